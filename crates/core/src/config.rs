//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable request tracing.
    #[serde(default)]
    pub enable_tracing: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            enable_tracing: false,
        }
    }
}

/// Blob storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for tile blobs.
        path: PathBuf,
    },
    /// In-memory storage. Contents are lost on restart; intended for
    /// tests and single-session experiments.
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("data/tiles"),
        }
    }
}

/// Metadata store backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite-backed metadata store.
    Sqlite {
        /// Path to the database file.
        path: PathBuf,
    },
    /// In-memory metadata store for tests.
    Memory,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("data/mural.db"),
        }
    }
}

/// Generation pipeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Deepest zoom level; generation and deletion happen only here.
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
    /// How long a neighborhood lock is honored before takeover, in seconds.
    #[serde(default = "default_lock_duration_secs")]
    pub lock_duration_secs: u64,
    /// Maximum accepted prompt length in characters.
    #[serde(default = "default_prompt_max_len")]
    pub prompt_max_len: usize,
    /// Style name folded into the generation seed.
    #[serde(default = "default_style")]
    pub style: String,
}

fn default_max_zoom() -> u8 {
    7
}

fn default_lock_duration_secs() -> u64 {
    120
}

fn default_prompt_max_len() -> usize {
    500
}

fn default_style() -> String {
    "cubist-earthy-v1".to_string()
}

impl GenerationConfig {
    /// Get the lock duration as a Duration.
    pub fn lock_duration(&self) -> Duration {
        let secs = i64::try_from(self.lock_duration_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_zoom: default_max_zoom(),
            lock_duration_secs: default_lock_duration_secs(),
            prompt_max_len: default_prompt_max_len(),
            style: default_style(),
        }
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl AppConfig {
    /// Create a test configuration backed entirely by in-memory stores.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::Memory,
            metadata: MetadataConfig::Memory,
            generation: GenerationConfig {
                max_zoom: 2,
                ..Default::default()
            },
        }
    }
}
