//! Core domain types for the mural tile pyramid.
//!
//! This crate provides:
//! - Tile coordinates and quadtree navigation (parents, children, 3x3
//!   neighborhoods)
//! - Content hashing and the composite tile payload hash
//! - Application configuration shared across crates

pub mod config;
pub mod coord;
pub mod error;
pub mod hash;

pub use coord::{GRID_DIM, GRID_SIZE, TILE_SIZE, TileCoord};
pub use error::{Error, Result};
pub use hash::{ContentHash, generation_seed, payload_hash};

/// Version of the tile payload hashing scheme. Bumping this invalidates
/// every cached payload hash without touching stored bytes.
pub const ALGO_VERSION: u32 = 1;
