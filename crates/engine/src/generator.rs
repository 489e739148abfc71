//! Tile generation: the opaque generator contract, the deterministic
//! stub, and the fallback wrapper that keeps the pipeline producing
//! output when a model call fails.

use crate::compositor;
use async_trait::async_trait;
use bytes::Bytes;
use image::{Rgba, RgbaImage};
use mural_core::{TILE_SIZE, TileCoord};
use thiserror::Error;

/// Recoverable generation failures. Any of these triggers the stub
/// fallback; they surface to callers only when the stub also fails.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("content blocked: {0}")]
    Blocked(String),

    #[error("no output produced: {0}")]
    NoOutput(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Everything a generator gets to work with for one 3x3 request.
#[derive(Clone)]
pub struct GridContext {
    /// Center coordinate of the neighborhood.
    pub coord: TileCoord,
    /// The caller's prompt, already validated.
    pub prompt: String,
    /// Deterministic seed for this (coordinate, style, prompt) request.
    pub seed: String,
    /// Assembled 768x768 context grid PNG: checkerboard base with known
    /// neighbor content pasted in.
    pub context_png: Bytes,
    /// Which grid cells hold known content, row-major; [1][1] is the
    /// center.
    pub present: [[bool; 3]; 3],
}

/// The opaque image generation function.
///
/// Implementations return a PNG sized to a known multiple of the tile
/// edge (3x for the 3x3 grid) or fail with a recoverable error.
#[async_trait]
pub trait TileGenerator: Send + Sync {
    async fn generate(&self, ctx: &GridContext) -> Result<Bytes, GenerationError>;
}

/// Deterministic stub generator.
///
/// Paints the center cell with a color derived from the seed and the
/// prompt, and marks each center-cell edge that faces known neighbor
/// content. Identical requests always reproduce identical bytes.
#[derive(Default)]
pub struct StubGenerator;

impl StubGenerator {
    pub fn new() -> Self {
        Self
    }

    fn seed_color(seed: &str, prompt: &str) -> Rgba<u8> {
        let r = u8::from_str_radix(seed.get(0..2).unwrap_or("7f"), 16).unwrap_or(127);
        let g = u8::from_str_radix(seed.get(2..4).unwrap_or("7f"), 16).unwrap_or(127);
        let b = ((prompt.len() * 19) % 255) as u8;
        Rgba([r, g, b, 255])
    }

    /// Lighten a 1px strip of the center cell facing a known neighbor.
    fn mark_edge(grid: &mut RgbaImage, dx: i32, dy: i32) {
        let base = TILE_SIZE;
        let (x0, y0, w, h) = match (dx, dy) {
            (0, -1) => (base, base, TILE_SIZE, 1),
            (0, 1) => (base, base + TILE_SIZE - 1, TILE_SIZE, 1),
            (-1, 0) => (base, base, 1, TILE_SIZE),
            (1, 0) => (base + TILE_SIZE - 1, base, 1, TILE_SIZE),
            (1, -1) => (base + TILE_SIZE - 1, base, 1, 1),
            (-1, -1) => (base, base, 1, 1),
            (1, 1) => (base + TILE_SIZE - 1, base + TILE_SIZE - 1, 1, 1),
            _ => (base, base + TILE_SIZE - 1, 1, 1),
        };
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                let p = grid.get_pixel_mut(x, y);
                // ~15% toward white.
                for c in 0..3 {
                    p.0[c] = p.0[c].saturating_add(((255 - u16::from(p.0[c])) * 38 / 255) as u8);
                }
            }
        }
    }
}

#[async_trait]
impl TileGenerator for StubGenerator {
    async fn generate(&self, ctx: &GridContext) -> Result<Bytes, GenerationError> {
        let mut grid = compositor::decode_png(&ctx.context_png)
            .map_err(|e| GenerationError::NoOutput(format!("context grid undecodable: {e}")))?;
        grid = compositor::normalize_grid(grid);

        let color = Self::seed_color(&ctx.seed, &ctx.prompt);
        for y in TILE_SIZE..2 * TILE_SIZE {
            for x in TILE_SIZE..2 * TILE_SIZE {
                grid.put_pixel(x, y, color);
            }
        }

        for (row, cols) in ctx.present.iter().enumerate() {
            for (col, present) in cols.iter().enumerate() {
                let dx = col as i32 - 1;
                let dy = row as i32 - 1;
                if *present && (dx, dy) != (0, 0) {
                    Self::mark_edge(&mut grid, dx, dy);
                }
            }
        }

        compositor::encode_png(&grid)
            .map_err(|e| GenerationError::NoOutput(format!("encode failed: {e}")))
    }
}

/// Wraps a primary generator and falls back to the deterministic stub on
/// any recoverable failure, so the pipeline always produces output. With
/// no primary configured the stub runs directly.
pub struct FallbackGenerator {
    primary: Option<std::sync::Arc<dyn TileGenerator>>,
    stub: StubGenerator,
}

impl FallbackGenerator {
    pub fn new(primary: std::sync::Arc<dyn TileGenerator>) -> Self {
        Self {
            primary: Some(primary),
            stub: StubGenerator::new(),
        }
    }

    /// A fallback generator with no primary: stub only.
    pub fn stub_only() -> Self {
        Self {
            primary: None,
            stub: StubGenerator::new(),
        }
    }
}

#[async_trait]
impl TileGenerator for FallbackGenerator {
    async fn generate(&self, ctx: &GridContext) -> Result<Bytes, GenerationError> {
        if let Some(primary) = &self.primary {
            match primary.generate(ctx).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    tracing::warn!(
                        coord = %ctx.coord,
                        error = %e,
                        "generator failed, falling back to stub"
                    );
                }
            }
        }
        self.stub.generate(ctx).await
    }
}
