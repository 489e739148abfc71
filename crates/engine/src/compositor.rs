//! Pure image operations: context grids, the radial blend mask, cell
//! extraction, parent quadrant compositing, and the placeholder tile.
//!
//! Everything here is a pure function of its pixel inputs; no I/O.

use crate::error::EngineResult;
use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use mural_core::{GRID_SIZE, TILE_SIZE};
use std::io::Cursor;

/// Checker square edge for the unknown-area background.
const CHECKER_SIZE: u32 = 16;

const CHECKER_LIGHT: Rgba<u8> = Rgba([255, 255, 255, 255]);
const CHECKER_GREY: Rgba<u8> = Rgba([200, 200, 200, 255]);

/// Decode PNG bytes into an RGBA image.
pub fn decode_png(bytes: &[u8]) -> EngineResult<RgbaImage> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8())
}

/// Encode an RGBA image as PNG bytes.
pub fn encode_png(img: &RgbaImage) -> EngineResult<Bytes> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(Bytes::from(buf))
}

/// Checkerboard background for grid cells with no known content, so the
/// generator always sees something rather than undefined pixels.
pub fn checkerboard(size: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| {
        if ((x / CHECKER_SIZE) + (y / CHECKER_SIZE)) % 2 == 0 {
            CHECKER_LIGHT
        } else {
            CHECKER_GREY
        }
    })
}

/// Assemble the 3x3 context grid: checkerboard base with every known
/// cell pasted into its slot, each normalized to the tile edge.
pub fn build_context_grid(cells: &[[Option<RgbaImage>; 3]; 3]) -> RgbaImage {
    let mut canvas = checkerboard(GRID_SIZE);
    for (row, row_cells) in cells.iter().enumerate() {
        for (col, cell) in row_cells.iter().enumerate() {
            if let Some(img) = cell {
                let tile = fit_tile(img);
                imageops::replace(
                    &mut canvas,
                    &tile,
                    (col as u32 * TILE_SIZE) as i64,
                    (row as u32 * TILE_SIZE) as i64,
                );
            }
        }
    }
    canvas
}

/// Resize to the tile edge unless already there.
pub fn fit_tile(img: &RgbaImage) -> RgbaImage {
    if img.width() == TILE_SIZE && img.height() == TILE_SIZE {
        img.clone()
    } else {
        imageops::resize(img, TILE_SIZE, TILE_SIZE, FilterType::Lanczos3)
    }
}

/// Resize a generated grid to the canonical grid edge unless already there.
pub fn normalize_grid(img: RgbaImage) -> RgbaImage {
    if img.width() == GRID_SIZE && img.height() == GRID_SIZE {
        img
    } else {
        imageops::resize(&img, GRID_SIZE, GRID_SIZE, FilterType::Lanczos3)
    }
}

/// Build the radial alpha mask for a full grid, one byte per pixel.
///
/// Full opacity within 50% of the radius from the grid center, zero at
/// the radius and beyond, linear in between. The radius touches the
/// midpoint of each grid side. Built once per edit batch and sliced per
/// cell.
pub fn radial_mask(size: u32) -> Vec<u8> {
    let center = size as f64 / 2.0;
    let radius = size as f64 / 2.0;
    let inner = radius * 0.5;
    let mut mask = vec![0u8; (size * size) as usize];
    for y in 0..size {
        for x in 0..size {
            let dx = x as f64 - center;
            let dy = y as f64 - center;
            let distance = (dx * dx + dy * dy).sqrt();
            let alpha = if distance <= inner {
                255.0
            } else if distance >= radius {
                0.0
            } else {
                255.0 * (1.0 - (distance - inner) / (radius - inner))
            };
            mask[(y * size + x) as usize] = alpha.round() as u8;
        }
    }
    mask
}

/// Blend a generated cell over existing content using the grid mask slice
/// for the cell at (col, row). Pure in (existing, generated, mask).
pub fn blend_cell(
    existing: &RgbaImage,
    generated: &RgbaImage,
    mask: &[u8],
    col: u32,
    row: u32,
) -> RgbaImage {
    let existing = fit_tile(existing);
    let generated = fit_tile(generated);
    RgbaImage::from_fn(TILE_SIZE, TILE_SIZE, |x, y| {
        let gx = col * TILE_SIZE + x;
        let gy = row * TILE_SIZE + y;
        let alpha = u32::from(mask[(gy * GRID_SIZE + gx) as usize]);
        let old = existing.get_pixel(x, y);
        let new = generated.get_pixel(x, y);
        let mut out = [0u8; 4];
        for c in 0..4 {
            let blended =
                (u32::from(old[c]) * (255 - alpha) + u32::from(new[c]) * alpha + 127) / 255;
            out[c] = blended as u8;
        }
        Rgba(out)
    })
}

/// Extract one cell from a generated grid, normalized to the tile edge.
///
/// When the generator returns an unexpectedly sized image the extraction
/// box is rescaled proportionally before the final resize. This mirrors
/// the observed behavior of the upstream model path; treat it as an
/// approximation rather than a guaranteed contract.
pub fn extract_cell(grid: &RgbaImage, col: u32, row: u32) -> RgbaImage {
    let scale_x = grid.width() as f64 / GRID_SIZE as f64;
    let scale_y = grid.height() as f64 / GRID_SIZE as f64;
    let left = ((col * TILE_SIZE) as f64 * scale_x).floor() as u32;
    let top = ((row * TILE_SIZE) as f64 * scale_y).floor() as u32;
    let width = ((TILE_SIZE as f64 * scale_x).floor() as u32).max(1);
    let height = ((TILE_SIZE as f64 * scale_y).floor() as u32).max(1);

    let width = width.min(grid.width().saturating_sub(left).max(1));
    let height = height.min(grid.height().saturating_sub(top).max(1));

    let cell = imageops::crop_imm(grid, left, top, width, height).to_image();
    fit_tile(&cell)
}

/// Composite up to four children into their parent tile.
///
/// Each present child is scaled to fill its quadrant; missing children
/// leave their quadrant transparent. Children are row-major:
/// [(0,0), (1,0), (0,1), (1,1)].
pub fn compose_parent(children: &[Option<RgbaImage>; 4]) -> RgbaImage {
    let half = TILE_SIZE / 2;
    let mut canvas = RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, Rgba([0, 0, 0, 0]));
    for (i, child) in children.iter().enumerate() {
        if let Some(img) = child {
            let scaled = imageops::resize(img, half, half, FilterType::Lanczos3);
            let col = (i as u32) % 2;
            let row = (i as u32) / 2;
            imageops::replace(&mut canvas, &scaled, (col * half) as i64, (row * half) as i64);
        }
    }
    canvas
}

/// The clearly marked placeholder served for tiles with no content:
/// white with a thin grey border and dashed center lines.
pub fn placeholder_tile() -> RgbaImage {
    const BORDER: Rgba<u8> = Rgba([112, 112, 112, 255]);
    const DASH: u32 = 4;

    let mut img = RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, Rgba([255, 255, 255, 255]));
    let last = TILE_SIZE - 1;
    let mid = TILE_SIZE / 2;
    for i in 0..TILE_SIZE {
        img.put_pixel(i, 0, BORDER);
        img.put_pixel(i, last, BORDER);
        img.put_pixel(0, i, BORDER);
        img.put_pixel(last, i, BORDER);
        if (i / DASH) % 2 == 0 {
            img.put_pixel(mid, i, BORDER);
            img.put_pixel(i, mid, BORDER);
        }
    }
    img
}
