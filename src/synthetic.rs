//! Synthetic slide tiles.
//!
//! Renders a deterministic tissue-like pattern as PNG tiles so the engine can run
//! without a tile server. Pixels are computed from image-space coordinates, so
//! every pyramid level shows the same picture at a different resolution.

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, Rgba, RgbaImage};

use crate::pyramid::{TileLoader, TileRequest};

/// Edge of one checkerboard cell in image pixels
const CELL_SIZE: f64 = 1024.0;

/// Stain-like palette: background, hematoxylin, eosin
const BACKGROUND: [u8; 3] = [244, 240, 246];
const HEMATOXYLIN: [u8; 3] = [92, 64, 150];
const EOSIN: [u8; 3] = [226, 140, 180];

/// Pattern generator for a slide of `width` x `height` image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticSlide {
    pub width: f64,
    pub height: f64,
}

impl SyntheticSlide {
    pub fn new(width: u64, height: u64) -> Self {
        Self {
            width: width as f64,
            height: height as f64,
        }
    }

    /// Color at an image-space position. Outside the image is transparent.
    pub fn sample(&self, x: f64, y: f64) -> Rgba<u8> {
        if x < 0.0 || y < 0.0 || x >= self.width || y >= self.height {
            return Rgba([0, 0, 0, 0]);
        }

        let fx = x / self.width;
        let fy = y / self.height;

        // Elliptical "tissue" region with a ragged edge
        let cx = fx - 0.5;
        let cy = fy - 0.5;
        let edge = 0.42 + 0.03 * (fx * 40.0).sin() * (fy * 30.0).cos();
        if (cx * cx + cy * cy).sqrt() > edge {
            return rgba(BACKGROUND);
        }

        // Checkerboard cells alternate stain dominance
        let checker = ((x / CELL_SIZE) as u64 + (y / CELL_SIZE) as u64) % 2 == 0;
        // Nuclei-like blobs on a fine grid
        let nx = (x / 48.0).fract() - 0.5;
        let ny = (y / 48.0).fract() - 0.5;
        let nucleus = nx * nx + ny * ny < 0.06;

        let base = if checker { EOSIN } else { blend(EOSIN, HEMATOXYLIN, 0.35) };
        if nucleus { rgba(HEMATOXYLIN) } else { rgba(base) }
    }

    /// Render the raster of one tile request.
    pub fn render(&self, request: &TileRequest) -> RgbaImage {
        let width = request.level_rect.width.max(1) as u32;
        let height = request.level_rect.height.max(1) as u32;
        let sx = request.image_rect.width / width as f64;
        let sy = request.image_rect.height / height as f64;
        RgbaImage::from_fn(width, height, |px, py| {
            self.sample(
                request.image_rect.x + (px as f64 + 0.5) * sx,
                request.image_rect.y + (py as f64 + 0.5) * sy,
            )
        })
    }

    /// Render and encode a tile as PNG.
    pub fn encode(&self, request: &TileRequest) -> Result<Vec<u8>, String> {
        let mut bytes = Cursor::new(Vec::new());
        self.render(request)
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(|e| format!("Failed to encode tile {}: {}", request.tile, e))?;
        Ok(bytes.into_inner())
    }

    /// Loader for [`crate::pyramid::ThreadedFetcher`] serving this slide.
    pub fn loader(self) -> TileLoader {
        Arc::new(move |request: &TileRequest| {
            log::trace!("Synthesizing tile {} ({})", request.tile, request.url);
            self.encode(request)
        })
    }
}

fn rgba([r, g, b]: [u8; 3]) -> Rgba<u8> {
    Rgba([r, g, b, 255])
}

fn blend(a: [u8; 3], b: [u8; 3], t: f64) -> [u8; 3] {
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    [mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])]
}
