//! Tile pyramid addressing.
//!
//! Maps a virtual gigapixel image onto discrete `(level, col, row)` tiles.
//! Level `max_level` is full resolution; each level below halves the linear
//! resolution, so `level_scale(level) = 2^(level - max_level)`.
//!
//! Everything in this module is pure. Fetching, caching and compositing live in
//! the submodules.

mod cache;
mod fetch;
mod renderer;

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_LEVEL, DEFAULT_TILE_FORMAT, DEFAULT_TILE_SIZE, DEFAULT_TILE_URL_TEMPLATE};
use crate::error::ConfigError;
use crate::model::Rect;

pub use cache::{TileCache, TileImage};
pub use fetch::{TileFetcher, TileResponse, ThreadedFetcher, TileLoader, decode_tile};
pub use renderer::{RendererStats, TileDraw, TileFrame, TileRenderer};

/// Identifies one fetchable raster unit of the pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileDescriptor {
    pub level: u32,
    pub col: u32,
    pub row: u32,
}

impl TileDescriptor {
    pub const fn new(level: u32, col: u32, row: u32) -> Self {
        Self { level, col, row }
    }

    /// The tile one level coarser that covers this one.
    pub fn parent(&self) -> Option<TileDescriptor> {
        (self.level > 0).then(|| TileDescriptor::new(self.level - 1, self.col / 2, self.row / 2))
    }
}

impl fmt::Display for TileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}_{}", self.level, self.col, self.row)
    }
}

/// Integer pixel rectangle in the coordinate space of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LevelRect {
    pub x: u64,
    pub y: u64,
    pub width: u64,
    pub height: u64,
}

fn default_tile_size() -> u32 {
    DEFAULT_TILE_SIZE
}

fn default_max_level() -> u32 {
    DEFAULT_MAX_LEVEL
}

/// The virtual image plane of one slide. Immutable once the slide is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePlane {
    /// Full-resolution width in pixels
    pub width: u64,
    /// Full-resolution height in pixels
    pub height: u64,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    #[serde(default)]
    pub min_level: u32,
    #[serde(default = "default_max_level")]
    pub max_level: u32,
    /// Microns per pixel along X, when the scanner recorded it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpp_x: Option<f64>,
    /// Microns per pixel along Y
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpp_y: Option<f64>,
    /// Objective power of the scan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnification: Option<f64>,
}

impl ImagePlane {
    /// Create a plane covering levels `0..=max_level`.
    pub fn new(width: u64, height: u64, tile_size: u32, max_level: u32) -> Result<Self, ConfigError> {
        let plane = Self {
            width,
            height,
            tile_size,
            min_level: 0,
            max_level,
            mpp_x: None,
            mpp_y: None,
            magnification: None,
        };
        plane.validate()?;
        Ok(plane)
    }

    pub fn with_mpp(mut self, mpp_x: f64, mpp_y: f64) -> Self {
        self.mpp_x = Some(mpp_x);
        self.mpp_y = Some(mpp_y);
        self
    }

    /// Check dimensions and level range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::invalid(
                "width/height",
                format!("image must be non-empty, got {}x{}", self.width, self.height),
            ));
        }
        if self.tile_size == 0 {
            return Err(ConfigError::invalid("tile_size", "must be positive"));
        }
        if self.min_level > self.max_level {
            return Err(ConfigError::invalid(
                "min_level",
                format!("{} exceeds max_level {}", self.min_level, self.max_level),
            ));
        }
        if self.max_level > 62 {
            return Err(ConfigError::invalid("max_level", "must be at most 62"));
        }
        Ok(())
    }

    /// Full image extent as an image-space rectangle.
    pub fn extent(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f64, self.height as f64)
    }

    /// Clamp any level into `[min_level, max_level]`.
    pub fn clamp_level(&self, level: i64) -> u32 {
        level.clamp(self.min_level as i64, self.max_level as i64) as u32
    }

    /// Linear scale of `level` relative to full resolution.
    pub fn level_scale(&self, level: u32) -> f64 {
        let level = self.clamp_level(level as i64);
        2f64.powi(level as i32 - self.max_level as i32)
    }

    /// Pixel dimensions of the image at `level`.
    pub fn level_dimensions(&self, level: u32) -> (u64, u64) {
        let scale = self.level_scale(level);
        (
            ((self.width as f64 * scale).ceil() as u64).max(1),
            ((self.height as f64 * scale).ceil() as u64).max(1),
        )
    }

    /// Tile grid size `(num_x, num_y)` at `level`.
    pub fn num_tiles(&self, level: u32) -> (u32, u32) {
        let (w, h) = self.level_dimensions(level);
        let ts = self.tile_size as u64;
        (w.div_ceil(ts) as u32, h.div_ceil(ts) as u32)
    }

    /// Whether the descriptor addresses an existing tile.
    pub fn contains_tile(&self, tile: TileDescriptor) -> bool {
        if tile.level < self.min_level || tile.level > self.max_level {
            return false;
        }
        let (nx, ny) = self.num_tiles(tile.level);
        tile.col < nx && tile.row < ny
    }

    /// Pixel footprint of a tile in its own level. Edge tiles are clipped.
    pub fn tile_level_rect(&self, tile: TileDescriptor) -> Option<LevelRect> {
        if !self.contains_tile(tile) {
            return None;
        }
        let (w, h) = self.level_dimensions(tile.level);
        let ts = self.tile_size as u64;
        let x = tile.col as u64 * ts;
        let y = tile.row as u64 * ts;
        Some(LevelRect {
            x,
            y,
            width: ts.min(w - x),
            height: ts.min(h - y),
        })
    }

    /// Footprint of a tile in image space, clipped to the image extent.
    pub fn tile_image_rect(&self, tile: TileDescriptor) -> Option<Rect> {
        let lr = self.tile_level_rect(tile)?;
        let scale = self.level_scale(tile.level);
        let x0 = lr.x as f64 / scale;
        let y0 = lr.y as f64 / scale;
        let x1 = ((lr.x + lr.width) as f64 / scale).min(self.width as f64);
        let y1 = ((lr.y + lr.height) as f64 / scale).min(self.height as f64);
        Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Level whose scale is closest to, but not coarser than, `zoom`.
    ///
    /// `zoom` is screen pixels per image pixel. Invalid zooms map to the finest level.
    pub fn level_for_zoom(&self, zoom: f64) -> u32 {
        if !zoom.is_finite() || zoom <= 0.0 {
            return self.max_level;
        }
        let offset = (zoom.log2() - 1e-9).ceil();
        let level = self.max_level as f64 + offset;
        self.clamp_level(level.clamp(i64::MIN as f64, i64::MAX as f64) as i64)
    }

    /// Tiles of `level` whose footprint intersects the image-space `bounds`.
    pub fn tiles_in(&self, level: u32, bounds: &Rect) -> TileCover {
        let level = self.clamp_level(level as i64);
        let (nx, ny) = self.num_tiles(level);
        let empty = TileCover {
            level,
            cols: 0..0,
            rows: 0..0,
        };
        if !bounds.is_finite() || bounds.width < 0.0 || bounds.height < 0.0 {
            return empty;
        }
        let scale = self.level_scale(level);
        let ts = self.tile_size as f64;
        let span = |lo: f64, hi: f64, n: u32| -> Range<u32> {
            let start = (lo * scale / ts).floor().clamp(0.0, n as f64) as u32;
            let end = (hi * scale / ts).ceil().clamp(0.0, n as f64) as u32;
            start..end.max(start)
        };
        let cols = span(bounds.x, bounds.right(), nx);
        let rows = span(bounds.y, bounds.bottom(), ny);
        if cols.is_empty() || rows.is_empty() {
            return empty;
        }
        TileCover { level, cols, rows }
    }

    /// Minimal covering tile set for a viewport showing `bounds` at `zoom`.
    pub fn covering_tiles(&self, bounds: &Rect, zoom: f64) -> TileCover {
        self.tiles_in(self.level_for_zoom(zoom), bounds)
    }
}

/// A rectangular block of tiles at one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileCover {
    pub level: u32,
    pub cols: Range<u32>,
    pub rows: Range<u32>,
}

impl TileCover {
    pub fn len(&self) -> usize {
        self.cols.len() * self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tiles in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = TileDescriptor> + '_ {
        self.rows.clone().flat_map(move |row| {
            self.cols
                .clone()
                .map(move |col| TileDescriptor::new(self.level, col, row))
        })
    }

    pub fn contains(&self, tile: &TileDescriptor) -> bool {
        tile.level == self.level && self.cols.contains(&tile.col) && self.rows.contains(&tile.row)
    }
}

/// Everything needed to fetch and place one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    pub tile: TileDescriptor,
    /// Resource locator understood by the fetcher
    pub url: String,
    /// Expected pixel span within the level
    pub level_rect: LevelRect,
    /// Footprint in image space
    pub image_rect: Rect,
}

/// Something that can name the resource behind each tile of a plane.
pub trait TileSource {
    fn plane(&self) -> &ImagePlane;

    /// Locator for a tile. Only called with descriptors inside the plane.
    fn tile_url(&self, tile: TileDescriptor) -> String;

    fn level_scale(&self, level: u32) -> f64 {
        self.plane().level_scale(level)
    }

    /// Build a request, or `None` for descriptors outside the plane.
    fn request(&self, tile: TileDescriptor) -> Option<TileRequest> {
        let plane = self.plane();
        Some(TileRequest {
            tile,
            level_rect: plane.tile_level_rect(tile)?,
            image_rect: plane.tile_image_rect(tile)?,
            url: self.tile_url(tile),
        })
    }
}

/// Tile source backed by a URL template.
///
/// Recognised placeholders: `{base}`, `{level}`, `{col}`, `{row}`, `{x}`, `{y}`
/// (level-space pixel offsets) and `{format}`.
#[derive(Debug, Clone)]
pub struct UrlTileSource {
    plane: ImagePlane,
    base_url: String,
    template: String,
    format: String,
}

impl UrlTileSource {
    /// Source using the default `?level=&x=&y=&format=` endpoint layout.
    pub fn new(plane: ImagePlane, base_url: impl Into<String>) -> Self {
        Self {
            plane,
            base_url: base_url.into(),
            template: DEFAULT_TILE_URL_TEMPLATE.to_string(),
            format: DEFAULT_TILE_FORMAT.to_string(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }
}

impl TileSource for UrlTileSource {
    fn plane(&self) -> &ImagePlane {
        &self.plane
    }

    fn tile_url(&self, tile: TileDescriptor) -> String {
        let ts = self.plane.tile_size as u64;
        self.template
            .replace("{base}", &self.base_url)
            .replace("{level}", &tile.level.to_string())
            .replace("{col}", &tile.col.to_string())
            .replace("{row}", &tile.row.to_string())
            .replace("{x}", &(tile.col as u64 * ts).to_string())
            .replace("{y}", &(tile.row as u64 * ts).to_string())
            .replace("{format}", &self.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(width: u64, height: u64, tile_size: u32, max_level: u32) -> ImagePlane {
        ImagePlane::new(width, height, tile_size, max_level).unwrap()
    }

    #[test]
    fn test_full_resolution_grid() {
        let p = plane(10000, 8000, 256, 5);
        assert_eq!(p.num_tiles(5), (40, 32));
        assert_eq!(p.level_dimensions(5), (10000, 8000));
    }

    #[test]
    fn test_level_scale_monotonic() {
        let p = plane(10000, 8000, 256, 5);
        assert_eq!(p.level_scale(5), 1.0);
        assert_eq!(p.level_scale(4), 0.5);
        assert_eq!(p.level_scale(0), 1.0 / 32.0);
        for level in 1..=5 {
            assert!(p.level_scale(level) > p.level_scale(level - 1));
        }
        assert_eq!(p.level_dimensions(0), (313, 250));
        assert_eq!(p.num_tiles(0), (2, 1));
    }

    #[test]
    fn test_tile_footprints_cover_every_level_exactly() {
        for &(w, h, ts, max) in &[
            (10000u64, 8000u64, 256u32, 5u32),
            (1, 1, 256, 3),
            (257, 255, 256, 2),
            (1000, 3, 7, 4),
            (4096, 4096, 512, 6),
        ] {
            let p = plane(w, h, ts, max);
            for level in 0..=max {
                let (lw, lh) = p.level_dimensions(level);
                let (nx, ny) = p.num_tiles(level);
                // Row widths sum to the level width, column heights to the level height
                let mut x_cursor = 0;
                for col in 0..nx {
                    let r = p.tile_level_rect(TileDescriptor::new(level, col, 0)).unwrap();
                    assert_eq!(r.x, x_cursor, "gap before col {col} at level {level}");
                    assert!(r.width > 0 && r.width <= ts as u64);
                    x_cursor += r.width;
                }
                assert_eq!(x_cursor, lw);
                let mut y_cursor = 0;
                for row in 0..ny {
                    let r = p.tile_level_rect(TileDescriptor::new(level, 0, row)).unwrap();
                    assert_eq!(r.y, y_cursor);
                    y_cursor += r.height;
                }
                assert_eq!(y_cursor, lh);
                assert!(p.tile_level_rect(TileDescriptor::new(level, nx, 0)).is_none());
                assert!(p.tile_level_rect(TileDescriptor::new(level, 0, ny)).is_none());
            }
        }
    }

    #[test]
    fn test_image_rect_clipped_to_extent() {
        let p = plane(1000, 600, 256, 3);
        let (nx, ny) = p.num_tiles(3);
        let last = p.tile_image_rect(TileDescriptor::new(3, nx - 1, ny - 1)).unwrap();
        assert_eq!(last.right(), 1000.0);
        assert_eq!(last.bottom(), 600.0);

        // Coarse level: one tile spans the whole image
        let coarse = p.tile_image_rect(TileDescriptor::new(0, 0, 0)).unwrap();
        assert_eq!(coarse, Rect::new(0.0, 0.0, 1000.0, 600.0));
    }

    #[test]
    fn test_level_for_zoom() {
        let p = plane(10000, 8000, 256, 5);
        assert_eq!(p.level_for_zoom(1.0), 5);
        assert_eq!(p.level_for_zoom(4.0), 5);
        assert_eq!(p.level_for_zoom(0.5), 4);
        // Between levels picks the finer one
        assert_eq!(p.level_for_zoom(0.3), 4);
        assert_eq!(p.level_for_zoom(0.25), 3);
        // Clamped silently
        assert_eq!(p.level_for_zoom(1e-6), 0);
        assert_eq!(p.level_for_zoom(f64::NAN), 5);
        assert_eq!(p.level_for_zoom(0.0), 5);
    }

    #[test]
    fn test_covering_tiles_clips_out_of_plane_viewport() {
        let p = plane(1000, 1000, 256, 2);
        let cover = p.covering_tiles(&Rect::new(-500.0, -500.0, 800.0, 800.0), 1.0);
        assert_eq!(cover.level, 2);
        assert_eq!(cover.cols, 0..2);
        assert_eq!(cover.rows, 0..2);
        assert!(cover.iter().all(|t| p.contains_tile(t)));

        let outside = p.covering_tiles(&Rect::new(2000.0, 2000.0, 100.0, 100.0), 1.0);
        assert!(outside.is_empty());
        assert_eq!(outside.iter().count(), 0);

        let beyond = p.covering_tiles(&Rect::new(900.0, 900.0, 5000.0, 5000.0), 1.0);
        assert_eq!(beyond.cols, 3..4);
        assert_eq!(beyond.rows, 3..4);
    }

    #[test]
    fn test_covering_tiles_at_coarse_zoom() {
        let p = plane(10000, 8000, 256, 5);
        let cover = p.covering_tiles(&p.extent(), 0.1);
        assert_eq!(cover.level, 2);
        assert_eq!((cover.cols.len() as u32, cover.rows.len() as u32), p.num_tiles(2));
    }

    #[test]
    fn test_url_template() {
        let p = plane(10000, 8000, 256, 5);
        let source = UrlTileSource::new(p, "/api/wsi/3/tile");
        let req = source.request(TileDescriptor::new(5, 2, 3)).unwrap();
        assert_eq!(req.url, "/api/wsi/3/tile?level=5&x=512&y=768&format=jpeg");
        assert_eq!(req.level_rect.width, 256);
        assert!(source.request(TileDescriptor::new(5, 40, 0)).is_none());
        assert!(source.request(TileDescriptor::new(6, 0, 0)).is_none());

        let custom = source.with_template("{base}/{level}/{col}_{row}.{format}").with_format("png");
        assert_eq!(custom.tile_url(TileDescriptor::new(1, 0, 1)), "/api/wsi/3/tile/1/0_1.png");
    }

    #[test]
    fn test_parent() {
        assert_eq!(
            TileDescriptor::new(3, 5, 4).parent(),
            Some(TileDescriptor::new(2, 2, 2))
        );
        assert_eq!(TileDescriptor::new(0, 0, 0).parent(), None);
    }

    #[test]
    fn test_invalid_planes_rejected() {
        assert!(ImagePlane::new(0, 10, 256, 3).is_err());
        assert!(ImagePlane::new(10, 10, 0, 3).is_err());
        assert!(ImagePlane::new(10, 10, 256, 63).is_err());
    }
}
