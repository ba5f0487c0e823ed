//! Tile pyramid renderer.
//!
//! On every viewport change the renderer recomputes the covering tile set, asks
//! the fetcher only for tiles it has neither cached nor in flight, and produces a
//! [`TileFrame`] listing what to draw where. Cells whose tile is missing borrow the
//! matching region of the nearest cached ancestor until the real tile arrives.

use std::collections::HashSet;

use super::cache::{TileCache, TileImage};
use super::fetch::TileFetcher;
use super::{ImagePlane, TileCover, TileDescriptor, TileSource};
use crate::model::Rect;
use crate::viewport::{ScreenPoint, ViewportState};

/// One textured quad of the tile layer.
#[derive(Debug, Clone)]
pub struct TileDraw {
    /// Covering cell being filled
    pub cell: TileDescriptor,
    /// Tile whose pixels are drawn (an ancestor for placeholders)
    pub source: TileDescriptor,
    pub image: TileImage,
    /// Pixel rectangle within `image`
    pub source_rect: Rect,
    /// Screen corners: top-left, top-right, bottom-right, bottom-left of the cell
    pub quad: [ScreenPoint; 4],
    pub placeholder: bool,
}

/// Composited tile layer for one frame. Draw in order.
#[derive(Debug, Clone, Default)]
pub struct TileFrame {
    pub level: u32,
    pub draws: Vec<TileDraw>,
    /// Cells with nothing to show yet
    pub missing: Vec<TileDescriptor>,
    /// Fetches still outstanding
    pub pending: usize,
}

impl TileFrame {
    /// Every covering cell has its own tile.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.draws.iter().all(|d| !d.placeholder)
    }

    pub fn placeholders(&self) -> usize {
        self.draws.iter().filter(|d| d.placeholder).count()
    }
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub requested: u64,
    pub received: u64,
    pub failed: u64,
    pub cancelled: u64,
}

pub struct TileRenderer {
    source: Box<dyn TileSource>,
    fetcher: Box<dyn TileFetcher>,
    cache: TileCache,
    cover: Option<TileCover>,
    in_flight: HashSet<TileDescriptor>,
    /// Tiles whose last fetch failed; retried when they re-enter the view
    failed: HashSet<TileDescriptor>,
    stats: RendererStats,
}

impl TileRenderer {
    pub fn new(source: Box<dyn TileSource>, fetcher: Box<dyn TileFetcher>, cache: TileCache) -> Self {
        Self {
            source,
            fetcher,
            cache,
            cover: None,
            in_flight: HashSet::new(),
            failed: HashSet::new(),
            stats: RendererStats::default(),
        }
    }

    pub fn plane(&self) -> &ImagePlane {
        self.source.plane()
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn cover(&self) -> Option<&TileCover> {
        self.cover.as_ref()
    }

    pub fn stats(&self) -> RendererStats {
        self.stats
    }

    /// Fetches issued and not yet received.
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Recompute the covering set for a committed viewport and request what is new.
    ///
    /// Returns the number of requests issued.
    pub fn on_viewport(&mut self, state: &ViewportState) -> usize {
        let cover = self.plane().covering_tiles(&state.bounds(), state.zoom);
        let previous = self.cover.replace(cover.clone());

        let departed: Vec<_> = self
            .in_flight
            .iter()
            .copied()
            .filter(|tile| !cover.contains(tile))
            .collect();
        for tile in departed {
            self.in_flight.remove(&tile);
            self.fetcher.cancel(tile);
            self.stats.cancelled += 1;
        }

        let mut issued = 0;
        for tile in cover.iter() {
            if self.cache.contains(&tile) || self.in_flight.contains(&tile) {
                continue;
            }
            let still_visible = previous.as_ref().is_some_and(|p| p.contains(&tile));
            if self.failed.contains(&tile) && still_visible {
                continue;
            }
            let Some(request) = self.source.request(tile) else {
                continue;
            };
            self.failed.remove(&tile);
            self.fetcher.request(request);
            self.in_flight.insert(tile);
            issued += 1;
        }
        self.stats.requested += issued as u64;

        self.update_pins();
        if issued > 0 {
            log::debug!(
                "Level {}: {} tiles visible, {} requested, {} in flight",
                cover.level,
                cover.len(),
                issued,
                self.in_flight.len()
            );
        }
        issued
    }

    /// Drain fetch completions into the cache.
    ///
    /// Results are cached even when the tile is no longer visible. Failures only
    /// mark the tile; its cell keeps whatever placeholder it had. Returns whether
    /// any visible cell changed.
    pub fn receive(&mut self) -> bool {
        let mut changed = false;
        for response in self.fetcher.poll() {
            let tile = response.tile;
            self.in_flight.remove(&tile);
            let visible = self.cover.as_ref().is_some_and(|c| c.contains(&tile));
            match response.result {
                Ok(image) => {
                    self.stats.received += 1;
                    self.failed.remove(&tile);
                    self.cache.insert(tile, image);
                    changed |= visible;
                }
                Err(e) => {
                    self.stats.failed += 1;
                    log::debug!("Tile fetch failed (visible: {}): {}", visible, e);
                    self.failed.insert(tile);
                }
            }
        }
        if changed {
            self.update_pins();
        }
        changed
    }

    /// Build the draw list for `state`, placeholders first.
    pub fn composite(&mut self, state: &ViewportState) -> TileFrame {
        let Some(cover) = self.cover.clone() else {
            return TileFrame::default();
        };
        let mut exact = Vec::new();
        let mut placeholders = Vec::new();
        let mut missing = Vec::new();

        for cell in cover.iter() {
            let Some(cell_rect) = self.plane().tile_image_rect(cell) else {
                continue;
            };
            let quad = cell_rect.corners().map(|c| state.image_to_screen(c));

            if let Some(image) = self.cache.get(&cell) {
                exact.push(TileDraw {
                    cell,
                    source: cell,
                    source_rect: Rect::new(0.0, 0.0, image.width as f64, image.height as f64),
                    image,
                    quad,
                    placeholder: false,
                });
                continue;
            }

            match self.cached_ancestor(cell) {
                Some(ancestor) => {
                    let source_rect = self.ancestor_region(ancestor, &cell_rect);
                    if let Some(image) = self.cache.get(&ancestor) {
                        placeholders.push(TileDraw {
                            cell,
                            source: ancestor,
                            source_rect: clip_to_image(source_rect, &image),
                            image,
                            quad,
                            placeholder: true,
                        });
                    }
                }
                None => missing.push(cell),
            }
        }

        // Coarser placeholders underneath finer ones
        placeholders.sort_by_key(|d: &TileDraw| (d.source.level, d.cell));
        placeholders.extend(exact);

        TileFrame {
            level: cover.level,
            draws: placeholders,
            missing,
            pending: self.in_flight.len(),
        }
    }

    /// Nearest coarser tile present in the cache.
    fn cached_ancestor(&self, tile: TileDescriptor) -> Option<TileDescriptor> {
        let min_level = self.plane().min_level;
        let mut current = tile.parent();
        while let Some(candidate) = current {
            if candidate.level < min_level {
                return None;
            }
            if self.cache.contains(&candidate) {
                return Some(candidate);
            }
            current = candidate.parent();
        }
        None
    }

    /// Pixel region of `ancestor` that covers the image-space rectangle `cell`.
    fn ancestor_region(&self, ancestor: TileDescriptor, cell: &Rect) -> Rect {
        let plane = self.plane();
        let scale = plane.level_scale(ancestor.level);
        let origin = plane
            .tile_image_rect(ancestor)
            .map_or((0.0, 0.0), |r| (r.x, r.y));
        Rect::new(
            (cell.x - origin.0) * scale,
            (cell.y - origin.1) * scale,
            cell.width * scale,
            cell.height * scale,
        )
    }

    /// Pin visible tiles and the ancestors standing in for missing ones.
    fn update_pins(&mut self) {
        let Some(cover) = self.cover.as_ref() else {
            return;
        };
        let mut pinned: Vec<TileDescriptor> = cover.iter().collect();
        let placeholders: Vec<_> = pinned
            .iter()
            .filter(|tile| !self.cache.contains(tile))
            .filter_map(|tile| self.cached_ancestor(*tile))
            .collect();
        pinned.extend(placeholders);
        self.cache.set_pinned(pinned);
    }
}

fn clip_to_image(rect: Rect, image: &TileImage) -> Rect {
    let x = rect.x.clamp(0.0, image.width as f64);
    let y = rect.y.clamp(0.0, image.height as f64);
    let right = rect.right().clamp(x, image.width as f64);
    let bottom = rect.bottom().clamp(y, image.height as f64);
    Rect::new(x, y, right - x, bottom - y)
}

impl std::fmt::Debug for TileRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileRenderer")
            .field("cover", &self.cover)
            .field("cached", &self.cache.len())
            .field("in_flight", &self.in_flight.len())
            .field("stats", &self.stats)
            .finish()
    }
}
