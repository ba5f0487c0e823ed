//! Viewport model: center, zoom and rotation over the image plane.
//!
//! The forward transform is
//!
//! ```text
//! screen = R(rotation) * (image - center) * zoom + container / 2
//! ```
//!
//! with screen Y pointing down. Every operation either commits a new, fully
//! valid state and returns the [`ViewportEvent`] describing it, or is rejected
//! and leaves the previous state in place.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, DEFAULT_ZOOM_STEP};
use crate::error::ViewportError;
use crate::model::{Point, Rect};

/// A position on screen, in pixels from the container's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: ScreenPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Size of the on-screen container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: f64,
    pub height: f64,
}

impl ScreenSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> ScreenPoint {
        ScreenPoint::new(self.width / 2.0, self.height / 2.0)
    }

    fn validate(&self) -> Result<(), ViewportError> {
        let ok = |v: f64| v.is_finite() && v > 0.0;
        if ok(self.width) && ok(self.height) {
            Ok(())
        } else {
            Err(ViewportError::InvalidContainer {
                width: self.width,
                height: self.height,
            })
        }
    }
}

/// Zoom range and wheel step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomLimits {
    pub min: f64,
    pub max: f64,
    /// Factor applied per zoom step
    pub step: f64,
}

impl ZoomLimits {
    pub fn clamp(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min, self.max)
    }
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_ZOOM,
            max: DEFAULT_MAX_ZOOM,
            step: DEFAULT_ZOOM_STEP,
        }
    }
}

/// A committed viewport snapshot. Cheap to copy into events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    /// Image-space point at the container center
    pub center: Point,
    /// Screen pixels per image pixel
    pub zoom: f64,
    /// Clockwise rotation in degrees, normalized to `[0, 360)`
    pub rotation: f64,
    pub container: ScreenSize,
}

impl ViewportState {
    fn validate(&self) -> Result<(), ViewportError> {
        if !self.zoom.is_finite() || self.zoom <= 0.0 {
            return Err(ViewportError::InvalidZoom { zoom: self.zoom });
        }
        if !self.center.is_finite() {
            return Err(ViewportError::NonFinite {
                what: "center",
                x: self.center.x,
                y: self.center.y,
            });
        }
        if !self.rotation.is_finite() {
            return Err(ViewportError::NonFinite {
                what: "rotation",
                x: self.rotation,
                y: 0.0,
            });
        }
        self.container.validate()
    }

    fn sin_cos(&self) -> (f64, f64) {
        self.rotation.to_radians().sin_cos()
    }

    /// Project an image-space point onto the screen.
    pub fn image_to_screen(&self, p: Point) -> ScreenPoint {
        let (sin, cos) = self.sin_cos();
        let dx = (p.x - self.center.x) * self.zoom;
        let dy = (p.y - self.center.y) * self.zoom;
        let origin = self.container.center();
        ScreenPoint::new(
            origin.x + dx * cos - dy * sin,
            origin.y + dx * sin + dy * cos,
        )
    }

    /// Inverse of [`image_to_screen`](Self::image_to_screen).
    pub fn screen_to_image(&self, s: ScreenPoint) -> Point {
        let (sin, cos) = self.sin_cos();
        let origin = self.container.center();
        let dx = s.x - origin.x;
        let dy = s.y - origin.y;
        Point::new(
            self.center.x + (dx * cos + dy * sin) / self.zoom,
            self.center.y + (-dx * sin + dy * cos) / self.zoom,
        )
    }

    /// Image-space rectangle enclosing everything visible in the container.
    pub fn bounds(&self) -> Rect {
        let ScreenSize { width, height } = self.container;
        let corners = [
            ScreenPoint::new(0.0, 0.0),
            ScreenPoint::new(width, 0.0),
            ScreenPoint::new(width, height),
            ScreenPoint::new(0.0, height),
        ]
        .map(|c| self.screen_to_image(c));
        Rect::enclosing(corners).unwrap_or_default()
    }

    /// Center chosen so that image point `image` lands on screen point `anchor`.
    fn center_for_anchor(&self, image: Point, anchor: ScreenPoint) -> Point {
        let (sin, cos) = self.sin_cos();
        let origin = self.container.center();
        let dx = anchor.x - origin.x;
        let dy = anchor.y - origin.y;
        Point::new(
            image.x - (dx * cos + dy * sin) / self.zoom,
            image.y - (-dx * sin + dy * cos) / self.zoom,
        )
    }
}

/// Which operation produced a viewport event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewportChange {
    Pan,
    Zoom,
    Rotate,
    Fit,
    Resize,
}

/// Notification for one committed viewport change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportEvent {
    /// Monotonic per viewport
    pub revision: u64,
    pub change: ViewportChange,
    pub state: ViewportState,
}

impl ViewportEvent {
    pub fn bounds(&self) -> Rect {
        self.state.bounds()
    }
}

/// Owns the current viewport state over one image.
#[derive(Debug, Clone)]
pub struct Viewport {
    state: ViewportState,
    limits: ZoomLimits,
    /// Full image extent, used by fit
    image: Rect,
    revision: u64,
}

impl Viewport {
    /// Viewport over `image` showing it fitted into `container`.
    pub fn new(image: Rect, container: ScreenSize, limits: ZoomLimits) -> Result<Self, ViewportError> {
        container.validate()?;
        if limits.min.is_nan() || limits.min <= 0.0 || limits.max.is_nan() || limits.max < limits.min {
            return Err(ViewportError::InvalidZoom { zoom: limits.min });
        }
        let state = ViewportState {
            center: image.center(),
            zoom: limits.clamp(1.0),
            rotation: 0.0,
            container,
        };
        let mut viewport = Self {
            state,
            limits,
            image,
            revision: 0,
        };
        viewport.state = viewport.fitted(container)?;
        Ok(viewport)
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn limits(&self) -> ZoomLimits {
        self.limits
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn zoom(&self) -> f64 {
        self.state.zoom
    }

    pub fn bounds(&self) -> Rect {
        self.state.bounds()
    }

    pub fn image_to_screen(&self, p: Point) -> ScreenPoint {
        self.state.image_to_screen(p)
    }

    pub fn screen_to_image(&self, s: ScreenPoint) -> Point {
        self.state.screen_to_image(s)
    }

    /// Move the center by an image-space delta.
    pub fn pan(&mut self, delta: Point) -> Result<ViewportEvent, ViewportError> {
        if !delta.is_finite() {
            return self.reject(ViewportError::NonFinite {
                what: "pan delta",
                x: delta.x,
                y: delta.y,
            });
        }
        let mut next = self.state;
        next.center = Point::new(next.center.x + delta.x, next.center.y + delta.y);
        self.commit(next, ViewportChange::Pan)
    }

    /// Drag the content by a screen-space delta; the image follows the pointer.
    pub fn pan_by_screen(&mut self, dx: f64, dy: f64) -> Result<ViewportEvent, ViewportError> {
        let origin = self.state.container.center();
        let moved = self
            .state
            .screen_to_image(ScreenPoint::new(origin.x - dx, origin.y - dy));
        let delta = Point::new(moved.x - self.state.center.x, moved.y - self.state.center.y);
        self.pan(delta)
    }

    /// Set an absolute zoom, keeping the image point under `anchor` fixed on screen.
    ///
    /// The zoom is clamped to the configured limits.
    pub fn zoom_to(&mut self, zoom: f64, anchor: ScreenPoint) -> Result<ViewportEvent, ViewportError> {
        if !zoom.is_finite() || zoom <= 0.0 {
            return self.reject(ViewportError::InvalidZoom { zoom });
        }
        if !anchor.is_finite() {
            return self.reject(ViewportError::NonFinite {
                what: "zoom anchor",
                x: anchor.x,
                y: anchor.y,
            });
        }
        let under_anchor = self.state.screen_to_image(anchor);
        let mut next = self.state;
        next.zoom = self.limits.clamp(zoom);
        next.center = next.center_for_anchor(under_anchor, anchor);
        self.commit(next, ViewportChange::Zoom)
    }

    /// Multiply the zoom by `factor` around `anchor`.
    pub fn zoom_by(&mut self, factor: f64, anchor: ScreenPoint) -> Result<ViewportEvent, ViewportError> {
        self.zoom_to(self.state.zoom * factor, anchor)
    }

    /// One zoom step in (`steps > 0`) or out around `anchor`.
    pub fn zoom_steps(&mut self, steps: i32, anchor: ScreenPoint) -> Result<ViewportEvent, ViewportError> {
        self.zoom_by(self.limits.step.powi(steps), anchor)
    }

    /// Rotate clockwise by `degrees` about the container center.
    pub fn rotate(&mut self, degrees: f64) -> Result<ViewportEvent, ViewportError> {
        self.set_rotation(self.state.rotation + degrees)
    }

    /// Set an absolute rotation about the container center.
    pub fn set_rotation(&mut self, degrees: f64) -> Result<ViewportEvent, ViewportError> {
        if !degrees.is_finite() {
            return self.reject(ViewportError::NonFinite {
                what: "rotation",
                x: degrees,
                y: 0.0,
            });
        }
        let mut next = self.state;
        next.rotation = degrees.rem_euclid(360.0);
        self.commit(next, ViewportChange::Rotate)
    }

    /// Center the image and pick the largest zoom at which it fits `container`.
    pub fn fit_to_container(&mut self, container: ScreenSize) -> Result<ViewportEvent, ViewportError> {
        match self.fitted(container) {
            Ok(next) => self.commit(next, ViewportChange::Fit),
            Err(e) => self.reject(e),
        }
    }

    /// Resize the container, keeping center, zoom and rotation.
    pub fn set_container_size(&mut self, container: ScreenSize) -> Result<ViewportEvent, ViewportError> {
        let mut next = self.state;
        next.container = container;
        self.commit(next, ViewportChange::Resize)
    }

    fn fitted(&self, container: ScreenSize) -> Result<ViewportState, ViewportError> {
        container.validate()?;
        let (sin, cos) = self.state.sin_cos();
        let (w, h) = (self.image.width, self.image.height);
        // Axis-aligned size of the rotated image
        let rotated_w = w * cos.abs() + h * sin.abs();
        let rotated_h = w * sin.abs() + h * cos.abs();
        let zoom = if rotated_w > 0.0 && rotated_h > 0.0 {
            (container.width / rotated_w).min(container.height / rotated_h)
        } else {
            1.0
        };
        Ok(ViewportState {
            center: self.image.center(),
            zoom: self.limits.clamp(zoom),
            rotation: self.state.rotation,
            container,
        })
    }

    fn commit(&mut self, next: ViewportState, change: ViewportChange) -> Result<ViewportEvent, ViewportError> {
        if let Err(e) = next.validate() {
            return self.reject(e);
        }
        self.state = next;
        self.revision += 1;
        log::trace!(
            "Viewport {:?} r{}: center=({:.2}, {:.2}) zoom={:.5} rotation={:.1}",
            change,
            self.revision,
            next.center.x,
            next.center.y,
            next.zoom,
            next.rotation
        );
        Ok(ViewportEvent {
            revision: self.revision,
            change,
            state: next,
        })
    }

    fn reject(&self, error: ViewportError) -> Result<ViewportEvent, ViewportError> {
        log::warn!("Rejected viewport operation: {}", error);
        Err(error)
    }
}
