//! Annotation tools and the in-progress drawing state they drive.

use serde::{Deserialize, Serialize};

use super::geometry::{Geometry, Point, Rect};
use crate::constants::MIN_RING_VERTICES;

/// Minimum on-screen size (width/height, screen px) for a rectangle to be kept.
pub const MIN_RECT_SIZE: f64 = 1.0;

/// Annotation tools available on the toolbar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationTool {
    /// Select existing annotations
    #[default]
    Select,
    /// Freehand outline, closed into a polygon on release
    Freehand,
    /// Click-by-click polygon
    Polygon,
    /// Drag a rectangle
    Rectangle,
    /// Single point marker
    Point,
    /// Remove the annotation under the cursor
    Erase,
}

impl AnnotationTool {
    /// Get the display name for this tool.
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationTool::Select => "Select",
            AnnotationTool::Freehand => "Freehand",
            AnnotationTool::Polygon => "Polygon",
            AnnotationTool::Rectangle => "Rectangle",
            AnnotationTool::Point => "Point",
            AnnotationTool::Erase => "Erase",
        }
    }

    pub fn all() -> &'static [AnnotationTool] {
        &[
            AnnotationTool::Select,
            AnnotationTool::Freehand,
            AnnotationTool::Polygon,
            AnnotationTool::Rectangle,
            AnnotationTool::Point,
            AnnotationTool::Erase,
        ]
    }

    /// Whether the tool creates new geometry.
    pub fn is_drawing_tool(&self) -> bool {
        matches!(
            self,
            AnnotationTool::Freehand
                | AnnotationTool::Polygon
                | AnnotationTool::Rectangle
                | AnnotationTool::Point
        )
    }
}

/// Geometry being drawn, in image coordinates.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DrawingState {
    /// Not drawing anything.
    #[default]
    Idle,
    /// Rectangle drag from `start` to `current`.
    Rectangle { start: Point, current: Point },
    /// Polygon clicks or freehand samples collected so far.
    Path { vertices: Vec<Point>, freehand: bool },
}

impl DrawingState {
    pub fn is_drawing(&self) -> bool {
        !matches!(self, DrawingState::Idle)
    }

    /// Start a gesture with `tool` at `at`.
    ///
    /// Point markers complete immediately and are returned as finished geometry.
    pub fn begin(&mut self, tool: AnnotationTool, at: Point) -> Option<Geometry> {
        if tool == AnnotationTool::Point {
            *self = DrawingState::Idle;
            return Some(Geometry::Point(at));
        }
        *self = match tool {
            AnnotationTool::Rectangle => DrawingState::Rectangle {
                start: at,
                current: at,
            },
            AnnotationTool::Polygon | AnnotationTool::Freehand => DrawingState::Path {
                vertices: vec![at],
                freehand: tool == AnnotationTool::Freehand,
            },
            AnnotationTool::Point | AnnotationTool::Select | AnnotationTool::Erase => {
                DrawingState::Idle
            }
        };
        None
    }

    /// Pointer moved while drawing.
    pub fn drag(&mut self, to: Point) {
        match self {
            DrawingState::Rectangle { current, .. } => *current = to,
            DrawingState::Path {
                vertices,
                freehand: true,
            } => vertices.push(to),
            _ => {}
        }
    }

    /// Add a polygon vertex (click).
    pub fn add_vertex(&mut self, at: Point) {
        if let DrawingState::Path { vertices, .. } = self {
            vertices.push(at);
        }
    }

    /// End the gesture, returning geometry if it is large enough to keep.
    ///
    /// `zoom` is the screen scale the gesture was drawn at; rectangles are measured
    /// on screen so the threshold does not depend on magnification.
    pub fn finish(&mut self, zoom: f64) -> Option<Geometry> {
        let state = std::mem::take(self);
        match state {
            DrawingState::Idle => None,
            DrawingState::Rectangle { start, current } => {
                let rect = Rect::from_corners(start, current);
                let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
                let min_size = MIN_RECT_SIZE / zoom;
                (rect.width >= min_size && rect.height >= min_size).then_some(Geometry::Rectangle(rect))
            }
            DrawingState::Path { vertices, .. } => {
                (vertices.len() >= MIN_RING_VERTICES).then(|| Geometry::polygon(vertices))
            }
        }
    }

    pub fn cancel(&mut self) {
        *self = DrawingState::Idle;
    }

    /// Geometry to preview while the gesture is in progress.
    pub fn preview(&self) -> Option<Geometry> {
        match self {
            DrawingState::Idle => None,
            DrawingState::Rectangle { start, current } => {
                Some(Geometry::Rectangle(Rect::from_corners(*start, *current)))
            }
            DrawingState::Path { vertices, .. } if !vertices.is_empty() => {
                Some(Geometry::polygon(vertices.clone()))
            }
            DrawingState::Path { .. } => None,
        }
    }
}
