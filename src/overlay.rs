//! Annotation overlay engine.
//!
//! Projects image-space annotation geometry into screen space for the current
//! viewport. Projection is a pure function of the viewport snapshot, the store
//! contents and the label schema: every trigger rebuilds the whole
//! [`OverlayFrame`], nothing is patched in place.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ANNOTATION_COLOR, DEFAULT_ANNOTATION_OPACITY, DEFAULT_MIN_VERTEX_SPACING, DEFAULT_POINT_RADIUS,
    DEFAULT_SELECTED_STROKE_WIDTH, DEFAULT_STROKE_WIDTH, MIN_RING_VERTICES, PREVIEW_ALPHA,
};
use crate::model::{Annotation, AnnotationId, Color, DrawingState, Geometry, LabelSchema, Point, Rect};
use crate::store::AnnotationStore;
use crate::viewport::{ScreenPoint, ViewportState};

/// Overlay styling and level-of-detail settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    /// Outline width in screen pixels
    pub stroke_width: f32,
    pub selected_stroke_width: f32,
    /// Point marker radius in screen pixels
    pub point_radius: f32,
    /// Used when neither the annotation nor its label has a color
    pub default_color: String,
    pub default_opacity: f32,
    /// Projected vertices closer than this to the previous kept vertex are dropped
    pub min_vertex_spacing: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            stroke_width: DEFAULT_STROKE_WIDTH,
            selected_stroke_width: DEFAULT_SELECTED_STROKE_WIDTH,
            point_radius: DEFAULT_POINT_RADIUS,
            default_color: DEFAULT_ANNOTATION_COLOR.to_string(),
            default_opacity: DEFAULT_ANNOTATION_OPACITY,
            min_vertex_spacing: DEFAULT_MIN_VERTEX_SPACING,
        }
    }
}

/// Geometry after projection. Rectangles become four-vertex polygons since
/// rotation can turn them into arbitrary quads.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenGeometry {
    Point { center: ScreenPoint, radius: f32 },
    /// Outer ring first, then holes. Rings are open (no repeated vertex).
    Polygon { rings: Vec<Vec<ScreenPoint>> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeStyle {
    pub stroke: Color,
    pub fill: Color,
    pub stroke_width: f32,
}

/// One annotation as it appears on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayShape {
    pub annotation_id: AnnotationId,
    /// Annotation version the shape was projected from
    pub version: u64,
    pub geometry: ScreenGeometry,
    pub style: ShapeStyle,
    pub selected: bool,
    /// Locked annotations are drawn but ignore the pointer
    pub interactive: bool,
}

/// Complete overlay layer for one frame, in draw order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayFrame {
    pub shapes: Vec<OverlayShape>,
    /// In-progress drawing gesture, drawn above everything
    pub preview: Option<ScreenGeometry>,
    /// Visible annotations outside the viewport
    pub culled: usize,
    /// Annotations with malformed geometry
    pub skipped: Vec<AnnotationId>,
}

impl OverlayFrame {
    pub fn shape(&self, id: AnnotationId) -> Option<&OverlayShape> {
        self.shapes.iter().find(|s| s.annotation_id == id)
    }

    /// Topmost interactive shape under `at`, or `None`.
    pub fn hit_test(&self, at: ScreenPoint) -> Option<AnnotationId> {
        self.shapes
            .iter()
            .rev()
            .filter(|shape| shape.interactive)
            .find(|shape| shape_contains(shape, at))
            .map(|shape| shape.annotation_id)
    }
}

/// Builds overlay frames.
#[derive(Debug, Clone)]
pub struct OverlayEngine {
    style: OverlayStyle,
    fallback: Color,
}

impl Default for OverlayEngine {
    fn default() -> Self {
        Self::new(OverlayStyle::default())
    }
}

impl OverlayEngine {
    pub fn new(style: OverlayStyle) -> Self {
        let fallback = Color::from_hex(&style.default_color).unwrap_or_else(|| {
            log::warn!(
                "Invalid overlay default color '{}', using {}",
                style.default_color,
                DEFAULT_ANNOTATION_COLOR
            );
            Color::rgb(1.0, 0.0, 0.0)
        });
        Self { style, fallback }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Project every visible annotation of `store` for `state`.
    pub fn project(&self, state: &ViewportState, store: &AnnotationStore, schema: &LabelSchema) -> OverlayFrame {
        let view = state.bounds();
        // Markers and strokes reach beyond the geometry by a few screen pixels
        let margin = f64::from(self.style.point_radius.max(self.style.selected_stroke_width)) / state.zoom;
        let mut frame = OverlayFrame::default();

        for annotation in store.iter().filter(|a| a.is_visible) {
            if let Err(e) = annotation.geometry.validate() {
                log::warn!("Skipping annotation {}: {}", annotation.id, e);
                frame.skipped.push(annotation.id);
                continue;
            }
            let on_screen = annotation.geometry.bounds().is_some_and(|b| {
                let grown = Rect::new(
                    b.x - margin,
                    b.y - margin,
                    b.width + 2.0 * margin,
                    b.height + 2.0 * margin,
                );
                grown.intersects(&view)
            });
            if !on_screen {
                frame.culled += 1;
                continue;
            }
            let selected = store.selected() == Some(annotation.id);
            frame.shapes.push(self.project_annotation(state, annotation, schema, selected));
        }
        frame
    }

    /// Project one annotation. Geometry is assumed valid.
    pub fn project_annotation(
        &self,
        state: &ViewportState,
        annotation: &Annotation,
        schema: &LabelSchema,
        selected: bool,
    ) -> OverlayShape {
        let color = self.resolve_color(annotation, schema);
        let opacity = if annotation.opacity.is_finite() {
            annotation.opacity.clamp(0.0, 1.0)
        } else {
            self.style.default_opacity
        };
        let stroke_width = if selected {
            self.style.selected_stroke_width
        } else {
            self.style.stroke_width
        };
        OverlayShape {
            annotation_id: annotation.id,
            version: annotation.version,
            geometry: self.project_geometry(state, &annotation.geometry),
            style: ShapeStyle {
                stroke: color.with_alpha(1.0),
                fill: color.with_alpha(color.a * opacity),
                stroke_width,
            },
            selected,
            interactive: !annotation.is_locked,
        }
    }

    /// Screen geometry for an in-progress drawing gesture.
    pub fn project_preview(&self, state: &ViewportState, drawing: &DrawingState) -> Option<ScreenGeometry> {
        let geometry = drawing.preview()?;
        match &geometry {
            // Open paths with fewer than three vertices are shown as-is
            Geometry::Polygon(rings) => Some(ScreenGeometry::Polygon {
                rings: rings
                    .iter()
                    .map(|ring| ring.iter().map(|p| state.image_to_screen(*p)).collect())
                    .collect(),
            }),
            _ => Some(self.project_geometry(state, &geometry)),
        }
    }

    /// Style used for the drawing preview with the given active color.
    pub fn preview_style(&self, active_color: &str) -> ShapeStyle {
        let color = Color::from_hex(active_color).unwrap_or(self.fallback);
        ShapeStyle {
            stroke: color.with_alpha(1.0),
            fill: color.with_alpha(PREVIEW_ALPHA * self.style.default_opacity),
            stroke_width: self.style.stroke_width,
        }
    }

    fn resolve_color(&self, annotation: &Annotation, schema: &LabelSchema) -> Color {
        annotation
            .color
            .as_deref()
            .and_then(Color::from_hex)
            .or_else(|| schema.color_for(&annotation.label))
            .unwrap_or(self.fallback)
    }

    fn project_geometry(&self, state: &ViewportState, geometry: &Geometry) -> ScreenGeometry {
        let point = |center: Point| ScreenGeometry::Point {
            center: state.image_to_screen(center),
            radius: self.style.point_radius,
        };
        match geometry {
            Geometry::Point(p) => point(*p),
            Geometry::Rectangle(r) => ScreenGeometry::Polygon {
                rings: vec![r.corners().iter().map(|c| state.image_to_screen(*c)).collect()],
            },
            Geometry::Polygon(rings) => {
                let mut projected = rings
                    .iter()
                    .map(|ring| self.decimate(ring.iter().map(|p| state.image_to_screen(*p))));
                let outer = projected.next().unwrap_or_default();
                if outer.len() < MIN_RING_VERTICES {
                    // Too small to see as an outline at this zoom
                    return match geometry.centroid() {
                        Some(c) => point(c),
                        None => ScreenGeometry::Polygon { rings: vec![outer] },
                    };
                }
                let mut out = vec![outer];
                out.extend(projected.filter(|hole| hole.len() >= MIN_RING_VERTICES));
                ScreenGeometry::Polygon { rings: out }
            }
        }
    }

    /// Drop vertices closer than the minimum spacing, and a closing duplicate.
    fn decimate(&self, points: impl Iterator<Item = ScreenPoint>) -> Vec<ScreenPoint> {
        let spacing = self.style.min_vertex_spacing;
        let mut kept: Vec<ScreenPoint> = Vec::new();
        for p in points {
            match kept.last() {
                Some(last) if last.distance_to(p) < spacing => {}
                _ => kept.push(p),
            }
        }
        while kept.len() > 1 && kept[0].distance_to(kept[kept.len() - 1]) < spacing.max(f64::EPSILON) {
            kept.pop();
        }
        kept
    }
}

fn shape_contains(shape: &OverlayShape, at: ScreenPoint) -> bool {
    let tolerance = f64::from(shape.style.stroke_width) / 2.0;
    match &shape.geometry {
        ScreenGeometry::Point { center, radius } => center.distance_to(at) <= f64::from(*radius) + tolerance,
        ScreenGeometry::Polygon { rings } => {
            // Even-odd over all rings excludes holes
            let inside = rings.iter().filter(|ring| ring_crossings(ring, at)).count() % 2 == 1;
            inside || rings.iter().any(|ring| near_ring(ring, at, tolerance))
        }
    }
}

/// Ray casting: whether a horizontal ray from `at` crosses `ring` an odd number of times.
fn ring_crossings(ring: &[ScreenPoint], at: ScreenPoint) -> bool {
    let n = ring.len();
    if n < MIN_RING_VERTICES {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (vi, vj) = (ring[i], ring[j]);
        if ((vi.y > at.y) != (vj.y > at.y)) && (at.x < (vj.x - vi.x) * (at.y - vi.y) / (vj.y - vi.y) + vi.x) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn near_ring(ring: &[ScreenPoint], at: ScreenPoint, tolerance: f64) -> bool {
    let n = ring.len();
    (0..n).any(|i| segment_distance(ring[i], ring[(i + 1) % n], at) <= tolerance)
}

fn segment_distance(a: ScreenPoint, b: ScreenPoint, p: ScreenPoint) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return a.distance_to(p);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance_to(ScreenPoint::new(a.x + t * dx, a.y + t * dy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnnotationPatch, AnnotationTool, LabelClass};
    use crate::viewport::{ScreenSize, Viewport, ZoomLimits};

    const EPSILON: f64 = 1e-9;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPSILON
    }

    fn square_state() -> ViewportState {
        ViewportState {
            center: Point::new(50.0, 50.0),
            zoom: 2.0,
            rotation: 0.0,
            container: ScreenSize::new(200.0, 200.0),
        }
    }

    fn square(id: AnnotationId) -> Annotation {
        Annotation::new(
            id,
            Geometry::polygon_from_coords(&[[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]]),
            "Tumor",
        )
    }

    fn store_with(annotations: Vec<Annotation>) -> AnnotationStore {
        let mut store = AnnotationStore::new();
        store.set_all(annotations);
        store
    }

    #[test]
    fn test_square_fills_screen() {
        let engine = OverlayEngine::default();
        let frame = engine.project(&square_state(), &store_with(vec![square(1)]), &LabelSchema::default());
        assert_eq!(frame.shapes.len(), 1);
        let ScreenGeometry::Polygon { rings } = &frame.shapes[0].geometry else {
            panic!("expected polygon");
        };
        let expected = [(0.0, 0.0), (200.0, 0.0), (200.0, 200.0), (0.0, 200.0)];
        assert_eq!(rings[0].len(), 4);
        for (p, (x, y)) in rings[0].iter().zip(expected) {
            assert!(approx_eq(p.x, x) && approx_eq(p.y, y), "{p:?}");
        }
    }

    #[test]
    fn test_projection_is_deterministic() {
        let engine = OverlayEngine::default();
        let store = store_with(vec![square(1), square(2).with_color("#00FF00")]);
        let schema = LabelSchema::default();
        let mut vp = Viewport::new(
            Rect::new(0.0, 0.0, 1000.0, 1000.0),
            ScreenSize::new(300.0, 200.0),
            ZoomLimits::default(),
        )
        .unwrap();
        vp.rotate(17.0).unwrap();
        let a = engine.project(&vp.state(), &store, &schema);
        let b = engine.project(&vp.state(), &store, &schema);
        assert_eq!(a, b);
    }

    #[test]
    fn test_draw_order_and_visibility() {
        let engine = OverlayEngine::default();
        let mut store = store_with(vec![square(3), square(1), square(2)]);
        store.update(1, AnnotationPatch::new().visible(false));
        let frame = engine.project(&square_state(), &store, &LabelSchema::default());
        let ids: Vec<_> = frame.shapes.iter().map(|s| s.annotation_id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_color_resolution() {
        let engine = OverlayEngine::default();
        let schema = LabelSchema::new("s", vec![LabelClass::new("Tumor", "#0000FF")]);
        let store = store_with(vec![
            square(1).with_color("#00FF00").with_opacity(0.5),
            square(2),
            Annotation::new(3, Geometry::Point(Point::new(50.0, 50.0)), "Unknown"),
        ]);
        let frame = engine.project(&square_state(), &store, &schema);
        assert_eq!(frame.shapes[0].style.stroke, Color::rgb(0.0, 1.0, 0.0));
        assert_eq!(frame.shapes[0].style.fill.a, 0.5);
        assert_eq!(frame.shapes[1].style.stroke, Color::rgb(0.0, 0.0, 1.0));
        assert_eq!(frame.shapes[2].style.stroke, Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(frame.shapes[2].style.fill.a, DEFAULT_ANNOTATION_OPACITY);
    }

    #[test]
    fn test_malformed_geometry_skipped_alone() {
        let engine = OverlayEngine::default();
        let broken = Annotation::new(2, Geometry::Polygon(vec![Vec::new()]), "Tumor");
        let store = store_with(vec![square(1), broken, square(3)]);
        let frame = engine.project(&square_state(), &store, &LabelSchema::default());
        assert_eq!(frame.skipped, vec![2]);
        assert_eq!(frame.shapes.len(), 2);
    }

    #[test]
    fn test_locked_shapes_visible_but_not_hit() {
        let engine = OverlayEngine::default();
        let mut store = store_with(vec![square(1), square(2)]);
        let frame = engine.project(&square_state(), &store, &LabelSchema::default());
        // Both overlap; the later one is on top
        assert_eq!(frame.hit_test(ScreenPoint::new(100.0, 100.0)), Some(2));

        store.update(2, AnnotationPatch::new().locked(true));
        let frame = engine.project(&square_state(), &store, &LabelSchema::default());
        assert_eq!(frame.shapes.len(), 2);
        assert!(!frame.shape(2).unwrap().interactive);
        assert_eq!(frame.hit_test(ScreenPoint::new(100.0, 100.0)), Some(1));
    }

    #[test]
    fn test_hit_test_respects_holes() {
        let engine = OverlayEngine::default();
        let donut = Annotation::new(
            1,
            Geometry::Polygon(vec![
                vec![
                    Point::new(0.0, 0.0),
                    Point::new(100.0, 0.0),
                    Point::new(100.0, 100.0),
                    Point::new(0.0, 100.0),
                ],
                vec![
                    Point::new(25.0, 25.0),
                    Point::new(75.0, 25.0),
                    Point::new(75.0, 75.0),
                    Point::new(25.0, 75.0),
                ],
            ]),
            "Tumor",
        );
        let frame = engine.project(&square_state(), &store_with(vec![donut]), &LabelSchema::default());
        assert_eq!(frame.hit_test(ScreenPoint::new(20.0, 20.0)), Some(1));
        assert_eq!(frame.hit_test(ScreenPoint::new(100.0, 100.0)), None);
    }

    #[test]
    fn test_culls_offscreen_annotations() {
        let engine = OverlayEngine::default();
        let far = Annotation::new(
            2,
            Geometry::Rectangle(Rect::new(5000.0, 5000.0, 10.0, 10.0)),
            "Tumor",
        );
        let frame = engine.project(&square_state(), &store_with(vec![square(1), far]), &LabelSchema::default());
        assert_eq!(frame.shapes.len(), 1);
        assert_eq!(frame.culled, 1);
    }

    #[test]
    fn test_tiny_polygon_collapses_to_marker() {
        let engine = OverlayEngine::default();
        let state = ViewportState {
            zoom: 0.001,
            ..square_state()
        };
        let frame = engine.project(&state, &store_with(vec![square(1)]), &LabelSchema::default());
        assert!(matches!(frame.shapes[0].geometry, ScreenGeometry::Point { .. }));
    }

    #[test]
    fn test_decimation_drops_close_vertices() {
        let engine = OverlayEngine::default();
        let dense: Vec<Point> = (0..=100)
            .map(|i| Point::new(i as f64 * 0.1, 0.0))
            .chain([Point::new(10.0, 10.0), Point::new(0.0, 10.0)])
            .collect();
        let ann = Annotation::new(1, Geometry::polygon(dense), "Tumor");
        // zoom 2: 0.1 image px -> 0.2 screen px, below the 0.5 px spacing
        let frame = engine.project(&square_state(), &store_with(vec![ann]), &LabelSchema::default());
        let ScreenGeometry::Polygon { rings } = &frame.shapes[0].geometry else {
            panic!("expected polygon");
        };
        assert!(rings[0].len() < 50);
        assert!(rings[0].len() >= 3);
    }

    #[test]
    fn test_rotated_rectangle_is_quad() {
        let engine = OverlayEngine::default();
        let state = ViewportState {
            rotation: 45.0,
            ..square_state()
        };
        let rect = Annotation::new(1, Geometry::Rectangle(Rect::new(0.0, 0.0, 100.0, 100.0)), "Tumor");
        let frame = engine.project(&state, &store_with(vec![rect]), &LabelSchema::default());
        let ScreenGeometry::Polygon { rings } = &frame.shapes[0].geometry else {
            panic!("expected polygon");
        };
        // Center of the rectangle stays at the screen center; corners on the diagonals
        let top = rings[0][0];
        assert!(approx_eq(top.x, 100.0));
        assert!(approx_eq(top.y, 100.0 - 100.0 * std::f64::consts::SQRT_2));
    }

    #[test]
    fn test_preview_projection() {
        let engine = OverlayEngine::default();
        let mut drawing = DrawingState::default();
        drawing.begin(AnnotationTool::Polygon, Point::new(0.0, 0.0));
        drawing.add_vertex(Point::new(50.0, 50.0));
        let preview = engine.project_preview(&square_state(), &drawing).unwrap();
        assert_eq!(
            preview,
            ScreenGeometry::Polygon {
                rings: vec![vec![ScreenPoint::new(0.0, 0.0), ScreenPoint::new(100.0, 100.0)]]
            }
        );
        assert!(engine.project_preview(&square_state(), &DrawingState::Idle).is_none());
        assert_eq!(engine.preview_style("#00FF00").stroke, Color::rgb(0.0, 1.0, 0.0));
    }
}
