//! Unit tests for the export formats.

mod geojson_tests;

use crate::model::{Annotation, Geometry, Point, Rect};
use crate::pyramid::ImagePlane;

/// 10000x8000 slide at 0.25 µm/px.
fn plane() -> ImagePlane {
    ImagePlane::new(10_000, 8_000, 256, 5)
        .unwrap()
        .with_mpp(0.25, 0.25)
}

/// A labelled square, a hierarchical rectangle and an untyped point.
fn annotations() -> Vec<Annotation> {
    let mut tumor = Annotation::new(
        7,
        Geometry::polygon_from_coords(&[[100.0, 100.0], [300.0, 100.0], [300.0, 300.0], [100.0, 300.0]]),
        "Tumor",
    )
    .with_color("#00FF00");
    tumor.created_at = 1_700_000_000_000;
    tumor.updated_at = 1_700_000_060_000;

    let mut gland = Annotation::new(8, Geometry::Rectangle(Rect::new(10.0, 20.0, 40.0, 80.0)), "Gland");
    gland.label_hierarchy = vec!["Epithelium".into(), "Gland".into()];
    gland.description = Some("crypt, \"irregular\"".into());
    gland.confidence = Some(0.5);
    gland.is_ai_generated = true;

    let cell = Annotation::new(9, Geometry::Point(Point::new(5.0, 6.0)), "Tumor");
    vec![tumor, gland, cell]
}
