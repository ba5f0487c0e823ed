//! Tests for the GeoJSON exporter.

use serde_json::Value;

use super::{annotations, plane};
use crate::export::{AnnotationExporter, ExportSource, GeoJsonExporter};

fn export() -> Value {
    let plane = plane();
    let anns = annotations();
    let source = ExportSource::new("case-17", &plane, &anns);
    serde_json::from_slice(&GeoJsonExporter.export_to_bytes(&source).unwrap()).unwrap()
}

#[test]
fn test_geojson_feature_collection() {
    let doc = export();
    assert_eq!(doc["type"], "FeatureCollection");
    let features = doc["features"].as_array().unwrap();
    assert_eq!(features.len(), 3);
    assert!(features.iter().all(|f| f["type"] == "Feature"));
    assert_eq!(GeoJsonExporter.file_name("case-17"), "case-17_annotations.geojson");
}

#[test]
fn test_geojson_geometry() {
    let doc = export();
    let square = &doc["features"][0]["geometry"];
    assert_eq!(square["type"], "Polygon");
    let ring = square["coordinates"][0].as_array().unwrap();
    assert_eq!(ring.len(), 5);
    assert_eq!(ring[0], ring[4]);

    // Rectangles are written as polygons
    assert_eq!(doc["features"][1]["geometry"]["type"], "Polygon");

    let point = &doc["features"][2]["geometry"];
    assert_eq!(point["type"], "Point");
    assert_eq!(point["coordinates"], serde_json::json!([5.0, 6.0]));
}

#[test]
fn test_geojson_properties() {
    let doc = export();
    let props = &doc["features"][0]["properties"];
    assert_eq!(props["id"], 7);
    assert_eq!(props["label"], "Tumor");
    assert_eq!(props["color"], "#00FF00");
    assert_eq!(props["layer_name"], "default");
    assert_eq!(props["area_um2"], 2500.0);
    assert_eq!(props["perimeter_um"], 200.0);
    assert_eq!(props["created_at"], "2023-11-14T22:13:20.000Z");
    assert_eq!(props["updated_at"], "2023-11-14T22:14:20.000Z");
    assert!(props["description"].is_null());
    assert!(props["confidence"].is_null());

    let gland = &doc["features"][1]["properties"];
    assert_eq!(gland["label_hierarchy"], serde_json::json!(["Epithelium", "Gland"]));
    assert_eq!(gland["is_ai_generated"], true);
    assert_eq!(gland["confidence"], 0.5);
}
