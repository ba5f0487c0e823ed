//! GeoJSON FeatureCollection export.

use serde::Serialize;

use crate::export::error::ExportError;
use crate::export::measure::{Measurements, format_timestamp};
use crate::export::traits::{AnnotationExporter, ExportSource};
use crate::model::{Annotation, AnnotationId, Geometry};

/// GeoJSON format. Coordinates stay in image pixels; rectangles are written as polygons.
pub struct GeoJsonExporter;

impl AnnotationExporter for GeoJsonExporter {
    fn id(&self) -> &'static str {
        "geojson"
    }

    fn display_name(&self) -> &'static str {
        "GeoJSON"
    }

    fn extension(&self) -> &'static str {
        "geojson"
    }

    fn media_type(&self) -> &'static str {
        "application/geo+json"
    }

    fn file_name(&self, slide: &str) -> String {
        format!("{slide}_annotations.geojson")
    }

    fn export_to_bytes(&self, source: &ExportSource<'_>) -> Result<Vec<u8>, ExportError> {
        let collection = FeatureCollection {
            kind: "FeatureCollection",
            features: source
                .annotations
                .iter()
                .map(|ann| feature(ann, source))
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&collection)?.into_bytes())
    }
}

fn feature<'a>(ann: &'a Annotation, source: &ExportSource<'_>) -> Feature<'a> {
    let m = Measurements::of(ann, source.plane);
    Feature {
        kind: "Feature",
        geometry: geometry(&ann.geometry),
        properties: Properties {
            id: ann.id,
            label: &ann.label,
            label_hierarchy: &ann.label_hierarchy,
            color: ann.color.as_deref(),
            opacity: ann.opacity,
            description: ann.description.as_deref(),
            confidence: ann.confidence,
            is_ai_generated: ann.is_ai_generated,
            layer_name: &ann.layer_name,
            area_um2: m.area_um2,
            perimeter_um: m.perimeter_um,
            creator_id: ann.creator_id,
            created_at: format_timestamp(ann.created_at),
            updated_at: format_timestamp(ann.updated_at),
        },
    }
}

fn geometry(geometry: &Geometry) -> GeoGeometry {
    match geometry {
        Geometry::Point(p) => GeoGeometry::Point {
            coordinates: [p.x, p.y],
        },
        other => GeoGeometry::Polygon {
            coordinates: other
                .closed_rings()
                .iter()
                .map(|ring| ring.iter().map(|p| [p.x, p.y]).collect())
                .collect(),
        },
    }
}

#[derive(Debug, Serialize)]
struct FeatureCollection<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    features: Vec<Feature<'a>>,
}

#[derive(Debug, Serialize)]
struct Feature<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    geometry: GeoGeometry,
    properties: Properties<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum GeoGeometry {
    Point { coordinates: [f64; 2] },
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
}

#[derive(Debug, Serialize)]
struct Properties<'a> {
    id: AnnotationId,
    label: &'a str,
    label_hierarchy: &'a [String],
    color: Option<&'a str>,
    opacity: f32,
    description: Option<&'a str>,
    confidence: Option<f32>,
    is_ai_generated: bool,
    layer_name: &'a str,
    area_um2: Option<f64>,
    perimeter_um: Option<f64>,
    creator_id: u64,
    created_at: String,
    updated_at: String,
}
