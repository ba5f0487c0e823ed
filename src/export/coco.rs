//! COCO JSON export.
//!
//! One image entry for the slide, one category per distinct label in first-seen
//! order. The supercategory is the first entry of the label hierarchy.

use std::collections::HashMap;

use serde::Serialize;

use crate::export::error::ExportError;
use crate::export::measure::Measurements;
use crate::export::traits::{AnnotationExporter, ExportSource};
use crate::model::{Annotation, AnnotationId, Geometry};

/// COCO JSON format.
///
/// Polygons and rectangles become flattened closed-ring segmentations; points have
/// an empty segmentation and a zero-size bbox.
pub struct CocoExporter;

impl AnnotationExporter for CocoExporter {
    fn id(&self) -> &'static str {
        "coco"
    }

    fn display_name(&self) -> &'static str {
        "COCO (JSON)"
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn media_type(&self) -> &'static str {
        "application/json"
    }

    fn export_to_bytes(&self, source: &ExportSource<'_>) -> Result<Vec<u8>, ExportError> {
        let mut coco = CocoDataset {
            info: CocoInfo {
                description: format!("Annotations for {}", source.slide),
                version: "1.0".into(),
            },
            images: vec![CocoImage {
                id: 1,
                width: source.plane.width,
                height: source.plane.height,
                file_name: source.slide.to_string(),
            }],
            annotations: Vec::with_capacity(source.annotations.len()),
            categories: Vec::new(),
        };

        let mut categories: HashMap<&str, u32> = HashMap::new();
        for ann in source.annotations {
            let mut entry = match convert_annotation(ann, source) {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping annotation in COCO export: {}", e);
                    continue;
                }
            };
            entry.category_id = match categories.get(ann.label.as_str()) {
                Some(&id) => id,
                None => {
                    let id = categories.len() as u32 + 1;
                    categories.insert(ann.label.as_str(), id);
                    coco.categories.push(CocoCategory {
                        id,
                        name: ann.label.clone(),
                        supercategory: ann
                            .label_hierarchy
                            .first()
                            .cloned()
                            .unwrap_or_else(|| "none".into()),
                    });
                    id
                }
            };
            coco.annotations.push(entry);
        }

        log::debug!(
            "COCO export: {} annotations in {} categories",
            coco.annotations.len(),
            coco.categories.len()
        );
        Ok(serde_json::to_string_pretty(&coco)?.into_bytes())
    }
}

/// Convert one annotation; the category is assigned by the caller.
fn convert_annotation(ann: &Annotation, source: &ExportSource<'_>) -> Result<CocoAnnotation, ExportError> {
    let bounds = ann
        .geometry
        .bounds()
        .ok_or_else(|| ExportError::InvalidAnnotation {
            id: ann.id,
            message: format!("{} has no vertices", ann.geometry.kind()),
        })?;

    let segmentation = match &ann.geometry {
        Geometry::Point(_) => Vec::new(),
        geometry => geometry
            .closed_rings()
            .iter()
            .map(|ring| ring.iter().flat_map(|p| [p.x, p.y]).collect())
            .collect(),
    };

    Ok(CocoAnnotation {
        id: ann.id,
        image_id: 1,
        category_id: 0,
        segmentation,
        area: Measurements::of(ann, source.plane).area_um2.unwrap_or(0.0),
        bbox: [bounds.x, bounds.y, bounds.width, bounds.height],
        iscrowd: 0,
    })
}

// COCO format structures

#[derive(Debug, Serialize)]
struct CocoDataset {
    info: CocoInfo,
    images: Vec<CocoImage>,
    annotations: Vec<CocoAnnotation>,
    categories: Vec<CocoCategory>,
}

#[derive(Debug, Serialize)]
struct CocoInfo {
    description: String,
    version: String,
}

#[derive(Debug, Serialize)]
struct CocoImage {
    id: u64,
    width: u64,
    height: u64,
    file_name: String,
}

#[derive(Debug, Serialize)]
struct CocoAnnotation {
    id: AnnotationId,
    image_id: u64,
    category_id: u32,
    segmentation: Vec<Vec<f64>>,
    /// Square microns; zero when the slide has no resolution
    area: f64,
    bbox: [f64; 4],
    iscrowd: u8,
}

#[derive(Debug, Serialize)]
struct CocoCategory {
    id: u32,
    name: String,
    supercategory: String,
}
