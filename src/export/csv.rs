//! CSV summary export: one row of measurements per annotation.

use crate::export::error::ExportError;
use crate::export::measure::{Measurements, format_timestamp};
use crate::export::traits::{AnnotationExporter, ExportSource};
use crate::model::Annotation;

/// Column headers, in output order.
pub const CSV_COLUMNS: [&str; 15] = [
    "ID",
    "Label",
    "Label Hierarchy",
    "Geometry Type",
    "Area (µm²)",
    "Perimeter (µm)",
    "Centroid X",
    "Centroid Y",
    "Confidence",
    "AI Generated",
    "Layer",
    "Description",
    "Creator ID",
    "Created At",
    "Updated At",
];

/// CSV format. Rows end with CRLF; missing values are empty cells.
pub struct CsvExporter;

impl AnnotationExporter for CsvExporter {
    fn id(&self) -> &'static str {
        "csv"
    }

    fn display_name(&self) -> &'static str {
        "CSV summary"
    }

    fn extension(&self) -> &'static str {
        "csv"
    }

    fn media_type(&self) -> &'static str {
        "text/csv"
    }

    fn file_name(&self, slide: &str) -> String {
        format!("{slide}_annotations.csv")
    }

    fn export_to_bytes(&self, source: &ExportSource<'_>) -> Result<Vec<u8>, ExportError> {
        let mut out = String::new();
        write_row(&mut out, CSV_COLUMNS.iter().map(|c| c.to_string()));
        for ann in source.annotations {
            write_row(&mut out, row(ann, source));
        }
        Ok(out.into_bytes())
    }
}

fn row(ann: &Annotation, source: &ExportSource<'_>) -> [String; 15] {
    let m = Measurements::of(ann, source.plane);
    let opt = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
    [
        ann.id.to_string(),
        ann.label.clone(),
        ann.label_hierarchy.join(" > "),
        ann.geometry.kind().to_string(),
        opt(m.area_um2),
        opt(m.perimeter_um),
        opt(m.centroid.map(|c| c.x)),
        opt(m.centroid.map(|c| c.y)),
        ann.confidence.map(|c| c.to_string()).unwrap_or_default(),
        if ann.is_ai_generated { "True" } else { "False" }.to_string(),
        ann.layer_name.clone(),
        ann.description.clone().unwrap_or_default(),
        ann.creator_id.to_string(),
        format_timestamp(ann.created_at),
        format_timestamp(ann.updated_at),
    ]
}

fn write_row(out: &mut String, cells: impl IntoIterator<Item = String>) {
    for (i, cell) in cells.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_cell(out, &cell);
    }
    out.push_str("\r\n");
}

/// RFC 4180 quoting; inner quotes are doubled.
fn push_cell(out: &mut String, cell: &str) {
    if cell.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&cell.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(cell);
    }
}
