//! Trait definitions for annotation exporters.

use std::path::Path;

use crate::export::error::ExportError;
use crate::model::Annotation;
use crate::pyramid::ImagePlane;

/// Everything an exporter reads: the slide and its annotations in store order.
#[derive(Debug, Clone, Copy)]
pub struct ExportSource<'a> {
    /// Slide name, used in file names and dataset descriptions
    pub slide: &'a str,
    /// Image plane; supplies dimensions and microns per pixel
    pub plane: &'a ImagePlane,
    pub annotations: &'a [Annotation],
}

impl<'a> ExportSource<'a> {
    pub fn new(slide: &'a str, plane: &'a ImagePlane, annotations: &'a [Annotation]) -> Self {
        Self {
            slide,
            plane,
            annotations,
        }
    }
}

/// Pure transform from annotations to an external file format.
///
/// Each format (COCO, GeoJSON, CSV) implements this trait. Exporters never
/// touch the store; they only read an [`ExportSource`].
pub trait AnnotationExporter: Send + Sync {
    /// Unique identifier for this format (e.g., "coco", "geojson", "csv").
    fn id(&self) -> &'static str;

    /// Human-readable name for display.
    fn display_name(&self) -> &'static str;

    /// File extension without the dot.
    fn extension(&self) -> &'static str;

    /// MIME type of the produced document.
    fn media_type(&self) -> &'static str;

    /// Render the export document.
    fn export_to_bytes(&self, source: &ExportSource<'_>) -> Result<Vec<u8>, ExportError>;

    /// Suggested output file name for a slide, e.g. `case-17_coco.json`.
    fn file_name(&self, slide: &str) -> String {
        format!("{}_{}.{}", slide, self.id(), self.extension())
    }

    /// Render and write the document to `path`. Returns the number of bytes written.
    fn export(&self, source: &ExportSource<'_>, path: &Path) -> Result<usize, ExportError> {
        let bytes = self.export_to_bytes(source)?;
        std::fs::write(path, &bytes).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!(
            "Exported {} annotations as {} to {:?}",
            source.annotations.len(),
            self.display_name(),
            path
        );
        Ok(bytes.len())
    }
}
