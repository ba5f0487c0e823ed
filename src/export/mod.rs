//! Annotation export formats.
//!
//! Exporters are pure transforms over an [`ExportSource`]: the slide, its image
//! plane and the annotations in store order.
//!
//! # Supported Formats
//!
//! - **COCO**: JSON dataset with flattened segmentations and label categories
//! - **GeoJSON**: FeatureCollection with annotation properties and measurements
//! - **CSV**: one summary row per annotation
//!
//! # Usage
//!
//! ```ignore
//! use slideview::export::{ExportRegistry, ExportSource};
//!
//! let registry = ExportRegistry::new();
//! let source = ExportSource::new("case-17", &plane, store.annotations());
//! let bytes = registry.require("geojson")?.export_to_bytes(&source)?;
//! ```

mod coco;
mod csv;
mod error;
mod geojson;
mod measure;
mod registry;
mod traits;

#[cfg(test)]
mod tests;

pub use coco::CocoExporter;
pub use csv::{CSV_COLUMNS, CsvExporter};
pub use error::ExportError;
pub use geojson::GeoJsonExporter;
pub use measure::{Measurements, format_timestamp};
pub use registry::ExportRegistry;
pub use traits::{AnnotationExporter, ExportSource};
