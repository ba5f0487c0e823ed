//! Registry for looking up exporters by id.

use std::collections::HashMap;

use crate::export::coco::CocoExporter;
use crate::export::csv::CsvExporter;
use crate::export::error::ExportError;
use crate::export::geojson::GeoJsonExporter;
use crate::export::traits::AnnotationExporter;

/// Registry of available exporters. All built-in formats are registered on creation.
pub struct ExportRegistry {
    exporters: HashMap<&'static str, Box<dyn AnnotationExporter>>,
}

impl ExportRegistry {
    /// Create a new registry with all built-in exporters registered.
    pub fn new() -> Self {
        let mut registry = Self {
            exporters: HashMap::new(),
        };

        registry.register(Box::new(CocoExporter));
        registry.register(Box::new(GeoJsonExporter));
        registry.register(Box::new(CsvExporter));

        registry
    }

    /// Register an exporter, replacing any with the same id.
    pub fn register(&mut self, exporter: Box<dyn AnnotationExporter>) {
        self.exporters.insert(exporter.id(), exporter);
    }

    /// Get an exporter by its id.
    pub fn get(&self, id: &str) -> Option<&dyn AnnotationExporter> {
        self.exporters.get(id).map(|e| e.as_ref())
    }

    /// Like [`get`](Self::get), with an error naming the unknown id.
    pub fn require(&self, id: &str) -> Result<&dyn AnnotationExporter, ExportError> {
        self.get(id)
            .ok_or_else(|| ExportError::UnknownFormat(id.to_string()))
    }

    /// All registered ids, sorted.
    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.exporters.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for ExportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportRegistry")
            .field("exporters", &self.ids())
            .finish()
    }
}
