//! Error types for annotation export.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::AnnotationId;

/// Errors that can occur while exporting annotations.
#[derive(Error, Debug)]
pub enum ExportError {
    /// I/O error writing the output file
    #[error("IO error at {path:?}: {source}")]
    Io {
        /// Output file
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No exporter registered under this id
    #[error("Unknown export format '{0}'")]
    UnknownFormat(String),

    /// The annotation cannot be represented in the target format
    #[error("Annotation {id} cannot be exported: {message}")]
    InvalidAnnotation {
        /// Offending annotation
        id: AnnotationId,
        /// What is wrong with it
        message: String,
    },
}
