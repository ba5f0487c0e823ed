//! Annotation persistence.
//!
//! The engine only needs two operations from a backend: load every annotation of a
//! slide in order, and save the current collection. [`JsonFileRepository`] keeps
//! one JSON document per slide in a directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;
use crate::model::{Annotation, now_millis};

/// Backend that stores annotations per slide. Geometry is always image-space.
pub trait AnnotationRepository {
    /// All annotations of `slide`, in creation order. Unknown slides yield an empty list.
    fn load(&self, slide: &str) -> Result<Vec<Annotation>, RepositoryError>;

    /// Replace the stored annotations of `slide`.
    fn save(&self, slide: &str, annotations: &[Annotation]) -> Result<(), RepositoryError>;
}

/// On-disk document layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationDocument {
    /// Format version for compatibility checking
    pub version: String,
    pub slide: String,
    #[serde(default)]
    pub saved_at: u64,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl AnnotationDocument {
    /// Current version of the document format.
    pub const CURRENT_VERSION: &'static str = "1.0.0";

    pub fn new(slide: impl Into<String>, annotations: Vec<Annotation>) -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
            slide: slide.into(),
            saved_at: now_millis(),
            annotations,
        }
    }
}

/// Stores `<slide>.annotations.json` files in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    root: PathBuf,
}

impl JsonFileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File holding the annotations of `slide`. Path separators in the name are replaced.
    pub fn path_for(&self, slide: &str) -> PathBuf {
        let safe: String = slide
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        self.root.join(format!("{safe}.annotations.json"))
    }

    /// Read a document from an explicit path.
    pub fn read_document(path: &Path) -> Result<AnnotationDocument, RepositoryError> {
        let json = std::fs::read_to_string(path).map_err(|source| RepositoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: AnnotationDocument = serde_json::from_str(&json)?;
        if document.version != AnnotationDocument::CURRENT_VERSION {
            log::warn!(
                "Annotation file {:?} has version {}, expected {}",
                path,
                document.version,
                AnnotationDocument::CURRENT_VERSION
            );
        }
        Ok(document)
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> RepositoryError {
    let path = path.to_path_buf();
    move |source| RepositoryError::Io { path, source }
}

impl AnnotationRepository for JsonFileRepository {
    fn load(&self, slide: &str) -> Result<Vec<Annotation>, RepositoryError> {
        let path = self.path_for(slide);
        if !path.exists() {
            log::debug!("No annotations stored for slide {} at {:?}", slide, path);
            return Ok(Vec::new());
        }
        let document = Self::read_document(&path)?;
        log::info!("Loaded {} annotations from {:?}", document.annotations.len(), path);
        Ok(document.annotations)
    }

    fn save(&self, slide: &str, annotations: &[Annotation]) -> Result<(), RepositoryError> {
        std::fs::create_dir_all(&self.root).map_err(io_err(&self.root))?;

        let path = self.path_for(slide);
        let document = AnnotationDocument::new(slide, annotations.to_vec());
        let json = serde_json::to_string_pretty(&document)?;

        // Write next to the target and rename so readers never see a partial file
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(io_err(&path))?;
        log::info!("Saved {} annotations to {:?}", annotations.len(), path);
        Ok(())
    }
}
