//! The single mutable annotation collection of a session.
//!
//! Holds annotations in insertion order together with the selection, active tool,
//! active label and active color. Every effective mutation bumps the store
//! revision and returns exactly one [`StoreEvent`]; no-ops return nothing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ACTIVE_COLOR, DEFAULT_ACTIVE_LABEL};
use crate::error::StoreError;
use crate::model::{Annotation, AnnotationId, AnnotationPatch, AnnotationTool, Geometry, LabelSchema, now_millis};

/// What changed in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreChange {
    /// Whole collection replaced
    Replaced { count: usize },
    Added(AnnotationId),
    Updated { id: AnnotationId, version: u64 },
    Removed(AnnotationId),
    Selection(Option<AnnotationId>),
    ActiveTool(AnnotationTool),
    ActiveLabel(String),
    ActiveColor(String),
}

/// Notification for one effective store mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub revision: u64,
    pub change: StoreChange,
}

/// Result of [`AnnotationStore::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// At least one field changed; the version was bumped
    Updated(StoreEvent),
    /// The patch matched the current values
    Unchanged,
    /// No annotation with that id
    NotFound,
}

impl UpdateOutcome {
    pub fn event(self) -> Option<StoreEvent> {
        match self {
            UpdateOutcome::Updated(event) => Some(event),
            UpdateOutcome::Unchanged | UpdateOutcome::NotFound => None,
        }
    }
}

/// Annotations plus editing state for one slide.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    /// Insertion order is draw order
    annotations: Vec<Annotation>,
    selected_id: Option<AnnotationId>,
    active_tool: AnnotationTool,
    active_label: String,
    active_color: String,
    revision: u64,
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self {
            annotations: Vec::new(),
            selected_id: None,
            active_tool: AnnotationTool::default(),
            active_label: DEFAULT_ACTIVE_LABEL.to_string(),
            active_color: DEFAULT_ACTIVE_COLOR.to_string(),
            revision: 0,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Annotations in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn selected(&self) -> Option<AnnotationId> {
        self.selected_id
    }

    pub fn selected_annotation(&self) -> Option<&Annotation> {
        self.selected_id.and_then(|id| self.get(id))
    }

    pub fn active_tool(&self) -> AnnotationTool {
        self.active_tool
    }

    pub fn active_label(&self) -> &str {
        &self.active_label
    }

    pub fn active_color(&self) -> &str {
        &self.active_color
    }

    /// Smallest id greater than every stored id.
    pub fn next_id(&self) -> AnnotationId {
        self.annotations.iter().map(|a| a.id).max().map_or(1, |max| max + 1)
    }

    fn emit(&mut self, change: StoreChange) -> StoreEvent {
        self.revision += 1;
        StoreEvent {
            revision: self.revision,
            change,
        }
    }

    /// Replace the whole collection, keeping the first of any duplicate ids.
    ///
    /// The selection survives only if its annotation is still present.
    pub fn set_all(&mut self, annotations: Vec<Annotation>) -> StoreEvent {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(annotations.len());
        for annotation in annotations {
            if seen.insert(annotation.id) {
                kept.push(annotation);
            } else {
                log::warn!("Dropping duplicate annotation id {}", annotation.id);
            }
        }
        self.annotations = kept;
        if let Some(id) = self.selected_id
            && self.get(id).is_none()
        {
            self.selected_id = None;
        }
        log::debug!("Store replaced with {} annotations", self.annotations.len());
        self.emit(StoreChange::Replaced {
            count: self.annotations.len(),
        })
    }

    /// Append an annotation; it draws on top of everything already stored.
    ///
    /// Duplicate ids and geometry that fails validation are rejected.
    pub fn add(&mut self, annotation: Annotation) -> Result<StoreEvent, StoreError> {
        if self.get(annotation.id).is_some() {
            return Err(StoreError::DuplicateId(annotation.id));
        }
        annotation
            .geometry
            .validate()
            .map_err(|source| StoreError::InvalidGeometry {
                id: annotation.id,
                source,
            })?;
        let id = annotation.id;
        self.annotations.push(annotation);
        Ok(self.emit(StoreChange::Added(id)))
    }

    /// Create an annotation from `geometry` using the active label and color.
    pub fn create(&mut self, geometry: Geometry, schema: &LabelSchema) -> Result<StoreEvent, StoreError> {
        let mut annotation = Annotation::new(self.next_id(), geometry, self.active_label.clone())
            .with_color(self.active_color.clone());
        annotation.label_hierarchy = schema.hierarchy_of(&self.active_label);
        self.add(annotation)
    }

    /// Apply a patch. The version is bumped only if some field actually changed.
    pub fn update(&mut self, id: AnnotationId, patch: AnnotationPatch) -> UpdateOutcome {
        let Some(annotation) = self.annotations.iter_mut().find(|a| a.id == id) else {
            log::debug!("Ignoring update for unknown annotation {}", id);
            return UpdateOutcome::NotFound;
        };
        if !patch.apply(annotation) {
            return UpdateOutcome::Unchanged;
        }
        annotation.version += 1;
        annotation.updated_at = now_millis().max(annotation.updated_at);
        let version = annotation.version;
        UpdateOutcome::Updated(self.emit(StoreChange::Updated { id, version }))
    }

    /// Remove an annotation, clearing the selection if it pointed at it.
    pub fn remove(&mut self, id: AnnotationId) -> Option<(Annotation, StoreEvent)> {
        let index = self.annotations.iter().position(|a| a.id == id)?;
        let removed = self.annotations.remove(index);
        if self.selected_id == Some(id) {
            self.selected_id = None;
        }
        Some((removed, self.emit(StoreChange::Removed(id))))
    }

    /// Change the selection. Unknown ids clear it.
    pub fn select(&mut self, id: Option<AnnotationId>) -> Option<StoreEvent> {
        let id = id.filter(|id| self.get(*id).is_some());
        if self.selected_id == id {
            return None;
        }
        self.selected_id = id;
        Some(self.emit(StoreChange::Selection(id)))
    }

    pub fn set_active_tool(&mut self, tool: AnnotationTool) -> Option<StoreEvent> {
        if self.active_tool == tool {
            return None;
        }
        self.active_tool = tool;
        Some(self.emit(StoreChange::ActiveTool(tool)))
    }

    pub fn set_active_label(&mut self, label: impl Into<String>) -> Option<StoreEvent> {
        let label = label.into();
        if self.active_label == label {
            return None;
        }
        self.active_label = label.clone();
        Some(self.emit(StoreChange::ActiveLabel(label)))
    }

    pub fn set_active_color(&mut self, color: impl Into<String>) -> Option<StoreEvent> {
        let color = color.into();
        if self.active_color == color {
            return None;
        }
        self.active_color = color.clone();
        Some(self.emit(StoreChange::ActiveColor(color)))
    }
}
