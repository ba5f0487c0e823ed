//! Annotation records and partial updates.

use serde::{Deserialize, Serialize};

use super::geometry::Geometry;
use crate::constants::{DEFAULT_ANNOTATION_OPACITY, DEFAULT_LAYER_NAME};

/// Unique, stable identifier for an annotation.
pub type AnnotationId = u64;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Current wall-clock time as a [`Timestamp`].
pub fn now_millis() -> Timestamp {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

fn default_opacity() -> f32 {
    DEFAULT_ANNOTATION_OPACITY
}

fn default_visible() -> bool {
    true
}

fn default_layer() -> String {
    DEFAULT_LAYER_NAME.to_string()
}

/// A single annotation on a slide. Geometry is always in image space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub geometry: Geometry,
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_hierarchy: Vec<String>,
    /// Hex color; when absent the label schema color is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub is_ai_generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_model_version: Option<String>,
    #[serde(default = "default_layer")]
    pub layer_name: String,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default = "default_visible")]
    pub is_visible: bool,
    /// Bumped on every effective mutation
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_annotation_id: Option<AnnotationId>,
    #[serde(default)]
    pub creator_id: u64,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl Annotation {
    /// Create a visible, unlocked annotation at version 1.
    pub fn new(id: AnnotationId, geometry: Geometry, label: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id,
            geometry,
            label: label.into(),
            label_hierarchy: Vec::new(),
            color: None,
            opacity: DEFAULT_ANNOTATION_OPACITY,
            description: None,
            confidence: None,
            is_ai_generated: false,
            ai_model_version: None,
            layer_name: default_layer(),
            is_locked: false,
            is_visible: true,
            version: 1,
            parent_annotation_id: None,
            creator_id: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_creator(mut self, creator_id: u64) -> Self {
        self.creator_id = creator_id;
        self
    }

    pub fn locked(mut self, locked: bool) -> Self {
        self.is_locked = locked;
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.is_visible = visible;
        self
    }
}

/// Partial update for an annotation. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_hierarchy: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,
}

impl AnnotationPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = Some(opacity);
        self
    }

    pub fn locked(mut self, locked: bool) -> Self {
        self.is_locked = Some(locked);
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.is_visible = Some(visible);
        self
    }

    /// Apply the patch; returns whether any field actually changed.
    ///
    /// Does not touch `version` or `updated_at`, the store owns those.
    pub fn apply(self, target: &mut Annotation) -> bool {
        fn set<T: PartialEq>(slot: &mut T, value: Option<T>) -> bool {
            match value {
                Some(v) if *slot != v => {
                    *slot = v;
                    true
                }
                _ => false,
            }
        }

        let mut changed = false;
        changed |= set(&mut target.geometry, self.geometry);
        changed |= set(&mut target.label, self.label);
        changed |= set(&mut target.label_hierarchy, self.label_hierarchy);
        changed |= set(&mut target.color, self.color.map(Some));
        changed |= set(&mut target.opacity, self.opacity);
        changed |= set(&mut target.description, self.description.map(Some));
        changed |= set(&mut target.layer_name, self.layer_name);
        changed |= set(&mut target.is_locked, self.is_locked);
        changed |= set(&mut target.is_visible, self.is_visible);
        changed
    }
}
