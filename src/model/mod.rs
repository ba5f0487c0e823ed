//! Data models for annotations, geometry and label schemas.

mod annotation;
mod color;
mod geometry;
mod label;
mod tool;

pub use annotation::{Annotation, AnnotationId, AnnotationPatch, Timestamp, now_millis};
pub use color::Color;
pub use geometry::{Geometry, Point, Rect};
pub use label::{LabelClass, LabelSchema, SchemaDefinition};
pub use tool::{AnnotationTool, DrawingState, MIN_RECT_SIZE};
