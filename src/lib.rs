//! slideview - Whole-slide image viewport engine
//!
//! Maps a continuous viewport onto a multi-resolution tile pyramid and keeps an
//! annotation overlay in sync with it. Everything is headless: the engine produces
//! tile draw lists and projected overlay shapes, a frontend paints them.

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod export;
pub mod model;
pub mod overlay;
pub mod pyramid;
pub mod repository;
pub mod session;
pub mod store;
pub mod synthetic;
pub mod viewport;

pub use config::{LogLevel, SlideDescriptor, ViewerConfig};
pub use error::{ConfigError, GeometryError, RepositoryError, SessionError, StoreError, TileError, ViewportError};
pub use session::{Notice, NoticeLevel, PointerInput, SessionFrame, SlideSession};
pub use store::AnnotationStore;
pub use viewport::{ScreenPoint, ScreenSize, Viewport, ViewportState};
