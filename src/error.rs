//! Error types for the viewport, tile, geometry and store layers.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::AnnotationId;
use crate::pyramid::TileDescriptor;

/// Viewport operations that would commit an invalid state.
///
/// A rejected operation leaves the previous viewport untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewportError {
    /// Zoom is zero, negative or not finite
    #[error("Invalid zoom: {zoom}")]
    InvalidZoom {
        /// The offending zoom value
        zoom: f64,
    },

    /// A coordinate or angle is NaN or infinite
    #[error("Non-finite {what}: ({x}, {y})")]
    NonFinite {
        /// Which quantity was non-finite
        what: &'static str,
        /// X component
        x: f64,
        /// Y component
        y: f64,
    },

    /// Container has zero or non-finite size
    #[error("Invalid container size: {width}x{height}")]
    InvalidContainer {
        /// Container width in screen pixels
        width: f64,
        /// Container height in screen pixels
        height: f64,
    },
}

/// Errors from fetching or decoding a tile.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TileError {
    /// The transport layer failed to deliver the tile
    #[error("Transport error for tile {tile}: {message}")]
    Transport {
        /// Tile that was requested
        tile: TileDescriptor,
        /// Description of the failure
        message: String,
    },

    /// The payload could not be decoded as an image
    #[error("Decode error for tile {tile}: {message}")]
    Decode {
        /// Tile that was requested
        tile: TileDescriptor,
        /// Decoder message
        message: String,
    },

    /// The raster is larger than the tile footprint allows
    #[error("Tile {tile} is {width}x{height}, larger than tile size {tile_size}")]
    Oversized {
        /// Tile that was requested
        tile: TileDescriptor,
        /// Received width
        width: u32,
        /// Received height
        height: u32,
        /// Configured tile size
        tile_size: u32,
    },

    /// The fetcher has shut down
    #[error("Tile fetcher disconnected")]
    Disconnected,
}

impl TileError {
    /// Create a transport error for a tile.
    pub fn transport(tile: TileDescriptor, message: impl Into<String>) -> Self {
        Self::Transport {
            tile,
            message: message.into(),
        }
    }

    /// Create a decode error for a tile.
    pub fn decode(tile: TileDescriptor, message: impl Into<String>) -> Self {
        Self::Decode {
            tile,
            message: message.into(),
        }
    }
}

/// Malformed annotation geometry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// A polygon without any ring
    #[error("Polygon has no rings")]
    NoRings,

    /// A ring with too few distinct vertices
    #[error("Ring {ring} has {count} vertices, need at least {min}")]
    TooFewVertices {
        /// Index of the ring (0 = outer)
        ring: usize,
        /// Distinct vertices found
        count: usize,
        /// Required minimum
        min: usize,
    },

    /// A coordinate is NaN or infinite
    #[error("Non-finite coordinate ({x}, {y})")]
    NonFinite {
        /// X component
        x: f64,
        /// Y component
        y: f64,
    },

    /// Rectangle with negative or non-finite extent
    #[error("Invalid rectangle size {width}x{height}")]
    InvalidRectangle {
        /// Width
        width: f64,
        /// Height
        height: f64,
    },
}

/// Errors from annotation store mutations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// An annotation with this ID already exists
    #[error("Annotation {0} already exists")]
    DuplicateId(AnnotationId),

    /// The geometry cannot be drawn
    #[error("Annotation {id} has invalid geometry: {source}")]
    InvalidGeometry {
        /// Rejected annotation
        id: AnnotationId,
        /// What is wrong with the geometry
        source: GeometryError,
    },
}

/// Errors loading or saving configuration and slide descriptors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error reading or writing the file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration from a newer, unknown format
    #[error("Unsupported config version {found} (supported up to {supported})")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Newest supported version
        supported: u32,
    },

    /// A value is outside its valid range
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        /// Name of the field
        field: &'static str,
        /// What is wrong with it
        message: String,
    },
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

/// Errors from the annotation persistence collaborator.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// I/O error during file operations
    #[error("IO error at {path:?}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend could not be reached or refused the request
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors opening a slide session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Slide descriptor or configuration is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The initial viewport could not be fitted
    #[error("Viewport error: {0}")]
    Viewport(#[from] ViewportError),
}
