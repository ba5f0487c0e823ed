//! Global constants for the slide viewer engine

/// Edge length of a pyramid tile in pixels
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Finest pyramid level served by the tile endpoint
pub const DEFAULT_MAX_LEVEL: u32 = 10;

/// Tile endpoint query layout; placeholders are filled per tile
pub const DEFAULT_TILE_URL_TEMPLATE: &str = "{base}?level={level}&x={x}&y={y}&format={format}";

/// Raster format requested from the tile endpoint
pub const DEFAULT_TILE_FORMAT: &str = "jpeg";

/// Smallest zoom (screen px per image px) the viewport accepts
pub const DEFAULT_MIN_ZOOM: f64 = 1.0 / 1024.0;

/// Largest zoom (screen px per image px) the viewport accepts
pub const DEFAULT_MAX_ZOOM: f64 = 40.0;

/// Multiplicative step for one wheel notch
pub const DEFAULT_ZOOM_STEP: f64 = 1.2;

/// Number of decoded tiles kept in memory
pub const DEFAULT_CACHE_MAX_TILES: usize = 512;

/// Decoded tile memory budget (RGBA bytes)
pub const DEFAULT_CACHE_MAX_BYTES: usize = 512 * 256 * 256 * 4;

/// Pending bus events kept before the oldest viewport change is dropped
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 64;

/// Fallback stroke/fill color for annotations without color or label match
pub const DEFAULT_ANNOTATION_COLOR: &str = "#FF0000";

/// Fallback fill opacity for annotations
pub const DEFAULT_ANNOTATION_OPACITY: f32 = 0.7;

/// Label assigned to new annotations when nothing else is chosen
pub const DEFAULT_ACTIVE_LABEL: &str = "Dysplastic Epithelial Cells";

/// Color assigned to new annotations when nothing else is chosen
pub const DEFAULT_ACTIVE_COLOR: &str = "#FF8800";

/// Layer name for annotations that do not set one
pub const DEFAULT_LAYER_NAME: &str = "default";

/// Overlay stroke width in screen pixels
pub const DEFAULT_STROKE_WIDTH: f32 = 2.0;

/// Overlay stroke width for the selected annotation
pub const DEFAULT_SELECTED_STROKE_WIDTH: f32 = 3.0;

/// Radius of point markers in screen pixels
pub const DEFAULT_POINT_RADIUS: f32 = 5.0;

/// Consecutive projected vertices closer than this (screen px) are merged
pub const DEFAULT_MIN_VERTEX_SPACING: f64 = 0.5;

/// Alpha multiplier for the in-progress drawing preview
pub const PREVIEW_ALPHA: f32 = 0.5;

/// Minimum number of vertices in a polygon ring
pub const MIN_RING_VERTICES: usize = 3;

/// Tolerance used by floating point comparisons in geometry code
pub const GEOMETRY_EPSILON: f64 = 1e-9;

/// Clicking within this many screen pixels of the first vertex closes a polygon
pub const POLYGON_CLOSE_DISTANCE: f64 = 10.0;

/// Transient notices kept before the oldest is dropped
pub const MAX_NOTICES: usize = 16;
