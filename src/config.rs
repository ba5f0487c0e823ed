//! Configuration file support.
//!
//! [`ViewerConfig`] holds engine settings (tile endpoint, zoom limits, cache budget,
//! overlay styling); [`SlideDescriptor`] describes one slide to open. Both are
//! JSON files read with serde and validated before use.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CACHE_MAX_BYTES, DEFAULT_CACHE_MAX_TILES, DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_TILE_FORMAT,
    DEFAULT_TILE_URL_TEMPLATE,
};
use crate::error::ConfigError;
use crate::model::LabelSchema;
use crate::overlay::OverlayStyle;
use crate::pyramid::ImagePlane;
use crate::viewport::ZoomLimits;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Get the display name for this log level.
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "Error",
            LogLevel::Warn => "Warn",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
            LogLevel::Trace => "Trace",
        }
    }

    /// Parse a case-insensitive level name, as given on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

fn default_version() -> u32 {
    CONFIG_VERSION
}

/// Tile endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileSettings {
    /// URL template, see [`crate::pyramid::UrlTileSource`]
    pub url_template: String,
    /// Raster format requested from the endpoint
    pub format: String,
    /// Background fetch threads
    pub fetch_workers: usize,
}

impl Default for TileSettings {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_TILE_URL_TEMPLATE.to_string(),
            format: DEFAULT_TILE_FORMAT.to_string(),
            fetch_workers: 4,
        }
    }
}

/// Decoded tile cache budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_tiles: usize,
    pub max_bytes: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_tiles: DEFAULT_CACHE_MAX_TILES,
            max_bytes: DEFAULT_CACHE_MAX_BYTES,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Version of the configuration file format
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub tiles: TileSettings,
    #[serde(default)]
    pub zoom: ZoomLimits,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub overlay: OverlayStyle,
    /// Events kept before the oldest viewport change is coalesced away
    #[serde(default = "default_queue_capacity")]
    pub event_queue_capacity: usize,
    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_queue_capacity() -> usize {
    DEFAULT_EVENT_QUEUE_CAPACITY
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewerConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            tiles: TileSettings::default(),
            zoom: ZoomLimits::default(),
            cache: CacheSettings::default(),
            overlay: OverlayStyle::default(),
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            log_level: LogLevel::default(),
        }
    }

    /// Get the default filename for the config file.
    pub fn default_filename() -> &'static str {
        "slideview-config.json"
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let z = &self.zoom;
        if !(z.min.is_finite() && z.min > 0.0) {
            return Err(ConfigError::invalid("zoom.min", format!("must be positive, got {}", z.min)));
        }
        if !(z.max.is_finite() && z.max >= z.min) {
            return Err(ConfigError::invalid(
                "zoom.max",
                format!("must be at least zoom.min ({}), got {}", z.min, z.max),
            ));
        }
        if !(z.step.is_finite() && z.step > 1.0) {
            return Err(ConfigError::invalid("zoom.step", format!("must exceed 1, got {}", z.step)));
        }
        if self.cache.max_tiles == 0 || self.cache.max_bytes == 0 {
            return Err(ConfigError::invalid("cache", "budget must be non-zero"));
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::invalid("event_queue_capacity", "must be non-zero"));
        }
        if !(self.overlay.min_vertex_spacing.is_finite() && self.overlay.min_vertex_spacing >= 0.0) {
            return Err(ConfigError::invalid(
                "overlay.min_vertex_spacing",
                "must be a non-negative number",
            ));
        }
        if !(0.0..=1.0).contains(&self.overlay.default_opacity) {
            return Err(ConfigError::invalid("overlay.default_opacity", "must be within 0..=1"));
        }
        Ok(())
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize and validate configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        // Validate version compatibility
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: config.version,
                supported: CONFIG_VERSION,
            });
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a file, creating parent directories if needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

/// Everything needed to open one slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub plane: ImagePlane,
    /// Base URL substituted for `{base}` in the tile template
    #[serde(default)]
    pub tile_base_url: String,
    #[serde(default)]
    pub schema: LabelSchema,
}

impl SlideDescriptor {
    pub fn new(plane: ImagePlane, tile_base_url: impl Into<String>) -> Self {
        Self {
            name: None,
            plane,
            tile_base_url: tile_base_url.into(),
            schema: LabelSchema::default(),
        }
    }

    pub fn with_schema(mut self, schema: LabelSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let slide: Self = serde_json::from_str(json)?;
        slide.plane.validate()?;
        Ok(slide)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let slide = Self::from_json(&std::fs::read_to_string(path)?)?;
        log::info!(
            "Loaded slide {:?}: {}x{} px, levels {}..={}",
            slide.name.as_deref().unwrap_or("<unnamed>"),
            slide.plane.width,
            slide.plane.height,
            slide.plane.min_level,
            slide.plane.max_level
        );
        Ok(slide)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip() {
        let config = ViewerConfig::new();
        let json = config.to_json().unwrap();
        assert_eq!(ViewerConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = ViewerConfig::from_json(r#"{"version": 1, "cache": {"max_tiles": 16}}"#).unwrap();
        assert_eq!(config.cache.max_tiles, 16);
        assert_eq!(config.cache.max_bytes, DEFAULT_CACHE_MAX_BYTES);
        assert_eq!(config.tiles.format, "jpeg");
        assert_eq!(config.overlay, OverlayStyle::default());
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_newer_version_rejected() {
        assert!(matches!(
            ViewerConfig::from_json(r#"{"version": 99}"#),
            Err(ConfigError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            ViewerConfig::from_json(r#"{"zoom": {"min": 0.0}}"#),
            Err(ConfigError::InvalidValue { field: "zoom.min", .. })
        ));
        assert!(ViewerConfig::from_json(r#"{"zoom": {"min": 2.0, "max": 1.0}}"#).is_err());
        assert!(ViewerConfig::from_json(r#"{"event_queue_capacity": 0}"#).is_err());
    }

    #[test]
    fn test_slide_descriptor() {
        let json = r##"{
            "name": "case-17",
            "plane": {"width": 10000, "height": 8000, "max_level": 5, "mpp_x": 0.25, "mpp_y": 0.25},
            "tile_base_url": "/api/wsi/17/tile",
            "schema": {
                "name": "oral",
                "schema_definition": {"classes": [{"name": "Tumor", "color": "#FF0000"}]}
            }
        }"##;
        let slide = SlideDescriptor::from_json(json).unwrap();
        assert_eq!(slide.plane.tile_size, 256);
        assert_eq!(slide.plane.num_tiles(5), (40, 32));
        assert!(slide.schema.resolve("Tumor").is_some());

        assert!(SlideDescriptor::from_json(r#"{"plane": {"width": 0, "height": 5}}"#).is_err());
    }

    #[test]
    fn test_log_level_names() {
        assert_eq!(LogLevel::from_name("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_name("nope"), None);
        assert_eq!(LogLevel::Warn.to_level_filter(), log::LevelFilter::Warn);
    }
}
