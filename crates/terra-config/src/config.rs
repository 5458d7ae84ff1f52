//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Deepest zoom level a sampling session supports.
pub const MAX_SUPPORTED_ZOOM: u32 = 24;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Tile sampling session settings.
    pub sampling: SamplingConfig,
    /// Camera / viewport settings used to drive sampling.
    pub view: ViewConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Coordinate system the tile pyramid is laid over.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub enum CoordSystemConfig {
    /// Longitude/latitude in radians, 2:1 root.
    PlateCarree,
    /// Web-mercator style square root in radians.
    #[default]
    SphericalMercator,
    /// Arbitrary planar bounds `[min_x, min_y, max_x, max_y]`.
    Custom {
        /// Root rectangle.
        bounds: [f64; 4],
    },
}

/// Sampling session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Coordinate system of the tile pyramid.
    pub coord_system: CoordSystemConfig,
    /// Coarsest level loaded.
    pub min_zoom: u32,
    /// Finest level loaded.
    pub max_zoom: u32,
    /// Level reported to data sources, if it differs from `max_zoom`.
    pub reported_max_zoom: Option<u32>,
    /// Maximum number of simultaneously resident tiles.
    pub max_tiles: usize,
    /// Minimum screen importance (pixels²) for a tile to load.
    pub min_importance: f64,
    /// Distinct threshold for the top level; 0 means "always load the root".
    pub min_importance_top: f64,
    /// Per-level overrides of `min_importance`; negative entries are ignored.
    pub importance_per_level: Vec<f64>,
    /// Load a single resolution level at a time.
    pub single_level: bool,
    /// Extra levels to load in single-level mode; negative values are
    /// relative to the target level.
    pub level_loads: Vec<i32>,
    /// Always keep the minimum level loaded.
    pub force_min_level: bool,
    /// Eye height above which the minimum level is kept in single-level mode.
    pub force_min_level_height: f64,
    /// Restrict loading to tiles overlapping `[min_x, min_y, max_x, max_y]`.
    pub clip_bounds: Option<[f64; 4]>,
    /// Build surface geometry for each tile.
    pub generate_geom: bool,
    /// Build caps over the poles.
    pub cover_poles: bool,
    /// Build skirts so neighbouring tiles at different levels match up.
    pub edge_matching: bool,
    /// Tessellation of generated geometry (columns, rows).
    pub tessellation: (u32, u32),
}

/// Which simulated camera drives the sampler.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ViewKind {
    /// Orthographic map view.
    #[default]
    Flat,
    /// Perspective camera orbiting a unit globe.
    Globe,
}

/// View configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewConfig {
    /// Camera model.
    pub kind: ViewKind,
    /// Framebuffer width in pixels.
    pub frame_width: u32,
    /// Framebuffer height in pixels.
    pub frame_height: u32,
    /// Vertical field of view for the globe camera.
    pub fov_degrees: f64,
    /// Number of simulated frames.
    pub frames: u32,
    /// Eye height at the first frame (globe radii, or world units per pixel for the flat view).
    pub start_height: f64,
    /// Eye height at the last frame.
    pub end_height: f64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Log per-frame tile statistics.
    pub show_tile_stats: bool,
}

// --- Default implementations ---

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            coord_system: CoordSystemConfig::default(),
            min_zoom: 0,
            max_zoom: 18,
            reported_max_zoom: None,
            max_tiles: 128,
            min_importance: 256.0 * 256.0,
            min_importance_top: 0.0,
            importance_per_level: Vec::new(),
            single_level: false,
            level_loads: Vec::new(),
            force_min_level: true,
            force_min_level_height: 1.0,
            clip_bounds: None,
            generate_geom: true,
            cover_poles: true,
            edge_matching: false,
            tessellation: (10, 10),
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            kind: ViewKind::Flat,
            frame_width: 1024,
            frame_height: 768,
            fov_degrees: 60.0,
            frames: 60,
            start_height: 2.0,
            end_height: 0.001,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            show_tile_stats: true,
        }
    }
}

impl SamplingConfig {
    /// Check the settings describe a session the scheduler can run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(ConfigError::Invalid(format!(
                "max_zoom {} exceeds supported maximum {MAX_SUPPORTED_ZOOM}",
                self.max_zoom
            )));
        }
        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::Invalid(format!(
                "min_zoom {} is greater than max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.max_tiles == 0 {
            return Err(ConfigError::Invalid("max_tiles must be at least 1".into()));
        }
        if self.min_importance < 0.0 || self.min_importance_top < 0.0 {
            return Err(ConfigError::Invalid(
                "importance thresholds must be non-negative".into(),
            ));
        }
        if let CoordSystemConfig::Custom { bounds } = self.coord_system
            && (bounds[0] >= bounds[2] || bounds[1] >= bounds[3])
        {
            return Err(ConfigError::Invalid(format!(
                "custom coordinate bounds {bounds:?} are empty"
            )));
        }
        Ok(())
    }
}

/// Platform config directory for terra (`<config_dir>/terra`).
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("terra"))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.sampling.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.sampling.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("max_tiles: 128"));
        assert!(ron_str.contains("SphericalMercator"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.sampling.coord_system = CoordSystemConfig::Custom {
            bounds: [0.0, 0.0, 10.0, 5.0],
        };
        config.sampling.level_loads = vec![-1, 2];
        config.sampling.clip_bounds = Some([1.0, 1.0, 2.0, 2.0]);
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_field_uses_default() {
        let ron_str = "(sampling: (max_tiles: 64, single_level: true))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.sampling.max_tiles, 64);
        assert!(config.sampling.single_level);
        assert_eq!(config.sampling.max_zoom, 18);
        assert_eq!(config.view, ViewConfig::default());
    }

    #[test]
    fn test_default_sampling_config_is_valid() {
        assert!(SamplingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_zoom_range() {
        let config = SamplingConfig {
            min_zoom: 5,
            max_zoom: 3,
            ..SamplingConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("min_zoom 5"));

        let config = SamplingConfig {
            max_zoom: MAX_SUPPORTED_ZOOM + 1,
            ..SamplingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_budget_and_empty_bounds() {
        let config = SamplingConfig {
            max_tiles: 0,
            ..SamplingConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SamplingConfig {
            coord_system: CoordSystemConfig::Custom {
                bounds: [1.0, 0.0, 1.0, 2.0],
            },
            ..SamplingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sampling.max_tiles = 300;
        config.view.kind = ViewKind::Globe;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_load_rejects_invalid_sampling() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.ron"),
            "(sampling: (min_zoom: 9, max_zoom: 2))",
        )
        .unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.sampling.max_tiles = 512;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().sampling.max_tiles, 512);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }
}
