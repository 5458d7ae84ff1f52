//! Immutable parameters of one sampling session.

use terra_config::SamplingConfig;
use terra_quadtree::Mbr;

use crate::CoordSystem;

/// Geometry generation flags handed through to the tile builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeometryFlags {
    /// Build a surface drawable per tile.
    pub generate_geom: bool,
    /// Build pole caps on tiles touching the top or bottom row.
    pub cover_poles: bool,
    /// Build skirts along tile edges.
    pub edge_matching: bool,
    /// Tessellation of generated geometry (columns, rows). The builder only
    /// allocates drawables; consumers that build meshes read this through
    /// [`QuadTileBuilder::geometry`](crate::QuadTileBuilder::geometry).
    pub tessellation: (u32, u32),
}

impl Default for GeometryFlags {
    fn default() -> Self {
        Self {
            generate_geom: true,
            cover_poles: true,
            edge_matching: false,
            tessellation: (10, 10),
        }
    }
}

/// Parameters a [`QuadSamplingController`](crate::QuadSamplingController)
/// session is started with.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingParams {
    pub coord_sys: CoordSystem,
    pub min_zoom: u32,
    pub max_zoom: u32,
    /// Level reported to data sources; usually `max_zoom`. Never used for
    /// scheduling, only handed to delegates through `set_builder`.
    pub reported_max_zoom: u32,
    /// Budget on simultaneously resident tiles.
    pub max_tiles: usize,
    /// Default per-level minimum importance.
    pub min_importance: f64,
    /// Threshold for `min_zoom`. Zero means level 0 is always loaded.
    pub min_importance_top: f64,
    /// Per-level overrides; negative entries fall back to `min_importance`.
    pub importance_per_level: Vec<f64>,
    pub single_level: bool,
    /// Extra levels loaded in single-level mode. Negative entries are
    /// relative to the target level.
    pub level_loads: Vec<i32>,
    pub force_min_level: bool,
    /// Eye height at or above which the min level is kept in single-level mode.
    pub force_min_level_height: f64,
    pub clip_bounds: Option<Mbr>,
    pub geometry: GeometryFlags,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            coord_sys: CoordSystem::SphericalMercator,
            min_zoom: 0,
            max_zoom: 18,
            reported_max_zoom: 18,
            max_tiles: 128,
            min_importance: 256.0 * 256.0,
            min_importance_top: 0.0,
            importance_per_level: Vec::new(),
            single_level: false,
            level_loads: Vec::new(),
            force_min_level: true,
            force_min_level_height: 1.0,
            clip_bounds: None,
            geometry: GeometryFlags::default(),
        }
    }
}

impl SamplingParams {
    /// Build session parameters from a validated [`SamplingConfig`].
    pub fn from_config(config: &SamplingConfig) -> Self {
        Self {
            coord_sys: CoordSystem::from(&config.coord_system),
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            reported_max_zoom: config.reported_max_zoom.unwrap_or(config.max_zoom),
            max_tiles: config.max_tiles,
            min_importance: config.min_importance,
            min_importance_top: config.min_importance_top,
            importance_per_level: config.importance_per_level.clone(),
            single_level: config.single_level,
            level_loads: config.level_loads.clone(),
            force_min_level: config.force_min_level,
            force_min_level_height: config.force_min_level_height,
            clip_bounds: config.clip_bounds.map(Mbr::from_array),
            geometry: GeometryFlags {
                generate_geom: config.generate_geom,
                cover_poles: config.cover_poles,
                edge_matching: config.edge_matching,
                tessellation: config.tessellation,
            },
        }
    }

    /// Override the minimum importance of one level.
    pub fn set_importance_level(&mut self, min_importance: f64, level: u32) {
        let level = level as usize;
        if self.importance_per_level.len() <= level {
            self.importance_per_level.resize(level + 1, -1.0);
        }
        self.importance_per_level[level] = min_importance;
    }

    /// Threshold table indexed by level, `0..=max_zoom`.
    ///
    /// `force_min_level` turns the min level threshold into the infinite
    /// sentinel so it always loads. Otherwise a non-zero
    /// `min_importance_top` replaces the min level's threshold.
    pub fn min_importance_per_level(&self) -> Vec<f64> {
        let mut table: Vec<f64> = (0..=self.max_zoom as usize)
            .map(|level| match self.importance_per_level.get(level) {
                Some(&value) if value >= 0.0 => value,
                _ => self.min_importance,
            })
            .collect();

        let top = self.min_zoom as usize;
        if self.force_min_level {
            table[top] = f64::INFINITY;
        } else if self.min_importance_top > 0.0 {
            table[top] = self.min_importance_top;
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_config::CoordSystemConfig;

    #[test]
    fn test_per_level_overrides() {
        let mut params = SamplingParams {
            max_zoom: 4,
            min_importance: 100.0,
            force_min_level: false,
            ..SamplingParams::default()
        };
        params.set_importance_level(10.0, 2);
        params.set_importance_level(-1.0, 3);
        assert_eq!(
            params.min_importance_per_level(),
            vec![100.0, 100.0, 10.0, 100.0, 100.0]
        );
    }

    #[test]
    fn test_force_min_level_uses_infinite_sentinel() {
        let params = SamplingParams {
            min_zoom: 2,
            max_zoom: 5,
            force_min_level: true,
            min_importance_top: 50.0,
            ..SamplingParams::default()
        };
        let table = params.min_importance_per_level();
        assert_eq!(table.len(), 6);
        assert!(table[2].is_infinite());
        assert_eq!(table[3], params.min_importance);
    }

    #[test]
    fn test_min_importance_top_replaces_min_level() {
        let params = SamplingParams {
            max_zoom: 3,
            force_min_level: false,
            min_importance_top: 5.0,
            ..SamplingParams::default()
        };
        assert_eq!(params.min_importance_per_level()[0], 5.0);
    }

    #[test]
    fn test_from_config() {
        let config = SamplingConfig {
            coord_system: CoordSystemConfig::PlateCarree,
            max_zoom: 12,
            reported_max_zoom: None,
            clip_bounds: Some([0.0, 0.0, 1.0, 1.0]),
            edge_matching: true,
            ..SamplingConfig::default()
        };
        let params = SamplingParams::from_config(&config);
        assert_eq!(params.coord_sys, CoordSystem::PlateCarree);
        assert_eq!(params.reported_max_zoom, 12);
        assert_eq!(params.clip_bounds, Some(Mbr::from_array([0.0, 0.0, 1.0, 1.0])));
        assert!(params.geometry.edge_matching);
        assert_eq!(params.max_tiles, config.max_tiles);
    }
}
