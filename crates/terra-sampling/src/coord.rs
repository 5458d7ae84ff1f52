//! Coordinate systems a tile pyramid can be laid over.

use std::f64::consts::{FRAC_PI_2, PI};

use glam::DVec2;
use terra_config::CoordSystemConfig;
use terra_quadtree::Mbr;

/// The coordinate system of a sampling session's root rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CoordSystem {
    /// Longitude/latitude in radians.
    PlateCarree,
    /// Spherical mercator in radians: `y = asinh(tan(lat))`.
    SphericalMercator,
    /// Planar bounds mapped linearly onto the whole globe.
    Custom {
        /// Root rectangle.
        bounds: Mbr,
    },
}

impl CoordSystem {
    /// Root rectangle covered by level 0.
    pub fn bounds(&self) -> Mbr {
        match self {
            CoordSystem::PlateCarree => Mbr::from_array([-PI, -FRAC_PI_2, PI, FRAC_PI_2]),
            CoordSystem::SphericalMercator => Mbr::from_array([-PI, -PI, PI, PI]),
            CoordSystem::Custom { bounds } => *bounds,
        }
    }

    /// Convert a point in this system to (longitude, latitude) in radians.
    pub fn to_geographic(&self, p: DVec2) -> DVec2 {
        match self {
            CoordSystem::PlateCarree => p,
            CoordSystem::SphericalMercator => DVec2::new(p.x, p.y.sinh().atan()),
            CoordSystem::Custom { bounds } => {
                let t = (p - bounds.ll) / bounds.span();
                DVec2::new(-PI + t.x * 2.0 * PI, -FRAC_PI_2 + t.y * PI)
            }
        }
    }
}

impl From<&CoordSystemConfig> for CoordSystem {
    fn from(config: &CoordSystemConfig) -> Self {
        match config {
            CoordSystemConfig::PlateCarree => CoordSystem::PlateCarree,
            CoordSystemConfig::SphericalMercator => CoordSystem::SphericalMercator,
            CoordSystemConfig::Custom { bounds } => CoordSystem::Custom {
                bounds: Mbr::from_array(*bounds),
            },
        }
    }
}
