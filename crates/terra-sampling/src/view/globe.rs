//! Perspective camera around a unit-radius globe.
//!
//! Tiles are placed on the sphere through [`CoordSystem::to_geographic`].
//! Visibility combines a horizon test with the camera's view cone, and
//! importance approximates the tile's projected pixel area from its
//! spherical area, distance and orientation.

use glam::{DVec2, DVec3};
use terra_quadtree::{Mbr, Node};

use super::ViewState;
use crate::CoordSystem;

/// Tiles facing away at a grazing angle still count this much.
const MIN_FACING: f64 = 0.1;

/// Horizon test for a unit sphere centred at the origin.
#[derive(Clone, Copy, Debug)]
pub struct Horizon {
    eye: DVec3,
    /// Distance from the eye to the globe centre.
    eye_distance: f64,
    /// `1 / eye_distance`: cosine of the visible cap's half-angle.
    cos_horizon: f64,
}

impl Horizon {
    pub fn new(eye: DVec3) -> Self {
        let eye_distance = eye.length();
        let cos_horizon = if eye_distance > 1.0 {
            1.0 / eye_distance
        } else {
            // Inside the globe: nothing is hidden.
            0.0
        };
        Self {
            eye,
            eye_distance,
            cos_horizon,
        }
    }

    /// Whether a bounding sphere reaches above the horizon.
    ///
    /// A surface point is visible iff the angle between it and the sub-eye
    /// point, seen from the centre, is below the cap half-angle. The bound's
    /// radius widens that angle by its angular size.
    pub fn is_above_horizon(&self, center: DVec3, radius: f64) -> bool {
        if self.eye_distance <= 1.0 {
            return true;
        }
        let center_dist = center.length();
        if center_dist < 1e-10 || radius >= center_dist {
            return true;
        }

        let cos_angle = center.dot(self.eye) / (center_dist * self.eye_distance);
        let sin_margin = radius / center_dist;
        let cos_margin = (1.0 - sin_margin * sin_margin).max(0.0).sqrt();
        let sin_horizon = (1.0 - self.cos_horizon * self.cos_horizon).max(0.0).sqrt();

        // cos(horizon + margin)
        cos_angle >= self.cos_horizon * cos_margin - sin_horizon * sin_margin
    }

    /// Height of the eye above the surface.
    pub fn altitude(&self) -> f64 {
        (self.eye_distance - 1.0).max(0.0)
    }
}

/// Approximate placement of a tile on the globe.
#[derive(Clone, Copy, Debug)]
struct TileShape {
    center: DVec3,
    radius: f64,
    /// Area on the unit sphere (steradians).
    area: f64,
}

impl TileShape {
    fn new(coord_sys: &CoordSystem, mbr: &Mbr) -> Self {
        let span = mbr.span();
        let mut samples = [DVec3::ZERO; 9];
        for (i, sample) in samples.iter_mut().enumerate() {
            let t = DVec2::new((i % 3) as f64, (i / 3) as f64) * 0.5;
            *sample = unit_vector(coord_sys.to_geographic(mbr.ll + span * t));
        }
        let center = samples[4];
        let chord = samples
            .iter()
            .map(|s| s.distance(center))
            .fold(0.0_f64, f64::max);
        // Add the sagitta so the sphere bulging between samples stays inside.
        let half = (chord * 0.5).min(1.0);
        let radius = chord + (1.0 - (1.0 - half * half).sqrt());

        let ll = coord_sys.to_geographic(mbr.ll);
        let ur = coord_sys.to_geographic(mbr.ur);
        let area = (ur.x - ll.x).abs() * (ur.y.sin() - ll.y.sin()).abs();

        Self {
            center,
            radius,
            area,
        }
    }
}

fn unit_vector(geo: DVec2) -> DVec3 {
    let (sin_lon, cos_lon) = geo.x.sin_cos();
    let (sin_lat, cos_lat) = geo.y.sin_cos();
    DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
}

/// A perspective camera looking at a unit globe.
#[derive(Clone, Copy, Debug)]
pub struct GlobeView {
    eye: DVec3,
    look: DVec3,
    /// Vertical field of view in radians.
    fov_y: f64,
    horizon: Horizon,
}

impl GlobeView {
    pub fn new(eye: DVec3, look: DVec3, fov_y: f64) -> Self {
        assert!(
            fov_y > 0.0 && fov_y < std::f64::consts::PI,
            "field of view out of range: {fov_y}"
        );
        Self {
            eye,
            look: look.normalize(),
            fov_y,
            horizon: Horizon::new(eye),
        }
    }

    /// A camera `height` above (`lon`, `lat`) looking at the globe centre.
    pub fn orbit(lon: f64, lat: f64, height: f64, fov_y: f64) -> Self {
        let up = unit_vector(DVec2::new(lon, lat));
        Self::new(up * (1.0 + height), -up, fov_y)
    }

    pub fn eye(&self) -> DVec3 {
        self.eye
    }

    pub fn horizon(&self) -> &Horizon {
        &self.horizon
    }

    fn tan_half_fov(&self) -> f64 {
        (self.fov_y * 0.5).tan()
    }

    fn in_view_cone(&self, frame_size: DVec2, shape: &TileShape) -> bool {
        let to_tile = shape.center - self.eye;
        let dist = to_tile.length();
        if dist <= shape.radius {
            return true;
        }
        let tan_y = self.tan_half_fov();
        let tan_x = tan_y * frame_size.x / frame_size.y;
        let cone = tan_x.hypot(tan_y).atan();
        let angle = (to_tile / dist).dot(self.look).clamp(-1.0, 1.0).acos();
        let tile_angle = (shape.radius / dist).min(1.0).asin();
        angle <= cone + tile_angle
    }

    fn shape_on_screen(&self, frame_size: DVec2, shape: &TileShape) -> bool {
        self.horizon.is_above_horizon(shape.center, shape.radius)
            && self.in_view_cone(frame_size, shape)
    }
}

impl ViewState for GlobeView {
    fn screen_importance(
        &self,
        frame_size: DVec2,
        coord_sys: &CoordSystem,
        mbr: &Mbr,
        _node: Node,
    ) -> f64 {
        let shape = TileShape::new(coord_sys, mbr);
        if !self.shape_on_screen(frame_size, &shape) {
            return 0.0;
        }

        let to_tile = shape.center - self.eye;
        let center_dist = to_tile.length();
        let dist = (center_dist - shape.radius).max(self.horizon.altitude()).max(1e-9);
        let facing = if center_dist > 0.0 {
            shape
                .center
                .dot(-to_tile / center_dist)
                .clamp(MIN_FACING, 1.0)
        } else {
            1.0
        };
        let focal = frame_size.y * 0.5 / self.tan_half_fov();

        shape.area * focal * focal / (dist * dist) * facing
    }

    fn is_on_screen(
        &self,
        frame_size: DVec2,
        coord_sys: &CoordSystem,
        mbr: &Mbr,
        _node: Node,
    ) -> bool {
        self.shape_on_screen(frame_size, &TileShape::new(coord_sys, mbr))
    }

    fn eye_height(&self) -> f64 {
        self.horizon.altitude()
    }
}
