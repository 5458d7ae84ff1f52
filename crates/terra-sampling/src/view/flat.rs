//! Orthographic planar camera.

use glam::DVec2;
use terra_quadtree::{Mbr, Node};

use super::ViewState;
use crate::CoordSystem;

/// A top-down camera over the coordinate system's plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlatView {
    /// Point under the centre of the frame, in coordinate-system units.
    pub center: DVec2,
    /// Coordinate-system units covered by one pixel.
    pub units_per_pixel: f64,
}

impl FlatView {
    pub fn new(center: DVec2, units_per_pixel: f64) -> Self {
        assert!(
            units_per_pixel > 0.0,
            "units per pixel must be positive, got {units_per_pixel}"
        );
        Self {
            center,
            units_per_pixel,
        }
    }

    /// A view showing all of `bounds` in a frame of `frame_size` pixels.
    pub fn fit(bounds: &Mbr, frame_size: DVec2) -> Self {
        let upp = (bounds.span() / frame_size).max_element();
        Self::new(bounds.center(), upp)
    }

    /// The rectangle visible in a frame of `frame_size` pixels.
    pub fn viewport(&self, frame_size: DVec2) -> Mbr {
        let half = frame_size * self.units_per_pixel * 0.5;
        Mbr::new(self.center - half, self.center + half)
    }

    /// Zoom in by `factor` (> 1 zooms in, < 1 zooms out).
    pub fn zoom(&mut self, factor: f64) {
        assert!(factor > 0.0, "zoom factor must be positive");
        self.units_per_pixel /= factor;
    }

    pub fn pan(&mut self, delta: DVec2) {
        self.center += delta;
    }
}

impl ViewState for FlatView {
    fn screen_importance(
        &self,
        frame_size: DVec2,
        coord_sys: &CoordSystem,
        mbr: &Mbr,
        node: Node,
    ) -> f64 {
        if !self.is_on_screen(frame_size, coord_sys, mbr, node) {
            return 0.0;
        }
        mbr.area() / (self.units_per_pixel * self.units_per_pixel)
    }

    fn is_on_screen(
        &self,
        frame_size: DVec2,
        _coord_sys: &CoordSystem,
        mbr: &Mbr,
        _node: Node,
    ) -> bool {
        self.viewport(frame_size)
            .intersection(mbr)
            .is_some_and(|overlap| overlap.area() > 0.0)
    }

    /// Planar views have no eye; the zoom (units per pixel) stands in for it.
    fn eye_height(&self) -> f64 {
        self.units_per_pixel
    }
}
