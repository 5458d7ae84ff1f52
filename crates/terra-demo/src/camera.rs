//! Simulated camera flights.

use std::f64::consts::PI;

use glam::DVec2;
use terra_config::{ViewConfig, ViewKind};
use terra_sampling::{CoordSystem, FlatView, GlobeView, Mbr, ViewState};

/// A descent from `start_height` to `end_height` over `frames` frames.
pub struct Flight {
    kind: ViewKind,
    frame_size: DVec2,
    fov_y: f64,
    start_height: f64,
    end_height: f64,
    frames: u32,
    bounds: Mbr,
}

impl Flight {
    pub fn new(config: &ViewConfig, coord_sys: &CoordSystem) -> Self {
        Self {
            kind: config.kind,
            frame_size: DVec2::new(config.frame_width as f64, config.frame_height as f64),
            fov_y: config.fov_degrees.to_radians(),
            start_height: config.start_height,
            end_height: config.end_height,
            frames: config.frames,
            bounds: coord_sys.bounds(),
        }
    }

    pub fn frame_size(&self) -> DVec2 {
        self.frame_size
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Eye height at `frame`, falling geometrically.
    pub fn height_at(&self, frame: u32) -> f64 {
        let t = if self.frames > 1 {
            frame as f64 / (self.frames - 1) as f64
        } else {
            1.0
        };
        self.start_height * (self.end_height / self.start_height).powf(t)
    }

    /// Camera for `frame`. The eye drifts east as it descends.
    pub fn view_at(&self, frame: u32) -> Box<dyn ViewState> {
        let height = self.height_at(frame);
        let drift = frame as f64 / self.frames.max(1) as f64;
        match self.kind {
            ViewKind::Flat => {
                let center = self.bounds.center()
                    + DVec2::new(0.1 + 0.05 * drift, 0.2) * self.bounds.span() * 0.5;
                // At height 1 the whole root fits the frame vertically.
                let units_per_pixel = height * self.bounds.height() / self.frame_size.y;
                Box::new(FlatView::new(center, units_per_pixel))
            }
            ViewKind::Globe => {
                let lon = 0.3 + drift * PI / 8.0;
                Box::new(GlobeView::orbit(lon, 0.6, height, self.fov_y))
            }
        }
    }
}
