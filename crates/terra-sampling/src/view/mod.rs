//! View/projection collaborators that score tiles for the sampling session.
//!
//! A [`ViewState`] is a snapshot of one camera. The controller asks it for a
//! screen-space importance and an on-screen test per candidate tile; both
//! must be deterministic for a fixed view.

mod flat;
mod globe;

pub use flat::FlatView;
pub use globe::{GlobeView, Horizon};

use glam::DVec2;
use terra_quadtree::{Mbr, Node};

use crate::CoordSystem;

/// A camera snapshot able to score tiles.
pub trait ViewState {
    /// Approximate projected pixel area of the tile, or 0 when off screen.
    fn screen_importance(
        &self,
        frame_size: DVec2,
        coord_sys: &CoordSystem,
        mbr: &Mbr,
        node: Node,
    ) -> f64;

    /// Whether any part of the tile may be on screen.
    fn is_on_screen(&self, frame_size: DVec2, coord_sys: &CoordSystem, mbr: &Mbr, node: Node)
    -> bool;

    /// Height of the eye above the surface, in the view's own units.
    fn eye_height(&self) -> f64;
}
