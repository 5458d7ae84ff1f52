//! Multi-consumer tile sampling on top of the quadtree LOD evaluator.
//!
//! A [`QuadSamplingController`] owns one loading session: it scores tiles
//! through a [`ViewState`], lets the [`QuadDisplayController`] choose the
//! resident node set, has the [`QuadTileBuilder`] diff and build tiles, and
//! fans every load/unload batch out to the registered
//! [`QuadTileBuilderDelegate`]s.

mod builder;
mod changes;
mod controller;
mod coord;
mod delegate;
mod display;
mod params;
pub mod view;

pub use builder::QuadTileBuilder;
pub use changes::{ChangeRequest, ChangeSet, DrawableId};
pub use controller::{QuadSamplingController, SamplingState};
pub use coord::CoordSystem;
pub use delegate::{
    DelegateId, LoadedTile, QuadTileBuilderDelegate, QuadTileBuilderDelegateRef,
    TileBuilderDelegateInfo,
};
pub use display::{QuadDisplayController, ViewUpdate};
pub use params::{GeometryFlags, SamplingParams};
pub use view::{FlatView, GlobeView, ViewState};

pub use terra_quadtree::{ImportantNode, ImportantNodeSet, Mbr, Node, NodeSet};
