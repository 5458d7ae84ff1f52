//! The consumer side of a sampling session.
//!
//! Each delegate (imagery, vector, elevation loader, ...) receives the same
//! load/unload batches from one shared session and reports back through
//! the [`ChangeSet`] it is handed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use terra_quadtree::{ImportantNodeSet, Node, NodeSet};

use crate::{ChangeSet, DrawableId, QuadTileBuilder, SamplingParams};

/// Process-unique identity of a delegate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DelegateId(u64);

impl DelegateId {
    /// Allocate a fresh identity.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        DelegateId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// A tile the builder currently holds.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedTile {
    pub node: Node,
    pub importance: f64,
    /// Drawables created for this tile, empty unless geometry is generated.
    pub draw_ids: Vec<DrawableId>,
    pub enabled: bool,
    /// Unique per load; a node unloaded and loaded again gets a new value.
    pub generation: u64,
}

/// One batch of builder changes as seen by a delegate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TileBuilderDelegateInfo {
    /// Builder batch this info brings a consumer up to.
    pub sequence: u64,
    pub target_level: u32,
    /// Tiles loaded by this batch.
    pub load_tiles: Vec<LoadedTile>,
    /// Nodes unloaded by this batch.
    pub unload_tiles: NodeSet,
    /// Loaded tiles that became visible.
    pub enable_tiles: Vec<LoadedTile>,
    /// Loaded tiles that became hidden.
    pub disable_tiles: Vec<LoadedTile>,
}

impl TileBuilderDelegateInfo {
    pub fn is_empty(&self) -> bool {
        self.load_tiles.is_empty()
            && self.unload_tiles.is_empty()
            && self.enable_tiles.is_empty()
            && self.disable_tiles.is_empty()
    }
}

/// A consumer registered with a [`QuadSamplingController`](crate::QuadSamplingController).
///
/// Callbacks may arrive from whichever thread drives the session and are
/// never invoked under the controller's registration lock, so they may add
/// or remove delegates themselves.
pub trait QuadTileBuilderDelegate: Send + Sync {
    fn id(&self) -> DelegateId;

    /// Called once when the session's builder comes up.
    fn set_builder(&self, _builder: &Arc<QuadTileBuilder>, _params: &SamplingParams) {}

    /// Tiles were loaded, unloaded, enabled or disabled.
    fn builder_load(
        &self,
        builder: &QuadTileBuilder,
        info: &TileBuilderDelegateInfo,
        changes: &mut ChangeSet,
    );

    /// Return the subset of `unload_tiles` this delegate still needs.
    fn builder_unload_check(
        &self,
        _builder: &QuadTileBuilder,
        _load_tiles: &ImportantNodeSet,
        _unload_tiles: &NodeSet,
        _target_level: u32,
    ) -> NodeSet {
        NodeSet::new()
    }

    /// Last chance to add changes before the frame's changes are applied.
    fn builder_pre_scene_flush(&self, _builder: &QuadTileBuilder, _changes: &mut ChangeSet) {}

    /// The delegate is leaving the session, or the session is stopping.
    fn builder_shutdown(&self, _builder: &QuadTileBuilder, _changes: &mut ChangeSet) {}

    /// Whether the delegate still has fetches or builds in flight.
    fn builder_is_loading(&self) -> bool {
        false
    }
}

pub type QuadTileBuilderDelegateRef = Arc<dyn QuadTileBuilderDelegate>;
