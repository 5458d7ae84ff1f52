//! A consumer that pretends to fetch tile data and keeps statistics.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use terra_sampling::{
    ChangeRequest, ChangeSet, DelegateId, Node, QuadTileBuilder, QuadTileBuilderDelegate,
    SamplingParams, TileBuilderDelegateInfo,
};
use tracing::{debug, trace};

/// Running totals reported at the end of a flight.
#[derive(Clone, Copy, Debug, Default)]
pub struct TileStats {
    pub loaded: usize,
    pub unloaded: usize,
    pub fetched: usize,
    /// Fetches that finished after their tile went away.
    pub stale: usize,
    /// Visibility flips applied to already fetched tiles.
    pub toggled: usize,
    pub deepest_level: u32,
}

#[derive(Default)]
struct Inner {
    stats: TileStats,
    pending: VecDeque<(Node, u64)>,
    /// Tiles whose fetch has completed, by load generation.
    fetched: BTreeMap<Node, u64>,
}

/// Queues every loaded tile as a fetch and completes a few per frame.
///
/// A fetched tile follows the builder's enable/disable batches; one still
/// in flight picks up its visibility when the fetch lands.
pub struct StatsDelegate {
    id: DelegateId,
    fetches_per_frame: usize,
    inner: Mutex<Inner>,
}

impl StatsDelegate {
    pub fn new(fetches_per_frame: usize) -> Self {
        Self {
            id: DelegateId::next(),
            fetches_per_frame,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> TileStats {
        self.lock().stats
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }
}

impl QuadTileBuilderDelegate for StatsDelegate {
    fn id(&self) -> DelegateId {
        self.id
    }

    fn set_builder(&self, builder: &Arc<QuadTileBuilder>, params: &SamplingParams) {
        debug!(
            reported_max_zoom = params.reported_max_zoom,
            tessellation = ?builder.geometry().tessellation,
            "stats delegate attached"
        );
    }

    fn builder_load(
        &self,
        _builder: &QuadTileBuilder,
        info: &TileBuilderDelegateInfo,
        changes: &mut ChangeSet,
    ) {
        let mut inner = self.lock();
        inner.stats.loaded += info.load_tiles.len();
        inner.stats.unloaded += info.unload_tiles.len();
        inner.stats.deepest_level = inner.stats.deepest_level.max(info.target_level);
        inner
            .pending
            .extend(info.load_tiles.iter().map(|t| (t.node, t.generation)));
        for node in &info.unload_tiles {
            inner.fetched.remove(node);
        }

        let flips = info
            .enable_tiles
            .iter()
            .map(|tile| (tile, true))
            .chain(info.disable_tiles.iter().map(|tile| (tile, false)));
        for (tile, enable) in flips {
            if inner.fetched.get(&tile.node) != Some(&tile.generation) {
                continue;
            }
            changes.extend(
                tile.draw_ids
                    .iter()
                    .map(|&id| ChangeRequest::OnOff { id, enable }),
            );
            inner.stats.toggled += 1;
        }
    }

    /// Finish queued fetches and show the tiles that are still wanted.
    fn builder_pre_scene_flush(&self, builder: &QuadTileBuilder, changes: &mut ChangeSet) {
        let done: Vec<(Node, u64)> = {
            let mut inner = self.lock();
            let count = self.fetches_per_frame.min(inner.pending.len());
            inner.pending.drain(..count).collect()
        };

        let mut stale = 0;
        let mut landed = Vec::with_capacity(done.len());
        for (node, generation) in &done {
            if !builder.is_current(*node, *generation) {
                stale += 1;
                continue;
            }
            landed.push((*node, *generation));
            if let Some(tile) = builder.tile(*node)
                && tile.enabled
            {
                changes.extend(
                    tile.draw_ids
                        .iter()
                        .map(|&id| ChangeRequest::OnOff { id, enable: true }),
                );
            }
        }
        if stale > 0 {
            trace!(stale, "dropped fetches for unloaded tiles");
        }

        let mut inner = self.lock();
        inner.fetched.extend(landed);
        inner.stats.fetched += done.len() - stale;
        inner.stats.stale += stale;
    }

    fn builder_shutdown(&self, _builder: &QuadTileBuilder, _changes: &mut ChangeSet) {
        let mut inner = self.lock();
        debug!(pending = inner.pending.len(), "stats delegate shutting down");
        inner.pending.clear();
        inner.fetched.clear();
    }

    fn builder_is_loading(&self) -> bool {
        !self.lock().pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_sampling::{GeometryFlags, ImportantNode, ImportantNodeSet, ViewUpdate};

    fn update(load: &[Node], unload: &[Node]) -> ViewUpdate {
        let to_load: ImportantNodeSet = load
            .iter()
            .map(|n| ImportantNode::new(*n, 1.0))
            .collect();
        ViewUpdate {
            target_level: 0,
            nodes: to_load.clone(),
            to_load,
            unload_candidates: unload.iter().copied().collect(),
        }
    }

    #[test]
    fn test_fetch_enables_current_tile() {
        let builder = QuadTileBuilder::new(GeometryFlags::default());
        let stats = StatsDelegate::new(4);
        let mut changes = ChangeSet::new();
        builder.build_tiles(&stats, &update(&[Node::ROOT], &[]), &mut changes);
        assert!(stats.builder_is_loading());

        let mut flush = ChangeSet::new();
        stats.builder_pre_scene_flush(&builder, &mut flush);
        assert!(!stats.builder_is_loading());
        assert!(
            flush
                .iter()
                .all(|c| matches!(c, ChangeRequest::OnOff { enable: true, .. }))
        );
        assert!(!flush.is_empty());
        assert_eq!(stats.stats().fetched, 1);
    }

    #[test]
    fn test_unloaded_tile_fetch_is_stale() {
        let builder = QuadTileBuilder::new(GeometryFlags::default());
        let stats = StatsDelegate::new(4);
        let mut changes = ChangeSet::new();
        builder.build_tiles(&stats, &update(&[Node::ROOT], &[]), &mut changes);
        builder.build_tiles(&stats, &update(&[], &[Node::ROOT]), &mut changes);

        let mut flush = ChangeSet::new();
        stats.builder_pre_scene_flush(&builder, &mut flush);
        assert!(flush.is_empty());
        let summary = stats.stats();
        assert_eq!((summary.loaded, summary.unloaded, summary.stale), (1, 1, 1));
    }

    fn switches(changes: &ChangeSet, enable: bool) -> Vec<u64> {
        changes
            .iter()
            .filter_map(|c| match c {
                ChangeRequest::OnOff { id, enable: e } if *e == enable => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// A fetched parent is hidden once its children cover it and shown
    /// again when they go away.
    #[test]
    fn test_fetched_parent_follows_coverage() {
        let builder = QuadTileBuilder::new(GeometryFlags::default());
        let stats = StatsDelegate::new(16);
        let mut changes = ChangeSet::new();
        builder.build_tiles(&stats, &update(&[Node::ROOT], &[]), &mut changes);
        stats.builder_pre_scene_flush(&builder, &mut ChangeSet::new());
        let root_ids = builder.tile(Node::ROOT).unwrap().draw_ids;

        let children = Node::ROOT.children().unwrap();
        let mut covered = ChangeSet::new();
        builder.build_tiles(&stats, &update(&children, &[]), &mut covered);
        assert_eq!(switches(&covered, false), root_ids);

        let mut uncovered = ChangeSet::new();
        builder.build_tiles(&stats, &update(&[], &children), &mut uncovered);
        assert_eq!(switches(&uncovered, true), root_ids);
        assert_eq!(stats.stats().toggled, 2);
    }

    /// A tile loaded underneath its children is switched on by a later
    /// enable batch once its fetch has landed.
    #[test]
    fn test_covered_tile_enabled_after_children_unload() {
        let builder = QuadTileBuilder::new(GeometryFlags::default());
        let stats = StatsDelegate::new(16);
        let children = Node::ROOT.children().unwrap();
        let mut changes = ChangeSet::new();
        builder.build_tiles(&stats, &update(&children, &[]), &mut changes);
        builder.build_tiles(&stats, &update(&[Node::ROOT], &[]), &mut changes);
        assert!(!builder.tile(Node::ROOT).unwrap().enabled);

        let mut flush = ChangeSet::new();
        stats.builder_pre_scene_flush(&builder, &mut flush);
        let root_ids = builder.tile(Node::ROOT).unwrap().draw_ids;
        assert!(switches(&flush, true).iter().all(|id| !root_ids.contains(id)));

        let mut uncovered = ChangeSet::new();
        builder.build_tiles(&stats, &update(&[], &children), &mut uncovered);
        assert_eq!(switches(&uncovered, true), root_ids);
    }

    #[test]
    fn test_unfetched_tile_ignores_flips() {
        let builder = QuadTileBuilder::new(GeometryFlags::default());
        let stats = StatsDelegate::new(16);
        let mut changes = ChangeSet::new();
        builder.build_tiles(&stats, &update(&[Node::ROOT], &[]), &mut changes);
        let children = Node::ROOT.children().unwrap();
        let mut covered = ChangeSet::new();
        builder.build_tiles(&stats, &update(&children, &[]), &mut covered);
        assert!(switches(&covered, false).is_empty());
        assert_eq!(stats.stats().toggled, 0);
    }
}
