//! Tile bookkeeping: which tiles are loaded, their drawables and load
//! generations.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use terra_quadtree::{Node, NodeSet};
use tracing::trace;

use crate::{
    ChangeRequest, ChangeSet, DrawableId, GeometryFlags, LoadedTile, QuadTileBuilderDelegate,
    TileBuilderDelegateInfo, ViewUpdate,
};

#[derive(Debug, Default)]
struct BuilderState {
    tiles: BTreeMap<Node, LoadedTile>,
    target_level: u32,
    /// Number of batches handed to the delegate so far.
    sequence: u64,
    next_generation: u64,
    next_drawable: DrawableId,
}

impl BuilderState {
    fn allocate_drawable(&mut self) -> DrawableId {
        self.next_drawable += 1;
        self.next_drawable
    }

    /// Every strict ancestor of a loaded tile.
    fn loaded_ancestors(&self) -> NodeSet {
        let mut ancestors = NodeSet::new();
        for node in self.tiles.keys() {
            let mut cursor = node.parent();
            while let Some(parent) = cursor {
                if !ancestors.insert(parent) {
                    break;
                }
                cursor = parent.parent();
            }
        }
        ancestors
    }

    /// Whether loaded descendants cover all of `node`'s area.
    fn is_covered(&self, ancestors: &NodeSet, node: Node) -> bool {
        let Some(children) = node.children() else {
            return false;
        };
        children.iter().all(|child| {
            self.tiles.contains_key(child)
                || (ancestors.contains(child) && self.is_covered(ancestors, *child))
        })
    }
}

/// Holds the loaded tiles of a sampling session.
///
/// State sits behind a short-lived mutex; the lock is never held while a
/// delegate is called, so delegates may query the builder from callbacks.
#[derive(Debug)]
pub struct QuadTileBuilder {
    geometry: GeometryFlags,
    state: Mutex<BuilderState>,
}

impl QuadTileBuilder {
    pub fn new(geometry: GeometryFlags) -> Self {
        Self {
            geometry,
            state: Mutex::new(BuilderState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BuilderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn geometry(&self) -> GeometryFlags {
        self.geometry
    }

    /// Apply one view update.
    ///
    /// Unload candidates are first offered to `delegate`, which may keep
    /// some of them. The rest are removed, new tiles are created, enable
    /// state is recomputed and the whole batch is handed to
    /// `delegate.builder_load`. Returns the kept nodes.
    pub fn build_tiles(
        &self,
        delegate: &dyn QuadTileBuilderDelegate,
        update: &ViewUpdate,
        changes: &mut ChangeSet,
    ) -> NodeSet {
        let proposed: NodeSet = {
            let state = self.lock();
            update
                .unload_candidates
                .iter()
                .filter(|node| state.tiles.contains_key(node))
                .copied()
                .collect()
        };

        let kept: NodeSet = if proposed.is_empty() {
            NodeSet::new()
        } else {
            delegate
                .builder_unload_check(self, &update.to_load, &proposed, update.target_level)
                .intersection(&proposed)
                .copied()
                .collect()
        };

        let info = {
            let mut state = self.lock();
            let mut info = TileBuilderDelegateInfo {
                target_level: update.target_level,
                ..TileBuilderDelegateInfo::default()
            };

            for node in proposed.difference(&kept) {
                if let Some(tile) = state.tiles.remove(node) {
                    changes.extend(
                        tile.draw_ids
                            .iter()
                            .map(|&id| ChangeRequest::RemoveDrawable { id }),
                    );
                    info.unload_tiles.insert(*node);
                }
            }

            let mut created = NodeSet::new();
            for candidate in &update.to_load {
                if state.tiles.contains_key(&candidate.node) {
                    continue;
                }
                let tile =
                    self.create_tile(&mut state, candidate.node, candidate.importance, changes);
                state.tiles.insert(candidate.node, tile);
                created.insert(candidate.node);
            }

            let ancestors = state.loaded_ancestors();
            let enabled: Vec<(Node, bool)> = state
                .tiles
                .keys()
                .map(|node| (*node, !state.is_covered(&ancestors, *node)))
                .collect();
            for (node, enable) in enabled {
                let Some(tile) = state.tiles.get_mut(&node) else {
                    continue;
                };
                let was_enabled = tile.enabled;
                tile.enabled = enable;
                if created.contains(&node) {
                    info.load_tiles.push(tile.clone());
                } else if was_enabled != enable {
                    if enable {
                        info.enable_tiles.push(tile.clone());
                    } else {
                        info.disable_tiles.push(tile.clone());
                    }
                }
            }

            let target_changed = state.target_level != update.target_level;
            state.target_level = update.target_level;
            if target_changed || !info.is_empty() {
                state.sequence += 1;
                info.sequence = state.sequence;
                Some(info)
            } else {
                None
            }
        };

        if let Some(info) = info {
            trace!(
                loaded = info.load_tiles.len(),
                unloaded = info.unload_tiles.len(),
                kept = kept.len(),
                "built tiles"
            );
            delegate.builder_load(self, &info, changes);
        }
        kept
    }

    fn create_tile(
        &self,
        state: &mut BuilderState,
        node: Node,
        importance: f64,
        changes: &mut ChangeSet,
    ) -> LoadedTile {
        let mut draw_ids = Vec::new();
        if self.geometry.generate_geom {
            draw_ids.push(state.allocate_drawable());
            if self.geometry.edge_matching {
                draw_ids.push(state.allocate_drawable());
            }
            let last_row = Node::grid_size(node.level) - 1;
            if self.geometry.cover_poles && (node.y == 0 || node.y == last_row) {
                draw_ids.push(state.allocate_drawable());
            }
        }
        changes.extend(
            draw_ids
                .iter()
                .map(|&id| ChangeRequest::AddDrawable { id, node }),
        );

        state.next_generation += 1;
        LoadedTile {
            node,
            importance,
            draw_ids,
            enabled: false,
            generation: state.next_generation,
        }
    }

    /// The builder's current contents as a single "everything just loaded"
    /// batch, for consumers joining a running session.
    pub fn loading_state(&self) -> TileBuilderDelegateInfo {
        let state = self.lock();
        TileBuilderDelegateInfo {
            sequence: state.sequence,
            target_level: state.target_level,
            load_tiles: state.tiles.values().cloned().collect(),
            ..TileBuilderDelegateInfo::default()
        }
    }

    pub fn loaded_tiles(&self) -> Vec<LoadedTile> {
        self.lock().tiles.values().cloned().collect()
    }

    pub fn loaded_nodes(&self) -> NodeSet {
        self.lock().tiles.keys().copied().collect()
    }

    pub fn tile(&self, node: Node) -> Option<LoadedTile> {
        self.lock().tiles.get(&node).cloned()
    }

    /// Whether `node` is still loaded under the load that produced
    /// `generation`. Asynchronous fetches check this before delivering.
    pub fn is_current(&self, node: Node, generation: u64) -> bool {
        self.lock()
            .tiles
            .get(&node)
            .is_some_and(|tile| tile.generation == generation)
    }

    pub fn tile_count(&self) -> usize {
        self.lock().tiles.len()
    }

    pub fn target_level(&self) -> u32 {
        self.lock().target_level
    }

    /// Sequence number of the last batch handed out.
    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }

    /// Drop every tile, removing its drawables.
    pub fn shutdown(&self, changes: &mut ChangeSet) {
        let tiles = std::mem::take(&mut self.lock().tiles);
        for tile in tiles.into_values() {
            changes.extend(
                tile.draw_ids
                    .into_iter()
                    .map(|id| ChangeRequest::RemoveDrawable { id }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_quadtree::{ImportantNode, ImportantNodeSet};

    use crate::DelegateId;

    /// Keeps whatever it is told to keep and remembers the last batch.
    struct Recorder {
        id: DelegateId,
        keep: NodeSet,
        last: Mutex<Option<TileBuilderDelegateInfo>>,
    }

    impl Recorder {
        fn new(keep: NodeSet) -> Self {
            Self {
                id: DelegateId::next(),
                keep,
                last: Mutex::new(None),
            }
        }

        fn take(&self) -> Option<TileBuilderDelegateInfo> {
            self.last.lock().unwrap().take()
        }
    }

    impl QuadTileBuilderDelegate for Recorder {
        fn id(&self) -> DelegateId {
            self.id
        }

        fn builder_load(
            &self,
            _builder: &QuadTileBuilder,
            info: &TileBuilderDelegateInfo,
            _changes: &mut ChangeSet,
        ) {
            *self.last.lock().unwrap() = Some(info.clone());
        }

        fn builder_unload_check(
            &self,
            _builder: &QuadTileBuilder,
            _load_tiles: &ImportantNodeSet,
            unload_tiles: &NodeSet,
            _target_level: u32,
        ) -> NodeSet {
            unload_tiles.intersection(&self.keep).copied().collect()
        }
    }

    fn load(nodes: &[Node], unload: &[Node], target_level: u32) -> ViewUpdate {
        let to_load: ImportantNodeSet = nodes
            .iter()
            .map(|n| ImportantNode::new(*n, 1.0))
            .collect();
        ViewUpdate {
            target_level,
            nodes: to_load.clone(),
            to_load,
            unload_candidates: unload.iter().copied().collect(),
        }
    }

    fn surface_only() -> GeometryFlags {
        GeometryFlags {
            cover_poles: false,
            ..GeometryFlags::default()
        }
    }

    #[test]
    fn test_new_tiles_get_drawables_and_generations() {
        let builder = QuadTileBuilder::new(surface_only());
        let delegate = Recorder::new(NodeSet::new());
        let mut changes = ChangeSet::new();
        builder.build_tiles(&delegate, &load(&[Node::ROOT], &[], 0), &mut changes);

        assert_eq!(changes.len(), 1);
        assert!(matches!(
            changes.iter().next(),
            Some(ChangeRequest::AddDrawable { node, .. }) if *node == Node::ROOT
        ));
        let info = delegate.take().unwrap();
        assert_eq!(info.load_tiles.len(), 1);
        assert!(info.load_tiles[0].enabled);
        assert!(builder.is_current(Node::ROOT, info.load_tiles[0].generation));
    }

    #[test]
    fn test_unchanged_update_emits_no_batch() {
        let builder = QuadTileBuilder::new(surface_only());
        let delegate = Recorder::new(NodeSet::new());
        let mut changes = ChangeSet::new();
        builder.build_tiles(&delegate, &load(&[Node::ROOT], &[], 0), &mut changes);
        assert_eq!(delegate.take().unwrap().sequence, 1);

        builder.build_tiles(&delegate, &load(&[Node::ROOT], &[], 0), &mut changes);
        assert!(delegate.take().is_none());
        assert_eq!(builder.sequence(), 1);
        assert_eq!(builder.tile_count(), 1);
    }

    #[test]
    fn test_poles_and_skirts_add_drawables() {
        let builder = QuadTileBuilder::new(GeometryFlags {
            edge_matching: true,
            cover_poles: true,
            ..GeometryFlags::default()
        });
        let delegate = Recorder::new(NodeSet::new());
        let mut changes = ChangeSet::new();
        let interior = Node::new(2, 1, 1);
        let polar = Node::new(2, 1, 3);
        builder.build_tiles(&delegate, &load(&[interior, polar], &[], 2), &mut changes);
        assert_eq!(builder.tile(interior).unwrap().draw_ids.len(), 2);
        assert_eq!(builder.tile(polar).unwrap().draw_ids.len(), 3);
        assert_eq!(changes.len(), 5);
    }

    #[test]
    fn test_no_geometry_means_no_drawables() {
        let builder = QuadTileBuilder::new(GeometryFlags {
            generate_geom: false,
            ..GeometryFlags::default()
        });
        let delegate = Recorder::new(NodeSet::new());
        let mut changes = ChangeSet::new();
        builder.build_tiles(&delegate, &load(&[Node::ROOT], &[], 0), &mut changes);
        assert!(changes.is_empty());
        assert_eq!(builder.tile_count(), 1);
    }

    /// A parent whose four children are loaded is disabled.
    #[test]
    fn test_covered_parent_is_disabled() {
        let builder = QuadTileBuilder::new(surface_only());
        let delegate = Recorder::new(NodeSet::new());
        let mut changes = ChangeSet::new();
        builder.build_tiles(&delegate, &load(&[Node::ROOT], &[], 0), &mut changes);
        delegate.take();

        let children = Node::ROOT.children().unwrap();
        builder.build_tiles(&delegate, &load(&children[..3], &[], 1), &mut changes);
        assert!(builder.tile(Node::ROOT).unwrap().enabled);
        assert!(delegate.take().unwrap().disable_tiles.is_empty());

        builder.build_tiles(&delegate, &load(&children[3..], &[], 1), &mut changes);
        assert!(!builder.tile(Node::ROOT).unwrap().enabled);
        let info = delegate.take().unwrap();
        assert_eq!(info.disable_tiles.len(), 1);
        assert_eq!(info.disable_tiles[0].node, Node::ROOT);
    }

    /// Coverage counts grandchildren filling in for a missing child.
    #[test]
    fn test_coverage_through_deeper_levels() {
        let builder = QuadTileBuilder::new(surface_only());
        let delegate = Recorder::new(NodeSet::new());
        let mut changes = ChangeSet::new();
        let children = Node::ROOT.children().unwrap();
        let mut nodes = vec![Node::ROOT];
        nodes.extend_from_slice(&children[..3]);
        nodes.extend_from_slice(&children[3].children().unwrap());
        builder.build_tiles(&delegate, &load(&nodes, &[], 2), &mut changes);
        assert!(!builder.tile(Node::ROOT).unwrap().enabled);
        assert!(builder.tile(children[0]).unwrap().enabled);
    }

    #[test]
    fn test_vetoed_unloads_stay_loaded() {
        let builder = QuadTileBuilder::new(surface_only());
        let children = Node::ROOT.children().unwrap();
        let delegate = Recorder::new([children[0]].into_iter().collect());
        let mut changes = ChangeSet::new();
        builder.build_tiles(&delegate, &load(&children, &[], 1), &mut changes);

        let mut changes = ChangeSet::new();
        let kept = builder.build_tiles(&delegate, &load(&[], &children, 1), &mut changes);
        assert_eq!(kept, [children[0]].into_iter().collect());
        assert_eq!(builder.loaded_nodes(), kept);
        assert_eq!(changes.len(), 3, "three surfaces removed");
        assert_eq!(delegate.take().unwrap().unload_tiles.len(), 3);
    }

    #[test]
    fn test_reload_gets_new_generation() {
        let builder = QuadTileBuilder::new(surface_only());
        let delegate = Recorder::new(NodeSet::new());
        let mut changes = ChangeSet::new();
        builder.build_tiles(&delegate, &load(&[Node::ROOT], &[], 0), &mut changes);
        let first = builder.tile(Node::ROOT).unwrap().generation;
        builder.build_tiles(&delegate, &load(&[], &[Node::ROOT], 0), &mut changes);
        assert!(!builder.is_current(Node::ROOT, first));
        builder.build_tiles(&delegate, &load(&[Node::ROOT], &[], 0), &mut changes);
        let second = builder.tile(Node::ROOT).unwrap().generation;
        assert!(second > first);
        assert!(!builder.is_current(Node::ROOT, first));
        assert!(builder.is_current(Node::ROOT, second));
    }

    #[test]
    fn test_loading_state_and_shutdown() {
        let builder = QuadTileBuilder::new(surface_only());
        let delegate = Recorder::new(NodeSet::new());
        let mut changes = ChangeSet::new();
        let children = Node::ROOT.children().unwrap();
        builder.build_tiles(&delegate, &load(&children, &[], 1), &mut changes);
        let state = builder.loading_state();
        assert_eq!(state.load_tiles.len(), 4);
        assert_eq!(state.target_level, 1);
        assert_eq!(state.sequence, builder.sequence());
        assert!(state.unload_tiles.is_empty());

        let mut changes = ChangeSet::new();
        builder.shutdown(&mut changes);
        assert_eq!(changes.len(), 4);
        assert_eq!(builder.tile_count(), 0);
    }
}
