//! Session LOD state: which nodes should be resident for the current view.

use terra_quadtree::{ImportantNodeSet, NodeEvaluator, NodeSet, QuadTree};
use tracing::trace;

use crate::SamplingParams;

/// Outcome of evaluating one view, before the builder acts on it.
#[derive(Clone, Debug, Default)]
pub struct ViewUpdate {
    /// Chosen level (single-level) or deepest accepted level.
    pub target_level: u32,
    /// Every node the view wants resident.
    pub nodes: ImportantNodeSet,
    /// Wanted nodes that are not resident yet.
    pub to_load: ImportantNodeSet,
    /// Resident nodes the view no longer wants.
    pub unload_candidates: NodeSet,
}

/// Drives a [`QuadTree`] with the session's thresholds and tracks the
/// resident node set between updates.
#[derive(Debug)]
pub struct QuadDisplayController {
    tree: QuadTree,
    min_importance: Vec<f64>,
    max_tiles: usize,
    single_level: bool,
    level_loads: Vec<i32>,
    resident: NodeSet,
    target_level: u32,
    max_rejected_importance: Vec<f64>,
}

impl QuadDisplayController {
    pub fn new(params: &SamplingParams) -> Self {
        let tree = QuadTree::new(params.coord_sys.bounds(), params.min_zoom, params.max_zoom);
        Self {
            max_rejected_importance: vec![0.0; params.max_zoom as usize + 1],
            target_level: params.min_zoom,
            tree,
            min_importance: params.min_importance_per_level(),
            max_tiles: params.max_tiles,
            single_level: params.single_level,
            level_loads: params.level_loads.clone(),
            resident: NodeSet::new(),
        }
    }

    /// Score the view and diff the wanted nodes against the resident set.
    ///
    /// Nothing is committed; call [`commit`](Self::commit) once the builder
    /// has decided which unloads actually happen.
    pub fn evaluate(
        &mut self,
        evaluator: &mut dyn NodeEvaluator,
        keep_min_level: bool,
    ) -> ViewUpdate {
        let (target_level, nodes) = if self.single_level {
            let coverage = self.tree.calc_coverage_visible(
                evaluator,
                &self.min_importance,
                self.max_tiles,
                &self.level_loads,
                keep_min_level,
            );
            self.max_rejected_importance = coverage.max_rejected_importance;
            (coverage.level, coverage.nodes)
        } else {
            let coverage = self.tree.calc_coverage_importance(
                evaluator,
                &self.min_importance,
                self.max_tiles,
                true,
            );
            self.max_rejected_importance = coverage.max_rejected_importance;
            let deepest = coverage
                .nodes
                .iter()
                .map(|n| n.node.level)
                .max()
                .unwrap_or(self.tree.min_level());
            (deepest, coverage.nodes)
        };

        let wanted: NodeSet = nodes.iter().map(|n| n.node).collect();
        let to_load = nodes
            .iter()
            .filter(|n| !self.resident.contains(&n.node))
            .copied()
            .collect();
        let unload_candidates = self.resident.difference(&wanted).copied().collect();

        trace!(target_level, wanted = wanted.len(), "evaluated view");
        ViewUpdate {
            target_level,
            nodes,
            to_load,
            unload_candidates,
        }
    }

    /// Make `update` the resident state. `kept` holds the unload candidates
    /// a consumer vetoed; they stay resident and are proposed again next time.
    pub fn commit(&mut self, update: &ViewUpdate, kept: &NodeSet) {
        let mut resident: NodeSet = update.nodes.iter().map(|n| n.node).collect();
        resident.extend(kept.intersection(&update.unload_candidates).copied());
        self.resident = resident;
        self.target_level = update.target_level;
    }

    pub fn resident(&self) -> &NodeSet {
        &self.resident
    }

    pub fn target_level(&self) -> u32 {
        self.target_level
    }

    /// Per-level largest `importance / threshold` among rejected nodes of
    /// the last evaluation.
    pub fn max_rejected_importance(&self) -> &[f64] {
        &self.max_rejected_importance
    }

    pub fn min_importance_per_level(&self) -> &[f64] {
        &self.min_importance
    }

    pub fn tree(&self) -> &QuadTree {
        &self.tree
    }
}
