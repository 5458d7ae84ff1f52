//! Importance- and visibility-driven coverage of the quadtree pyramid.

use std::collections::BTreeSet;

use glam::DVec2;

use crate::{ImportantNode, ImportantNodeSet, MAX_LEVEL, Mbr, Node, NodeSet};

/// Scores nodes for a coverage pass.
///
/// The tree calls back once per candidate node, handing over the node's
/// bounds so the implementation never has to recompute them.
pub trait NodeEvaluator {
    /// Non-negative importance of `node`. Typically its projected pixel area.
    fn importance(&mut self, node: Node, mbr: &Mbr) -> f64;

    /// Whether `node` can be seen at all.
    fn visible(&mut self, _node: Node, _mbr: &Mbr) -> bool {
        true
    }
}

/// [`NodeEvaluator`] backed by a pair of closures. See [`evaluator_fn`].
pub struct FnEvaluator<I, V> {
    importance: I,
    visible: V,
}

/// Build a [`NodeEvaluator`] from an importance closure and a visibility closure.
pub fn evaluator_fn<I, V>(importance: I, visible: V) -> FnEvaluator<I, V>
where
    I: FnMut(Node, &Mbr) -> f64,
    V: FnMut(Node, &Mbr) -> bool,
{
    FnEvaluator {
        importance,
        visible,
    }
}

impl<I, V> NodeEvaluator for FnEvaluator<I, V>
where
    I: FnMut(Node, &Mbr) -> f64,
    V: FnMut(Node, &Mbr) -> bool,
{
    fn importance(&mut self, node: Node, mbr: &Mbr) -> f64 {
        (self.importance)(node, mbr)
    }

    fn visible(&mut self, node: Node, mbr: &Mbr) -> bool {
        (self.visible)(node, mbr)
    }
}

/// Result of [`QuadTree::calc_coverage_importance`].
#[derive(Clone, Debug, Default)]
pub struct Coverage {
    /// Accepted nodes, most important first.
    pub nodes: ImportantNodeSet,
    /// Per level, the largest `importance / threshold` ratio among rejected
    /// nodes. Indexed by level; 0 where nothing was rejected.
    pub max_rejected_importance: Vec<f64>,
}

/// Result of [`QuadTree::calc_coverage_visible`].
#[derive(Clone, Debug, Default)]
pub struct VisibleCoverage {
    /// The resolution level that fit the budget.
    pub level: u32,
    /// Visible nodes at the loaded levels, most important first.
    pub nodes: ImportantNodeSet,
    /// Same diagnostics as [`Coverage::max_rejected_importance`].
    pub max_rejected_importance: Vec<f64>,
}

/// Level-of-detail evaluator over a fixed root rectangle and level range.
///
/// The tree is immutable once built; every evaluation is a pure function of
/// the supplied thresholds, budget and [`NodeEvaluator`].
#[derive(Clone, Debug)]
pub struct QuadTree {
    mbr: Mbr,
    min_level: u32,
    max_level: u32,
}

impl QuadTree {
    /// Create a tree covering `mbr` and evaluating levels `min_level..=max_level`.
    ///
    /// # Panics
    ///
    /// Panics if `min_level > max_level` or `max_level` exceeds [`MAX_LEVEL`].
    pub fn new(mbr: Mbr, min_level: u32, max_level: u32) -> Self {
        assert!(
            min_level <= max_level,
            "min_level {min_level} must not exceed max_level {max_level}"
        );
        assert!(
            max_level <= MAX_LEVEL,
            "max_level {max_level} exceeds MAX_LEVEL {MAX_LEVEL}"
        );
        Self {
            mbr,
            min_level,
            max_level,
        }
    }

    pub fn mbr(&self) -> &Mbr {
        &self.mbr
    }

    pub fn min_level(&self) -> u32 {
        self.min_level
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Bounds of `node`, found by bisecting the root `node.level` times.
    pub fn generate_mbr_for_node(&self, node: Node) -> Mbr {
        let size = Node::grid_size(node.level) as f64;
        let span = self.mbr.span();
        let ll = DVec2::new(node.x as f64, node.y as f64) / size;
        let ur = DVec2::new((node.x + 1) as f64, (node.y + 1) as f64) / size;
        Mbr {
            ll: self.mbr.ll + span * ll,
            ur: self.mbr.ll + span * ur,
        }
    }

    /// Pick the most important nodes at any depth, up to `max_nodes`.
    ///
    /// Every node of `min_level` is evaluated, then each branch descends until
    /// a node falls below its level's threshold in `min_importance`. Accepted
    /// candidates are taken in importance order. With `sibling_nodes`, taking
    /// a node strictly between the min and max level also takes its three
    /// siblings, so the result may hold up to `max_nodes + 3` entries.
    pub fn calc_coverage_importance(
        &self,
        evaluator: &mut dyn NodeEvaluator,
        min_importance: &[f64],
        max_nodes: usize,
        sibling_nodes: bool,
    ) -> Coverage {
        let mut max_rejected = vec![0.0; self.max_level as usize + 1];
        let candidates = self.scan_importance(evaluator, min_importance, &mut max_rejected);

        let mut accepted = NodeSet::new();
        let mut nodes = ImportantNodeSet::new();
        for candidate in &candidates {
            if accepted.len() >= max_nodes {
                break;
            }
            let level = candidate.node.level;
            if rejects(candidate.importance, threshold_for(min_importance, level)) {
                break;
            }
            if accepted.insert(candidate.node) {
                nodes.insert(*candidate);
            }

            if sibling_nodes && level > self.min_level && level < self.max_level {
                // A sibling accepted earlier keeps its own score.
                for sibling in candidate.node.siblings() {
                    if accepted.insert(sibling) {
                        nodes.insert(ImportantNode::new(sibling, candidate.importance));
                    }
                }
            }
        }

        Coverage {
            nodes,
            max_rejected_importance: max_rejected,
        }
    }

    /// Pick a single resolution level (plus any extra `level_loads`) whose
    /// visible nodes fit in `max_nodes`.
    ///
    /// The target level is the deepest level the importance pass reaches.
    /// Levels are tried from the target downwards until one fits; the
    /// result never exceeds `max_nodes`. Negative `level_loads` entries are
    /// offsets from the target level.
    pub fn calc_coverage_visible(
        &self,
        evaluator: &mut dyn NodeEvaluator,
        min_importance: &[f64],
        max_nodes: usize,
        level_loads: &[i32],
        keep_min_level: bool,
    ) -> VisibleCoverage {
        let mut max_rejected = vec![0.0; self.max_level as usize + 1];
        let candidates = self.scan_importance(evaluator, min_importance, &mut max_rejected);

        let target_level = candidates
            .iter()
            .map(|n| n.node.level)
            .max()
            .unwrap_or(self.min_level);

        for chosen_level in (self.min_level..=target_level).rev() {
            let levels =
                self.levels_to_load(chosen_level, target_level, level_loads, keep_min_level);
            let mut visible = ImportantNodeSet::new();
            let mut pass = VisiblePass {
                evaluator: &mut *evaluator,
                min_importance,
                levels: &levels,
                chosen_level,
                max_nodes,
                visible: &mut visible,
            };
            let fits = self
                .min_level_nodes()
                .all(|node| self.eval_node_visible(&mut pass, node));
            if fits {
                return VisibleCoverage {
                    level: chosen_level,
                    nodes: visible,
                    max_rejected_importance: max_rejected,
                };
            }
        }

        VisibleCoverage {
            level: self.min_level,
            nodes: ImportantNodeSet::new(),
            max_rejected_importance: max_rejected,
        }
    }

    fn min_level_nodes(&self) -> impl Iterator<Item = Node> + use<> {
        let level = self.min_level;
        let size = Node::grid_size(level);
        (0..size).flat_map(move |y| (0..size).map(move |x| Node { level, x, y }))
    }

    /// Evaluate every branch from the min level down, returning all nodes
    /// that passed their level's threshold.
    fn scan_importance(
        &self,
        evaluator: &mut dyn NodeEvaluator,
        min_importance: &[f64],
        max_rejected: &mut [f64],
    ) -> ImportantNodeSet {
        let mut candidates = ImportantNodeSet::new();
        for node in self.min_level_nodes() {
            self.eval_node_importance(
                evaluator,
                node,
                min_importance,
                &mut candidates,
                max_rejected,
            );
        }
        candidates
    }

    fn eval_node_importance(
        &self,
        evaluator: &mut dyn NodeEvaluator,
        node: Node,
        min_importance: &[f64],
        candidates: &mut ImportantNodeSet,
        max_rejected: &mut [f64],
    ) {
        let mbr = self.generate_mbr_for_node(node);
        let importance = evaluator.importance(node, &mbr);
        let threshold = threshold_for(min_importance, node.level);
        if rejects(importance, threshold) {
            if threshold > 0.0 {
                let slot = &mut max_rejected[node.level as usize];
                *slot = slot.max(importance / threshold);
            }
            return;
        }

        candidates.insert(ImportantNode::new(node, importance));

        if node.level < self.max_level
            && let Some(children) = node.children()
        {
            for child in children {
                self.eval_node_importance(
                    evaluator,
                    child,
                    min_importance,
                    candidates,
                    max_rejected,
                );
            }
        }
    }

    /// Returns false once the visible set outgrows the budget.
    ///
    /// Below the min level a branch ends only where the evaluator scores
    /// exactly 0, so tiles under their level's threshold still get covered
    /// at the chosen level.
    fn eval_node_visible(&self, pass: &mut VisiblePass<'_>, node: Node) -> bool {
        let mbr = self.generate_mbr_for_node(node);
        let importance = pass.evaluator.importance(node, &mbr);
        if node.level == self.min_level {
            if rejects(importance, threshold_for(pass.min_importance, node.level)) {
                return true;
            }
        } else if importance == 0.0 {
            return true;
        }

        if !pass.evaluator.visible(node, &mbr) {
            return true;
        }

        if pass.levels.contains(&node.level) {
            pass.visible.insert(ImportantNode::new(node, importance));
            if pass.visible.len() > pass.max_nodes {
                return false;
            }
        }

        if node.level < pass.chosen_level
            && let Some(children) = node.children()
        {
            for child in children {
                if !self.eval_node_visible(pass, child) {
                    return false;
                }
            }
        }
        true
    }

    fn levels_to_load(
        &self,
        chosen_level: u32,
        target_level: u32,
        level_loads: &[i32],
        keep_min_level: bool,
    ) -> BTreeSet<u32> {
        let mut levels = BTreeSet::from([chosen_level]);
        if keep_min_level {
            levels.insert(self.min_level);
        }
        if self.max_level > 0 {
            let upper = i64::from(self.max_level) - 1;
            for &entry in level_loads {
                let level = if entry < 0 {
                    i64::from(target_level) + i64::from(entry)
                } else {
                    i64::from(entry)
                };
                levels.insert(level.clamp(0, upper) as u32);
            }
        }
        levels
    }
}

/// Per-level state threaded through one visibility traversal.
struct VisiblePass<'a> {
    evaluator: &'a mut dyn NodeEvaluator,
    min_importance: &'a [f64],
    levels: &'a BTreeSet<u32>,
    chosen_level: u32,
    max_nodes: usize,
    visible: &'a mut ImportantNodeSet,
}

/// Threshold for `level`, repeating the last entry past the end of the table.
fn threshold_for(min_importance: &[f64], level: u32) -> f64 {
    min_importance
        .get(level as usize)
        .or(min_importance.last())
        .copied()
        .unwrap_or(0.0)
}

/// An infinite threshold never rejects: it forces the level to load.
fn rejects(importance: f64, threshold: f64) -> bool {
    threshold.is_finite() && importance < threshold
}
