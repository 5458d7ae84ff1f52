//! Quadtree node model and level-of-detail coverage evaluation.
//!
//! A [`QuadTree`] never stores nodes. Tiles are addressed by value
//! ([`Node`]), their bounds are derived on demand from the root [`Mbr`],
//! and every evaluation produces a fresh node set scored by a caller
//! supplied [`NodeEvaluator`].

mod coverage;
mod mbr;
mod node;

pub use coverage::{Coverage, FnEvaluator, NodeEvaluator, QuadTree, VisibleCoverage, evaluator_fn};
pub use mbr::Mbr;
pub use node::{ImportantNode, ImportantNodeSet, MAX_LEVEL, Node, NodeSet};
