//! Trajectory construction: tree doubling and candidate selection.

pub mod sampler;
pub mod tree;

pub use sampler::TrajectorySampler;
pub use tree::{build_tree, cross_tree_terminated, Direction, TreeNode};
