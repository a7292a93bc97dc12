/*!
This crate builds classification trees under a wall clock deadline. A tree is grown best first from a [`FeatureMatrix`](struct.FeatureMatrix.html), choosing at each node either a univariate threshold split or a multivariate hyperplane split, and stopping at the depth bound, when a node is pure, when the regularized gain of the best split is not positive, or when the deadline fires. A grown tree can then be simplified by [`merge_leaves`](fn.merge_leaves.html), which collapses the sibling leaves whose merge costs the fewest training misclassifications.

```
use ndarray::prelude::*;
use treesweep_tree::{FeatureMatrix, TrainOptions};

let features = arr2(&[[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]);
let matrix = FeatureMatrix::new(features, &[0, 0, 1, 1]).unwrap();
let options = TrainOptions { max_depth: 2, ..Default::default() };
let tree = treesweep_tree::train(&matrix, &options).unwrap();
assert_eq!(tree.n_leaves(), 2);
let tree = treesweep_tree::merge_leaves(&tree, 100.0).unwrap();
assert_eq!(tree.n_leaves(), 1);
```
*/

#![allow(clippy::tabs_in_doc_comments)]

use itertools::izip;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use std::time::Duration;

mod deadline;
mod error;
mod examples_index;
mod feature_matrix;
mod merge;
mod multivariate;
mod split;
mod train;

pub use self::deadline::Deadline;
pub use self::error::Error;
pub use self::feature_matrix::FeatureMatrix;
pub use self::merge::{merge_leaves, plan_merges, MergePlan, MergeStep};
pub use self::split::gini_impurity;
pub use self::train::train;

/// These are the options passed to [`train`](fn.train.html).
#[derive(Clone, Debug)]
pub struct TrainOptions {
	/// The build stops growing the tree after this many seconds. Nodes still open when the deadline fires become leaves. Must be positive.
	pub time_limit: f64,
	/// The regularization weight. A split is only made if its impurity reduction, as a fraction of the root's impurity, exceeds `lambd` times the per split complexity penalty.
	pub lambd: f64,
	/// The depth of the tree will never exceed this value. A value of zero produces a single leaf. Negative values are rejected.
	pub max_depth: i64,
	/// If true, nodes are split by hyperplanes over all features instead of thresholds on a single feature.
	pub multivariate: bool,
	/// A split is only valid if each child receives at least this many training instances.
	pub min_examples_per_child: usize,
	/// After coordinate descent converges, the multivariate search tries this many pseudo random directions.
	pub multivariate_random_directions: usize,
	/// Seeds the pseudo random directions of the multivariate search.
	pub seed: u64,
}

impl Default for TrainOptions {
	fn default() -> Self {
		Self {
			time_limit: 10.0,
			lambd: 0.0,
			max_depth: 3,
			multivariate: false,
			min_examples_per_child: 1,
			multivariate_random_directions: 4,
			seed: 0,
		}
	}
}

/// Trees are stored as a `Vec` of `Node`s with the root at index 0. Each branch holds the indexes of its two children.
#[derive(Clone, Debug)]
pub struct Tree {
	pub nodes: Vec<Node>,
	/// The original label of each class index.
	pub classes: Vec<i64>,
	pub n_features: usize,
	/// The depth bound the tree was built with.
	pub max_depth: usize,
	/// The regularization weight the tree was built with.
	pub lambd: f64,
	pub build_duration: Duration,
	/// True if the deadline fired before every node was expanded.
	pub truncated: bool,
}

/// A node is either a branch or a leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
	Branch(BranchNode),
	Leaf(LeafNode),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BranchNode {
	pub left_child_index: usize,
	pub right_child_index: usize,
	pub split: Split,
	/// The number of training instances of each class that reached this node. It is always the sum of the children's histograms.
	pub histogram: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeafNode {
	/// The class predicted for instances that reach this leaf, the majority class of `histogram`.
	pub class_index: usize,
	pub histogram: Vec<usize>,
}

/// A `Split` sends each instance to the left or right child.
#[derive(Clone, Debug, PartialEq)]
pub enum Split {
	Univariate(UnivariateSplit),
	Multivariate(MultivariateSplit),
}

/// An instance is sent left if `x[feature_index] <= threshold`.
#[derive(Clone, Debug, PartialEq)]
pub struct UnivariateSplit {
	pub feature_index: usize,
	pub threshold: f32,
}

/// An instance is sent left if the dot product of `weights` and its features is `<= threshold`. The weights are scaled so the largest has magnitude one.
#[derive(Clone, Debug, PartialEq)]
pub struct MultivariateSplit {
	pub weights: Vec<f64>,
	pub threshold: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SplitDirection {
	Left,
	Right,
}

impl Split {
	pub fn direction(&self, features: ArrayView1<f32>) -> SplitDirection {
		let left = match self {
			Split::Univariate(UnivariateSplit {
				feature_index,
				threshold,
			}) => features[*feature_index] <= *threshold,
			Split::Multivariate(MultivariateSplit { weights, threshold }) => {
				project(weights, features) <= *threshold
			}
		};
		if left {
			SplitDirection::Left
		} else {
			SplitDirection::Right
		}
	}
}

/// Compute the dot product of `weights` and `features` in `f64`.
pub(crate) fn project(weights: &[f64], features: ArrayView1<f32>) -> f64 {
	weights
		.iter()
		.zip(features.iter())
		.map(|(weight, value)| weight * value.to_f64().unwrap())
		.sum()
}

impl Node {
	pub fn histogram(&self) -> &[usize] {
		match self {
			Node::Branch(branch) => &branch.histogram,
			Node::Leaf(leaf) => &leaf.histogram,
		}
	}

	pub fn as_branch(&self) -> Option<&BranchNode> {
		match self {
			Node::Branch(branch) => Some(branch),
			Node::Leaf(_) => None,
		}
	}

	pub fn is_leaf(&self) -> bool {
		matches!(self, Node::Leaf(_))
	}

	/// Create a leaf predicting the majority class of `histogram`.
	pub fn leaf(histogram: Vec<usize>) -> Node {
		Node::Leaf(LeafNode {
			class_index: majority_class(&histogram),
			histogram,
		})
	}
}

/// Return the index of the largest count in `histogram`, preferring the lowest index on ties.
pub fn majority_class(histogram: &[usize]) -> usize {
	let mut best = 0;
	for (class_index, count) in histogram.iter().enumerate() {
		if *count > histogram[best] {
			best = class_index;
		}
	}
	best
}

impl Tree {
	/// Return the class index of the leaf `features` reaches.
	pub fn predict_class_index(&self, features: ArrayView1<f32>) -> usize {
		let mut node_index = 0;
		loop {
			match &self.nodes[node_index] {
				Node::Branch(BranchNode {
					left_child_index,
					right_child_index,
					split,
					..
				}) => {
					node_index = match split.direction(features) {
						SplitDirection::Left => *left_child_index,
						SplitDirection::Right => *right_child_index,
					};
				}
				Node::Leaf(LeafNode { class_index, .. }) => return *class_index,
			}
		}
	}

	/// Predict the original label for `features`.
	pub fn predict(&self, features: ArrayView1<f32>) -> i64 {
		self.classes[self.predict_class_index(features)]
	}

	pub fn n_leaves(&self) -> usize {
		self.nodes.iter().filter(|node| node.is_leaf()).count()
	}

	pub fn n_branches(&self) -> usize {
		self.nodes.len() - self.n_leaves()
	}

	/// The length of the longest path from the root to a leaf.
	pub fn depth(&self) -> usize {
		let mut depth = 0;
		let mut stack = vec![(0, 0)];
		while let Some((node_index, node_depth)) = stack.pop() {
			depth = depth.max(node_depth);
			if let Node::Branch(branch) = &self.nodes[node_index] {
				stack.push((branch.left_child_index, node_depth + 1));
				stack.push((branch.right_child_index, node_depth + 1));
			}
		}
		depth
	}

	/// For each node, the index of its parent. The root has none.
	pub fn parent_indices(&self) -> Vec<Option<usize>> {
		let mut parents = vec![None; self.nodes.len()];
		for (node_index, node) in self.nodes.iter().enumerate() {
			if let Node::Branch(branch) = node {
				parents[branch.left_child_index] = Some(node_index);
				parents[branch.right_child_index] = Some(node_index);
			}
		}
		parents
	}

	/**
	Check that this tree is well formed:

	1. Every node is reachable from the root exactly once and every child index is in bounds.
	2. No leaf is deeper than `max_depth`.
	3. Every branch's histogram is the sum of its children's histograms, so the leaves partition the root's instances.
	4. Every leaf predicts the majority class of its histogram.
	*/
	pub fn is_well_formed(&self) -> bool {
		if self.nodes.is_empty() {
			return false;
		}
		let n_classes = self.classes.len();
		let mut visited = vec![false; self.nodes.len()];
		let mut stack = vec![(0, 0)];
		while let Some((node_index, depth)) = stack.pop() {
			match self.nodes.get(node_index) {
				None => return false,
				Some(_) if visited[node_index] => return false,
				Some(Node::Leaf(leaf)) => {
					if depth > self.max_depth
						|| leaf.histogram.len() != n_classes
						|| leaf.class_index != majority_class(&leaf.histogram)
					{
						return false;
					}
				}
				Some(Node::Branch(branch)) => {
					let (left, right) = match (
						self.nodes.get(branch.left_child_index),
						self.nodes.get(branch.right_child_index),
					) {
						(Some(left), Some(right)) => (left, right),
						_ => return false,
					};
					let sums_match = branch.histogram.len() == n_classes
						&& izip!(&branch.histogram, left.histogram(), right.histogram())
							.all(|(total, left, right)| *total == left + right);
					if !sums_match || branch.left_child_index == branch.right_child_index {
						return false;
					}
					stack.push((branch.left_child_index, depth + 1));
					stack.push((branch.right_child_index, depth + 1));
				}
			}
			visited[node_index] = true;
		}
		visited.into_iter().all(|visited| visited)
	}

	/// Renumber the nodes in breadth first order starting at the root, dropping any node that is no longer reachable.
	pub(crate) fn compact(mut self) -> Tree {
		let mut order = vec![0];
		let mut links: Vec<Option<(usize, usize)>> = Vec::new();
		let mut position = 0;
		while position < order.len() {
			let node_index = order[position];
			if let Node::Branch(branch) = &self.nodes[node_index] {
				let left = order.len();
				order.push(branch.left_child_index);
				order.push(branch.right_child_index);
				links.push(Some((left, left + 1)));
			} else {
				links.push(None);
			}
			position += 1;
		}
		let mut old_nodes: Vec<Option<Node>> = self.nodes.drain(..).map(Some).collect();
		self.nodes = order
			.into_iter()
			.zip(links)
			.filter_map(|(node_index, link)| {
				let mut node = old_nodes[node_index].take()?;
				if let (Node::Branch(branch), Some((left, right))) = (&mut node, link) {
					branch.left_child_index = left;
					branch.right_child_index = right;
				}
				Some(node)
			})
			.collect();
		self
	}
}

impl std::fmt::Display for Tree {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut stack = vec![(0, 0, "")];
		while let Some((node_index, depth, prefix)) = stack.pop() {
			let indent = "  ".repeat(depth);
			match &self.nodes[node_index] {
				Node::Branch(branch) => {
					match &branch.split {
						Split::Univariate(split) => writeln!(
							f,
							"{}{}x[{}] <= {}",
							indent, prefix, split.feature_index, split.threshold
						)?,
						Split::Multivariate(split) => {
							let terms: Vec<String> = split
								.weights
								.iter()
								.enumerate()
								.filter(|(_, weight)| **weight != 0.0)
								.map(|(feature_index, weight)| {
									format!("{:.4}*x[{}]", weight, feature_index)
								})
								.collect();
							writeln!(
								f,
								"{}{}{} <= {:.4}",
								indent,
								prefix,
								terms.join(" + "),
								split.threshold
							)?
						}
					}
					stack.push((branch.right_child_index, depth + 1, "no: "));
					stack.push((branch.left_child_index, depth + 1, "yes: "));
				}
				Node::Leaf(leaf) => writeln!(
					f,
					"{}{}class {} {:?}",
					indent, prefix, self.classes[leaf.class_index], leaf.histogram
				)?,
			}
		}
		Ok(())
	}
}

#[cfg(test)]
fn stump() -> Tree {
	Tree {
		nodes: vec![
			Node::Branch(BranchNode {
				left_child_index: 2,
				right_child_index: 1,
				split: Split::Univariate(UnivariateSplit {
					feature_index: 0,
					threshold: 0.5,
				}),
				histogram: vec![2, 3],
			}),
			Node::leaf(vec![0, 3]),
			Node::leaf(vec![2, 0]),
		],
		classes: vec![-1, 1],
		n_features: 1,
		max_depth: 1,
		lambd: 0.0,
		build_duration: Duration::from_secs(0),
		truncated: false,
	}
}

#[test]
fn test_predict() {
	let tree = stump();
	assert_eq!(tree.predict(arr1(&[0.25]).view()), -1);
	assert_eq!(tree.predict(arr1(&[0.5]).view()), -1);
	assert_eq!(tree.predict(arr1(&[0.75]).view()), 1);
}

#[test]
fn test_compact_renumbers_breadth_first() {
	let tree = stump().compact();
	assert!(tree.is_well_formed());
	assert_eq!(tree.nodes[1], Node::leaf(vec![2, 0]));
	assert_eq!(tree.nodes[2], Node::leaf(vec![0, 3]));
	assert_eq!(tree.predict(arr1(&[0.25]).view()), -1);
}

#[test]
fn test_is_well_formed_rejects_bad_histograms() {
	let mut tree = stump();
	assert!(tree.is_well_formed());
	tree.nodes[1] = Node::leaf(vec![0, 2]);
	assert!(!tree.is_well_formed());
}

#[test]
fn test_majority_class_ties() {
	assert_eq!(majority_class(&[2, 2, 1]), 0);
	assert_eq!(majority_class(&[0, 1, 1]), 1);
	assert_eq!(majority_class(&[0, 0]), 0);
}

#[test]
fn test_display() {
	insta::assert_display_snapshot!(stump(), @r###"
 x[0] <= 0.5
   yes: class -1 [2, 0]
   no: class 1 [0, 3]
 "###);
}
