use crate::{Error, Node, Tree};
use num_traits::ToPrimitive;
use std::{cmp::Reverse, collections::BinaryHeap};

/// One merge: the branch at `node_index`, whose children are both leaves when the merge is applied, becomes a single leaf.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeStep {
	pub node_index: usize,
	/// The number of additional training instances the merged leaf misclassifies.
	pub cost: usize,
}

/// The merges to perform on a tree, in the order they are applied.
#[derive(Clone, Debug, PartialEq)]
pub struct MergePlan {
	pub n_leaves_before: usize,
	pub steps: Vec<MergeStep>,
}

/**
Plan which sibling leaves to merge.

Every branch whose children are both leaves is a candidate, with a cost equal to the increase in training misclassifications if its two leaves were replaced by one leaf predicting the majority of their combined histogram. The cheapest candidate is merged first, ties going to the lowest node index. Merging can turn the parent into a candidate, which then competes with the rest. The number of merges is `merge_percentage` percent of the leaves in the tree, rounded down, or fewer if the tree runs out of candidates.
*/
pub fn plan_merges(tree: &Tree, merge_percentage: f64) -> Result<MergePlan, Error> {
	if !(0.0..=100.0).contains(&merge_percentage) {
		return Err(Error::InvalidPercentage(merge_percentage));
	}
	let n_leaves_before = tree.n_leaves();
	let n_merges = (merge_percentage / 100.0 * n_leaves_before.to_f64().unwrap())
		.floor()
		.to_usize()
		.unwrap_or(0);
	let parents = tree.parent_indices();
	let mut is_leaf: Vec<bool> = tree.nodes.iter().map(|node| node.is_leaf()).collect();
	let mut queue: BinaryHeap<Reverse<(usize, usize)>> = tree
		.nodes
		.iter()
		.enumerate()
		.filter(|(node_index, _)| has_leaf_children(tree, &is_leaf, *node_index))
		.map(|(node_index, _)| Reverse((merge_cost(tree, node_index), node_index)))
		.collect();
	let mut steps = Vec::new();
	while steps.len() < n_merges {
		let Reverse((cost, node_index)) = match queue.pop() {
			Some(item) => item,
			None => break,
		};
		steps.push(MergeStep { node_index, cost });
		is_leaf[node_index] = true;
		if let Some(parent_index) = parents[node_index] {
			if has_leaf_children(tree, &is_leaf, parent_index) {
				queue.push(Reverse((merge_cost(tree, parent_index), parent_index)));
			}
		}
	}
	Ok(MergePlan {
		n_leaves_before,
		steps,
	})
}

impl MergePlan {
	/// Apply the plan to the tree it was planned for. The input is left untouched and the result is compacted. An empty plan returns an identical copy.
	pub fn apply(&self, tree: &Tree) -> Tree {
		let mut merged = tree.clone();
		if self.steps.is_empty() {
			return merged;
		}
		for step in self.steps.iter() {
			if let Node::Branch(branch) = &merged.nodes[step.node_index] {
				let histogram = branch.histogram.clone();
				merged.nodes[step.node_index] = Node::leaf(histogram);
			}
		}
		merged.compact()
	}
}

/// Merge the cheapest `merge_percentage` percent of the tree's leaves. See [`plan_merges`](fn.plan_merges.html).
pub fn merge_leaves(tree: &Tree, merge_percentage: f64) -> Result<Tree, Error> {
	let plan = plan_merges(tree, merge_percentage)?;
	let merged = plan.apply(tree);
	tracing::debug!(
		merge_percentage,
		n_leaves_before = plan.n_leaves_before,
		n_leaves_after = merged.n_leaves(),
		total_cost = plan.steps.iter().map(|step| step.cost).sum::<usize>(),
		"merged leaves"
	);
	Ok(merged)
}

fn has_leaf_children(tree: &Tree, is_leaf: &[bool], node_index: usize) -> bool {
	match &tree.nodes[node_index] {
		Node::Branch(branch) if !is_leaf[node_index] => {
			is_leaf[branch.left_child_index] && is_leaf[branch.right_child_index]
		}
		_ => false,
	}
}

/// The number of instances in `histogram` that are not of its majority class.
fn misclassifications(histogram: &[usize]) -> usize {
	let total: usize = histogram.iter().sum();
	total - histogram.iter().max().copied().unwrap_or(0)
}

fn merge_cost(tree: &Tree, node_index: usize) -> usize {
	match &tree.nodes[node_index] {
		Node::Branch(branch) => misclassifications(&branch.histogram).saturating_sub(
			misclassifications(tree.nodes[branch.left_child_index].histogram())
				+ misclassifications(tree.nodes[branch.right_child_index].histogram()),
		),
		Node::Leaf(_) => 0,
	}
}

#[cfg(test)]
use crate::{BranchNode, Split, UnivariateSplit};

#[cfg(test)]
fn branch(left_child_index: usize, right_child_index: usize, histogram: Vec<usize>) -> Node {
	Node::Branch(BranchNode {
		left_child_index,
		right_child_index,
		split: Split::Univariate(UnivariateSplit {
			feature_index: 0,
			threshold: 0.0,
		}),
		histogram,
	})
}

#[cfg(test)]
fn two_level_tree() -> Tree {
	Tree {
		nodes: vec![
			branch(1, 2, vec![6, 1]),
			branch(3, 4, vec![3, 1]),
			branch(5, 6, vec![3, 0]),
			Node::leaf(vec![3, 0]),
			Node::leaf(vec![0, 1]),
			Node::leaf(vec![2, 0]),
			Node::leaf(vec![1, 0]),
		],
		classes: vec![0, 1],
		n_features: 1,
		max_depth: 2,
		lambd: 0.0,
		build_duration: std::time::Duration::from_secs(0),
		truncated: false,
	}
}

#[test]
fn test_plan_orders_by_cost_and_cascades() {
	let tree = two_level_tree();
	let plan = plan_merges(&tree, 75.0).unwrap();
	assert_eq!(
		plan,
		MergePlan {
			n_leaves_before: 4,
			steps: vec![
				MergeStep {
					node_index: 2,
					cost: 0
				},
				MergeStep {
					node_index: 1,
					cost: 1
				},
				MergeStep {
					node_index: 0,
					cost: 0
				},
			],
		}
	);
	let merged = plan.apply(&tree);
	assert_eq!(merged.nodes, vec![Node::leaf(vec![6, 1])]);
}

#[test]
fn test_merge_count_rounds_down() {
	let tree = two_level_tree();
	// 30% of 4 leaves is 1.2 merges.
	let merged = merge_leaves(&tree, 30.0).unwrap();
	assert!(merged.is_well_formed());
	assert_eq!(merged.n_leaves(), 3);
	assert_eq!(merged.nodes[2], Node::leaf(vec![3, 0]));
	// 20% of 4 leaves is 0.8 merges.
	let merged = merge_leaves(&tree, 20.0).unwrap();
	assert_eq!(merged.nodes, tree.nodes);
}

#[test]
fn test_zero_percent_is_identity_and_idempotent() {
	let tree = two_level_tree();
	let once = merge_leaves(&tree, 0.0).unwrap();
	let twice = merge_leaves(&once, 0.0).unwrap();
	assert_eq!(once.nodes, tree.nodes);
	assert_eq!(twice.nodes, once.nodes);
}

#[test]
fn test_input_tree_is_not_mutated() {
	let tree = two_level_tree();
	let before = tree.nodes.clone();
	let merged = merge_leaves(&tree, 100.0).unwrap();
	assert_eq!(tree.nodes, before);
	assert_eq!(merged.n_leaves(), 1);
}

#[test]
fn test_full_merge_of_built_tree() {
	use crate::{train, FeatureMatrix, TrainOptions};
	use ndarray::prelude::*;
	let mut features = Vec::new();
	let mut labels = Vec::new();
	for i in 0..6 {
		for j in 0..6 {
			features.push([i as f32, j as f32]);
			labels.push(((i / 2 + j / 3) % 3) as i64);
		}
	}
	let matrix = FeatureMatrix::new(arr2(features.as_slice()), &labels).unwrap();
	let options = TrainOptions {
		max_depth: 4,
		..Default::default()
	};
	let tree = train(&matrix, &options).unwrap();
	let n_leaves = tree.n_leaves();
	assert!(n_leaves > 1);
	for merge_percentage in [10.0, 50.0, 90.0].iter() {
		let merged = merge_leaves(&tree, *merge_percentage).unwrap();
		let n_merges = (merge_percentage / 100.0 * n_leaves as f64).floor() as usize;
		assert!(merged.is_well_formed());
		assert!(merged.depth() <= tree.depth());
		assert_eq!(merged.n_leaves(), n_leaves - n_merges.min(n_leaves - 1));
	}
	let merged = merge_leaves(&tree, 100.0).unwrap();
	assert!(merged.n_leaves() < n_leaves);
	assert_eq!(merged.nodes.len(), 1);
}

#[test]
fn test_invalid_percentage() {
	let tree = two_level_tree();
	for merge_percentage in [-1.0, 100.5, f64::NAN].iter() {
		assert!(matches!(
			merge_leaves(&tree, *merge_percentage),
			Err(Error::InvalidPercentage(_))
		));
	}
}
