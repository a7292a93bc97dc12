use crate::{
	examples_index::rearrange_examples_index,
	split::{choose_best_split, gini_impurity, is_pure, SplitContext},
	BranchNode, Deadline, Error, FeatureMatrix, Node, Split, TrainOptions, Tree,
};
use num_traits::ToPrimitive;
use std::{cmp::Ordering, collections::BinaryHeap, ops::Range};
use treesweep_util::finite::{Finite, ToFinite};

/// A split must remove at least `lambd` times this fraction of the root's impurity to be made.
pub const COMPLEXITY_PENALTY: f64 = 0.01;

/// An open node waiting in the queue to be split.
struct QueueItem {
	/// Items in the priority queue are ordered by the regularized gain of their split.
	gain: Finite<f64>,
	/// Among equal gains, the node that was opened first is split first.
	sequence: usize,
	/// The index of the node in the tree. It holds a provisional leaf until the split is made.
	node_index: usize,
	depth: usize,
	split: Split,
	/// The examples index is already rearranged so that these ranges hold the left and right children's instances.
	left_examples_index_range: Range<usize>,
	right_examples_index_range: Range<usize>,
	left_histogram: Vec<usize>,
	right_histogram: Vec<usize>,
	histogram: Vec<usize>,
}

impl PartialEq for QueueItem {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for QueueItem {
	fn cmp(&self, other: &Self) -> Ordering {
		self.gain
			.cmp(&other.gain)
			.then_with(|| other.sequence.cmp(&self.sequence))
	}
}

/**
Build a classification tree.

The tree is grown best first: every node is created as a leaf, and a node whose best split has positive regularized gain is queued. The queued node with the highest gain is split next, and its children are created as leaves and considered in turn. Because every open node is already a leaf, the tree is complete at every moment. When the deadline fires, the split that was popped last is still made, since its partition is already computed, and the build returns the tree with `truncated` set.

A node stays a leaf if its depth is `max_depth`, it is pure, it has fewer than `2 * min_examples_per_child` instances, no split reduces its impurity, the regularized gain of its best split is not positive, or the deadline has been reached. The regularized gain of a split is its impurity reduction as a fraction of the root's impurity minus `lambd * COMPLEXITY_PENALTY`.
*/
pub fn train(matrix: &FeatureMatrix, options: &TrainOptions) -> Result<Tree, Error> {
	if matrix.n_rows() == 0 {
		return Err(Error::EmptyDataset);
	}
	let max_depth = options
		.max_depth
		.to_usize()
		.ok_or(Error::InvalidDepthBound(options.max_depth))?;
	if !(options.time_limit > 0.0) || !options.time_limit.is_finite() {
		return Err(Error::InvalidTimeLimit(options.time_limit));
	}
	if !(options.lambd >= 0.0) || !options.lambd.is_finite() {
		return Err(Error::InvalidRegularization(options.lambd));
	}
	let deadline = Deadline::from_secs_f64(options.time_limit);
	let mut builder = Builder {
		matrix,
		options,
		deadline: &deadline,
		max_depth,
		root_impurity: 0.0,
		examples_index: (0..matrix.n_rows()).collect(),
		nodes: Vec::new(),
		queue: BinaryHeap::new(),
		sequence: 0,
		truncated: false,
	};
	let root_histogram = matrix.class_histogram(&builder.examples_index);
	builder.root_impurity = gini_impurity(&root_histogram);
	builder.nodes.push(Node::leaf(root_histogram.clone()));
	builder.open(0, 0, 0..matrix.n_rows(), root_histogram);

	while let Some(queue_item) = builder.queue.pop() {
		let deadline_reached = deadline.is_reached();
		let left_child_index = builder.nodes.len();
		let right_child_index = left_child_index + 1;
		builder
			.nodes
			.push(Node::leaf(queue_item.left_histogram.clone()));
		builder
			.nodes
			.push(Node::leaf(queue_item.right_histogram.clone()));
		builder.nodes[queue_item.node_index] = Node::Branch(BranchNode {
			left_child_index,
			right_child_index,
			split: queue_item.split,
			histogram: queue_item.histogram,
		});
		if deadline_reached {
			// The popped split was already computed, so it is kept. Its children and the remaining queued nodes stay leaves.
			builder.truncated = true;
			break;
		}
		builder.open(
			left_child_index,
			queue_item.depth + 1,
			queue_item.left_examples_index_range,
			queue_item.left_histogram,
		);
		builder.open(
			right_child_index,
			queue_item.depth + 1,
			queue_item.right_examples_index_range,
			queue_item.right_histogram,
		);
	}

	let tree = Tree {
		nodes: builder.nodes,
		classes: matrix.classes().to_vec(),
		n_features: matrix.n_features(),
		max_depth,
		lambd: options.lambd,
		build_duration: deadline.elapsed(),
		truncated: builder.truncated,
	}
	.compact();
	if tree.truncated {
		tracing::debug!(
			time_limit = options.time_limit,
			n_nodes = tree.nodes.len(),
			"the deadline was reached, returning the partially grown tree"
		);
	}
	tracing::debug!(
		n_leaves = tree.n_leaves(),
		depth = tree.depth(),
		duration = ?tree.build_duration,
		"built tree"
	);
	Ok(tree)
}

struct Builder<'a> {
	matrix: &'a FeatureMatrix,
	options: &'a TrainOptions,
	deadline: &'a Deadline,
	max_depth: usize,
	root_impurity: f64,
	examples_index: Vec<usize>,
	nodes: Vec<Node>,
	queue: BinaryHeap<QueueItem>,
	sequence: usize,
	truncated: bool,
}

impl<'a> Builder<'a> {
	/// Visit the provisional leaf at `node_index`. If it should be split, partition its instances and queue it.
	fn open(
		&mut self,
		node_index: usize,
		depth: usize,
		examples_index_range: Range<usize>,
		histogram: Vec<usize>,
	) {
		if self.deadline.is_reached() {
			self.truncated = true;
			return;
		}
		let min_examples_per_child = self.options.min_examples_per_child.max(1);
		if depth >= self.max_depth
			|| is_pure(&histogram)
			|| examples_index_range.len() < 2 * min_examples_per_child
			|| self.root_impurity <= 0.0
		{
			return;
		}
		let sequence = self.sequence;
		self.sequence += 1;
		let context = SplitContext {
			matrix: self.matrix,
			options: self.options,
			deadline: self.deadline,
			seed: self.options.seed.wrapping_add(sequence.to_u64().unwrap_or(0)),
		};
		let examples_index = &mut self.examples_index[examples_index_range.clone()];
		let candidate = match choose_best_split(&context, examples_index, &histogram) {
			Some(candidate) => candidate,
			None => return,
		};
		let (left, right) = rearrange_examples_index(self.matrix, &candidate.split, examples_index);
		if left.len() < min_examples_per_child || right.len() < min_examples_per_child {
			return;
		}
		let left_histogram = self.matrix.class_histogram(&examples_index[left.clone()]);
		let right_histogram = self.matrix.class_histogram(&examples_index[right.clone()]);
		// Score the partition the split actually produced.
		let score =
			gini_impurity(&histogram) - gini_impurity(&left_histogram) - gini_impurity(&right_histogram);
		let gain = score / self.root_impurity - self.options.lambd * COMPLEXITY_PENALTY;
		let gain = match gain.to_finite() {
			Ok(gain) if gain.get() > 0.0 => gain,
			_ => return,
		};
		let start = examples_index_range.start;
		self.queue.push(QueueItem {
			gain,
			sequence,
			node_index,
			depth,
			split: candidate.split,
			left_examples_index_range: start + left.start..start + left.end,
			right_examples_index_range: start + right.start..start + right.end,
			left_histogram,
			right_histogram,
			histogram,
		});
	}
}

#[cfg(test)]
use crate::{UnivariateSplit, Node::Leaf};
#[cfg(test)]
use ndarray::prelude::*;
#[cfg(test)]
use treesweep_metrics::{Accuracy, StreamingMetric};

#[cfg(test)]
fn training_accuracy(tree: &Tree, matrix: &FeatureMatrix) -> f32 {
	let mut accuracy = Accuracy::new();
	for row_index in 0..matrix.n_rows() {
		accuracy.update((tree.predict(matrix.row(row_index)), matrix.label(row_index)));
	}
	accuracy.finalize().unwrap()
}

#[cfg(test)]
fn sum_of_leaf_histograms(tree: &Tree) -> Vec<usize> {
	let mut total = vec![0; tree.classes.len()];
	for node in tree.nodes.iter().filter(|node| node.is_leaf()) {
		for (total, count) in total.iter_mut().zip(node.histogram()) {
			*total += count;
		}
	}
	total
}

#[cfg(test)]
fn checkerboard() -> FeatureMatrix {
	let mut features = Vec::new();
	let mut labels = Vec::new();
	for i in 0..8 {
		for j in 0..8 {
			features.push([i as f32, j as f32]);
			labels.push(((i / 2 + j / 2) % 3) as i64);
		}
	}
	FeatureMatrix::new(arr2(features.as_slice()), &labels).unwrap()
}

#[test]
fn test_two_separable_pairs() {
	let features = arr2(&[[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]);
	let matrix = FeatureMatrix::new(features, &[0, 0, 1, 1]).unwrap();
	let options = TrainOptions {
		time_limit: 10.0,
		lambd: 0.0,
		max_depth: 2,
		multivariate: false,
		..Default::default()
	};
	let tree = train(&matrix, &options).unwrap();
	assert!(tree.is_well_formed());
	assert!(!tree.truncated);
	assert_eq!(tree.n_branches(), 1);
	assert_eq!(tree.n_leaves(), 2);
	assert_eq!(
		tree.nodes[0],
		Node::Branch(BranchNode {
			left_child_index: 1,
			right_child_index: 2,
			split: Split::Univariate(UnivariateSplit {
				feature_index: 0,
				threshold: 0.5,
			}),
			histogram: vec![2, 2],
		})
	);
	assert_eq!(tree.nodes[1], Node::leaf(vec![2, 0]));
	assert_eq!(tree.nodes[2], Node::leaf(vec![0, 2]));
	assert_eq!(training_accuracy(&tree, &matrix), 1.0);
}

#[test]
fn test_depth_bound_and_partition_invariants() {
	let matrix = checkerboard();
	let root_histogram = matrix.class_histogram(&(0..matrix.n_rows()).collect::<Vec<_>>());
	for max_depth in 0..6 {
		for multivariate in [false, true].iter() {
			let options = TrainOptions {
				max_depth,
				multivariate: *multivariate,
				..Default::default()
			};
			let tree = train(&matrix, &options).unwrap();
			assert!(tree.is_well_formed());
			assert!(tree.depth() <= max_depth as usize);
			assert_eq!(sum_of_leaf_histograms(&tree), root_histogram);
		}
	}
}

#[test]
fn test_zero_depth_gives_single_leaf() {
	let matrix = checkerboard();
	let options = TrainOptions {
		max_depth: 0,
		..Default::default()
	};
	let tree = train(&matrix, &options).unwrap();
	assert_eq!(tree.nodes.len(), 1);
	assert!(!tree.truncated);
}

#[test]
fn test_tiny_time_limit_gives_single_leaf() {
	let matrix = checkerboard();
	let options = TrainOptions {
		time_limit: 1e-12,
		max_depth: 5,
		multivariate: true,
		..Default::default()
	};
	let tree = train(&matrix, &options).unwrap();
	assert!(tree.truncated);
	assert_eq!(tree.nodes.len(), 1);
	match &tree.nodes[0] {
		Leaf(leaf) => {
			assert_eq!(
				leaf.histogram,
				matrix.class_histogram(&(0..matrix.n_rows()).collect::<Vec<_>>())
			);
		}
		Node::Branch(_) => panic!("expected a leaf"),
	}
}

#[test]
fn test_deadline_during_multivariate_build_keeps_computed_splits() {
	use rand::{Rng, SeedableRng};
	use rand_xoshiro::Xoshiro256Plus;
	let mut rng = Xoshiro256Plus::seed_from_u64(7);
	let n_rows = 20_000;
	let n_features = 8;
	let features = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen_range(0.0f32, 1.0));
	let labels: Vec<i64> = (0..n_rows).map(|_| rng.gen_range(0, 4)).collect();
	let matrix = FeatureMatrix::new(features, &labels).unwrap();
	let options = TrainOptions {
		time_limit: 0.1,
		max_depth: 12,
		multivariate: true,
		..Default::default()
	};
	let tree = train(&matrix, &options).unwrap();
	assert!(tree.truncated);
	assert!(tree.is_well_formed());
	assert!(tree.n_leaves() > 1);
	assert_eq!(
		sum_of_leaf_histograms(&tree),
		matrix.class_histogram(&(0..n_rows).collect::<Vec<_>>())
	);
}

#[test]
fn test_deterministic_univariate_builds() {
	let matrix = checkerboard();
	let options = TrainOptions {
		max_depth: 4,
		lambd: 0.1,
		..Default::default()
	};
	let a = train(&matrix, &options).unwrap();
	let b = train(&matrix, &options).unwrap();
	assert_eq!(a.nodes, b.nodes);
}

#[test]
fn test_regularization_shrinks_the_tree() {
	let matrix = checkerboard();
	let unregularized = train(
		&matrix,
		&TrainOptions {
			max_depth: 5,
			lambd: 0.0,
			..Default::default()
		},
	)
	.unwrap();
	// No single split can remove all of the root's impurity, so a weight this large forbids every split.
	let regularized = train(
		&matrix,
		&TrainOptions {
			max_depth: 5,
			lambd: 100.0,
			..Default::default()
		},
	)
	.unwrap();
	assert!(unregularized.n_leaves() > 1);
	assert_eq!(regularized.n_leaves(), 1);
}

#[test]
fn test_multivariate_splits_diagonal_in_one_step() {
	let features = arr2(&[
		[0.0, 0.0],
		[1.0, -1.0],
		[-1.0, 1.0],
		[1.0, 1.0],
		[2.0, 0.0],
		[0.0, 2.0],
	]);
	let matrix = FeatureMatrix::new(features, &[0, 0, 0, 1, 1, 1]).unwrap();
	let univariate = train(
		&matrix,
		&TrainOptions {
			max_depth: 1,
			..Default::default()
		},
	)
	.unwrap();
	let multivariate = train(
		&matrix,
		&TrainOptions {
			max_depth: 1,
			multivariate: true,
			..Default::default()
		},
	)
	.unwrap();
	assert!(multivariate.is_well_formed());
	assert_eq!(multivariate.n_leaves(), 2);
	assert_eq!(training_accuracy(&multivariate, &matrix), 1.0);
	assert!(training_accuracy(&univariate, &matrix) < 1.0);
}

#[test]
fn test_invalid_inputs() {
	let matrix = checkerboard();
	let empty = FeatureMatrix::new(Array2::zeros((0, 2)), &[]).unwrap();
	assert_eq!(
		train(&empty, &TrainOptions::default()).unwrap_err(),
		Error::EmptyDataset
	);
	let options = TrainOptions {
		max_depth: -1,
		..Default::default()
	};
	assert_eq!(
		train(&matrix, &options).unwrap_err(),
		Error::InvalidDepthBound(-1)
	);
	for time_limit in [0.0, -1.0].iter() {
		let options = TrainOptions {
			time_limit: *time_limit,
			..Default::default()
		};
		assert_eq!(
			train(&matrix, &options).unwrap_err(),
			Error::InvalidTimeLimit(*time_limit)
		);
	}
	let options = TrainOptions {
		time_limit: f64::NAN,
		..Default::default()
	};
	assert!(matches!(
		train(&matrix, &options).unwrap_err(),
		Error::InvalidTimeLimit(_)
	));
	let options = TrainOptions {
		lambd: -0.5,
		..Default::default()
	};
	assert_eq!(
		train(&matrix, &options).unwrap_err(),
		Error::InvalidRegularization(-0.5)
	);
}
