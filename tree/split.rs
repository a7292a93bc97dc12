use crate::{multivariate, Deadline, FeatureMatrix, Split, TrainOptions, UnivariateSplit};
use num_traits::ToPrimitive;
use rayon::prelude::*;
use std::cmp::Ordering;

/// A split is only considered if it reduces the weighted Gini impurity by more than this amount. Smaller reductions are floating point noise.
pub const SPLIT_EPSILON: f64 = 1e-9;

/// Above this many instances, features are searched on multiple threads.
const MIN_EXAMPLES_TO_PARALLELIZE: usize = 1024;

/// A split together with its score, the reduction in weighted Gini impurity from the parent to the two children.
#[derive(Clone, Debug)]
pub struct SplitCandidate {
	pub split: Split,
	pub score: f64,
}

/// Everything the split search needs besides the node's instances.
pub struct SplitContext<'a> {
	pub matrix: &'a FeatureMatrix,
	pub options: &'a TrainOptions,
	pub deadline: &'a Deadline,
	/// Seeds the pseudo random directions of the multivariate search for this node.
	pub seed: u64,
}

/// Compute the weighted Gini impurity `n - sum(count^2) / n` of a class histogram. This is `n` times the usual Gini impurity, so the impurities of two children add up to compare against their parent.
pub fn gini_impurity(histogram: &[usize]) -> f64 {
	let n: usize = histogram.iter().sum();
	if n == 0 {
		return 0.0;
	}
	let sum_of_squares: f64 = histogram
		.iter()
		.map(|count| count.to_f64().unwrap().powi(2))
		.sum();
	n.to_f64().unwrap() - sum_of_squares / n.to_f64().unwrap()
}

/// The class counts on one side of a sweep. The sum of squared counts is maintained incrementally so the impurity costs O(1) after each move.
#[derive(Clone, Debug)]
pub struct SweepHistogram {
	counts: Vec<u64>,
	n: u64,
	sum_of_squares: u64,
}

impl SweepHistogram {
	pub fn empty(n_classes: usize) -> SweepHistogram {
		SweepHistogram {
			counts: vec![0; n_classes],
			n: 0,
			sum_of_squares: 0,
		}
	}

	pub fn add(&mut self, class_index: usize) {
		let count = &mut self.counts[class_index];
		self.sum_of_squares += 2 * *count + 1;
		*count += 1;
		self.n += 1;
	}

	pub fn remove(&mut self, class_index: usize) {
		let count = &mut self.counts[class_index];
		self.sum_of_squares -= 2 * *count - 1;
		*count -= 1;
		self.n -= 1;
	}

	pub fn len(&self) -> usize {
		self.n.to_usize().unwrap()
	}

	pub fn impurity(&self) -> f64 {
		if self.n == 0 {
			return 0.0;
		}
		self.n.to_f64().unwrap() - self.sum_of_squares.to_f64().unwrap() / self.n.to_f64().unwrap()
	}
}

/// Return true if at most one class has instances.
pub fn is_pure(histogram: &[usize]) -> bool {
	histogram.iter().filter(|count| **count > 0).count() <= 1
}

/**
Find the best split for the instances in `examples_index`, whose class counts are `histogram`. Returns `None` if the node is pure, if it is too small to give each child `min_examples_per_child` instances, or if no split reduces the impurity by more than `SPLIT_EPSILON`.
*/
pub fn choose_best_split(
	context: &SplitContext,
	examples_index: &[usize],
	histogram: &[usize],
) -> Option<SplitCandidate> {
	let min_examples_per_child = context.options.min_examples_per_child.max(1);
	if examples_index.len() < 2 * min_examples_per_child || is_pure(histogram) {
		return None;
	}
	let univariate = choose_best_univariate_split(context, examples_index, histogram);
	if context.options.multivariate {
		multivariate::choose_best_multivariate_split(context, examples_index, histogram, univariate)
	} else {
		univariate
	}
}

/// Find the best threshold split across all features. Ties go to the lowest feature index, then to the lowest threshold.
pub fn choose_best_univariate_split(
	context: &SplitContext,
	examples_index: &[usize],
	histogram: &[usize],
) -> Option<SplitCandidate> {
	let n_features = context.matrix.n_features();
	let search = |feature_index| {
		choose_best_split_for_feature(context, feature_index, examples_index, histogram)
	};
	let candidates: Vec<Option<SplitCandidate>> =
		if examples_index.len() < MIN_EXAMPLES_TO_PARALLELIZE {
			(0..n_features).map(search).collect()
		} else {
			(0..n_features).into_par_iter().map(search).collect()
		};
	// Reduce in feature order so a later feature must be strictly better to win.
	candidates
		.into_iter()
		.flatten()
		.fold(None, |best: Option<SplitCandidate>, candidate| match best {
			Some(best) if best.score >= candidate.score => Some(best),
			_ => Some(candidate),
		})
}

/// Sort the instances by the value of one feature and sweep the thresholds between consecutive distinct values from lowest to highest, moving one instance at a time from the right histogram to the left.
fn choose_best_split_for_feature(
	context: &SplitContext,
	feature_index: usize,
	examples_index: &[usize],
	histogram: &[usize],
) -> Option<SplitCandidate> {
	let matrix = context.matrix;
	let labels = matrix.labels();
	let features = matrix.features();
	let column = features.column(feature_index);
	let min_examples_per_child = context.options.min_examples_per_child.max(1);
	let mut sorted: Vec<(f32, usize)> = examples_index
		.iter()
		.map(|example_index| (column[*example_index], *example_index))
		.collect();
	sorted.sort_by(|a, b| {
		a.0.partial_cmp(&b.0)
			.unwrap_or(Ordering::Equal)
			.then(a.1.cmp(&b.1))
	});
	let parent_impurity = gini_impurity(histogram);
	let mut left = SweepHistogram::empty(histogram.len());
	let mut right = SweepHistogram::empty(histogram.len());
	for (_, example_index) in sorted.iter() {
		right.add(labels[*example_index]);
	}
	let mut best: Option<(f32, f64)> = None;
	for window in sorted.windows(2) {
		let (value, example_index) = window[0];
		let next_value = window[1].0;
		let class_index = labels[example_index];
		left.add(class_index);
		right.remove(class_index);
		if value == next_value
			|| left.len() < min_examples_per_child
			|| right.len() < min_examples_per_child
		{
			continue;
		}
		let score = parent_impurity - left.impurity() - right.impurity();
		let is_better = match best {
			Some((_, best_score)) => score > best_score,
			None => score > SPLIT_EPSILON,
		};
		if is_better {
			best = Some((midpoint(value, next_value), score));
		}
	}
	best.map(|(threshold, score)| SplitCandidate {
		split: Split::Univariate(UnivariateSplit {
			feature_index,
			threshold,
		}),
		score,
	})
}

/// Compute a threshold between `low` and `high`, with `low < high`, such that `low <= threshold < high`.
pub fn midpoint(low: f32, high: f32) -> f32 {
	let threshold = (low.to_f64().unwrap() + (high.to_f64().unwrap() - low.to_f64().unwrap()) / 2.0)
		.to_f32()
		.unwrap_or(low);
	if threshold >= high || threshold < low {
		low
	} else {
		threshold
	}
}

#[cfg(test)]
fn search(
	features: ndarray::Array2<f32>,
	labels: &[i64],
	options: &TrainOptions,
) -> Option<SplitCandidate> {
	let matrix = FeatureMatrix::new(features, labels).unwrap();
	let deadline = Deadline::from_secs_f64(options.time_limit);
	let context = SplitContext {
		matrix: &matrix,
		options,
		deadline: &deadline,
		seed: options.seed,
	};
	let examples_index: Vec<usize> = (0..matrix.n_rows()).collect();
	let histogram = matrix.class_histogram(&examples_index);
	choose_best_split(&context, &examples_index, &histogram)
}

#[test]
fn test_gini_impurity() {
	assert_eq!(gini_impurity(&[2, 2]), 2.0);
	assert_eq!(gini_impurity(&[4, 0]), 0.0);
	assert_eq!(gini_impurity(&[]), 0.0);
	let mut sweep = SweepHistogram::empty(2);
	sweep.add(0);
	sweep.add(0);
	sweep.add(1);
	sweep.add(1);
	assert_eq!(sweep.impurity(), gini_impurity(&[2, 2]));
	sweep.remove(1);
	assert!((sweep.impurity() - gini_impurity(&[2, 1])).abs() < 1e-12);
}

#[test]
fn test_midpoint() {
	assert_eq!(midpoint(1.0, 2.0), 1.5);
	assert_eq!(midpoint(-1.0, 3.0), 1.0);
	let low = 1.0f32;
	let high = f32::from_bits(low.to_bits() + 1);
	let threshold = midpoint(low, high);
	assert!(threshold >= low && threshold < high);
}

#[test]
fn test_univariate_split_separates_classes() {
	use ndarray::prelude::*;
	let features = arr2(&[[5.0, 0.0], [1.0, 0.0], [4.0, 1.0], [2.0, 1.0]]);
	let candidate = search(features, &[1, 0, 1, 0], &TrainOptions::default()).unwrap();
	assert_eq!(
		candidate.split,
		Split::Univariate(UnivariateSplit {
			feature_index: 0,
			threshold: 3.0,
		})
	);
	assert_eq!(candidate.score, 2.0);
}

#[test]
fn test_univariate_ties_prefer_lowest_feature_then_lowest_threshold() {
	use ndarray::prelude::*;
	// Both features separate the classes perfectly.
	let features = arr2(&[[0.0, 0.0], [0.0, 0.0], [1.0, 5.0], [1.0, 5.0]]);
	let candidate = search(features, &[0, 0, 1, 1], &TrainOptions::default()).unwrap();
	assert_eq!(
		candidate.split,
		Split::Univariate(UnivariateSplit {
			feature_index: 0,
			threshold: 0.5,
		})
	);
	let features = arr2(&[[0.0], [1.0], [2.0], [3.0]]);
	let candidate = search(features, &[0, 1, 0, 1], &TrainOptions::default()).unwrap();
	assert_eq!(
		candidate.split,
		Split::Univariate(UnivariateSplit {
			feature_index: 0,
			threshold: 0.5,
		})
	);
}

#[test]
fn test_no_valid_split() {
	use ndarray::prelude::*;
	// Pure.
	let features = arr2(&[[0.0], [1.0]]);
	assert!(search(features, &[3, 3], &TrainOptions::default()).is_none());
	// Every instance has the same features.
	let features = arr2(&[[1.0], [1.0], [1.0]]);
	assert!(search(features, &[0, 1, 0], &TrainOptions::default()).is_none());
	// The children would be too small.
	let features = arr2(&[[0.0], [1.0], [2.0]]);
	let options = TrainOptions {
		min_examples_per_child: 2,
		..Default::default()
	};
	assert!(search(features, &[0, 1, 1], &options).is_none());
}
