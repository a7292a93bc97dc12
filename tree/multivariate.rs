/*!
This module searches for hyperplane splits. Exhaustive search over hyperplanes is intractable, so the search starts from the better of two seeds, the best univariate split and the direction between the means of the two largest classes, and improves it with exact line searches: first along each coordinate in turn until a pass makes no progress, then along a few pseudo random directions.

Moving the hyperplane along a direction changes every instance's projection linearly, so each instance crosses the hyperplane at exactly one step size. Sorting those crossing points and sweeping them with incremental class histograms evaluates every distinct partition along the line in O(n log n), exactly like the univariate threshold sweep.

Each node's search gets its own slice of the time that remains in the build, so one slow node cannot use up the budget of the nodes queued after it. The slice is polled before every line search. When it runs out, the best hyperplane found so far is returned.
*/

use crate::{
	split::{SplitCandidate, SplitContext, SweepHistogram, SPLIT_EPSILON},
	MultivariateSplit, Split,
};
use num_traits::ToPrimitive;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::cmp::Ordering;

/// Coordinate descent stops after this many passes over the coordinates even if it is still improving.
const MAX_COORDINATE_PASSES: usize = 8;

/// The search at one node may use at most this fraction of the time remaining in the build.
const NODE_TIME_SHARE: f64 = 0.1;

/// A hyperplane is stored as `n_features` weights followed by the threshold. An instance's projection is `w . x - threshold`, and instances with a projection `<= 0` go left.
struct Hyperplane {
	coefficients: Vec<f64>,
	projections: Vec<f64>,
	score: f64,
}

/// The state shared by every line search at one node.
struct Search<'a> {
	context: &'a SplitContext<'a>,
	examples_index: &'a [usize],
	labels: Vec<usize>,
	n_classes: usize,
	parent_impurity: f64,
	min_examples_per_child: usize,
}

pub fn choose_best_multivariate_split(
	context: &SplitContext,
	examples_index: &[usize],
	histogram: &[usize],
	univariate: Option<SplitCandidate>,
) -> Option<SplitCandidate> {
	let matrix_labels = context.matrix.labels();
	let search = Search {
		context,
		examples_index,
		labels: examples_index
			.iter()
			.map(|example_index| matrix_labels[*example_index])
			.collect(),
		n_classes: histogram.len(),
		parent_impurity: crate::gini_impurity(histogram),
		min_examples_per_child: context.options.min_examples_per_child.max(1),
	};
	let n_features = context.matrix.n_features();
	let deadline = context.deadline.slice(NODE_TIME_SHARE);

	// Start from the better seed. The univariate seed wins ties.
	let univariate_seed = univariate.as_ref().and_then(|candidate| match &candidate.split {
		Split::Univariate(split) => {
			let mut coefficients = vec![0.0; n_features + 1];
			coefficients[split.feature_index] = 1.0;
			coefficients[n_features] = split.threshold.to_f64().unwrap();
			search.hyperplane(coefficients)
		}
		Split::Multivariate(_) => None,
	});
	let class_means_seed = search.class_means_seed(histogram);
	let mut best = match (univariate_seed, class_means_seed) {
		(Some(a), Some(b)) if b.score > a.score + SPLIT_EPSILON => b,
		(Some(a), _) => a,
		(None, Some(b)) => b,
		(None, None) => return univariate,
	};

	// Coordinate descent over the weights and the threshold.
	'passes: for _ in 0..MAX_COORDINATE_PASSES {
		let mut improved = false;
		for coordinate in 0..=n_features {
			if deadline.is_reached() {
				break 'passes;
			}
			let mut direction = vec![0.0; n_features + 1];
			direction[coordinate] = 1.0;
			improved |= search.step(&mut best, &direction);
		}
		if !improved {
			break;
		}
	}

	// Pseudo random directions to leave local optima of coordinate descent.
	let mut rng = Xoshiro256Plus::seed_from_u64(context.seed);
	for _ in 0..context.options.multivariate_random_directions {
		if deadline.is_reached() {
			break;
		}
		let direction: Vec<f64> = (0..=n_features)
			.map(|_| rng.gen_range(-1.0, 1.0))
			.collect();
		search.step(&mut best, &direction);
	}

	// Prefer the exact univariate split when the hyperplane did not improve on it.
	if let Some(univariate) = univariate {
		if best.score <= univariate.score + SPLIT_EPSILON {
			return Some(univariate);
		}
	}
	let (weights, threshold) = best.coefficients.split_at(n_features);
	let scale = weights
		.iter()
		.fold(0.0f64, |scale, weight| scale.max(weight.abs()));
	if scale == 0.0 {
		return None;
	}
	Some(SplitCandidate {
		split: Split::Multivariate(MultivariateSplit {
			weights: weights.iter().map(|weight| weight / scale).collect(),
			threshold: threshold[0] / scale,
		}),
		score: best.score,
	})
}

impl<'a> Search<'a> {
	/// Compute the projections and score of a hyperplane. Returns `None` if the hyperplane has no non-zero weight or does not produce a valid split.
	fn hyperplane(&self, coefficients: Vec<f64>) -> Option<Hyperplane> {
		let n_features = coefficients.len() - 1;
		if coefficients[..n_features].iter().all(|weight| *weight == 0.0) {
			return None;
		}
		let (weights, threshold) = coefficients.split_at(n_features);
		let projections: Vec<f64> = self
			.examples_index
			.iter()
			.map(|example_index| {
				crate::project(weights, self.context.matrix.row(*example_index)) - threshold[0]
			})
			.collect();
		let mut left = SweepHistogram::empty(self.n_classes);
		let mut right = SweepHistogram::empty(self.n_classes);
		for (projection, label) in projections.iter().zip(self.labels.iter()) {
			if *projection <= 0.0 {
				left.add(*label);
			} else {
				right.add(*label);
			}
		}
		let score = self.score(&left, &right)?;
		Some(Hyperplane {
			coefficients,
			projections,
			score,
		})
	}

	fn score(&self, left: &SweepHistogram, right: &SweepHistogram) -> Option<f64> {
		if left.len() < self.min_examples_per_child || right.len() < self.min_examples_per_child {
			return None;
		}
		let score = self.parent_impurity - left.impurity() - right.impurity();
		if score > SPLIT_EPSILON {
			Some(score)
		} else {
			None
		}
	}

	/// The rate at which each instance's projection changes when the coefficients move along `direction`.
	fn gradients(&self, direction: &[f64]) -> Vec<f64> {
		let n_features = direction.len() - 1;
		let (weights, threshold) = direction.split_at(n_features);
		self.examples_index
			.iter()
			.map(|example_index| {
				crate::project(weights, self.context.matrix.row(*example_index)) - threshold[0]
			})
			.collect()
	}

	/// Move `hyperplane` along `direction` to the best point on that line, if it is strictly better. Returns true if the hyperplane moved.
	fn step(&self, hyperplane: &mut Hyperplane, direction: &[f64]) -> bool {
		let gradients = self.gradients(direction);
		let (step, _) = match self.line_search(&hyperplane.projections, &gradients) {
			Some(result) => result,
			None => return false,
		};
		let coefficients = hyperplane
			.coefficients
			.iter()
			.zip(direction.iter())
			.map(|(coefficient, direction)| coefficient + step * direction)
			.collect();
		// Recompute from the new coefficients so the score matches the partition the split will actually produce.
		match self.hyperplane(coefficients) {
			Some(moved) if moved.score > hyperplane.score + SPLIT_EPSILON => {
				*hyperplane = moved;
				true
			}
			_ => false,
		}
	}

	/// Find the step size along a line that gives the best split, and its score. `projections` are the current projections and `gradients` their rates of change along the line.
	fn line_search(&self, projections: &[f64], gradients: &[f64]) -> Option<(f64, f64)> {
		let mut left = SweepHistogram::empty(self.n_classes);
		let mut right = SweepHistogram::empty(self.n_classes);
		// For very negative steps, instances whose projection grows along the line are on the left and the others are on the right. Each crossing moves one instance to the other side.
		let mut crossings: Vec<(f64, usize)> = Vec::new();
		for (position, (projection, gradient)) in projections.iter().zip(gradients).enumerate() {
			let label = self.labels[position];
			let crossing = -projection / gradient;
			if *gradient != 0.0 && crossing.is_finite() {
				if *gradient > 0.0 {
					left.add(label);
				} else {
					right.add(label);
				}
				crossings.push((crossing, position));
			} else if *projection <= 0.0 {
				left.add(label);
			} else {
				right.add(label);
			}
		}
		if crossings.is_empty() {
			return None;
		}
		crossings.sort_by(|a, b| {
			a.0.partial_cmp(&b.0)
				.unwrap_or(Ordering::Equal)
				.then(a.1.cmp(&b.1))
		});
		let first = crossings[0].0;
		let mut best = self
			.score(&left, &right)
			.map(|score| (first - (1.0 + first.abs()), score));
		let mut index = 0;
		while index < crossings.len() {
			let crossing = crossings[index].0;
			while index < crossings.len() && crossings[index].0 == crossing {
				let position = crossings[index].1;
				let label = self.labels[position];
				if gradients[position] > 0.0 {
					left.remove(label);
					right.add(label);
				} else {
					right.remove(label);
					left.add(label);
				}
				index += 1;
			}
			let step = match crossings.get(index) {
				Some((next, _)) => crossing + (next - crossing) / 2.0,
				None => crossing + (1.0 + crossing.abs()),
			};
			if let Some(score) = self.score(&left, &right) {
				if best.map_or(true, |(_, best_score)| score > best_score) {
					best = Some((step, score));
				}
			}
		}
		best
	}

	/// Build a hyperplane orthogonal to the line between the means of the two largest classes, with the best threshold along that normal.
	fn class_means_seed(&self, histogram: &[usize]) -> Option<Hyperplane> {
		let matrix = self.context.matrix;
		let n_features = matrix.n_features();
		let mut classes: Vec<usize> = (0..histogram.len()).collect();
		// Largest count first, lowest class index on ties.
		classes.sort_by(|a, b| histogram[*b].cmp(&histogram[*a]).then(a.cmp(b)));
		let (first, second) = (classes[0], *classes.get(1)?);
		if histogram[second] == 0 {
			return None;
		}
		let mut means = vec![vec![0.0f64; n_features]; 2];
		for (example_index, label) in self.examples_index.iter().zip(self.labels.iter()) {
			let side = if *label == first {
				0
			} else if *label == second {
				1
			} else {
				continue;
			};
			for (mean, value) in means[side].iter_mut().zip(matrix.row(*example_index)) {
				*mean += value.to_f64().unwrap();
			}
		}
		let mut coefficients: Vec<f64> = means[1]
			.iter()
			.zip(means[0].iter())
			.map(|(second_sum, first_sum)| {
				second_sum / histogram[second].to_f64().unwrap()
					- first_sum / histogram[first].to_f64().unwrap()
			})
			.collect();
		if coefficients.iter().all(|weight| *weight == 0.0) {
			return None;
		}
		coefficients.push(0.0);
		let projections = self.gradients(&coefficients);
		let gradients = vec![-1.0; projections.len()];
		let (step, _) = self.line_search(&projections, &gradients)?;
		coefficients[n_features] = step;
		self.hyperplane(coefficients)
	}
}

#[cfg(test)]
use crate::{Deadline, FeatureMatrix, TrainOptions, UnivariateSplit};

#[cfg(test)]
fn search_node(
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
	crate::split::choose_best_split(&context, &examples_index, &histogram)
}

#[cfg(test)]
fn diagonal() -> (ndarray::Array2<f32>, Vec<i64>) {
	use ndarray::prelude::*;
	// The classes are separated by x + y = 1 but not by any single feature.
	let features = arr2(&[
		[0.0, 0.0],
		[1.0, -1.0],
		[-1.0, 1.0],
		[1.0, 1.0],
		[2.0, 0.0],
		[0.0, 2.0],
	]);
	(features, vec![0, 0, 0, 1, 1, 1])
}

#[test]
fn test_multivariate_split_finds_diagonal() {
	let (features, labels) = diagonal();
	let options = TrainOptions {
		multivariate: true,
		..Default::default()
	};
	let candidate = search_node(features, &labels, &options).unwrap();
	assert_eq!(
		candidate.split,
		Split::Multivariate(MultivariateSplit {
			weights: vec![1.0, 1.0],
			threshold: 1.0,
		})
	);
	assert_eq!(candidate.score, 3.0);
}

#[test]
fn test_multivariate_is_at_least_as_good_as_univariate() {
	let (features, labels) = diagonal();
	let univariate = search_node(features.clone(), &labels, &TrainOptions::default()).unwrap();
	assert_eq!(
		univariate.split,
		Split::Univariate(UnivariateSplit {
			feature_index: 0,
			threshold: -0.5,
		})
	);
	let options = TrainOptions {
		multivariate: true,
		..Default::default()
	};
	let multivariate = search_node(features, &labels, &options).unwrap();
	assert!(multivariate.score > univariate.score);
}

#[test]
fn test_multivariate_keeps_univariate_split_when_it_is_optimal() {
	use ndarray::prelude::*;
	let features = arr2(&[[0.0, 3.0], [1.0, 0.0], [2.0, 3.0], [3.0, 0.0]]);
	let options = TrainOptions {
		multivariate: true,
		..Default::default()
	};
	let candidate = search_node(features, &[0, 0, 1, 1], &options).unwrap();
	assert_eq!(
		candidate.split,
		Split::Univariate(UnivariateSplit {
			feature_index: 0,
			threshold: 1.5,
		})
	);
}

#[test]
fn test_multivariate_search_returns_seed_when_deadline_has_passed() {
	let (features, labels) = diagonal();
	let options = TrainOptions {
		multivariate: true,
		time_limit: 1e-12,
		..Default::default()
	};
	// The seeds are computed before the first deadline check, so an expired deadline still yields the best seed.
	let candidate = search_node(features, &labels, &options).unwrap();
	assert_eq!(candidate.score, 3.0);
}
