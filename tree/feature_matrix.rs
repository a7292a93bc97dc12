use crate::Error;
use ndarray::prelude::*;

/**
A `FeatureMatrix` is the immutable training set for a build: one row of `f32` features per instance and one class label per row.

Labels are arbitrary integers. They are mapped to dense class indices `0..n_classes` in ascending label order, and the original labels are kept in `classes` so predictions can be reported in the caller's terms.
*/
#[derive(Clone, Debug)]
pub struct FeatureMatrix {
	features: Array2<f32>,
	labels: Array1<usize>,
	classes: Vec<i64>,
}

impl FeatureMatrix {
	pub fn new(features: Array2<f32>, labels: &[i64]) -> Result<FeatureMatrix, Error> {
		if features.nrows() != labels.len() {
			return Err(Error::LabelCountMismatch {
				n_rows: features.nrows(),
				n_labels: labels.len(),
			});
		}
		if let Some(((row, column), _)) = features
			.indexed_iter()
			.find(|(_, value)| !value.is_finite())
		{
			return Err(Error::NonFiniteFeature { row, column });
		}
		let mut classes = labels.to_vec();
		classes.sort_unstable();
		classes.dedup();
		let labels = labels
			.iter()
			.map(|label| classes.binary_search(label).unwrap_or(0))
			.collect::<Array1<usize>>();
		Ok(FeatureMatrix {
			features,
			labels,
			classes,
		})
	}

	pub fn n_rows(&self) -> usize {
		self.features.nrows()
	}

	pub fn n_features(&self) -> usize {
		self.features.ncols()
	}

	pub fn n_classes(&self) -> usize {
		self.classes.len()
	}

	pub fn features(&self) -> ArrayView2<f32> {
		self.features.view()
	}

	pub fn row(&self, row_index: usize) -> ArrayView1<f32> {
		self.features.row(row_index)
	}

	/// The class index of every row.
	pub fn labels(&self) -> ArrayView1<usize> {
		self.labels.view()
	}

	/// The original label of every class index, in ascending order.
	pub fn classes(&self) -> &[i64] {
		&self.classes
	}

	/// The original label of the given row.
	pub fn label(&self, row_index: usize) -> i64 {
		self.classes[self.labels[row_index]]
	}

	/// Count the instances of each class among the given rows.
	pub fn class_histogram(&self, examples_index: &[usize]) -> Vec<usize> {
		let mut histogram = vec![0; self.n_classes()];
		for example_index in examples_index {
			histogram[self.labels[*example_index]] += 1;
		}
		histogram
	}

	/// Make a new matrix from the given rows. The class table is kept whole, so class indices agree between the two matrices even if some class has no rows in the selection.
	pub fn select(&self, row_indexes: &[usize]) -> FeatureMatrix {
		FeatureMatrix {
			features: self.features.select(Axis(0), row_indexes),
			labels: self.labels.select(Axis(0), row_indexes),
			classes: self.classes.clone(),
		}
	}
}

#[test]
fn test_labels_map_to_sorted_class_indexes() {
	let features = arr2(&[[0.0], [1.0], [2.0], [3.0]]);
	let matrix = FeatureMatrix::new(features, &[7, -2, 7, 3]).unwrap();
	assert_eq!(matrix.classes(), &[-2, 3, 7]);
	assert_eq!(matrix.labels().to_vec(), vec![2, 0, 2, 1]);
	assert_eq!(matrix.label(0), 7);
	assert_eq!(matrix.class_histogram(&[0, 1, 2, 3]), vec![1, 1, 2]);
}

#[test]
fn test_rejects_mismatched_labels() {
	let features = arr2(&[[0.0, 1.0], [1.0, 0.0]]);
	assert_eq!(
		FeatureMatrix::new(features, &[1]).unwrap_err(),
		Error::LabelCountMismatch {
			n_rows: 2,
			n_labels: 1
		}
	);
}

#[test]
fn test_rejects_non_finite_features() {
	let features = arr2(&[[0.0, 1.0], [1.0, f32::NAN]]);
	assert_eq!(
		FeatureMatrix::new(features, &[0, 1]).unwrap_err(),
		Error::NonFiniteFeature { row: 1, column: 1 }
	);
}

#[test]
fn test_select_keeps_class_table() {
	let features = arr2(&[[0.0], [1.0], [2.0]]);
	let matrix = FeatureMatrix::new(features, &[0, 1, 2]).unwrap();
	let selection = matrix.select(&[2, 0]);
	assert_eq!(selection.n_rows(), 2);
	assert_eq!(selection.classes(), &[0, 1, 2]);
	assert_eq!(selection.labels().to_vec(), vec![2, 0]);
	assert_eq!(selection.row(0).to_vec(), vec![2.0]);
}
