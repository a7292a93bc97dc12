use crate::{FeatureMatrix, Split, SplitDirection};

/// This function rearranges `examples_index` in place so that the instances the split sends left come first, followed by the instances it sends right, and returns the ranges of each side. The ranges are local to the slice.
pub fn rearrange_examples_index(
	matrix: &FeatureMatrix,
	split: &Split,
	examples_index: &mut [usize],
) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
	let start = 0;
	let end = examples_index.len();
	let mut left = start;
	let mut right = end;
	let mut n_left = 0;
	while left < right {
		match split.direction(matrix.row(examples_index[left])) {
			SplitDirection::Left => {
				left += 1;
				n_left += 1;
			}
			SplitDirection::Right => {
				right -= 1;
				examples_index.swap(left, right);
			}
		};
	}
	(start..n_left, n_left..end)
}

#[test]
fn test_rearrange_examples_index() {
	use crate::UnivariateSplit;
	use ndarray::prelude::*;
	let features = arr2(&[[3.0], [0.0], [2.0], [1.0], [4.0]]);
	let matrix = FeatureMatrix::new(features, &[0, 0, 0, 0, 0]).unwrap();
	let split = Split::Univariate(UnivariateSplit {
		feature_index: 0,
		threshold: 1.5,
	});
	let mut examples_index = vec![0, 1, 2, 3, 4];
	let (left, right) = rearrange_examples_index(&matrix, &split, &mut examples_index);
	assert_eq!(left, 0..2);
	assert_eq!(right, 2..5);
	let mut left_rows = examples_index[left].to_vec();
	left_rows.sort_unstable();
	assert_eq!(left_rows, vec![1, 3]);
	let mut right_rows = examples_index[right].to_vec();
	right_rows.sort_unstable();
	assert_eq!(right_rows, vec![0, 2, 4]);
}
