use thiserror::Error;

/// The errors returned when the inputs to a build or a merge are invalid. They are detected before any work begins. Running out of time or failing to find a split are not errors.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
	#[error("the feature matrix has no instances")]
	EmptyDataset,
	#[error("the depth bound must not be negative, got {0}")]
	InvalidDepthBound(i64),
	#[error("the time limit must be a positive number of seconds, got {0}")]
	InvalidTimeLimit(f64),
	#[error("the regularization weight must be a non-negative number, got {0}")]
	InvalidRegularization(f64),
	#[error("the merge percentage must be between 0 and 100, got {0}")]
	InvalidPercentage(f64),
	#[error("the feature matrix has {n_rows} rows but {n_labels} labels were given")]
	LabelCountMismatch { n_rows: usize, n_labels: usize },
	#[error("the feature value at row {row}, column {column} is not finite")]
	NonFiniteFeature { row: usize, column: usize },
}
