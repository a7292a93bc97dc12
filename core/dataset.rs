/*!
This module loads datasets. A dataset is a comma separated file of numbers: one row per instance, the features first and an integer class label in the last column. If the first row does not parse as numbers it is treated as a header and skipped.
*/

use anyhow::{format_err, Context, Result};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::path::{Path, PathBuf};
use treesweep_tree::FeatureMatrix;

/// Files in the dataset directory with any other extension are ignored.
const DATASET_EXTENSIONS: &[&str] = &["csv", "txt", "data"];

pub struct Dataset {
	/// The file stem of the dataset's path.
	pub name: String,
	pub matrix: FeatureMatrix,
}

/// List the dataset files in `dir`, sorted by path.
pub fn list_dataset_paths(dir: &Path) -> Result<Vec<PathBuf>> {
	let entries = std::fs::read_dir(dir)
		.with_context(|| format!("failed to read dataset directory {}", dir.display()))?;
	let mut paths = Vec::new();
	for entry in entries {
		let path = entry?.path();
		let has_dataset_extension = path
			.extension()
			.and_then(|extension| extension.to_str())
			.map(|extension| DATASET_EXTENSIONS.contains(&extension))
			.unwrap_or(false);
		if has_dataset_extension && path.is_file() {
			paths.push(path);
		}
	}
	paths.sort();
	Ok(paths)
}

impl Dataset {
	pub fn from_path(path: &Path) -> Result<Dataset> {
		let name = path
			.file_stem()
			.and_then(|stem| stem.to_str())
			.ok_or_else(|| format_err!("invalid dataset file name {}", path.display()))?
			.to_owned();
		let file = std::fs::File::open(path)
			.with_context(|| format!("failed to open dataset {}", path.display()))?;
		Dataset::from_reader(name, file)
			.with_context(|| format!("failed to load dataset {}", path.display()))
	}

	pub fn from_reader<R>(name: String, reader: R) -> Result<Dataset>
	where
		R: std::io::Read,
	{
		let mut reader = csv::ReaderBuilder::new()
			.has_headers(false)
			.flexible(true)
			.trim(csv::Trim::All)
			.from_reader(reader);
		let mut n_columns: Option<usize> = None;
		let mut values: Vec<f32> = Vec::new();
		let mut labels: Vec<i64> = Vec::new();
		let mut record = csv::StringRecord::new();
		let mut is_first_record = true;
		while reader.read_record(&mut record)? {
			let line = record.position().map(|position| position.line()).unwrap_or(0);
			if is_first_record {
				is_first_record = false;
				if !record.iter().all(|field| field.parse::<f64>().is_ok()) {
					continue;
				}
			}
			if n_columns.is_none() && record.len() < 2 {
				return Err(format_err!(
					"line {}: a dataset needs at least one feature column and a label column",
					line
				));
			}
			let n_columns_expected = *n_columns.get_or_insert(record.len());
			if record.len() != n_columns_expected {
				return Err(format_err!(
					"line {}: expected {} columns, got {}",
					line,
					n_columns_expected,
					record.len()
				));
			}
			for (column_index, field) in record.iter().take(n_columns_expected - 1).enumerate() {
				let value: f32 = field.parse().map_err(|_| {
					format_err!(
						"line {}, column {}: {:?} is not a number",
						line,
						column_index + 1,
						field
					)
				})?;
				values.push(value);
			}
			let field = &record[n_columns_expected - 1];
			let label = parse_label(field)
				.ok_or_else(|| format_err!("line {}: the label {:?} is not an integer", line, field))?;
			labels.push(label);
		}
		let n_features = n_columns.map(|n_columns| n_columns - 1).unwrap_or(0);
		let features = Array2::from_shape_vec((labels.len(), n_features), values)?;
		let matrix = FeatureMatrix::new(features, &labels)?;
		Ok(Dataset { name, matrix })
	}
}

/// Labels are integers, but may be written with a zero fractional part, as in `1.0`.
fn parse_label(field: &str) -> Option<i64> {
	field.parse::<i64>().ok().or_else(|| {
		field
			.parse::<f64>()
			.ok()
			.filter(|value| value.is_finite() && value.fract() == 0.0)
			.and_then(|value| value.to_i64())
	})
}

/**
Shuffle the rows of `matrix` with a generator seeded by `seed` and hold out `test_fraction` of them for testing. The train rows are the first `(1 - test_fraction) * n_rows` rows after the shuffle, rounded down, but at least one row is always kept for training. If no rows are held out the test matrix is `None`.
*/
pub fn train_test_split(
	matrix: &FeatureMatrix,
	test_fraction: f64,
	seed: u64,
) -> (FeatureMatrix, Option<FeatureMatrix>) {
	if test_fraction <= 0.0 {
		return (matrix.clone(), None);
	}
	let n_rows = matrix.n_rows();
	let mut row_indexes: Vec<usize> = (0..n_rows).collect();
	let mut rng = Xoshiro256Plus::seed_from_u64(seed);
	row_indexes.shuffle(&mut rng);
	let n_rows_train = ((1.0 - test_fraction) * n_rows.to_f64().unwrap())
		.to_usize()
		.unwrap_or(0)
		.max(1)
		.min(n_rows);
	let (train_indexes, test_indexes) = row_indexes.split_at(n_rows_train);
	let test = if test_indexes.is_empty() {
		None
	} else {
		Some(matrix.select(test_indexes))
	};
	(matrix.select(train_indexes), test)
}

#[test]
fn test_load_dataset_with_header() {
	let csv = "x, y, label\n0.5, 1, 0\n1.5, -2, 1.0\n\n2.5, 3e1, 3\n";
	let dataset = Dataset::from_reader("toy".to_owned(), csv.as_bytes()).unwrap();
	assert_eq!(dataset.name, "toy");
	assert_eq!(dataset.matrix.n_rows(), 3);
	assert_eq!(dataset.matrix.n_features(), 2);
	assert_eq!(dataset.matrix.classes(), &[0, 1, 3]);
	assert_eq!(dataset.matrix.row(2).to_vec(), vec![2.5, 30.0]);
	assert_eq!(dataset.matrix.label(1), 1);
}

#[test]
fn test_load_dataset_without_header() {
	let csv = "1,2,7\n3,4,7\n";
	let dataset = Dataset::from_reader("plain".to_owned(), csv.as_bytes()).unwrap();
	assert_eq!(dataset.matrix.n_rows(), 2);
	assert_eq!(dataset.matrix.classes(), &[7]);
}

#[test]
fn test_invalid_datasets() {
	let invalid = [
		("1,2,0\n3,0\n", "line 2: expected 3 columns, got 2"),
		("1,2,0\n1,a,0\n", "line 2, column 2: \"a\" is not a number"),
		("x,y\n1,0.5\n", "line 2: the label \"0.5\" is not an integer"),
		("1\n2\n", "line 1: a dataset needs at least one feature column and a label column"),
	];
	for (csv, message) in invalid.iter() {
		let error = Dataset::from_reader("invalid".to_owned(), csv.as_bytes())
			.err()
			.unwrap();
		assert_eq!(error.to_string(), *message);
	}
	// The feature matrix rejects values that are not finite.
	assert!(Dataset::from_reader("nan".to_owned(), "1,0\nNaN,1\n".as_bytes()).is_err());
}

#[test]
fn test_list_dataset_paths() {
	let dir = tempfile::tempdir().unwrap();
	for file_name in ["b.csv", "a.data", "c.txt", "notes.md", "d.json"].iter() {
		std::fs::write(dir.path().join(file_name), "0,0\n").unwrap();
	}
	std::fs::create_dir(dir.path().join("e.csv")).unwrap();
	let file_names: Vec<String> = list_dataset_paths(dir.path())
		.unwrap()
		.iter()
		.map(|path| path.file_name().unwrap().to_str().unwrap().to_owned())
		.collect();
	assert_eq!(file_names, vec!["a.data", "b.csv", "c.txt"]);
	let dataset = Dataset::from_path(&dir.path().join("b.csv")).unwrap();
	assert_eq!(dataset.name, "b");
}

#[test]
fn test_train_test_split() {
	let features = Array2::from_shape_fn((10, 1), |(i, _)| i as f32);
	let labels: Vec<i64> = (0..10).map(|i| i % 2).collect();
	let matrix = FeatureMatrix::new(features, &labels).unwrap();
	let (train, test) = train_test_split(&matrix, 0.0, 42);
	assert_eq!(train.n_rows(), 10);
	assert!(test.is_none());
	let (train, test) = train_test_split(&matrix, 0.25, 42);
	let test = test.unwrap();
	assert_eq!(train.n_rows(), 7);
	assert_eq!(test.n_rows(), 3);
	let mut rows: Vec<f32> = train
		.features()
		.iter()
		.chain(test.features().iter())
		.cloned()
		.collect();
	rows.sort_by(|a, b| a.partial_cmp(b).unwrap());
	assert_eq!(rows, (0..10).map(|i| i as f32).collect::<Vec<_>>());
	let (train_again, _) = train_test_split(&matrix, 0.25, 42);
	assert_eq!(train.features(), train_again.features());
}

#[test]
fn test_train_test_split_keeps_one_training_row() {
	let matrix = FeatureMatrix::new(arr2(&[[1.0, 2.0]]), &[3]).unwrap();
	let (train, test) = train_test_split(&matrix, 0.5, 0);
	assert_eq!(train.n_rows(), 1);
	assert!(test.is_none());
	let features = Array2::from_shape_fn((3, 1), |(i, _)| i as f32);
	let matrix = FeatureMatrix::new(features, &[0, 1, 0]).unwrap();
	let (train, test) = train_test_split(&matrix, 0.9, 0);
	assert_eq!(train.n_rows(), 1);
	assert_eq!(test.unwrap().n_rows(), 2);
}
