use crate::{
	config::{Config, ResolutionMethod},
	dataset::{list_dataset_paths, train_test_split, Dataset},
	grid::{compute_grid, GridItem},
};
use anyhow::{format_err, Context, Result};
use itertools::iproduct;
use num_traits::ToPrimitive;
use rayon::prelude::*;
use treesweep_metrics::{Accuracy, StreamingMetric};
use treesweep_tree::{FeatureMatrix, Tree};
use treesweep_util::progress_counter::ProgressCounter;

/// The measurements taken from one run: one tree built on one dataset with one grid item.
#[derive(Clone, Debug)]
pub struct RunMetrics {
	pub dataset: String,
	pub method: ResolutionMethod,
	pub grid_item: GridItem,
	/// The accuracy of the merged tree on the training instances.
	pub train_accuracy: f32,
	/// The accuracy of the merged tree on the held out instances, if any were held out.
	pub test_accuracy: Option<f32>,
	pub n_leaves_before_merge: usize,
	pub n_leaves: usize,
	pub n_branches: usize,
	pub depth: usize,
	/// The wall clock seconds spent building the tree, not counting the merge.
	pub build_time: f64,
	/// True if the deadline fired during the build.
	pub truncated: bool,
}

struct PreparedDataset {
	name: String,
	train: FeatureMatrix,
	test: Option<FeatureMatrix>,
}

/**
Run every combination of dataset, resolution method, and grid item in the experiment. Runs execute in parallel on the rayon thread pool, each with its own deadline. The results are returned in the order datasets, then methods, then grid items, regardless of which run finishes first.
*/
pub fn run(config: &Config) -> Result<Vec<RunMetrics>> {
	let dataset_paths = list_dataset_paths(&config.instances_paths)?;
	if dataset_paths.is_empty() {
		return Err(format_err!(
			"no datasets were found in {}",
			config.instances_paths.display()
		));
	}
	let datasets = dataset_paths
		.iter()
		.map(|path| {
			let dataset = Dataset::from_path(path)?;
			let (train, test) =
				train_test_split(&dataset.matrix, config.test_fraction, config.shuffle_seed);
			tracing::info!(
				dataset = %dataset.name,
				n_rows = dataset.matrix.n_rows(),
				n_features = dataset.matrix.n_features(),
				n_classes = dataset.matrix.n_classes(),
				n_rows_test = test.as_ref().map(|test| test.n_rows()).unwrap_or(0),
				"loaded dataset"
			);
			Ok(PreparedDataset {
				name: dataset.name,
				train,
				test,
			})
		})
		.collect::<Result<Vec<_>>>()?;
	let grid = compute_grid(&config.parameters_to_combine);
	let runs: Vec<(&PreparedDataset, ResolutionMethod, &GridItem)> = iproduct!(
		datasets.iter(),
		config.resolution_methods.iter().cloned(),
		grid.iter()
	)
	.collect();
	let progress_counter = ProgressCounter::new(runs.len().to_u64().unwrap());
	tracing::info!(
		n_datasets = datasets.len(),
		n_grid_items = grid.len(),
		n_runs = runs.len(),
		"starting experiment"
	);
	let results = runs
		.par_iter()
		.map(|(dataset, method, grid_item)| {
			let metrics = match method {
				ResolutionMethod::BuildTree => build_tree(dataset, grid_item),
			}
			.with_context(|| {
				format!(
					"run failed for dataset {} with {} {}",
					dataset.name, method, grid_item
				)
			})?;
			let n_runs_completed = progress_counter.inc(1);
			tracing::info!(
				dataset = %metrics.dataset,
				%grid_item,
				train_accuracy = metrics.train_accuracy,
				n_leaves = metrics.n_leaves,
				truncated = metrics.truncated,
				progress = %format!("{}/{}", n_runs_completed, progress_counter.total()),
				"finished run"
			);
			Ok(metrics)
		})
		.collect::<Result<Vec<_>>>()?;
	tracing::info!(
		n_runs_completed = progress_counter.get(),
		"finished experiment"
	);
	Ok(results)
}

fn build_tree(dataset: &PreparedDataset, grid_item: &GridItem) -> Result<RunMetrics> {
	let tree = treesweep_tree::train(&dataset.train, &grid_item.train_options())?;
	let merged = treesweep_tree::merge_leaves(&tree, grid_item.merge_percentage)?;
	Ok(RunMetrics {
		dataset: dataset.name.clone(),
		method: ResolutionMethod::BuildTree,
		grid_item: grid_item.clone(),
		train_accuracy: compute_accuracy(&merged, &dataset.train).unwrap_or(0.0),
		test_accuracy: dataset
			.test
			.as_ref()
			.and_then(|test| compute_accuracy(&merged, test)),
		n_leaves_before_merge: tree.n_leaves(),
		n_leaves: merged.n_leaves(),
		n_branches: merged.n_branches(),
		depth: merged.depth(),
		build_time: tree.build_duration.as_secs_f64(),
		truncated: tree.truncated,
	})
}

/// Compute the accuracy of `tree` on every row of `matrix`. Returns `None` if the matrix has no rows.
pub fn compute_accuracy(tree: &Tree, matrix: &FeatureMatrix) -> Option<f32> {
	let mut accuracy = Accuracy::new();
	for row_index in 0..matrix.n_rows() {
		accuracy.update((tree.predict(matrix.row(row_index)), matrix.label(row_index)));
	}
	accuracy.finalize()
}

#[cfg(test)]
fn write_experiment(dir: &std::path::Path, parameters: &str) -> Config {
	let data_dir = dir.join("data");
	std::fs::create_dir(&data_dir).unwrap();
	std::fs::write(
		data_dir.join("b_line.csv"),
		"x,y,label\n0,0,0\n1,0,0\n3,0,1\n4,1,1\n",
	)
	.unwrap();
	std::fs::write(
		data_dir.join("a_blobs.csv"),
		"0,0,5\n0,1,5\n1,0,5\n5,5,6\n5,6,6\n6,5,6\n6,6,6\n",
	)
	.unwrap();
	std::fs::write(data_dir.join("readme.md"), "not a dataset").unwrap();
	let json = format!(
		r#"{{"instancesPaths": "data", "parametersToCombine": {}}}"#,
		parameters
	);
	Config::from_json(&json).unwrap().resolve_paths(dir)
}

#[test]
fn test_run_experiment() {
	let dir = tempfile::tempdir().unwrap();
	let config = write_experiment(
		dir.path(),
		r#"{"mergePercentage": [0, 100], "D": [0, 2]}"#,
	);
	let results = run(&config).unwrap();
	let summary: Vec<(String, f64, i64, f32, usize, usize)> = results
		.iter()
		.map(|metrics| {
			(
				metrics.dataset.clone(),
				metrics.grid_item.merge_percentage,
				metrics.grid_item.max_depth,
				metrics.train_accuracy,
				metrics.n_leaves_before_merge,
				metrics.n_leaves,
			)
		})
		.collect();
	let expected: Vec<(String, f64, i64, f32, usize, usize)> = vec![
		("a_blobs".to_owned(), 0.0, 0, 4.0 / 7.0, 1, 1),
		("a_blobs".to_owned(), 0.0, 2, 1.0, 2, 2),
		("a_blobs".to_owned(), 100.0, 0, 4.0 / 7.0, 1, 1),
		("a_blobs".to_owned(), 100.0, 2, 4.0 / 7.0, 2, 1),
		("b_line".to_owned(), 0.0, 0, 0.5, 1, 1),
		("b_line".to_owned(), 0.0, 2, 1.0, 2, 2),
		("b_line".to_owned(), 100.0, 0, 0.5, 1, 1),
		("b_line".to_owned(), 100.0, 2, 0.5, 2, 1),
	];
	assert_eq!(summary, expected);
	for metrics in results.iter() {
		assert_eq!(metrics.method, ResolutionMethod::BuildTree);
		assert!(metrics.test_accuracy.is_none());
		assert!(!metrics.truncated);
		assert_eq!(metrics.n_branches + 1, metrics.n_leaves);
	}
}

#[test]
fn test_run_with_test_fraction() {
	let dir = tempfile::tempdir().unwrap();
	let mut config = write_experiment(dir.path(), r#"{"D": [1]}"#);
	config.test_fraction = 0.5;
	let results = run(&config).unwrap();
	assert_eq!(results.len(), 2);
	for metrics in results.iter() {
		let test_accuracy = metrics.test_accuracy.unwrap();
		assert!((0.0..=1.0).contains(&test_accuracy));
	}
}

#[test]
fn test_run_without_datasets() {
	let dir = tempfile::tempdir().unwrap();
	std::fs::create_dir(dir.path().join("data")).unwrap();
	let config = Config::from_json(r#"{"instancesPaths": "data"}"#)
		.unwrap()
		.resolve_paths(dir.path());
	let error = run(&config).unwrap_err();
	assert!(error.to_string().starts_with("no datasets were found in"));
}

#[test]
fn test_demo_experiment() {
	use crate::report::TableFormat;
	let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/classification_tree");
	let config = Config::from_path(&root.join("config/expe.js"))
		.unwrap()
		.resolve_paths(&root);
	let results = run(&config).unwrap();
	assert_eq!(results.len(), 2 * 11 * 2 * 4);
	for metrics in results.iter() {
		assert!(metrics.n_leaves <= metrics.n_leaves_before_merge);
		assert!(metrics.depth <= metrics.grid_item.max_depth as usize);
		assert!((0.0..=1.0).contains(&metrics.train_accuracy));
	}
	let table = TableFormat::from_path(&config.latex_format_path[0])
		.unwrap()
		.render(&results)
		.unwrap();
	// One header row and one row per run.
	assert_eq!(table.matches(" \\\\\n").count(), results.len() + 1);
}
