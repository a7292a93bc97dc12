/*!
This module defines the `Config` struct, which describes an experiment to [`run`](../run/fn.run.html). Configs are JSON files. The file may carry a `.js` extension, but its contents must be a plain JSON object.
*/

use anyhow::{format_err, Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
	/// The directory containing the datasets.
	pub instances_paths: PathBuf,
	#[serde(default = "default_resolution_methods")]
	pub resolution_methods: Vec<ResolutionMethod>,
	/// Each format file describes one LaTeX table.
	#[serde(default)]
	pub latex_format_path: Vec<PathBuf>,
	/// The tables are written to this file.
	pub latex_output_file: Option<PathBuf>,
	#[serde(default)]
	pub parameters_to_combine: ParametersToCombine,
	/// The fraction of each dataset held out to measure test accuracy. With the default of zero every instance is used for training.
	#[serde(default)]
	pub test_fraction: f64,
	/// Seeds the shuffle that precedes the train test split.
	#[serde(default = "default_shuffle_seed")]
	pub shuffle_seed: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Deserialize)]
pub enum ResolutionMethod {
	#[serde(rename = "build_tree")]
	BuildTree,
}

impl ResolutionMethod {
	pub fn name(self) -> &'static str {
		match self {
			ResolutionMethod::BuildTree => "build_tree",
		}
	}
}

impl std::fmt::Display for ResolutionMethod {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{}", self.name())
	}
}

/// The values to try for each build parameter. Every combination is run. A key that is missing from the config takes a single default value.
#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParametersToCombine {
	#[serde(default = "default_time_limit")]
	pub time_limit: Vec<f64>,
	#[serde(default = "default_lambd")]
	pub lambd: Vec<f64>,
	#[serde(rename = "mergePercentage", default = "default_merge_percentage")]
	pub merge_percentage: Vec<f64>,
	#[serde(default = "default_multivariate")]
	pub multivariate: Vec<bool>,
	#[serde(rename = "D", default = "default_max_depth")]
	pub max_depth: Vec<i64>,
}

impl Default for ParametersToCombine {
	fn default() -> Self {
		Self {
			time_limit: default_time_limit(),
			lambd: default_lambd(),
			merge_percentage: default_merge_percentage(),
			multivariate: default_multivariate(),
			max_depth: default_max_depth(),
		}
	}
}

fn default_resolution_methods() -> Vec<ResolutionMethod> {
	vec![ResolutionMethod::BuildTree]
}

fn default_shuffle_seed() -> u64 {
	42
}

fn default_time_limit() -> Vec<f64> {
	vec![10.0]
}

fn default_lambd() -> Vec<f64> {
	vec![0.0]
}

fn default_merge_percentage() -> Vec<f64> {
	vec![0.0]
}

fn default_multivariate() -> Vec<bool> {
	vec![false]
}

fn default_max_depth() -> Vec<i64> {
	vec![3]
}

impl Config {
	/// Read and validate the config at `path`. Relative paths in the config are left as they are. Call [`resolve_paths`](#method.resolve_paths) to anchor them.
	pub fn from_path(path: &Path) -> Result<Config> {
		let config = std::fs::read_to_string(path)
			.with_context(|| format!("failed to read config file {}", path.display()))?;
		let config = Config::from_json(&config)
			.with_context(|| format!("failed to parse config file {}", path.display()))?;
		Ok(config)
	}

	pub fn from_json(json: &str) -> Result<Config> {
		let config: Config = serde_json::from_str(json)?;
		config.validate()?;
		Ok(config)
	}

	/// Check every value in the config. This runs before any dataset is loaded.
	pub fn validate(&self) -> Result<()> {
		if self.resolution_methods.is_empty() {
			return Err(format_err!("resolutionMethods must not be empty"));
		}
		let parameters = &self.parameters_to_combine;
		let lengths = [
			("time_limit", parameters.time_limit.len()),
			("lambd", parameters.lambd.len()),
			("mergePercentage", parameters.merge_percentage.len()),
			("multivariate", parameters.multivariate.len()),
			("D", parameters.max_depth.len()),
		];
		for (name, len) in lengths.iter() {
			if *len == 0 {
				return Err(format_err!("parametersToCombine.{} must not be empty", name));
			}
		}
		if let Some(time_limit) = parameters
			.time_limit
			.iter()
			.find(|time_limit| !time_limit.is_finite() || **time_limit <= 0.0)
		{
			return Err(format_err!(
				"time_limit must be a positive number of seconds, got {}",
				time_limit
			));
		}
		if let Some(lambd) = parameters
			.lambd
			.iter()
			.find(|lambd| !lambd.is_finite() || **lambd < 0.0)
		{
			return Err(format_err!("lambd must not be negative, got {}", lambd));
		}
		if let Some(merge_percentage) = parameters
			.merge_percentage
			.iter()
			.find(|merge_percentage| !(0.0..=100.0).contains(*merge_percentage))
		{
			return Err(format_err!(
				"mergePercentage must be between 0 and 100, got {}",
				merge_percentage
			));
		}
		if let Some(max_depth) = parameters.max_depth.iter().find(|max_depth| **max_depth < 0) {
			return Err(format_err!("D must not be negative, got {}", max_depth));
		}
		if !(0.0..1.0).contains(&self.test_fraction) {
			return Err(format_err!(
				"testFraction must be at least 0 and less than 1, got {}",
				self.test_fraction
			));
		}
		if !self.latex_format_path.is_empty() && self.latex_output_file.is_none() {
			return Err(format_err!(
				"latexOutputFile is required when latexFormatPath is given"
			));
		}
		Ok(())
	}

	/// Anchor every relative path in the config at `root`. Absolute paths are kept.
	pub fn resolve_paths(mut self, root: &Path) -> Config {
		self.instances_paths = root.join(&self.instances_paths);
		self.latex_format_path = self
			.latex_format_path
			.iter()
			.map(|path| root.join(path))
			.collect();
		self.latex_output_file = self.latex_output_file.map(|path| root.join(path));
		self
	}
}

#[test]
fn test_parse_experiment_config() {
	let config = Config::from_json(
		r#"{
			"instancesPaths": "./data",
			"resolutionMethods": ["build_tree"],
			"latexFormatPath": ["./config/latexTable.json"],
			"latexOutputFile": "./results/result_tables.tex",
			"parametersToCombine": {"time_limit": [10], "lambd": [0.9], "mergePercentage": [100, 90, 80, 70, 60, 50, 40, 30, 20, 10, 0], "multivariate": [true, false], "D": [2, 3, 4, 5]}
		}"#,
	)
	.unwrap();
	assert_eq!(config.instances_paths, PathBuf::from("./data"));
	assert_eq!(config.resolution_methods, vec![ResolutionMethod::BuildTree]);
	assert_eq!(config.parameters_to_combine.time_limit, vec![10.0]);
	assert_eq!(config.parameters_to_combine.lambd, vec![0.9]);
	assert_eq!(config.parameters_to_combine.merge_percentage.len(), 11);
	assert_eq!(config.parameters_to_combine.multivariate, vec![true, false]);
	assert_eq!(config.parameters_to_combine.max_depth, vec![2, 3, 4, 5]);
	assert_eq!(config.test_fraction, 0.0);
	assert_eq!(config.shuffle_seed, 42);
}

#[test]
fn test_missing_parameters_take_defaults() {
	let config = Config::from_json(r#"{"instancesPaths": "data", "parametersToCombine": {"D": [1]}}"#)
		.unwrap();
	let parameters = &config.parameters_to_combine;
	assert_eq!(parameters.time_limit, vec![10.0]);
	assert_eq!(parameters.lambd, vec![0.0]);
	assert_eq!(parameters.merge_percentage, vec![0.0]);
	assert_eq!(parameters.multivariate, vec![false]);
	assert_eq!(parameters.max_depth, vec![1]);
	assert_eq!(config.resolution_methods, vec![ResolutionMethod::BuildTree]);
	assert!(config.latex_format_path.is_empty());
}

#[test]
fn test_invalid_configs_are_rejected() {
	let invalid = [
		// Unknown parameter.
		r#"{"instancesPaths": "data", "parametersToCombine": {"depth": [3]}}"#,
		// Unknown top level key.
		r#"{"instancesPaths": "data", "instancePath": "data"}"#,
		// Unknown resolution method.
		r#"{"instancesPaths": "data", "resolutionMethods": ["solve_mip"]}"#,
		r#"{"instancesPaths": "data", "resolutionMethods": []}"#,
		r#"{"instancesPaths": "data", "parametersToCombine": {"lambd": []}}"#,
		r#"{"instancesPaths": "data", "parametersToCombine": {"time_limit": [0]}}"#,
		r#"{"instancesPaths": "data", "parametersToCombine": {"lambd": [-1]}}"#,
		r#"{"instancesPaths": "data", "parametersToCombine": {"mergePercentage": [101]}}"#,
		r#"{"instancesPaths": "data", "parametersToCombine": {"D": [-1]}}"#,
		r#"{"instancesPaths": "data", "parametersToCombine": {"D": [2.5]}}"#,
		r#"{"instancesPaths": "data", "testFraction": 1}"#,
		r#"{"instancesPaths": "data", "latexFormatPath": ["table.json"]}"#,
	];
	for json in invalid.iter() {
		assert!(Config::from_json(json).is_err(), "accepted {}", json);
	}
	let error = Config::from_json(r#"{"instancesPaths": "data", "parametersToCombine": {"D": []}}"#)
		.unwrap_err();
	insta::assert_display_snapshot!(error, @"parametersToCombine.D must not be empty");
}

#[test]
fn test_from_path_and_resolve_paths() {
	let dir = tempfile::tempdir().unwrap();
	let config_path = dir.path().join("expe.js");
	std::fs::write(
		&config_path,
		r#"{"instancesPaths": "./data", "latexFormatPath": ["./config/table.json"], "latexOutputFile": "/tmp/out.tex"}"#,
	)
	.unwrap();
	let config = Config::from_path(&config_path)
		.unwrap()
		.resolve_paths(Path::new("/experiments/trees"));
	assert_eq!(config.instances_paths, PathBuf::from("/experiments/trees/data"));
	assert_eq!(
		config.latex_format_path,
		vec![PathBuf::from("/experiments/trees/config/table.json")]
	);
	assert_eq!(config.latex_output_file, Some(PathBuf::from("/tmp/out.tex")));
	let error = Config::from_path(&dir.path().join("missing.js")).unwrap_err();
	assert!(error.to_string().starts_with("failed to read config file"));
}
