/*!
This module renders run metrics as LaTeX tables. Each table is described by a JSON format file:

```json
{
	"caption": "Accuracy of the merged trees",
	"label": "tab:accuracy",
	"precision": 2,
	"columns": [
		{ "header": "Instance", "value": "dataset" },
		{ "header": "$D$", "value": "D" },
		{ "header": "Train (\\%)", "value": "trainAccuracy" }
	],
	"rowFilter": { "multivariate": true }
}
```

Every run that matches the row filter becomes one row of the table. Headers and captions are written as they are, so they may contain LaTeX. Dataset names are escaped.
*/

use crate::{config::Config, run::RunMetrics};
use anyhow::{format_err, Context, Result};
use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
};

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TableFormat {
	pub caption: Option<String>,
	pub label: Option<String>,
	/// The number of digits after the decimal point for accuracies and build times.
	#[serde(default = "default_precision")]
	pub precision: usize,
	pub columns: Vec<ColumnFormat>,
	/// Only runs whose values equal every entry of the filter are rendered.
	#[serde(default)]
	pub row_filter: BTreeMap<String, serde_json::Value>,
}

fn default_precision() -> usize {
	2
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnFormat {
	pub header: String,
	pub value: ColumnValue,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Deserialize)]
pub enum ColumnValue {
	#[serde(rename = "dataset")]
	Dataset,
	#[serde(rename = "method")]
	Method,
	#[serde(rename = "time_limit")]
	TimeLimit,
	#[serde(rename = "lambd")]
	Lambd,
	#[serde(rename = "mergePercentage")]
	MergePercentage,
	#[serde(rename = "multivariate")]
	Multivariate,
	#[serde(rename = "D")]
	MaxDepth,
	#[serde(rename = "trainAccuracy")]
	TrainAccuracy,
	#[serde(rename = "testAccuracy")]
	TestAccuracy,
	#[serde(rename = "leavesBeforeMerge")]
	LeavesBeforeMerge,
	#[serde(rename = "leaves")]
	Leaves,
	#[serde(rename = "branches")]
	Branches,
	#[serde(rename = "depth")]
	Depth,
	#[serde(rename = "buildTime")]
	BuildTime,
	#[serde(rename = "truncated")]
	Truncated,
}

/// The value of one column for one run, before formatting.
#[derive(Debug, PartialEq)]
enum Cell {
	Text(String),
	Number(f64),
	Count(usize),
	Flag(bool),
	Accuracy(Option<f32>),
	Seconds(f64),
}

impl ColumnValue {
	fn cell(self, metrics: &RunMetrics) -> Cell {
		match self {
			ColumnValue::Dataset => Cell::Text(metrics.dataset.clone()),
			ColumnValue::Method => Cell::Text(metrics.method.name().to_owned()),
			ColumnValue::TimeLimit => Cell::Number(metrics.grid_item.time_limit),
			ColumnValue::Lambd => Cell::Number(metrics.grid_item.lambd),
			ColumnValue::MergePercentage => Cell::Number(metrics.grid_item.merge_percentage),
			ColumnValue::Multivariate => Cell::Flag(metrics.grid_item.multivariate),
			ColumnValue::MaxDepth => Cell::Number(metrics.grid_item.max_depth as f64),
			ColumnValue::TrainAccuracy => Cell::Accuracy(Some(metrics.train_accuracy)),
			ColumnValue::TestAccuracy => Cell::Accuracy(metrics.test_accuracy),
			ColumnValue::LeavesBeforeMerge => Cell::Count(metrics.n_leaves_before_merge),
			ColumnValue::Leaves => Cell::Count(metrics.n_leaves),
			ColumnValue::Branches => Cell::Count(metrics.n_branches),
			ColumnValue::Depth => Cell::Count(metrics.depth),
			ColumnValue::BuildTime => Cell::Seconds(metrics.build_time),
			ColumnValue::Truncated => Cell::Flag(metrics.truncated),
		}
	}

	fn alignment(self) -> char {
		match self {
			ColumnValue::Dataset | ColumnValue::Method => 'l',
			ColumnValue::Multivariate | ColumnValue::Truncated => 'c',
			_ => 'r',
		}
	}
}

impl Cell {
	fn format(&self, precision: usize) -> String {
		match self {
			Cell::Text(text) => escape(text),
			Cell::Number(value) => value.to_string(),
			Cell::Count(value) => value.to_string(),
			Cell::Flag(true) => "yes".to_owned(),
			Cell::Flag(false) => "no".to_owned(),
			Cell::Accuracy(Some(accuracy)) => {
				format!("{:.*}", precision, f64::from(*accuracy) * 100.0)
			}
			Cell::Accuracy(None) => "-".to_owned(),
			Cell::Seconds(seconds) => format!("{:.*}", precision, seconds),
		}
	}

	fn matches(&self, value: &serde_json::Value) -> bool {
		match (self, value) {
			(Cell::Text(text), serde_json::Value::String(expected)) => text == expected,
			(Cell::Number(number), serde_json::Value::Number(expected)) => {
				expected.as_f64() == Some(*number)
			}
			(Cell::Count(count), serde_json::Value::Number(expected)) => {
				expected.as_u64() == Some(*count as u64)
			}
			(Cell::Flag(flag), serde_json::Value::Bool(expected)) => flag == expected,
			(Cell::Accuracy(None), serde_json::Value::Null) => true,
			(Cell::Accuracy(Some(accuracy)), serde_json::Value::Number(expected)) => {
				expected.as_f64() == Some(f64::from(*accuracy))
			}
			(Cell::Seconds(seconds), serde_json::Value::Number(expected)) => {
				expected.as_f64() == Some(*seconds)
			}
			_ => false,
		}
	}
}

/// Escape the characters that are special in LaTeX text.
pub fn escape(text: &str) -> String {
	let mut escaped = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' | '%' | '$' | '#' | '_' | '{' | '}' => {
				escaped.push('\\');
				escaped.push(c);
			}
			'~' => escaped.push_str("\\textasciitilde{}"),
			'^' => escaped.push_str("\\textasciicircum{}"),
			'\\' => escaped.push_str("\\textbackslash{}"),
			_ => escaped.push(c),
		}
	}
	escaped
}

impl TableFormat {
	pub fn from_path(path: &Path) -> Result<TableFormat> {
		let format = std::fs::read_to_string(path)
			.with_context(|| format!("failed to read latex format file {}", path.display()))?;
		let format = TableFormat::from_json(&format)
			.with_context(|| format!("failed to parse latex format file {}", path.display()))?;
		Ok(format)
	}

	pub fn from_json(json: &str) -> Result<TableFormat> {
		let format: TableFormat = serde_json::from_str(json)?;
		if format.columns.is_empty() {
			return Err(format_err!("a table needs at least one column"));
		}
		// Unknown filter keys are an error.
		format.parsed_row_filter()?;
		Ok(format)
	}

	fn parsed_row_filter(&self) -> Result<Vec<(ColumnValue, &serde_json::Value)>> {
		self.row_filter
			.iter()
			.map(|(key, value)| {
				let column_value: ColumnValue =
					serde_json::from_value(serde_json::Value::String(key.clone()))
						.map_err(|_| format_err!("unknown rowFilter key {:?}", key))?;
				Ok((column_value, value))
			})
			.collect()
	}

	/// Render one `table` environment with a row for each run that matches the row filter.
	pub fn render(&self, results: &[RunMetrics]) -> Result<String> {
		let row_filter = self.parsed_row_filter()?;
		let alignments: String = self
			.columns
			.iter()
			.map(|column| column.value.alignment())
			.collect();
		let headers: Vec<&str> = self
			.columns
			.iter()
			.map(|column| column.header.as_str())
			.collect();
		let mut table = String::new();
		table.push_str("\\begin{table}[htbp]\n");
		table.push_str("\\centering\n");
		if let Some(caption) = &self.caption {
			table.push_str(&format!("\\caption{{{}}}\n", caption));
		}
		if let Some(label) = &self.label {
			table.push_str(&format!("\\label{{{}}}\n", label));
		}
		table.push_str(&format!("\\begin{{tabular}}{{{}}}\n", alignments));
		table.push_str("\\hline\n");
		table.push_str(&format!("{} \\\\\n", headers.join(" & ")));
		table.push_str("\\hline\n");
		for metrics in results.iter().filter(|metrics| {
			row_filter
				.iter()
				.all(|(column_value, expected)| column_value.cell(metrics).matches(expected))
		}) {
			let cells: Vec<String> = self
				.columns
				.iter()
				.map(|column| column.value.cell(metrics).format(self.precision))
				.collect();
			table.push_str(&format!("{} \\\\\n", cells.join(" & ")));
		}
		table.push_str("\\hline\n");
		table.push_str("\\end{tabular}\n");
		table.push_str("\\end{table}\n");
		Ok(table)
	}
}

/// Render one table per format file in the config and write them to the config's output file, creating its parent directories. Returns the path written, or `None` if the config has no format files.
pub fn write_report(config: &Config, results: &[RunMetrics]) -> Result<Option<PathBuf>> {
	let output_path = match (&config.latex_output_file, config.latex_format_path.is_empty()) {
		(Some(output_path), false) => output_path,
		_ => return Ok(None),
	};
	let tables = config
		.latex_format_path
		.iter()
		.map(|format_path| TableFormat::from_path(format_path)?.render(results))
		.collect::<Result<Vec<_>>>()?;
	if let Some(parent) = output_path.parent() {
		std::fs::create_dir_all(parent)
			.with_context(|| format!("failed to create directory {}", parent.display()))?;
	}
	std::fs::write(output_path, tables.join("\n"))
		.with_context(|| format!("failed to write report {}", output_path.display()))?;
	tracing::info!(
		path = %output_path.display(),
		n_tables = tables.len(),
		n_runs = results.len(),
		"wrote report"
	);
	Ok(Some(output_path.clone()))
}

#[cfg(test)]
fn sample_results() -> Vec<RunMetrics> {
	use crate::{config::ResolutionMethod, grid::GridItem};
	let metrics = |dataset: &str, multivariate: bool, train_accuracy: f32, test_accuracy| {
		RunMetrics {
			dataset: dataset.to_owned(),
			method: ResolutionMethod::BuildTree,
			grid_item: GridItem {
				time_limit: 10.0,
				lambd: 0.9,
				merge_percentage: 50.0,
				multivariate,
				max_depth: 3,
			},
			train_accuracy,
			test_accuracy,
			n_leaves_before_merge: 8,
			n_leaves: 4,
			n_branches: 3,
			depth: 2,
			build_time: 0.3,
			truncated: false,
		}
	};
	vec![
		metrics("iris_small", true, 0.96, Some(0.9)),
		metrics("50%_wine&co", false, 2.0 / 3.0, None),
	]
}

#[test]
fn test_render_table() {
	let format = TableFormat::from_json(
		r#"{
			"caption": "Accuracy",
			"label": "tab:accuracy",
			"precision": 1,
			"columns": [
				{"header": "Instance", "value": "dataset"},
				{"header": "Multi", "value": "multivariate"},
				{"header": "$\\lambda$", "value": "lambd"},
				{"header": "$D$", "value": "D"},
				{"header": "Leaves", "value": "leaves"},
				{"header": "Train", "value": "trainAccuracy"},
				{"header": "Test", "value": "testAccuracy"},
				{"header": "Time", "value": "buildTime"}
			]
		}"#,
	)
	.unwrap();
	let table = format.render(&sample_results()).unwrap();
	insta::assert_snapshot!(table.trim_end(), @r###"
 \begin{table}[htbp]
 \centering
 \caption{Accuracy}
 \label{tab:accuracy}
 \begin{tabular}{lcrrrrrr}
 \hline
 Instance & Multi & $\lambda$ & $D$ & Leaves & Train & Test & Time \\
 \hline
 iris\_small & yes & 0.9 & 3 & 4 & 96.0 & 90.0 & 0.3 \\
 50\%\_wine\&co & no & 0.9 & 3 & 4 & 66.7 & - & 0.3 \\
 \hline
 \end{tabular}
 \end{table}
 "###);
}

#[test]
fn test_row_filter() {
	let format = TableFormat::from_json(
		r#"{"columns": [{"header": "Instance", "value": "dataset"}], "rowFilter": {"multivariate": false, "D": 3}}"#,
	)
	.unwrap();
	let table = format.render(&sample_results()).unwrap();
	assert!(table.contains("50\\%\\_wine\\&co \\\\\n"));
	assert!(!table.contains("iris"));
	assert!(
		TableFormat::from_json(r#"{"columns": [{"header": "a", "value": "dataset"}], "rowFilter": {"depthh": 3}}"#)
			.is_err()
	);
	assert!(TableFormat::from_json(r#"{"columns": [{"header": "a", "value": "accuracy"}]}"#).is_err());
	assert!(TableFormat::from_json(r#"{"columns": []}"#).is_err());
}

#[test]
fn test_escape() {
	assert_eq!(escape("a_b%c&d"), "a\\_b\\%c\\&d");
	assert_eq!(escape("x^2~y\\z"), "x\\textasciicircum{}2\\textasciitilde{}y\\textbackslash{}z");
	assert_eq!(escape("plain"), "plain");
}

#[test]
fn test_write_report() {
	let dir = tempfile::tempdir().unwrap();
	let format_path = dir.path().join("config").join("latexTable.json");
	std::fs::create_dir(dir.path().join("config")).unwrap();
	std::fs::write(
		&format_path,
		r#"{"columns": [{"header": "Instance", "value": "dataset"}, {"header": "Train", "value": "trainAccuracy"}]}"#,
	)
	.unwrap();
	let config = Config::from_json(
		r#"{"instancesPaths": "data", "latexFormatPath": ["config/latexTable.json", "config/latexTable.json"], "latexOutputFile": "results/nested/tables.tex"}"#,
	)
	.unwrap()
	.resolve_paths(dir.path());
	let path = write_report(&config, &sample_results()).unwrap().unwrap();
	assert_eq!(path, dir.path().join("results/nested/tables.tex"));
	let report = std::fs::read_to_string(&path).unwrap();
	assert_eq!(report.matches("\\begin{table}").count(), 2);
	assert!(report.contains("iris\\_small & 96.00 \\\\\n"));
	let config = Config::from_json(r#"{"instancesPaths": "data"}"#).unwrap();
	assert_eq!(write_report(&config, &sample_results()).unwrap(), None);
}
