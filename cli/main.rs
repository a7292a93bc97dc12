//! This module contains the main entrypoint to the treesweep cli.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use treesweep_core::{config::Config, dataset::Dataset, report, run::compute_accuracy};
use treesweep_tree::TrainOptions;

#[derive(Parser)]
#[clap(
	name = "treesweep",
	about = "Build classification trees under a time limit and sweep their parameters."
)]
enum Options {
	#[clap(name = "run")]
	Run(RunOptions),
	#[clap(name = "build")]
	Build(BuildOptions),
}

#[derive(Parser, Debug)]
#[clap(about = "run an experiment")]
#[clap(
	long_about = "build a tree for every dataset and combination of parameters in an experiment config and write the latex report"
)]
struct RunOptions {
	#[clap(short, long, help = "the path to the experiment config")]
	config: PathBuf,
	#[clap(
		long,
		help = "the directory relative paths in the config are resolved against, defaults to the working directory"
	)]
	root: Option<PathBuf>,
	#[clap(long, help = "the number of worker threads, defaults to one per cpu")]
	threads: Option<usize>,
}

#[derive(Parser, Debug)]
#[clap(about = "build a single tree")]
#[clap(long_about = "build a single tree from a .csv file and print it")]
struct BuildOptions {
	#[clap(short, long, help = "the path to your .csv file")]
	data: PathBuf,
	#[clap(short = 'D', long = "depth", default_value = "3", help = "the maximum depth")]
	max_depth: i64,
	#[clap(long, default_value = "0", help = "the regularization weight")]
	lambd: f64,
	#[clap(long, default_value = "10", help = "the time limit in seconds")]
	time_limit: f64,
	#[clap(long, help = "split on hyperplanes instead of single features")]
	multivariate: bool,
	#[clap(
		long,
		default_value = "0",
		help = "the percentage of leaves to merge after the build"
	)]
	merge_percentage: f64,
	#[clap(long, default_value = "0", help = "seeds the multivariate search")]
	seed: u64,
}

fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "treesweep=info".into()),
		)
		.with_writer(std::io::stderr)
		.init();
	let options = Options::parse();
	let result = match options {
		Options::Run(options) => cli_run(options),
		Options::Build(options) => cli_build(options),
	};
	if let Err(error) = result {
		eprintln!("{}: {:#}", "error".red().bold(), error);
		std::process::exit(1);
	}
}

fn cli_run(options: RunOptions) -> Result<()> {
	if let Some(threads) = options.threads {
		rayon::ThreadPoolBuilder::new()
			.num_threads(threads)
			.build_global()
			.context("failed to start the thread pool")?;
	}
	let root = match options.root {
		Some(root) => root,
		None => std::env::current_dir().context("failed to read the working directory")?,
	};
	let config = Config::from_path(&options.config)?.resolve_paths(&root);
	let results = treesweep_core::run(&config)?;
	match report::write_report(&config, &results)? {
		Some(path) => eprintln!(
			"Wrote the results of {} runs to {}.",
			results.len(),
			path.display()
		),
		None => eprintln!(
			"Finished {} runs. The config names no latex format files, so no report was written.",
			results.len()
		),
	}
	Ok(())
}

fn cli_build(options: BuildOptions) -> Result<()> {
	let dataset = Dataset::from_path(&options.data)?;
	let train_options = TrainOptions {
		time_limit: options.time_limit,
		lambd: options.lambd,
		max_depth: options.max_depth,
		multivariate: options.multivariate,
		seed: options.seed,
		..Default::default()
	};
	let tree = treesweep_tree::train(&dataset.matrix, &train_options)?;
	let merged = treesweep_tree::merge_leaves(&tree, options.merge_percentage)?;
	print!("{}", merged);
	println!();
	if let Some(accuracy) = compute_accuracy(&merged, &dataset.matrix) {
		println!("training accuracy: {:.2}%", f64::from(accuracy) * 100.0);
	}
	println!(
		"leaves: {} (before merging {}), depth: {}",
		merged.n_leaves(),
		tree.n_leaves(),
		merged.depth()
	);
	println!(
		"build time: {:.3}s{}",
		tree.build_duration.as_secs_f64(),
		if tree.truncated {
			", stopped at the time limit"
		} else {
			""
		}
	);
	Ok(())
}
