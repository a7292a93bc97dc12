/*!
This crate runs classification tree experiments. An experiment is described by a JSON [`Config`](config/struct.Config.html): a directory of datasets, the resolution methods to run, lists of values for each build parameter, and the LaTeX tables to produce. [`run`](run/fn.run.html) trains one tree per dataset, method, and combination of parameter values, and [`report`](report/index.html) renders the collected metrics.
*/

#![allow(clippy::tabs_in_doc_comments)]

pub mod config;
pub mod dataset;
pub mod grid;
pub mod report;
pub mod run;

pub use self::config::Config;
pub use self::run::{run, RunMetrics};
