use crate::config::ParametersToCombine;
use itertools::iproduct;
use treesweep_tree::TrainOptions;

/// A `GridItem` is one combination of build parameters from the experiment's grid.
#[derive(Clone, Debug, PartialEq)]
pub struct GridItem {
	pub time_limit: f64,
	pub lambd: f64,
	pub merge_percentage: f64,
	pub multivariate: bool,
	pub max_depth: i64,
}

impl GridItem {
	pub fn train_options(&self) -> TrainOptions {
		TrainOptions {
			time_limit: self.time_limit,
			lambd: self.lambd,
			max_depth: self.max_depth,
			multivariate: self.multivariate,
			..Default::default()
		}
	}
}

impl std::fmt::Display for GridItem {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(
			f,
			"time_limit={} lambd={} mergePercentage={} multivariate={} D={}",
			self.time_limit, self.lambd, self.merge_percentage, self.multivariate, self.max_depth
		)
	}
}

/// Compute the cartesian product of the parameter lists. The first list varies slowest: items are ordered by time limit, then lambd, then merge percentage, then multivariate, then depth, each in the order the values appear in the config.
pub fn compute_grid(parameters: &ParametersToCombine) -> Vec<GridItem> {
	iproduct!(
		parameters.time_limit.iter(),
		parameters.lambd.iter(),
		parameters.merge_percentage.iter(),
		parameters.multivariate.iter(),
		parameters.max_depth.iter()
	)
	.map(
		|(&time_limit, &lambd, &merge_percentage, &multivariate, &max_depth)| GridItem {
			time_limit,
			lambd,
			merge_percentage,
			multivariate,
			max_depth,
		},
	)
	.collect()
}

#[test]
fn test_compute_grid() {
	let parameters = ParametersToCombine {
		time_limit: vec![10.0],
		lambd: vec![0.9],
		merge_percentage: vec![100.0, 0.0],
		multivariate: vec![true, false],
		max_depth: vec![2, 3],
	};
	let grid = compute_grid(&parameters);
	assert_eq!(grid.len(), 8);
	let grid: Vec<String> = grid.iter().map(|item| item.to_string()).collect();
	insta::assert_debug_snapshot!(grid, @r###"
 [
     "time_limit=10 lambd=0.9 mergePercentage=100 multivariate=true D=2",
     "time_limit=10 lambd=0.9 mergePercentage=100 multivariate=true D=3",
     "time_limit=10 lambd=0.9 mergePercentage=100 multivariate=false D=2",
     "time_limit=10 lambd=0.9 mergePercentage=100 multivariate=false D=3",
     "time_limit=10 lambd=0.9 mergePercentage=0 multivariate=true D=2",
     "time_limit=10 lambd=0.9 mergePercentage=0 multivariate=true D=3",
     "time_limit=10 lambd=0.9 mergePercentage=0 multivariate=false D=2",
     "time_limit=10 lambd=0.9 mergePercentage=0 multivariate=false D=3",
 ]
 "###);
}

#[test]
fn test_grid_size_is_product_of_list_lengths() {
	let parameters = ParametersToCombine {
		time_limit: vec![1.0, 10.0],
		lambd: vec![0.0, 0.5, 0.9],
		merge_percentage: (0..=10).map(|i| f64::from(i) * 10.0).collect(),
		multivariate: vec![true, false],
		max_depth: vec![2, 3, 4, 5],
	};
	let grid = compute_grid(&parameters);
	assert_eq!(grid.len(), 2 * 3 * 11 * 2 * 4);
	let options = grid[0].train_options();
	assert_eq!(options.time_limit, 1.0);
	assert_eq!(options.max_depth, 2);
	assert!(options.multivariate);
	assert_eq!(grid.last().unwrap().merge_percentage, 100.0);
}
