/*!
This module provides the `Finite` type, a floating point number that is known to be neither infinite nor `NaN`. Because `NaN` is excluded, `Finite` values have a total order and can be used as keys in a `BinaryHeap` or sorted with `sort_by_key`.

```
use treesweep_util::finite::{Finite, ToFinite};

let gain = 0.25f64.to_finite().unwrap();
assert!(gain > Finite::new(0.0).unwrap());
assert!(Finite::new(f64::NAN).is_err());
```
*/

use num_traits::Float;
use std::cmp::{Ord, Ordering};
use thiserror::Error;

#[derive(Clone, Copy, Debug)]
pub struct Finite<T>(T)
where
	T: Float;

#[derive(Debug, Error, PartialEq)]
#[error("the value is not finite")]
pub struct NotFiniteError;

impl<T> Finite<T>
where
	T: Float,
{
	pub fn new(value: T) -> Result<Self, NotFiniteError> {
		if value.is_finite() {
			Ok(Self(value))
		} else {
			Err(NotFiniteError)
		}
	}

	pub fn get(self) -> T {
		self.0
	}
}

impl<T> std::fmt::Display for Finite<T>
where
	T: Float + std::fmt::Display,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl<T> PartialEq for Finite<T>
where
	T: Float,
{
	fn eq(&self, other: &Self) -> bool {
		self.0.eq(&other.0)
	}
}

impl<T> Eq for Finite<T> where T: Float {}

impl<T> PartialOrd for Finite<T>
where
	T: Float,
{
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl<T> Ord for Finite<T>
where
	T: Float,
{
	fn cmp(&self, other: &Self) -> Ordering {
		// Neither value is NaN, so the partial order is total.
		self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
	}
}

pub trait ToFinite<T>
where
	T: Float,
{
	fn to_finite(self) -> Result<Finite<T>, NotFiniteError>;
}

impl<T> ToFinite<T> for T
where
	T: Float,
{
	fn to_finite(self) -> Result<Finite<T>, NotFiniteError> {
		Finite::new(self)
	}
}

#[test]
fn test_finite_ordering() {
	let mut values: Vec<Finite<f64>> = [0.5, -1.0, 2.0, 0.0]
		.iter()
		.map(|value| Finite::new(*value).unwrap())
		.collect();
	values.sort();
	let values: Vec<f64> = values.into_iter().map(|value| value.get()).collect();
	assert_eq!(values, vec![-1.0, 0.0, 0.5, 2.0]);
}

#[test]
fn test_not_finite() {
	assert_eq!(f32::INFINITY.to_finite().unwrap_err(), NotFiniteError);
	assert_eq!(Finite::new(f64::NAN).unwrap_err(), NotFiniteError);
}
