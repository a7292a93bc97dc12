/*!
This crate defines the [`StreamingMetric`](trait.StreamingMetric.html) trait and the metrics the experiment harness reports for each trained tree, such as [`Accuracy`](struct.Accuracy.html).
*/

#![allow(clippy::tabs_in_doc_comments)]

mod accuracy;
mod mean;

pub use self::accuracy::Accuracy;
pub use self::mean::Mean;

/**
The `StreamingMetric` trait defines a common interface to metrics that are computed one input at a time.

After being initialized, a value implementing `StreamingMetric` has `update()` called on it with each input. Values computed on different threads can be combined with `merge()`. When all inputs have been seen, `finalize()` produces the `Output`.

# Examples

A metric that tracks the largest input:

```
use treesweep_metrics::StreamingMetric;

struct Max(f32);

impl StreamingMetric<'_> for Max {
	type Input = f32;
	type Output = f32;
	fn update(&mut self, input: Self::Input) {
		self.0 = self.0.max(input)
	}
	fn merge(&mut self, other: Self) { self.0 = self.0.max(other.0) }
	fn finalize(self) -> Self::Output { self.0 }
}
```
*/
pub trait StreamingMetric<'a> {
	/// `Input` is the type to aggregate in calls to `update()`.
	type Input;
	/// `Output` is the return type of `finalize()`.
	type Output;
	/// Update this metric with the next input.
	fn update(&mut self, input: Self::Input);
	/// Combine the state of another metric with this one.
	fn merge(&mut self, other: Self);
	/// Consume the metric and produce its output.
	fn finalize(self) -> Self::Output;
}
