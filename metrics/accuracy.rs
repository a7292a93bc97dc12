use super::{mean::Mean, StreamingMetric};

/// The accuracy is the proportion of examples where the predicted class equals the label. Inputs are `(prediction, label)` pairs.
#[derive(Debug, Default)]
pub struct Accuracy(Mean);

impl Accuracy {
	pub fn new() -> Self {
		Self::default()
	}
}

impl StreamingMetric<'_> for Accuracy {
	type Input = (i64, i64);
	type Output = Option<f32>;

	fn update(&mut self, value: Self::Input) {
		self.0.update(if value.0 == value.1 { 1.0 } else { 0.0 })
	}

	fn merge(&mut self, other: Self) {
		self.0.merge(other.0)
	}

	fn finalize(self) -> Option<f32> {
		self.0.finalize()
	}
}

#[test]
fn test_accuracy() {
	let mut accuracy = Accuracy::new();
	let predictions_and_labels = [(1, 1), (1, 0), (0, 0), (-1, -1)];
	for value in predictions_and_labels.iter() {
		accuracy.update(*value);
	}
	insta::assert_debug_snapshot!(accuracy.finalize(), @r###"
 Some(
     0.75,
 )
 "###);
}
