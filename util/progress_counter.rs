use std::sync::{
	atomic::{AtomicU64, Ordering},
	Arc,
};

/// A `ProgressCounter` is shared between the worker threads of an experiment. Each worker increments it when it finishes a unit of work, and any clone can read the current value.
#[derive(Clone, Debug)]
pub struct ProgressCounter {
	current: Arc<AtomicU64>,
	total: u64,
}

impl ProgressCounter {
	pub fn new(total: u64) -> Self {
		Self {
			current: Arc::new(AtomicU64::new(0)),
			total,
		}
	}

	pub fn total(&self) -> u64 {
		self.total
	}

	pub fn get(&self) -> u64 {
		self.current.load(Ordering::Relaxed)
	}

	/// Add `amount` to the counter and return the value after the increment.
	pub fn inc(&self, amount: u64) -> u64 {
		self.current.fetch_add(amount, Ordering::Relaxed) + amount
	}
}

#[test]
fn test_progress_counter_shared_between_clones() {
	let counter = ProgressCounter::new(3);
	let clone = counter.clone();
	assert_eq!(clone.inc(1), 1);
	assert_eq!(counter.inc(2), 3);
	assert_eq!(counter.get(), clone.get());
	assert_eq!(counter.total(), 3);
}
