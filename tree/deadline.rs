use std::time::{Duration, Instant};

/// Time limits beyond this many seconds are treated as this many seconds, which keeps `Duration` construction from overflowing.
const MAX_TIME_LIMIT_SECS: f64 = 1e9;

/**
A `Deadline` is started once per build and shared by reference with everything that does work for that build. It is only ever read, so every worker sees the same clock, and cancellation is cooperative: workers call `is_reached` between units of work.
*/
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
	start: Instant,
	limit: Duration,
}

impl Deadline {
	pub fn start(limit: Duration) -> Deadline {
		Deadline {
			start: Instant::now(),
			limit,
		}
	}

	/// Start a deadline `seconds` from now. `seconds` must be positive and finite.
	pub fn from_secs_f64(seconds: f64) -> Deadline {
		Deadline::start(Duration::from_secs_f64(seconds.min(MAX_TIME_LIMIT_SECS)))
	}

	pub fn is_reached(&self) -> bool {
		self.start.elapsed() >= self.limit
	}

	pub fn elapsed(&self) -> Duration {
		self.start.elapsed()
	}

	pub fn remaining(&self) -> Duration {
		self.limit
			.checked_sub(self.start.elapsed())
			.unwrap_or_else(|| Duration::from_secs(0))
	}

	/// Start a deadline for one part of the work that may use at most `fraction` of the time that remains. It is never later than `self`.
	pub fn slice(&self, fraction: f64) -> Deadline {
		Deadline::start(self.remaining().mul_f64(fraction.max(0.0).min(1.0)))
	}
}

#[test]
fn test_zero_deadline_is_reached_immediately() {
	let deadline = Deadline::from_secs_f64(1e-12);
	assert!(deadline.is_reached());
	assert_eq!(deadline.remaining(), Duration::from_secs(0));
	assert!(deadline.slice(0.5).is_reached());
}

#[test]
fn test_long_deadline_is_not_reached() {
	let deadline = Deadline::from_secs_f64(1e300);
	assert!(!deadline.is_reached());
	assert!(deadline.remaining() > Duration::from_secs(1_000_000));
}

#[test]
fn test_slice_takes_a_fraction_of_the_remaining_time() {
	let deadline = Deadline::from_secs_f64(1000.0);
	let slice = deadline.slice(0.1);
	assert!(!slice.is_reached());
	assert!(slice.remaining() <= Duration::from_secs(100));
	assert!(slice.remaining() > Duration::from_secs(90));
	assert!(deadline.slice(0.0).is_reached());
}
