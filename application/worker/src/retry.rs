//! Exponential backoff schedule for retried filesystem operations.

use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	///Total attempts, the first one included
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		RetryPolicy {
			max_attempts: 5,
			base_delay: Duration::from_millis(500),
			max_delay: Duration::from_secs(8),
		}
	}
}

impl RetryPolicy {
	pub fn new(max_attempts: u32) -> RetryPolicy {
		RetryPolicy {
			max_attempts: max_attempts.max(1),
			..RetryPolicy::default()
		}
	}

	pub fn with_base_delay(mut self, delay: Duration) -> RetryPolicy {
		self.base_delay = delay;
		self
	}

	pub fn with_max_delay(mut self, delay: Duration) -> RetryPolicy {
		self.max_delay = delay;
		self
	}

	///Delay after the failed `attempt`, counted from 1: `base * 2^(attempt-1)`, capped
	pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(31);
		self.base_delay
			.saturating_mul(1u32 << exponent)
			.min(self.max_delay)
	}

	///Whether another attempt is allowed after `attempt` failed
	pub fn should_retry(&self, attempt: u32) -> bool {
		attempt < self.max_attempts
	}
}
