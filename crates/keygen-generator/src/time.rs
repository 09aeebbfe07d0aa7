//! Clock abstraction used by time-based key generators.

use chrono::Utc;
use std::time::Duration;

/// Source of wall-clock milliseconds.
///
/// The snowflake generator reads time through this trait so tests can drive
/// the clock explicitly.
pub trait TimeService: Send + Sync {
	/// Milliseconds since the Unix epoch.
	fn current_millis(&self) -> u64;

	/// Blocks the calling thread for `duration`.
	fn sleep(&self, duration: Duration) {
		std::thread::sleep(duration);
	}

	/// Called while spinning until the clock moves to the next millisecond.
	fn pause(&self) {
		std::hint::spin_loop();
	}
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeService;

impl TimeService for SystemTimeService {
	fn current_millis(&self) -> u64 {
		u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
	}
}
