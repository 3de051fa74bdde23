//! Wall-clock sources used to derive day keys and token expiry instants.

// self
use crate::_prelude::*;

/// Source of the current UTC instant.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current instant in UTC.
	fn now(&self) -> OffsetDateTime;
}

/// Clock backed by the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually driven clock for tests and demos.
#[derive(Debug)]
pub struct FixedClock(Mutex<OffsetDateTime>);
impl FixedClock {
	/// Creates a clock frozen at `instant`.
	pub fn new(instant: OffsetDateTime) -> Self {
		Self(Mutex::new(instant))
	}

	/// Moves the clock to `instant`.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}

	/// Moves the clock forward by `delta`.
	pub fn advance(&self, delta: Duration) {
		let mut guard = self.0.lock();

		*guard += delta;
	}
}
impl Clock for FixedClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn fixed_clock_advances_and_resets() {
		let start = macros::datetime!(2024-01-01 23:59 UTC);
		let clock = FixedClock::new(start);

		clock.advance(Duration::minutes(2));

		assert_eq!(clock.now(), macros::datetime!(2024-01-02 00:01 UTC));

		clock.set(start);

		assert_eq!(clock.now(), start);
	}
}
