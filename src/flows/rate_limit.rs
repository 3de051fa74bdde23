//! Per-IP daily quota backed by the datastore's atomic upsert.

// self
use crate::{
	_prelude::*,
	auth::ClientIp,
	clock::Clock,
	obs::{self, Stage, StageOutcome, StageSpan},
	store::{IssuanceStore, RateLimitKey},
};

/// Result of one quota check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
	/// `true` while the post-increment count is within the limit.
	pub allowed: bool,
	/// Post-increment count for the requester's current UTC day.
	pub count: u64,
}

/// Counts requests per requester per UTC day.
///
/// Every check increments the counter, including the one that gets rejected, so the first
/// refusal of the day reports `limit + 1`.
#[derive(Clone)]
pub struct RateLimiter {
	store: Arc<dyn IssuanceStore>,
	clock: Arc<dyn Clock>,
}
impl RateLimiter {
	/// Creates a limiter that keys counters by the UTC day reported by `clock`.
	pub fn new(store: Arc<dyn IssuanceStore>, clock: Arc<dyn Clock>) -> Self {
		Self { store, clock }
	}

	/// Increments today's counter for `ip` and compares it against `limit`.
	///
	/// Datastore failures surface as [`Error::RateLimitCheck`] and are not retried.
	pub async fn check_and_increment(
		&self,
		ip: &ClientIp,
		limit: u64,
	) -> Result<RateLimitDecision> {
		let span = StageSpan::new(Stage::RateCheck, Some(ip));

		obs::record_stage_outcome(Stage::RateCheck, StageOutcome::Attempt);

		let key = RateLimitKey::for_instant(ip.clone(), self.clock.now());
		let result = span
			.instrument(self.store.increment_rate_limit(&key))
			.await
			.map(|record| RateLimitDecision { allowed: record.count <= limit, count: record.count })
			.map_err(Error::RateLimitCheck);

		match &result {
			Ok(decision) if decision.allowed =>
				obs::record_stage_outcome(Stage::RateCheck, StageOutcome::Success),
			Ok(_) => obs::record_stage_outcome(Stage::RateCheck, StageOutcome::Rejected),
			Err(_) => obs::record_stage_outcome(Stage::RateCheck, StageOutcome::Failure),
		}

		result
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter").finish_non_exhaustive()
	}
}
