//! Best-effort audit trail of successful issuances.

// self
use crate::{
	_prelude::*,
	auth::{ClientIp, IdentityId},
	clock::Clock,
	obs::{self, Stage, StageOutcome, StageSpan},
	store::{AuditRecord, IssuanceStore},
};

/// Appends one audit row per issued token; failures never reach the caller.
#[derive(Clone)]
pub struct AuditRecorder {
	store: Arc<dyn IssuanceStore>,
	clock: Arc<dyn Clock>,
}
impl AuditRecorder {
	/// Creates a recorder that stamps rows with `clock` and writes them to `store`.
	pub fn new(store: Arc<dyn IssuanceStore>, clock: Arc<dyn Clock>) -> Self {
		Self { store, clock }
	}

	/// Writes an audit row for `user_id`. Any failure is logged as [`Error::Audit`] and dropped.
	pub async fn record(&self, user_id: &IdentityId, ip: &ClientIp, expires_at: OffsetDateTime) {
		let span = StageSpan::new(Stage::Audit, Some(ip));

		obs::record_stage_outcome(Stage::Audit, StageOutcome::Attempt);

		let record = AuditRecord {
			user_id: user_id.clone(),
			ip: ip.clone(),
			created_at: self.clock.now(),
			expires_at,
		};

		match span.instrument(self.store.insert_audit(record)).await {
			Ok(()) => obs::record_stage_outcome(Stage::Audit, StageOutcome::Success),
			Err(e) => {
				obs::record_stage_outcome(Stage::Audit, StageOutcome::Failure);
				obs::log_swallowed(Stage::Audit, &Error::Audit(e));
			},
		}
	}
}
impl Debug for AuditRecorder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuditRecorder").finish_non_exhaustive()
	}
}
