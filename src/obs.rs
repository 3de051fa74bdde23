//! Optional observability helpers for the issuance pipeline.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `anon_token_broker.stage` with the `stage`
//!   and `ip` fields, plus warn-level events for failures the pipeline swallows.
//! - Enable `metrics` to increment the `anon_token_broker_stage_total` counter for every
//!   attempt/success/failure/rejection, labeled by `stage` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Pipeline stages observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Whole request, from method gate to response.
	Issue,
	/// Daily per-IP counter upsert.
	RateCheck,
	/// Identity creation on the provider.
	Provision,
	/// Password credential exchange.
	Exchange,
	/// Undo steps run after a failed exchange.
	Compensate,
	/// Best-effort audit insert.
	Audit,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Issue => "issue",
			Stage::RateCheck => "rate_check",
			Stage::Provision => "provision",
			Stage::Exchange => "exchange",
			Stage::Compensate => "compensate",
			Stage::Audit => "audit",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageOutcome {
	/// Entry to a stage.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure, either propagated or swallowed.
	Failure,
	/// Request refused by policy (quota or method).
	Rejected,
}
impl StageOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageOutcome::Attempt => "attempt",
			StageOutcome::Success => "success",
			StageOutcome::Failure => "failure",
			StageOutcome::Rejected => "rejected",
		}
	}
}
impl Display for StageOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
