//! Compensation log for partially completed issuances.
//!
//! Every step that creates upstream state pushes its inverse onto an [`UndoStack`]. When a later
//! step fails, the stack is unwound newest-first and every inverse is attempted even if an
//! earlier one fails. A stack that is dropped while still armed only logs what it abandons;
//! those leftovers expire under the provider's retention rules.

// self
use crate::{
	_prelude::*,
	auth::IdentityId,
	obs::{self, Stage, StageOutcome, StageSpan},
	provider::IdentityProvider,
};

/// Inverse of one upstream side effect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UndoStep {
	/// Removes an identity created earlier in the same request.
	DeleteIdentity(IdentityId),
}

/// Ordered list of pending compensations for one request.
#[derive(Debug, Default)]
pub struct UndoStack {
	steps: Vec<UndoStep>,
}
impl UndoStack {
	/// Records `step` as the newest pending compensation.
	pub fn push(&mut self, step: UndoStep) {
		self.steps.push(step);
	}

	/// Pending compensations, oldest first.
	pub fn steps(&self) -> &[UndoStep] {
		&self.steps
	}

	/// Number of pending compensations.
	pub fn len(&self) -> usize {
		self.steps.len()
	}

	/// Returns `true` when nothing needs to be undone.
	pub fn is_empty(&self) -> bool {
		self.steps.is_empty()
	}

	/// Forgets every pending compensation after the request committed.
	pub fn disarm(&mut self) {
		self.steps.clear();
	}

	/// Runs every pending compensation newest-first and returns how many of them failed.
	///
	/// Failures are logged and never interrupt the remaining steps.
	pub async fn unwind(&mut self, provider: &dyn IdentityProvider) -> usize {
		let span = StageSpan::new(Stage::Compensate, None);
		let mut failed = 0;

		while let Some(step) = self.steps.pop() {
			obs::record_stage_outcome(Stage::Compensate, StageOutcome::Attempt);

			let result = span
				.instrument(async {
					match &step {
						UndoStep::DeleteIdentity(id) => provider.delete_identity(id).await,
					}
				})
				.await;

			match result {
				Ok(()) => obs::record_stage_outcome(Stage::Compensate, StageOutcome::Success),
				Err(e) => {
					failed += 1;

					obs::record_stage_outcome(Stage::Compensate, StageOutcome::Failure);
					obs::log_swallowed(Stage::Compensate, &e);
				},
			}
		}

		failed
	}
}
impl Drop for UndoStack {
	fn drop(&mut self) {
		#[cfg(feature = "tracing")]
		{
			if !self.steps.is_empty() {
				tracing::warn!(pending = ?self.steps, "undo stack dropped while armed");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{AnonymousIdentity, IdentityDraft, TokenGrant},
		error::UpstreamError,
		provider::{MemoryProvider, ProviderFuture},
	};

	#[derive(Default)]
	struct RecordingProvider {
		deleted: Mutex<Vec<IdentityId>>,
		fail_on: Option<IdentityId>,
	}
	impl IdentityProvider for RecordingProvider {
		fn create_identity(&self, _: IdentityDraft) -> ProviderFuture<'_, AnonymousIdentity> {
			Box::pin(async { Err(UpstreamError::EmptyResponse) })
		}

		fn exchange_password<'a>(
			&'a self,
			_: &'a str,
			_: &'a str,
		) -> ProviderFuture<'a, TokenGrant> {
			Box::pin(async { Err(UpstreamError::EmptyResponse) })
		}

		fn delete_identity<'a>(&'a self, id: &'a IdentityId) -> ProviderFuture<'a, ()> {
			Box::pin(async move {
				self.deleted.lock().push(id.clone());

				if self.fail_on.as_ref() == Some(id) {
					return Err(UpstreamError::status(500, "boom"));
				}

				Ok(())
			})
		}
	}

	fn id(value: &str) -> IdentityId {
		IdentityId::new(value).expect("Identity fixture should be valid.")
	}

	#[tokio::test]
	async fn unwind_runs_newest_first_and_continues_after_failures() {
		let provider = RecordingProvider { fail_on: Some(id("second")), ..Default::default() };
		let mut stack = UndoStack::default();

		stack.push(UndoStep::DeleteIdentity(id("first")));
		stack.push(UndoStep::DeleteIdentity(id("second")));
		stack.push(UndoStep::DeleteIdentity(id("third")));

		let failed = stack.unwind(&provider).await;

		assert_eq!(failed, 1);
		assert!(stack.is_empty());
		assert_eq!(*provider.deleted.lock(), vec![id("third"), id("second"), id("first")]);
	}

	#[tokio::test]
	async fn disarmed_stacks_do_nothing() {
		let provider = MemoryProvider::default();
		let mut stack = UndoStack::default();

		stack.push(UndoStep::DeleteIdentity(id("kept")));

		assert_eq!(stack.len(), 1);

		stack.disarm();

		assert_eq!(stack.unwind(&provider).await, 0);
	}
}
