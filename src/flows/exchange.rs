//! Password-grant exchange with compensation on failure.

// self
use crate::{
	_prelude::*,
	auth::{AnonymousIdentity, TokenGrant},
	flows::UndoStack,
	obs::{self, Stage, StageOutcome, StageSpan},
	provider::IdentityProvider,
};

/// Trades a freshly provisioned identity's credentials for an access token.
#[derive(Clone)]
pub struct TokenIssuer {
	provider: Arc<dyn IdentityProvider>,
}
impl TokenIssuer {
	/// Creates an issuer that exchanges and compensates through `provider`.
	pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
		Self { provider }
	}

	/// Exchanges `identity`'s credentials and returns the provider's grant unmodified.
	///
	/// On failure `undo` is unwound before [`Error::Exchange`] is returned, so the identity is
	/// already gone (or its deletion was at least attempted) when the caller sees the error.
	/// Cleanup failures are logged and never replace the exchange failure. On success `undo` is
	/// disarmed.
	pub async fn issue(
		&self,
		identity: &AnonymousIdentity,
		undo: &mut UndoStack,
	) -> Result<TokenGrant> {
		let span = StageSpan::new(Stage::Exchange, None);

		obs::record_stage_outcome(Stage::Exchange, StageOutcome::Attempt);

		let exchange =
			self.provider.exchange_password(&identity.email, identity.password.expose());
		let result = span.instrument(exchange).await;

		match result {
			Ok(grant) => {
				obs::record_stage_outcome(Stage::Exchange, StageOutcome::Success);
				undo.disarm();

				Ok(grant)
			},
			Err(e) => {
				obs::record_stage_outcome(Stage::Exchange, StageOutcome::Failure);
				undo.unwind(self.provider.as_ref()).await;

				Err(Error::Exchange(e))
			},
		}
	}
}
impl Debug for TokenIssuer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenIssuer").finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{IdentityDraft, Secret},
		flows::UndoStep,
		provider::MemoryProvider,
	};

	async fn provisioned(provider: &MemoryProvider) -> AnonymousIdentity {
		provider
			.create_identity(IdentityDraft::generate("example.com", "unit-test"))
			.await
			.expect("Memory provider should create identities.")
	}

	#[tokio::test]
	async fn successful_exchange_disarms_the_stack() {
		let provider = Arc::new(MemoryProvider::default());
		let identity = provisioned(&provider).await;
		let issuer = TokenIssuer::new(provider.clone());
		let mut undo = UndoStack::default();

		undo.push(UndoStep::DeleteIdentity(identity.id.clone()));

		let grant = issuer.issue(&identity, &mut undo).await.expect("Exchange should succeed.");

		assert_eq!(grant.token_type, "bearer");
		assert!(undo.is_empty());
		assert!(provider.get(&identity.id).is_some());
	}

	#[tokio::test]
	async fn failed_exchange_deletes_the_identity() {
		let provider = Arc::new(MemoryProvider::default());
		let mut identity = provisioned(&provider).await;
		let issuer = TokenIssuer::new(provider.clone());
		let mut undo = UndoStack::default();

		undo.push(UndoStep::DeleteIdentity(identity.id.clone()));
		identity.password = Secret::new("wrong-password");

		let err = issuer.issue(&identity, &mut undo).await.expect_err("Exchange should fail.");

		assert!(matches!(err, Error::Exchange(_)));
		assert_eq!(err.upstream().and_then(|e| e.http_status()), Some(400));
		assert!(undo.is_empty());
		assert!(provider.get(&identity.id).is_none());
	}
}
