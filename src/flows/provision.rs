//! Creation of throwaway identities on the upstream provider.

// self
use crate::{
	_prelude::*,
	auth::{AnonymousIdentity, IdentityDraft},
	obs::{self, Stage, StageOutcome, StageSpan},
	provider::IdentityProvider,
};

/// Mints a synthetic address + random password and registers them upstream.
#[derive(Clone)]
pub struct IdentityProvisioner {
	provider: Arc<dyn IdentityProvider>,
	email_domain: String,
	created_by: String,
}
impl IdentityProvisioner {
	/// Creates a provisioner that registers identities under `email_domain`, tagged with
	/// `created_by`.
	pub fn new(
		provider: Arc<dyn IdentityProvider>,
		email_domain: impl Into<String>,
		created_by: impl Into<String>,
	) -> Self {
		Self { provider, email_domain: email_domain.into(), created_by: created_by.into() }
	}

	/// Creates one pre-confirmed anonymous identity.
	///
	/// Nothing is retained locally when the provider refuses; the failure surfaces as
	/// [`Error::Provisioning`] with the upstream status + body preview attached.
	pub async fn provision(&self) -> Result<AnonymousIdentity> {
		let span = StageSpan::new(Stage::Provision, None);

		obs::record_stage_outcome(Stage::Provision, StageOutcome::Attempt);

		let draft = IdentityDraft::generate(&self.email_domain, &self.created_by);
		let result = span
			.instrument(self.provider.create_identity(draft))
			.await
			.map_err(Error::Provisioning);

		match &result {
			Ok(_) => obs::record_stage_outcome(Stage::Provision, StageOutcome::Success),
			Err(_) => obs::record_stage_outcome(Stage::Provision, StageOutcome::Failure),
		}

		result
	}
}
impl Debug for IdentityProvisioner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityProvisioner")
			.field("email_domain", &self.email_domain)
			.field("created_by", &self.created_by)
			.finish_non_exhaustive()
	}
}
