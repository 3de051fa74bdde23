//! Thread-safe in-memory [`IdentityProvider`] implementation for local development and tests.

// crates.io
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	auth::{AnonymousIdentity, IdentityDraft, IdentityId, Secret, TokenGrant},
	error::UpstreamError,
	provider::{IdentityProvider, ProviderFuture},
};

type IdentityMap = Arc<RwLock<HashMap<IdentityId, AnonymousIdentity>>>;

/// Provider that keeps identities in-process and mints opaque bearer tokens.
#[derive(Clone, Debug, Default)]
pub struct MemoryProvider(IdentityMap);
impl MemoryProvider {
	/// Looks up an identity by id, mirroring the provider's admin "get user" call.
	pub fn get(&self, id: &IdentityId) -> Option<AnonymousIdentity> {
		self.0.read().get(id).cloned()
	}

	/// Returns the number of identities currently held.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no identity is held.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn create_now(
		map: IdentityMap,
		draft: IdentityDraft,
	) -> Result<AnonymousIdentity, UpstreamError> {
		let mut guard = map.write();

		if guard.values().any(|identity| identity.email == draft.email) {
			return Err(UpstreamError::status(422, "{\"error_code\":\"email_exists\"}"));
		}

		let id = IdentityId::new(Uuid::new_v4().to_string())
			.map_err(|e| UpstreamError::status(500, e.to_string()))?;
		let identity = AnonymousIdentity::from_draft(draft, id.clone(), None);

		guard.insert(id, identity.clone());

		Ok(identity)
	}

	fn exchange_now(
		map: IdentityMap,
		email: &str,
		password: &str,
	) -> Result<TokenGrant, UpstreamError> {
		let guard = map.read();
		let identity = guard
			.values()
			.find(|identity| identity.email == email && identity.password.expose() == password)
			.ok_or_else(|| UpstreamError::status(400, "{\"error\":\"invalid_grant\"}"))?;

		Ok(TokenGrant {
			access_token: Secret::new(format!(
				"memory.{}.{}",
				identity.id,
				Uuid::new_v4().simple()
			)),
			token_type: "bearer".into(),
		})
	}

	fn delete_now(map: IdentityMap, id: &IdentityId) -> Result<(), UpstreamError> {
		match map.write().remove(id) {
			Some(_) => Ok(()),
			None => Err(UpstreamError::status(404, "{\"error_code\":\"user_not_found\"}")),
		}
	}
}
impl IdentityProvider for MemoryProvider {
	fn create_identity(&self, draft: IdentityDraft) -> ProviderFuture<'_, AnonymousIdentity> {
		let map = self.0.clone();

		Box::pin(async move { Self::create_now(map, draft) })
	}

	fn exchange_password<'a>(
		&'a self,
		email: &'a str,
		password: &'a str,
	) -> ProviderFuture<'a, TokenGrant> {
		let map = self.0.clone();

		Box::pin(async move { Self::exchange_now(map, email, password) })
	}

	fn delete_identity<'a>(&'a self, id: &'a IdentityId) -> ProviderFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move { Self::delete_now(map, id) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn create_exchange_delete_lifecycle() {
		let provider = MemoryProvider::default();
		let draft = IdentityDraft::generate("example.com", "edge-get-anon");
		let password = draft.password.clone();
		let identity =
			provider.create_identity(draft).await.expect("Creating an identity should succeed.");

		assert!(provider.get(&identity.id).is_some());

		let grant = provider
			.exchange_password(&identity.email, password.expose())
			.await
			.expect("Exchanging the generated credentials should succeed.");

		assert_eq!(grant.token_type, "bearer");
		assert!(grant.access_token.expose().starts_with("memory."));

		provider.delete_identity(&identity.id).await.expect("Deleting should succeed.");

		assert!(provider.get(&identity.id).is_none());
		assert!(provider.is_empty());
	}

	#[tokio::test]
	async fn wrong_password_and_missing_identity_are_rejected() {
		let provider = MemoryProvider::default();
		let identity = provider
			.create_identity(IdentityDraft::generate("example.com", "edge-get-anon"))
			.await
			.expect("Creating an identity should succeed.");
		let err = provider
			.exchange_password(&identity.email, "wrong")
			.await
			.expect_err("Wrong passwords should be rejected.");

		assert_eq!(err.http_status(), Some(400));

		let missing = IdentityId::new("missing").expect("Identity fixture should be valid.");
		let err =
			provider.delete_identity(&missing).await.expect_err("Unknown ids should be rejected.");

		assert_eq!(err.http_status(), Some(404));
		assert_eq!(provider.len(), 1);
	}
}
