//! Upstream identity provider contract and built-in implementations.
//!
//! The broker needs exactly three capabilities from the provider: an administrative
//! create-identity call, a password-grant credential exchange, and an administrative
//! delete-identity call. [`GoTrueProvider`] speaks the Supabase Auth wire format;
//! [`MemoryProvider`] keeps identities in-process for tests and demos.

pub mod gotrue;
pub mod memory;

pub use gotrue::GoTrueProvider;
pub use memory::MemoryProvider;

// self
use crate::{
	_prelude::*,
	auth::{AnonymousIdentity, IdentityDraft, IdentityId, TokenGrant},
	error::UpstreamError,
};

/// Boxed future returned by [`IdentityProvider`] operations.
pub type ProviderFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, UpstreamError>> + 'a + Send>>;

/// Identity provider capabilities the issuance pipeline depends on.
pub trait IdentityProvider
where
	Self: Send + Sync,
{
	/// Creates a pre-confirmed identity from `draft` and returns it with its assigned id.
	fn create_identity(&self, draft: IdentityDraft) -> ProviderFuture<'_, AnonymousIdentity>;

	/// Exchanges the identity's address + password for an access token.
	fn exchange_password<'a>(
		&'a self,
		email: &'a str,
		password: &'a str,
	) -> ProviderFuture<'a, TokenGrant>;

	/// Deletes the identity with the provided id.
	fn delete_identity<'a>(&'a self, id: &'a IdentityId) -> ProviderFuture<'a, ()>;
}
