//! Access tokens returned by the credential exchange.

// self
use crate::{_prelude::*, auth::Secret};

/// Token payload as returned by the provider's password grant, passed through unmodified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
	/// Access token secret; callers must avoid logging it.
	pub access_token: Secret,
	/// Token type reported by the provider (usually `bearer`).
	pub token_type: String,
}

/// Token handed to the caller together with the broker-computed expiry.
#[derive(Clone, Debug)]
pub struct IssuedToken {
	/// Access token secret; callers must avoid logging it.
	pub access_token: Secret,
	/// Token type reported by the provider.
	pub token_type: String,
	/// Instant the broker issued the token.
	pub issued_at: OffsetDateTime,
	/// Issuance instant plus the configured TTL.
	pub expires_at: OffsetDateTime,
}
impl IssuedToken {
	/// Stamps a provider grant with the issuance instant and TTL.
	///
	/// The issuance instant is truncated to whole milliseconds so rendered timestamps stay
	/// stable across serializers.
	pub fn new(grant: TokenGrant, issued_at: OffsetDateTime, ttl: Duration) -> Self {
		let issued_at = issued_at.replace_millisecond(issued_at.millisecond()).unwrap_or(issued_at);

		Self {
			access_token: grant.access_token,
			token_type: grant.token_type,
			issued_at,
			expires_at: issued_at + ttl,
		}
	}
}
