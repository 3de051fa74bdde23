//! Datastore contract shared by the rate limiter and the audit recorder, plus built-in stores.

pub mod memory;
pub mod postgrest;

pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;

// self
use crate::{
	_prelude::*,
	auth::{ClientIp, IdentityId},
	error::UpstreamError,
};

time::serde::format_description!(day_format, Date, "[year]-[month]-[day]");

/// Boxed future returned by [`IssuanceStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UpstreamError>> + 'a + Send>>;

/// Storage backend contract implemented by issuance datastores.
pub trait IssuanceStore
where
	Self: Send + Sync,
{
	/// Inserts `count = 1` for `key` or increments the existing row by one, returning the
	/// post-merge record.
	///
	/// Implementations must perform the merge as a single atomic operation; callers never lock.
	fn increment_rate_limit<'a>(
		&'a self,
		key: &'a RateLimitKey,
	) -> StoreFuture<'a, RateLimitRecord>;

	/// Appends an audit row.
	fn insert_audit(&self, record: AuditRecord) -> StoreFuture<'_, ()>;
}

/// Partition key of the daily rate-limit counter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimitKey {
	/// Requester address.
	pub ip: ClientIp,
	/// UTC calendar day, serialized as `YYYY-MM-DD`.
	#[serde(with = "day_format")]
	pub day: Date,
}
impl RateLimitKey {
	/// Builds a key for `ip` on an explicit day.
	pub fn new(ip: ClientIp, day: Date) -> Self {
		Self { ip, day }
	}

	/// Builds a key for `ip` on the UTC day containing `instant`.
	pub fn for_instant(ip: ClientIp, instant: OffsetDateTime) -> Self {
		Self::new(ip, instant.to_offset(time::UtcOffset::UTC).date())
	}
}

/// Counter row returned by [`IssuanceStore::increment_rate_limit`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
	/// Key the counter belongs to.
	#[serde(flatten)]
	pub key: RateLimitKey,
	/// Post-increment number of requests seen for the key.
	pub count: u64,
}

/// Append-only record of a successful issuance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
	/// Identity the token was issued for.
	pub user_id: IdentityId,
	/// Requester address as seen by the broker.
	pub ip: ClientIp,
	/// Instant the record was written.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	/// Expiry advertised to the caller.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
}
