//! PostgREST-backed [`IssuanceStore`] used against Supabase projects.
//!
//! The rate-limit upsert is a single `POST` with `resolution=merge-duplicates`, so the database
//! resolves concurrent increments for the same `(ip, day)` key. The table needs an on-conflict
//! rule that adds one to the stored count instead of overwriting it (see
//! `sql/anon_broker.sql`).

// crates.io
use oauth2::http::Method;
// self
use crate::{
	_prelude::*,
	error::UpstreamError,
	http::UpstreamHttpClient,
	store::{AuditRecord, IssuanceStore, RateLimitKey, RateLimitRecord, StoreFuture},
	upstream::{self, TransportErrorMapper, UpstreamClient},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, upstream::ReqwestTransportErrorMapper};

/// Default table holding per-IP daily counters.
pub const RATE_LIMIT_TABLE: &str = "anon_rate_limits";
/// Default table receiving audit rows.
pub const AUDIT_TABLE: &str = "user_anon";

const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=representation";
const INSERT_PREFER: &str = "return=minimal";

#[cfg(feature = "reqwest")]
/// Store specialized for the crate's default reqwest transport stack.
pub type ReqwestPostgrestStore = PostgrestStore<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// [`IssuanceStore`] that talks to the PostgREST interface of the upstream project.
pub struct PostgrestStore<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	upstream: UpstreamClient<C, M>,
	rate_limit_table: String,
	audit_table: String,
}
impl<C, M> PostgrestStore<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a store that writes to the default tables through `upstream`.
	pub fn new(upstream: UpstreamClient<C, M>) -> Self {
		Self {
			upstream,
			rate_limit_table: RATE_LIMIT_TABLE.into(),
			audit_table: AUDIT_TABLE.into(),
		}
	}

	/// Overrides the table names used for counters and audit rows.
	pub fn with_tables(
		mut self,
		rate_limit_table: impl Into<String>,
		audit_table: impl Into<String>,
	) -> Self {
		self.rate_limit_table = rate_limit_table.into();
		self.audit_table = audit_table.into();

		self
	}

	async fn increment_now(&self, key: &RateLimitKey) -> Result<RateLimitRecord, UpstreamError> {
		let mut url = self.upstream.endpoint(&format!("rest/v1/{}", self.rate_limit_table))?;

		url.query_pairs_mut().append_pair("on_conflict", "ip,day");

		let body = RateLimitRecord { key: key.clone(), count: 1 };
		let request = UpstreamClient::<C, M>::json_body(
			self.upstream.request(Method::POST, &url).header("Prefer", UPSERT_PREFER),
			&body,
		)?;
		let response = self.upstream.send(request).await?;
		let row = match upstream::decode_json::<UpsertedRows>(&response)? {
			UpsertedRows::Many(rows) => rows.into_iter().next(),
			UpsertedRows::One(row) => Some(row),
		}
		.ok_or(UpstreamError::EmptyResponse)?;

		Ok(RateLimitRecord { key: key.clone(), count: row.count })
	}

	async fn insert_audit_now(&self, record: AuditRecord) -> Result<(), UpstreamError> {
		let url = self.upstream.endpoint(&format!("rest/v1/{}", self.audit_table))?;
		let request = UpstreamClient::<C, M>::json_body(
			self.upstream.request(Method::POST, &url).header("Prefer", INSERT_PREFER),
			&record,
		)?;

		self.upstream.send(request).await?;

		Ok(())
	}
}
impl<C, M> IssuanceStore for PostgrestStore<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn increment_rate_limit<'a>(
		&'a self,
		key: &'a RateLimitKey,
	) -> StoreFuture<'a, RateLimitRecord> {
		Box::pin(self.increment_now(key))
	}

	fn insert_audit(&self, record: AuditRecord) -> StoreFuture<'_, ()> {
		Box::pin(self.insert_audit_now(record))
	}
}
impl<C, M> Debug for PostgrestStore<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PostgrestStore")
			.field("upstream", &self.upstream)
			.field("rate_limit_table", &self.rate_limit_table)
			.field("audit_table", &self.audit_table)
			.finish()
	}
}

// PostgREST returns an array for `return=representation`; single-object responses appear when
// the caller (or a proxy) asks for `application/vnd.pgrst.object+json`.
#[derive(Deserialize)]
#[serde(untagged)]
enum UpsertedRows {
	Many(Vec<UpsertedRow>),
	One(UpsertedRow),
}

#[derive(Deserialize)]
struct UpsertedRow {
	count: u64,
}
