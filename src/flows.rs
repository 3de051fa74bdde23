//! Issuance pipeline: quota check, identity provisioning, credential exchange, and audit.
//!
//! [`Broker`] owns one instance of each stage and sequences them for every request. Each stage
//! lives in its own module so it can be exercised (and replaced) in isolation; the broker itself
//! keeps no state between requests beyond the immutable [`BrokerConfig`].

pub mod audit;
pub mod exchange;
pub mod provision;
pub mod rate_limit;
pub mod saga;

pub use audit::*;
pub use exchange::*;
pub use provision::*;
pub use rate_limit::*;
pub use saga::*;

// self
use crate::{
	_prelude::*,
	auth::{ClientIp, IdentityDescriptor, IssuedToken},
	clock::{Clock, SystemClock},
	config::BrokerConfig,
	obs::{self, Stage, StageOutcome, StageSpan},
	provider::IdentityProvider,
	store::IssuanceStore,
};
#[cfg(feature = "reqwest")]
use crate::{
	http::ReqwestHttpClient,
	provider::gotrue::ReqwestGoTrueProvider,
	store::postgrest::ReqwestPostgrestStore,
	upstream::{ReqwestTransportErrorMapper, UpstreamClient},
};

/// Lifecycle of one issuance request.
///
/// Requests move forward one state at a time and leave early through [`IssuanceState::Rejected`]
/// or [`IssuanceState::Failed`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssuanceState {
	/// Request accepted by the endpoint.
	Received,
	/// Quota check passed.
	RateChecked,
	/// Identity exists upstream.
	Provisioned,
	/// Access token obtained.
	Exchanged,
	/// Audit attempted.
	Recorded,
	/// Success response produced.
	Responded,
	/// Refused by policy (method or quota).
	Rejected,
	/// Aborted by an upstream or configuration failure.
	Failed,
}
impl IssuanceState {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			IssuanceState::Received => "Received",
			IssuanceState::RateChecked => "RateChecked",
			IssuanceState::Provisioned => "Provisioned",
			IssuanceState::Exchanged => "Exchanged",
			IssuanceState::Recorded => "Recorded",
			IssuanceState::Responded => "Responded",
			IssuanceState::Rejected => "Rejected",
			IssuanceState::Failed => "Failed",
		}
	}

	/// Last state a request reached before terminating with `error`.
	pub fn reached_before(error: &Error) -> Self {
		match error {
			Error::Config(_) | Error::MethodNotAllowed { .. } | Error::RateLimitCheck(_) =>
				IssuanceState::Received,
			Error::RateLimitExceeded { .. } | Error::Provisioning(_) => IssuanceState::RateChecked,
			Error::Exchange(_) => IssuanceState::Provisioned,
			Error::Audit(_) => IssuanceState::Exchanged,
		}
	}

	/// Terminal state a request lands in after `error`.
	pub fn terminal_for(error: &Error) -> Self {
		match error {
			Error::MethodNotAllowed { .. } | Error::RateLimitExceeded { .. } =>
				IssuanceState::Rejected,
			_ => IssuanceState::Failed,
		}
	}
}
impl Display for IssuanceState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Everything the endpoint needs to answer a successful request.
#[derive(Clone, Debug)]
pub struct Issuance {
	/// Token plus broker-computed expiry.
	pub token: IssuedToken,
	/// Public view of the identity the token belongs to.
	pub user: IdentityDescriptor,
	/// Requester's post-increment count for the current day.
	pub count: u64,
}

/// Request orchestrator wiring the issuance stages together.
#[derive(Clone)]
pub struct Broker {
	config: Arc<BrokerConfig>,
	clock: Arc<dyn Clock>,
	provider: Arc<dyn IdentityProvider>,
	store: Arc<dyn IssuanceStore>,
	rate_limiter: RateLimiter,
	provisioner: IdentityProvisioner,
	issuer: TokenIssuer,
	recorder: AuditRecorder,
}
impl Broker {
	/// Creates a broker over the given provider + store using the system clock.
	pub fn new(
		config: Arc<BrokerConfig>,
		provider: Arc<dyn IdentityProvider>,
		store: Arc<dyn IssuanceStore>,
	) -> Self {
		let clock: Arc<dyn Clock> = Arc::new(SystemClock);

		Self::assemble(config, provider, store, clock)
	}

	/// Builds the default HTTP-backed broker (GoTrue provider + PostgREST store) from `config`.
	#[cfg(feature = "reqwest")]
	pub fn from_config(config: BrokerConfig) -> Result<Self> {
		let http_client = Arc::new(ReqwestHttpClient::with_timeout(config.request_timeout)?);
		let mapper = Arc::new(ReqwestTransportErrorMapper);
		let upstream = || {
			UpstreamClient::<ReqwestHttpClient, ReqwestTransportErrorMapper>::new(
				config.base_url.clone(),
				config.service_key.clone(),
				http_client.clone(),
				mapper.clone(),
			)
		};
		let provider: Arc<dyn IdentityProvider> = Arc::new(ReqwestGoTrueProvider::new(upstream()));
		let store: Arc<dyn IssuanceStore> = Arc::new(ReqwestPostgrestStore::new(upstream()));

		Ok(Self::new(Arc::new(config), provider, store))
	}

	/// Replaces the clock used for day keys, expiry, and audit timestamps.
	pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
		Self::assemble(self.config, self.provider, self.store, clock)
	}

	/// Configuration the broker was built with.
	pub fn config(&self) -> &BrokerConfig {
		&self.config
	}

	/// Runs the pipeline for one requester after the method gate passed.
	///
	/// The quota check increments even when it refuses, identities whose exchange fails are
	/// deleted before this returns, and audit failures are swallowed.
	pub async fn issue(&self, ip: &ClientIp) -> Result<Issuance> {
		let span = StageSpan::new(Stage::Issue, Some(ip));

		obs::record_stage_outcome(Stage::Issue, StageOutcome::Attempt);

		let result = span.instrument(self.run(ip)).await;

		match &result {
			Ok(_) => obs::record_stage_outcome(Stage::Issue, StageOutcome::Success),
			Err(Error::RateLimitExceeded { .. }) =>
				obs::record_stage_outcome(Stage::Issue, StageOutcome::Rejected),
			Err(_) => obs::record_stage_outcome(Stage::Issue, StageOutcome::Failure),
		}

		result
	}

	async fn run(&self, ip: &ClientIp) -> Result<Issuance> {
		let limit = self.config.daily_limit;
		let decision = self.rate_limiter.check_and_increment(ip, limit).await?;

		if !decision.allowed {
			return Err(Error::RateLimitExceeded { count: decision.count, limit });
		}

		let identity = self.provisioner.provision().await?;
		let mut undo = UndoStack::default();

		undo.push(UndoStep::DeleteIdentity(identity.id.clone()));

		let grant = self.issuer.issue(&identity, &mut undo).await?;
		let token = IssuedToken::new(grant, self.clock.now(), self.config.token_ttl);

		self.recorder.record(&identity.id, ip, token.expires_at).await;

		Ok(Issuance { token, user: identity.descriptor(), count: decision.count })
	}

	fn assemble(
		config: Arc<BrokerConfig>,
		provider: Arc<dyn IdentityProvider>,
		store: Arc<dyn IssuanceStore>,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			rate_limiter: RateLimiter::new(store.clone(), clock.clone()),
			provisioner: IdentityProvisioner::new(
				provider.clone(),
				config.email_domain.clone(),
				config.created_by.clone(),
			),
			issuer: TokenIssuer::new(provider.clone()),
			recorder: AuditRecorder::new(store.clone(), clock.clone()),
			config,
			clock,
			provider,
			store,
		}
	}
}
impl Debug for Broker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker").field("config", &self.config).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::_preludet::{build_memory_test_broker, test_config};

	fn ip() -> ClientIp {
		ClientIp::new("203.0.113.5").expect("Client IP fixture should be valid.")
	}

	#[tokio::test]
	async fn issuance_runs_every_stage() {
		let now = macros::datetime!(2024-01-01 00:00 UTC);
		let (broker, provider, store, _) =
			build_memory_test_broker(test_config("https://project.supabase.co", 10, 60), now);
		let issuance = broker.issue(&ip()).await.expect("Issuance should succeed.");

		assert_eq!(issuance.count, 1);
		assert_eq!(issuance.token.expires_at, macros::datetime!(2024-01-01 01:00 UTC));
		assert!(provider.get(&issuance.user.id).is_some());
		assert_eq!(store.audit_records().len(), 1);
	}

	#[test]
	fn states_follow_the_failing_stage() {
		let exchange = Error::Exchange(crate::error::UpstreamError::Timeout);
		let limited = Error::RateLimitExceeded { count: 11, limit: 10 };

		assert_eq!(IssuanceState::reached_before(&exchange), IssuanceState::Provisioned);
		assert_eq!(IssuanceState::terminal_for(&exchange), IssuanceState::Failed);
		assert_eq!(IssuanceState::reached_before(&limited), IssuanceState::RateChecked);
		assert_eq!(IssuanceState::terminal_for(&limited), IssuanceState::Rejected);
	}
}
