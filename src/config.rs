//! Process-wide configuration, loaded once at startup and shared immutably.

// std
use std::{net::SocketAddr, time::Duration as StdDuration};
// self
use crate::{_prelude::*, auth::Secret, error::ConfigError};

const ENV_BASE_URL: &str = "SUPABASE_URL";
const ENV_SERVICE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
const ENV_TOKEN_TTL_MIN: &str = "ANON_TOKEN_TTL_MIN";
const ENV_DAILY_LIMIT: &str = "DAILY_LIMIT_PER_IP";
const ENV_REQUEST_TIMEOUT_SECS: &str = "ANON_REQUEST_TIMEOUT_SECS";
const ENV_EMAIL_DOMAIN: &str = "ANON_EMAIL_DOMAIN";
const ENV_CREATED_BY: &str = "ANON_CREATED_BY";
const ENV_BIND_ADDRESS: &str = "BIND_ADDRESS";

/// Immutable broker configuration.
///
/// Every component receives the values it needs from this struct at construction time; nothing
/// is re-read after startup.
#[derive(Clone)]
pub struct BrokerConfig {
	/// Upstream base URL shared by the identity provider and the datastore.
	pub base_url: Url,
	/// Service credential sent as both `apikey` and bearer token.
	pub service_key: Secret,
	/// Lifetime advertised for issued tokens.
	pub token_ttl: Duration,
	/// Number of successful issuances allowed per IP per UTC day.
	pub daily_limit: u64,
	/// Bound applied to every individual upstream call.
	pub request_timeout: StdDuration,
	/// Domain used for synthetic identity addresses.
	pub email_domain: String,
	/// Provenance tag written into identity metadata.
	pub created_by: String,
	/// Listen address for the HTTP server binary.
	pub bind_address: SocketAddr,
}
impl BrokerConfig {
	/// Default token lifetime in minutes.
	pub const DEFAULT_TOKEN_TTL_MIN: i64 = 60;
	/// Default daily per-IP quota.
	pub const DEFAULT_DAILY_LIMIT: u64 = 10;
	/// Default per-call upstream timeout in seconds.
	pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
	/// Default synthetic address domain.
	pub const DEFAULT_EMAIL_DOMAIN: &'static str = "example.com";
	/// Default provenance tag.
	pub const DEFAULT_CREATED_BY: &'static str = "edge-get-anon";
	/// Default server listen address.
	pub const DEFAULT_BIND_ADDRESS: &'static str = "0.0.0.0:8080";

	/// Creates a configuration with defaults for everything except the upstream endpoint.
	pub fn new(base_url: Url, service_key: impl Into<String>) -> Self {
		Self {
			base_url: normalize_base_url(base_url),
			service_key: Secret::new(service_key),
			token_ttl: Duration::minutes(Self::DEFAULT_TOKEN_TTL_MIN),
			daily_limit: Self::DEFAULT_DAILY_LIMIT,
			request_timeout: StdDuration::from_secs(Self::DEFAULT_REQUEST_TIMEOUT_SECS),
			email_domain: Self::DEFAULT_EMAIL_DOMAIN.into(),
			created_by: Self::DEFAULT_CREATED_BY.into(),
			bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
		}
	}

	/// Loads the configuration from process environment variables.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads the configuration through `lookup`, which maps a variable name to its value.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let required = |name: &'static str| {
			lookup(name)
				.map(|value| value.trim().to_owned())
				.filter(|value| !value.is_empty())
				.ok_or(ConfigError::MissingVar { name })
		};
		let base_url = Url::parse(&required(ENV_BASE_URL)?)
			.map_err(|source| ConfigError::InvalidBaseUrl { source })?;
		let service_key = required(ENV_SERVICE_KEY)?;
		let ttl_minutes = positive(ENV_TOKEN_TTL_MIN, lookup(ENV_TOKEN_TTL_MIN))?
			.unwrap_or(Self::DEFAULT_TOKEN_TTL_MIN as u64);
		let token_ttl = i64::try_from(ttl_minutes)
			.ok()
			.and_then(|minutes| minutes.checked_mul(60))
			.map(Duration::seconds)
			.ok_or_else(|| ConfigError::InvalidVar {
				name: ENV_TOKEN_TTL_MIN,
				value: ttl_minutes.to_string(),
				reason: "value is out of range",
			})?;
		let daily_limit = positive(ENV_DAILY_LIMIT, lookup(ENV_DAILY_LIMIT))?
			.unwrap_or(Self::DEFAULT_DAILY_LIMIT);
		let timeout_secs = positive(ENV_REQUEST_TIMEOUT_SECS, lookup(ENV_REQUEST_TIMEOUT_SECS))?
			.unwrap_or(Self::DEFAULT_REQUEST_TIMEOUT_SECS);
		let bind_raw =
			lookup(ENV_BIND_ADDRESS).unwrap_or_else(|| Self::DEFAULT_BIND_ADDRESS.to_owned());
		let bind_address = bind_raw.trim().parse().map_err(|_| ConfigError::InvalidVar {
			name: ENV_BIND_ADDRESS,
			value: bind_raw.clone(),
			reason: "expected a socket address such as 0.0.0.0:8080",
		})?;
		let mut config = Self::new(base_url, service_key)
			.with_token_ttl(token_ttl)
			.with_daily_limit(daily_limit)
			.with_request_timeout(StdDuration::from_secs(timeout_secs));

		config.bind_address = bind_address;

		if let Some(domain) = lookup(ENV_EMAIL_DOMAIN).filter(|v| !v.trim().is_empty()) {
			config.email_domain = domain.trim().to_owned();
		}
		if let Some(tag) = lookup(ENV_CREATED_BY).filter(|v| !v.trim().is_empty()) {
			config.created_by = tag.trim().to_owned();
		}

		Ok(config)
	}

	/// Overrides the token lifetime.
	pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
		self.token_ttl = ttl;

		self
	}

	/// Overrides the daily per-IP quota.
	pub fn with_daily_limit(mut self, limit: u64) -> Self {
		self.daily_limit = limit;

		self
	}

	/// Overrides the per-call upstream timeout.
	pub fn with_request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the synthetic address domain.
	pub fn with_email_domain(mut self, domain: impl Into<String>) -> Self {
		self.email_domain = domain.into();

		self
	}

	/// Overrides the provenance tag.
	pub fn with_created_by(mut self, tag: impl Into<String>) -> Self {
		self.created_by = tag.into();

		self
	}
}
impl Debug for BrokerConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BrokerConfig")
			.field("base_url", &self.base_url.as_str())
			.field("service_key", &self.service_key)
			.field("token_ttl", &self.token_ttl)
			.field("daily_limit", &self.daily_limit)
			.field("request_timeout", &self.request_timeout)
			.field("email_domain", &self.email_domain)
			.field("created_by", &self.created_by)
			.field("bind_address", &self.bind_address)
			.finish()
	}
}

// `Url::join` drops the last path segment unless the base ends with a slash.
fn normalize_base_url(mut url: Url) -> Url {
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	url
}

fn positive(name: &'static str, raw: Option<String>) -> Result<Option<u64>, ConfigError> {
	let Some(raw) = raw else {
		return Ok(None);
	};
	let trimmed = raw.trim();

	if trimmed.is_empty() {
		return Ok(None);
	}

	match trimmed.parse::<u64>() {
		Ok(0) =>
			Err(ConfigError::InvalidVar { name, value: raw, reason: "value must be positive" }),
		Ok(value) => Ok(Some(value)),
		Err(_) => Err(ConfigError::InvalidVar { name, value: raw, reason: "expected an integer" }),
	}
}
