//! Broker-level error types shared across flows, upstream clients, and configuration.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// Inbound request used a method other than POST.
	#[error("Method `{method}` is not allowed.")]
	MethodNotAllowed {
		/// Method supplied by the caller.
		method: String,
	},
	/// The requester exhausted its daily quota.
	#[error("Rate limit exceeded: {count} requests against a limit of {limit}.")]
	RateLimitExceeded {
		/// Post-increment counter value for the current day.
		count: u64,
		/// Configured daily limit.
		limit: u64,
	},
	/// The datastore upsert backing the rate limiter failed.
	#[error("Rate limit check failed.")]
	RateLimitCheck(#[source] UpstreamError),
	/// The identity provider refused to create the anonymous identity.
	#[error("Identity provisioning failed.")]
	Provisioning(#[source] UpstreamError),
	/// The credential exchange failed; the compensating delete has already been attempted.
	#[error("Credential exchange failed.")]
	Exchange(#[source] UpstreamError),
	/// The audit insert failed. Never surfaced to callers.
	#[error("Audit record insert failed.")]
	Audit(#[source] UpstreamError),
}
impl Error {
	/// HTTP status code that represents this error on the issuance endpoint.
	pub fn status_code(&self) -> u16 {
		match self {
			Self::MethodNotAllowed { .. } => 405,
			Self::RateLimitExceeded { .. } => 429,
			Self::Config(_)
			| Self::RateLimitCheck(_)
			| Self::Provisioning(_)
			| Self::Exchange(_)
			| Self::Audit(_) => 500,
		}
	}

	/// Generic message returned to callers; upstream diagnostics never leak into responses.
	pub fn public_message(&self) -> &'static str {
		match self.status_code() {
			405 => "Method not allowed",
			429 => "Rate limit exceeded",
			_ => "Internal server error",
		}
	}

	/// Returns the upstream failure behind this error, if any.
	pub fn upstream(&self) -> Option<&UpstreamError> {
		match self {
			Self::RateLimitCheck(e) | Self::Provisioning(e) | Self::Exchange(e) | Self::Audit(e) =>
				Some(e),
			_ => None,
		}
	}
}

/// Configuration and validation failures raised at startup.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A required environment variable is missing.
	#[error("Environment variable `{name}` is required.")]
	MissingVar {
		/// Variable name.
		name: &'static str,
	},
	/// An environment variable holds a value that cannot be used.
	#[error("Environment variable `{name}` has an invalid value `{value}`: {reason}.")]
	InvalidVar {
		/// Variable name.
		name: &'static str,
		/// Raw value as read from the environment.
		value: String,
		/// Why the value was rejected.
		reason: &'static str,
	},
	/// Upstream base URL cannot be parsed.
	#[error("Upstream base URL is invalid.")]
	InvalidBaseUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failure reported by an upstream service (identity provider or datastore).
#[derive(Debug, ThisError)]
pub enum UpstreamError {
	/// Upstream answered with a non-success status.
	#[error("Upstream returned HTTP {status}: {body}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Preview of the response body for diagnostics.
		body: String,
	},
	/// Upstream answered with JSON that does not match the expected shape.
	#[error("Upstream returned malformed JSON.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Upstream answered successfully but returned no row.
	#[error("Upstream returned an empty response.")]
	EmptyResponse,
	/// The per-call timeout elapsed.
	#[error("Upstream request timed out.")]
	Timeout,
	/// Endpoint URL could not be derived from the configured base URL.
	#[error("Upstream endpoint `{path}` is invalid.")]
	InvalidEndpoint {
		/// Relative path that failed to join.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Outbound payload could not be serialized.
	#[error("Upstream request body could not be encoded.")]
	Encode(#[source] serde_json::Error),
	/// Outbound request could not be constructed.
	#[error("Upstream request could not be built.")]
	Request(#[from] oauth2::http::Error),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl UpstreamError {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Builds a [`UpstreamError::Status`] while truncating oversized bodies.
	pub fn status(status: u16, body: impl AsRef<[u8]>) -> Self {
		let text = String::from_utf8_lossy(body.as_ref());
		let body = match text.char_indices().nth(Self::BODY_PREVIEW_LIMIT) {
			Some((idx, _)) => format!("{}...", &text[..idx]),
			None => text.into_owned(),
		};

		Self::Status { status, body }
	}

	/// Returns the upstream HTTP status, when one was observed.
	pub fn http_status(&self) -> Option<u16> {
		match self {
			Self::Status { status, .. } => Some(*status),
			Self::Decode { status, .. } => *status,
			_ => None,
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the upstream service.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the upstream service.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
