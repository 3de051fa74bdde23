//! Inbound side of the issuance endpoint: method gate, requester address, response shaping.
//!
//! The functions here are transport-agnostic. They operate on `http` types so any server
//! framework built on the same crate (the bundled binary uses axum) can forward a request and
//! write back an [`IssuanceResponse`] unchanged.

// crates.io
use oauth2::http::{HeaderMap, Method};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{ClientIp, IdentityDescriptor},
	flows::{Broker, Issuance, IssuanceState},
	obs,
};

/// Header whose first hop identifies the original requester behind a proxy.
pub const FORWARDED_FOR: &str = "x-forwarded-for";
/// Single-address fallback header set by some proxies.
pub const REAL_IP: &str = "x-real-ip";

/// Status + JSON body produced for one inbound request.
#[derive(Clone, Debug, PartialEq)]
pub struct IssuanceResponse {
	/// HTTP status code.
	pub status: u16,
	/// JSON payload; always an object.
	pub body: Value,
}
impl IssuanceResponse {
	/// Content type of every response body.
	pub const CONTENT_TYPE: &'static str = "application/json";

	/// Builds the `200` payload for a completed issuance.
	pub fn success(issuance: &Issuance) -> Self {
		let body = SuccessBody {
			access_token: issuance.token.access_token.expose(),
			expires_at: issuance.token.expires_at,
			token_type: &issuance.token.token_type,
			user: &issuance.user,
		};

		match serde_json::to_value(&body) {
			Ok(body) => Self { status: 200, body },
			Err(e) => {
				obs::log_swallowed(obs::Stage::Issue, &e);

				Self::message(500, INTERNAL_ERROR)
			},
		}
	}

	/// Builds the `{ "error": .. }` payload for `error`; upstream details are never included.
	pub fn error(error: &Error) -> Self {
		Self::message(error.status_code(), error.public_message())
	}

	/// Serializes the body for the wire.
	pub fn to_bytes(&self) -> Vec<u8> {
		self.body.to_string().into_bytes()
	}

	fn message(status: u16, message: &str) -> Self {
		Self { status, body: serde_json::json!({ "error": message }) }
	}
}

const INTERNAL_ERROR: &str = "Internal server error";

#[derive(Serialize)]
struct SuccessBody<'a> {
	access_token: &'a str,
	#[serde(with = "time::serde::rfc3339")]
	expires_at: OffsetDateTime,
	token_type: &'a str,
	user: &'a IdentityDescriptor,
}

/// Resolves the requester address: first hop of `x-forwarded-for`, then `x-real-ip`, then
/// [`ClientIp::unknown`].
///
/// The result is advisory. Values that are empty or not valid identifiers are skipped.
pub fn client_ip(headers: &HeaderMap) -> ClientIp {
	let forwarded = headers
		.get(FORWARDED_FOR)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.split(',').next());
	let real = headers.get(REAL_IP).and_then(|value| value.to_str().ok());

	[forwarded, real]
		.into_iter()
		.flatten()
		.map(str::trim)
		.find_map(|value| ClientIp::new(value).ok())
		.unwrap_or_else(ClientIp::unknown)
}

impl Broker {
	/// Handles one inbound request end to end and never fails; every error maps to a status.
	pub async fn handle(&self, method: &Method, headers: &HeaderMap) -> IssuanceResponse {
		let result = if method == Method::POST {
			self.issue(&client_ip(headers)).await
		} else {
			Err(Error::MethodNotAllowed { method: method.to_string() })
		};

		match result {
			Ok(issuance) => {
				let response = IssuanceResponse::success(&issuance);
				let state = if response.status == 200 {
					IssuanceState::Responded
				} else {
					IssuanceState::Failed
				};

				obs::log_termination(
					state.as_str(),
					IssuanceState::Recorded.as_str(),
					response.status,
				);

				response
			},
			Err(e) => {
				let response = IssuanceResponse::error(&e);

				obs::log_termination(
					IssuanceState::terminal_for(&e).as_str(),
					IssuanceState::reached_before(&e).as_str(),
					response.status,
				);

				response
			},
		}
	}
}
