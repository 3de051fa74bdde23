//! Shared plumbing for calls against the upstream identity provider and datastore.
//!
//! Both upstream surfaces authenticate with the same service credential and report failures
//! the same way, so [`UpstreamClient`] owns request construction, dispatch through an
//! [`UpstreamHttpClient`], status checking, and JSON decoding. Transport failures are funneled
//! through a [`TransportErrorMapper`] so custom HTTP stacks can classify their own errors.

pub use oauth2;

// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	http::{
		Method, Request,
		header::{AUTHORIZATION, CONTENT_TYPE},
		request::Builder,
	},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::Secret,
	error::{TransportError, UpstreamError},
	http::{ResponseMetadata, ResponseMetadataSlot, UpstreamHttpClient},
};

/// Content type used for JSON payloads.
pub const JSON: &str = "application/json";
/// Content type used for form-encoded payloads.
pub const FORM: &str = "application/x-www-form-urlencoded";

/// Maps HTTP transport failures into [`UpstreamError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into an upstream error.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> UpstreamError;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> UpstreamError {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(*inner),
			HttpClientError::Http(inner) => UpstreamError::Request(inner),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_generic_transport_error(meta, "unrecognized transport failure"),
		}
	}
}

/// Authenticated client for one upstream base URL.
pub struct UpstreamClient<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	base_url: Url,
	service_key: Secret,
}
impl<C, M> UpstreamClient<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client for `base_url` that authenticates with `service_key`.
	pub fn new(
		base_url: Url,
		service_key: Secret,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
			base_url,
			service_key,
		}
	}

	/// Resolves `path` (relative, no leading slash) against the base URL.
	pub fn endpoint(&self, path: &str) -> Result<Url, UpstreamError> {
		self.base_url
			.join(path)
			.map_err(|source| UpstreamError::InvalidEndpoint { path: path.to_owned(), source })
	}

	/// Starts a request that already carries the service credential headers.
	pub fn request(&self, method: Method, url: &Url) -> Builder {
		let key = self.service_key.expose();

		Request::builder()
			.method(method)
			.uri(url.as_str())
			.header("apikey", key)
			.header(AUTHORIZATION, format!("Bearer {key}"))
	}

	/// Finishes `builder` with a JSON body.
	pub fn json_body<T>(builder: Builder, body: &T) -> Result<HttpRequest, UpstreamError>
	where
		T: ?Sized + Serialize,
	{
		let payload = serde_json::to_vec(body).map_err(UpstreamError::Encode)?;

		Ok(builder.header(CONTENT_TYPE, JSON).body(payload)?)
	}

	/// Dispatches `request` and rejects non-success statuses.
	pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, UpstreamError> {
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());
		let outcome = handle.call(request).await;
		let meta = slot.take();
		let response =
			outcome.map_err(|err| self.error_mapper.map_transport_error(meta.as_ref(), err))?;
		let status = response.status();

		#[cfg(feature = "tracing")]
		tracing::debug!(
			status = status.as_u16(),
			elapsed_ms = meta.and_then(|m| m.elapsed).map(|elapsed| elapsed.as_millis() as u64),
			"upstream call completed"
		);

		if !status.is_success() {
			return Err(UpstreamError::status(status.as_u16(), response.body()));
		}

		Ok(response)
	}
}
impl<C, M> Debug for UpstreamClient<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UpstreamClient")
			.field("base_url", &self.base_url.as_str())
			.field("service_key", &self.service_key)
			.finish()
	}
}

/// Decodes a JSON response body, keeping the failing path for diagnostics.
pub fn decode_json<T>(response: &HttpResponse) -> Result<T, UpstreamError>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(response.body());

	serde_path_to_error::deserialize(&mut deserializer).map_err(|source| UpstreamError::Decode {
		source,
		status: Some(response.status().as_u16()),
	})
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(err: ReqwestError) -> UpstreamError {
	if err.is_timeout() {
		return UpstreamError::Timeout;
	}
	if let Some(status) = err.status() {
		return UpstreamError::status(status.as_u16(), err.to_string());
	}

	TransportError::from(err).into()
}

#[cfg_attr(not(feature = "reqwest"), allow(dead_code))]
fn map_generic_transport_error(
	meta: Option<&ResponseMetadata>,
	message: impl Display,
) -> UpstreamError {
	match meta.and_then(|value| value.status) {
		Some(status) => UpstreamError::status(status, message.to_string()),
		None => TransportError::network(GenericTransportError(message.to_string())).into(),
	}
}

#[derive(Debug, ThisError)]
#[error("HTTP client error occurred while calling the upstream service: {0}.")]
struct GenericTransportError(String);

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::StatusCode;
	// self
	use super::*;

	fn response(status: u16, body: &str) -> HttpResponse {
		let mut response = HttpResponse::new(body.as_bytes().to_vec());

		*response.status_mut() =
			StatusCode::from_u16(status).expect("Fixture status should be valid.");

		response
	}

	#[derive(Debug, Deserialize)]
	struct Row {
		count: u64,
	}

	#[test]
	fn decode_reports_the_failing_path() {
		let err = decode_json::<Vec<Row>>(&response(201, "[{\"count\":\"many\"}]"))
			.expect_err("String counts should fail to decode.");
		let UpstreamError::Decode { source, status } = err else {
			panic!("Expected a decode error.");
		};

		assert_eq!(status, Some(201));
		assert_eq!(source.path().to_string(), "[0].count");

		let rows = decode_json::<Vec<Row>>(&response(201, "[{\"count\":4}]"))
			.expect("Numeric counts should decode.");

		assert_eq!(rows[0].count, 4);
	}

	#[test]
	fn generic_transport_errors_keep_observed_status() {
		let meta = ResponseMetadata { status: Some(502), elapsed: None };
		let with_status = map_generic_transport_error(Some(&meta), "connection reset");
		let without_status = map_generic_transport_error(None, "connection reset");

		assert_eq!(with_status.http_status(), Some(502));
		assert!(matches!(without_status, UpstreamError::Transport(TransportError::Network { .. })));
	}
}
