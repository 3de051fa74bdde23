//! Transport seam for every call the broker makes to the identity provider and the datastore.
//!
//! [`UpstreamHttpClient`] hands out one [`AsyncHttpClient`] handle per call, each bound to a fresh
//! [`ResponseMetadataSlot`]. Whatever the transport learns about the response (status, latency)
//! lands in the slot, so a failure that happens after the status line arrived can still be
//! classified by status in [`crate::upstream::TransportErrorMapper`].

// std
use std::time::Duration as StdDuration;
#[cfg(feature = "reqwest")] use std::time::Instant;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError};
#[cfg(feature = "reqwest")] use oauth2::{HttpRequest, HttpResponse};
#[cfg(feature = "reqwest")] use reqwest::redirect::Policy;
// self
use crate::_prelude::*;
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// HTTP stack used for upstream calls.
///
/// Implementations are shared by every in-flight request, so they must be `Send + Sync +
/// 'static`, and the futures returned by their handles must be `Send`.
pub trait UpstreamHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Error type the transport reports through [`HttpClientError::Reqwest`].
	type TransportError: 'static + Send + Sync + StdError;

	/// Per-call [`AsyncHttpClient`] bound to one [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Returns a handle that reports into `slot`.
	///
	/// Handles clear `slot` before sending and fill it as soon as a status is known, even when
	/// reading the body fails afterwards.
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// What the transport observed about one upstream response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
	/// Status code, once the status line was received.
	pub status: Option<u16>,
	/// Time from dispatch until the status line arrived.
	pub elapsed: Option<StdDuration>,
}

/// Shared cell through which a handle passes [`ResponseMetadata`] back to the caller.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Replaces the slot content.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Empties the slot, returning what it held.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Default transport built on a shared [`ReqwestClient`].
///
/// Clients built by [`ReqwestHttpClient::with_timeout`] bound every call and never follow
/// redirects.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Uses an already configured [`ReqwestClient`] as is.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that aborts every call after `timeout`.
	pub fn with_timeout(timeout: StdDuration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().timeout(timeout).redirect(Policy::none()).build()?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl UpstreamHttpClient for ReqwestHttpClient {
	type Handle = ReqwestHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ReqwestHandle { client: self.0.clone(), slot }
	}
}

/// Handle returned by [`ReqwestHttpClient::with_metadata`].
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestHandle {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}
#[cfg(feature = "reqwest")]
impl ReqwestHandle {
	async fn execute(
		client: ReqwestClient,
		slot: ResponseMetadataSlot,
		request: HttpRequest,
	) -> Result<HttpResponse, HttpClientError<ReqwestError>> {
		slot.take();

		let started = Instant::now();
		let request: reqwest::Request = request.try_into().map_err(Box::new)?;
		let upstream = client.execute(request).await.map_err(Box::new)?;
		let status = upstream.status();

		slot.store(ResponseMetadata {
			status: Some(status.as_u16()),
			elapsed: Some(started.elapsed()),
		});

		let headers = upstream.headers().clone();
		let body = upstream.bytes().await.map_err(Box::new)?;
		let mut response = HttpResponse::new(body.to_vec());

		*response.status_mut() = status;
		*response.headers_mut() = headers;

		Ok(response)
	}
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for ReqwestHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(Self::execute(self.client.clone(), self.slot.clone(), request))
	}
}
