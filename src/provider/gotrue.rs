//! Supabase Auth (GoTrue) identity provider spoken over HTTP.

// crates.io
use oauth2::http::{Method, header::CONTENT_TYPE};
use url::form_urlencoded::Serializer as FormSerializer;
// self
use crate::{
	_prelude::*,
	auth::{AnonymousIdentity, IdentityDraft, IdentityId, IdentityMetadata, TokenGrant},
	error::UpstreamError,
	http::UpstreamHttpClient,
	provider::{IdentityProvider, ProviderFuture},
	upstream::{self, FORM, TransportErrorMapper, UpstreamClient},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, upstream::ReqwestTransportErrorMapper};

const ADMIN_USERS_PATH: &str = "auth/v1/admin/users";
const TOKEN_PATH: &str = "auth/v1/token";

#[cfg(feature = "reqwest")]
/// Provider specialized for the crate's default reqwest transport stack.
pub type ReqwestGoTrueProvider = GoTrueProvider<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// [`IdentityProvider`] backed by the GoTrue admin + token endpoints.
///
/// Every call authenticates with the service credential held by the [`UpstreamClient`], so the
/// admin endpoints accept `email_confirm` and the token endpoint never waits on a verification
/// email.
pub struct GoTrueProvider<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	upstream: UpstreamClient<C, M>,
}
impl<C, M> GoTrueProvider<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a provider that issues calls through `upstream`.
	pub fn new(upstream: UpstreamClient<C, M>) -> Self {
		Self { upstream }
	}

	async fn create_now(&self, draft: IdentityDraft) -> Result<AnonymousIdentity, UpstreamError> {
		let url = self.upstream.endpoint(ADMIN_USERS_PATH)?;
		let body = CreateUserBody {
			email: &draft.email,
			password: draft.password.expose(),
			email_confirm: true,
			user_metadata: &draft.metadata,
		};
		let request =
			UpstreamClient::<C, M>::json_body(self.upstream.request(Method::POST, &url), &body)?;
		let response = self.upstream.send(request).await?;
		let user: CreatedUser = upstream::decode_json(&response)?;

		Ok(AnonymousIdentity::from_draft(draft, user.id, user.user_metadata))
	}

	async fn exchange_now(
		&self,
		email: &str,
		password: &str,
	) -> Result<TokenGrant, UpstreamError> {
		let mut url = self.upstream.endpoint(TOKEN_PATH)?;

		url.query_pairs_mut().append_pair("grant_type", "password");

		let form = FormSerializer::new(String::new())
			.append_pair("email", email)
			.append_pair("password", password)
			.finish();
		let request = self
			.upstream
			.request(Method::POST, &url)
			.header(CONTENT_TYPE, FORM)
			.body(form.into_bytes())?;
		let response = self.upstream.send(request).await?;

		upstream::decode_json(&response)
	}

	async fn delete_now(&self, id: &IdentityId) -> Result<(), UpstreamError> {
		let url = self.upstream.endpoint(&format!("{ADMIN_USERS_PATH}/{id}"))?;
		let request = self.upstream.request(Method::DELETE, &url).body(Vec::new())?;

		self.upstream.send(request).await?;

		Ok(())
	}
}
impl<C, M> IdentityProvider for GoTrueProvider<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn create_identity(&self, draft: IdentityDraft) -> ProviderFuture<'_, AnonymousIdentity> {
		Box::pin(self.create_now(draft))
	}

	fn exchange_password<'a>(
		&'a self,
		email: &'a str,
		password: &'a str,
	) -> ProviderFuture<'a, TokenGrant> {
		Box::pin(self.exchange_now(email, password))
	}

	fn delete_identity<'a>(&'a self, id: &'a IdentityId) -> ProviderFuture<'a, ()> {
		Box::pin(self.delete_now(id))
	}
}
impl<C, M> Debug for GoTrueProvider<C, M>
where
	C: ?Sized + UpstreamHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GoTrueProvider").field("upstream", &self.upstream).finish()
	}
}

#[derive(Serialize)]
struct CreateUserBody<'a> {
	email: &'a str,
	password: &'a str,
	email_confirm: bool,
	user_metadata: &'a IdentityMetadata,
}

#[derive(Deserialize)]
struct CreatedUser {
	id: IdentityId,
	#[serde(default)]
	user_metadata: Option<IdentityMetadata>,
}
