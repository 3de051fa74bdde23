//! Throwaway identities provisioned on the upstream provider.

// crates.io
use serde_json::{Map, Value};
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	auth::{IdentityId, Secret},
};

/// Number of random bytes behind every generated password (hex-encoded on the wire).
pub const SECRET_BYTES: usize = 24;

/// Metadata tagging an identity as anonymous and recording which system issued it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdentityMetadata {
	/// Always `true` for identities minted by the broker.
	#[serde(default)]
	pub anon: bool,
	/// Provenance tag of the issuing system.
	#[serde(default)]
	pub created_by: String,
	/// Additional keys the provider attached to the metadata object.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl IdentityMetadata {
	/// Builds the metadata for an anonymous identity issued by `created_by`.
	pub fn anonymous(created_by: impl Into<String>) -> Self {
		Self { anon: true, created_by: created_by.into(), extra: Map::new() }
	}
}

/// Credentials generated locally before the provider assigns an identifier.
#[derive(Clone, Debug)]
pub struct IdentityDraft {
	/// Synthetic, collision-free address (`anon+<uuid>@<domain>`).
	pub email: String,
	/// Random password; only ever sent to the provider.
	pub password: Secret,
	/// Metadata attached at creation time.
	pub metadata: IdentityMetadata,
}
impl IdentityDraft {
	/// Generates a fresh address + password pair under `email_domain`.
	pub fn generate(email_domain: &str, created_by: &str) -> Self {
		let suffix = Uuid::new_v4();

		Self {
			email: format!("anon+{suffix}@{email_domain}"),
			password: Secret::random_hex(SECRET_BYTES),
			metadata: IdentityMetadata::anonymous(created_by),
		}
	}
}

/// Anonymous identity after the provider accepted it.
#[derive(Clone, Debug)]
pub struct AnonymousIdentity {
	/// Identifier assigned by the provider.
	pub id: IdentityId,
	/// Synthetic address used as the login name.
	pub email: String,
	/// Password generated for the credential exchange.
	pub password: Secret,
	/// Metadata as echoed back by the provider.
	pub metadata: IdentityMetadata,
}
impl AnonymousIdentity {
	/// Combines a draft with the identifier + metadata returned by the provider.
	pub fn from_draft(
		draft: IdentityDraft,
		id: IdentityId,
		metadata: Option<IdentityMetadata>,
	) -> Self {
		Self {
			id,
			email: draft.email,
			password: draft.password,
			metadata: metadata.unwrap_or(draft.metadata),
		}
	}

	/// Returns the public view of the identity sent back to callers.
	pub fn descriptor(&self) -> IdentityDescriptor {
		IdentityDescriptor {
			id: self.id.clone(),
			email: self.email.clone(),
			user_metadata: self.metadata.clone(),
		}
	}
}

/// Minimal identity view embedded in issuance responses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdentityDescriptor {
	/// Identifier assigned by the provider.
	pub id: IdentityId,
	/// Synthetic address.
	pub email: String,
	/// Identity metadata.
	pub user_metadata: IdentityMetadata,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn drafts_use_unique_synthetic_addresses() {
		let first = IdentityDraft::generate("example.com", "edge-get-anon");
		let second = IdentityDraft::generate("example.com", "edge-get-anon");

		assert!(first.email.starts_with("anon+"));
		assert!(first.email.ends_with("@example.com"));
		assert_ne!(first.email, second.email);
		assert_eq!(first.password.expose().len(), SECRET_BYTES * 2);
		assert!(first.metadata.anon);
		assert_eq!(first.metadata.created_by, "edge-get-anon");
	}

	#[test]
	fn metadata_serializes_flat_and_keeps_unknown_keys() {
		let metadata = IdentityMetadata::anonymous("edge-get-anon");
		let json = serde_json::to_value(&metadata).expect("Metadata should serialize.");

		assert_eq!(json, serde_json::json!({ "anon": true, "created_by": "edge-get-anon" }));

		let echoed: IdentityMetadata = serde_json::from_value(serde_json::json!({
			"anon": true,
			"created_by": "edge-get-anon",
			"email_verified": true
		}))
		.expect("Provider metadata should deserialize.");

		assert_eq!(echoed.extra.get("email_verified"), Some(&Value::Bool(true)));
	}

	#[test]
	fn identity_prefers_provider_metadata() {
		let draft = IdentityDraft::generate("example.com", "edge-get-anon");
		let id = IdentityId::new("identity-1").expect("Identity fixture should be valid.");
		let mut echoed = IdentityMetadata::anonymous("edge-get-anon");

		echoed.extra.insert("email_verified".into(), Value::Bool(true));

		let identity = AnonymousIdentity::from_draft(draft, id, Some(echoed.clone()));

		assert_eq!(identity.descriptor().user_metadata, echoed);
		assert_eq!(identity.descriptor().id.as_ref(), "identity-1");
	}
}
