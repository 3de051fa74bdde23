//! Secure secret wrapper that redacts sensitive material.

// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Redacted secret wrapper keeping passwords, access tokens, and service keys out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret(String);
impl Secret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Draws `len` bytes from the thread-local CSPRNG and hex-encodes them.
	pub fn random_hex(len: usize) -> Self {
		let mut bytes = vec![0_u8; len];

		rand::rng().fill(bytes.as_mut_slice());

		Self(hex::encode(bytes))
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for Secret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Secret").field(&"<redacted>").finish()
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
