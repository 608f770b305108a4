//! Access tokens returned by the token endpoint and their cached form.

// self
use crate::{_prelude::*, auth::Secret};

/// Successful output of one authentication run.
#[derive(Clone, Debug)]
pub struct AuthResult {
	/// Bearer token; callers must avoid logging it.
	pub access_token: Secret,
	/// Base URL every data request is issued against.
	pub instance_url: Url,
}
impl AuthResult {
	/// Creates a result from the token endpoint's fields.
	pub fn new(access_token: impl Into<String>, instance_url: Url) -> Self {
		Self { access_token: Secret::new(access_token), instance_url }
	}
}

/// Token held by the session cache.
#[derive(Clone, Debug)]
pub struct CachedToken {
	/// Bearer token; callers must avoid logging it.
	pub access_token: Secret,
	/// Base URL every data request is issued against.
	pub instance_url: Url,
	/// Instant the token was obtained.
	pub issued_at: OffsetDateTime,
	/// Instant after which the token is no longer handed out.
	pub expires_at: OffsetDateTime,
}
impl CachedToken {
	/// Converts an authentication result into a cache entry valid for `validity`.
	pub fn from_auth(result: AuthResult, issued_at: OffsetDateTime, validity: Duration) -> Self {
		Self {
			access_token: result.access_token,
			instance_url: result.instance_url,
			issued_at,
			expires_at: issued_at + validity,
		}
	}

	/// Returns `true` while `instant` is strictly before the expiry.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at
	}

	/// Time left before expiry, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}

	/// `Authorization` header value for this token.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}
}
