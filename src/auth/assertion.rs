//! RS256 bearer assertions for the signed-assertion strategy.

// crates.io
use jsonwebtoken::{Algorithm, EncodingKey, Header};
// self
use crate::{_prelude::*, credentials::JwtBearerCredentials, error::ConfigError};

/// Claims carried by a bearer assertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
	/// Connected-app client identifier.
	pub iss: String,
	/// Username the token is issued for.
	pub sub: String,
	/// Login origin the assertion is presented to.
	pub aud: String,
	/// Expiry as seconds since the Unix epoch.
	pub exp: i64,
}
impl AssertionClaims {
	/// Builds claims expiring `lifetime` after `now`.
	pub fn new(
		credentials: &JwtBearerCredentials,
		audience: &str,
		lifetime: Duration,
		now: OffsetDateTime,
	) -> Self {
		Self {
			iss: credentials.client_id.clone(),
			sub: credentials.username.clone(),
			aud: audience.to_owned(),
			exp: (now + lifetime).unix_timestamp(),
		}
	}
}

/// Signs a fresh assertion with the credential's RSA key.
pub fn sign_assertion(
	credentials: &JwtBearerCredentials,
	audience: &str,
	lifetime: Duration,
	now: OffsetDateTime,
) -> Result<String> {
	let key = EncodingKey::from_rsa_pem(credentials.private_key.expose().as_bytes())
		.map_err(|e| ConfigError::InvalidSigningKey { source: Arc::new(e) })?;
	let claims = AssertionClaims::new(credentials, audience, lifetime, now);

	jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
		.map_err(|e| ConfigError::AssertionSigning { source: Arc::new(e) }.into())
}
