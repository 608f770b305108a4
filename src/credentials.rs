//! Static credential lookup and validation.
//!
//! A [`CredentialSource`] answers key lookups; the provided [`CredentialSource::load`] turns
//! those answers into a typed [`Credentials`] bundle, reporting every absent key at once.

// self
use crate::{
	_prelude::*,
	auth::{Secret, StrategyKind},
};

/// Connected-app client identifier.
pub const CLIENT_ID_KEY: &str = "CRM_CLIENT_ID";
/// Username the signed assertion is issued for.
pub const USERNAME_KEY: &str = "CRM_USERNAME";
/// RSA private key (PEM) used to sign assertions.
pub const PRIVATE_KEY_KEY: &str = "CRM_PRIVATE_KEY";
/// Connected-app client secret.
pub const CLIENT_SECRET_KEY: &str = "CRM_CLIENT_SECRET";
/// Long-lived refresh token.
pub const REFRESH_TOKEN_KEY: &str = "CRM_REFRESH_TOKEN";
/// Optional login host override.
pub const LOGIN_URL_KEY: &str = "CRM_LOGIN_URL";
/// Optional data API version override.
pub const API_VERSION_KEY: &str = "CRM_API_VERSION";

/// Validated credential bundle for one strategy.
#[derive(Clone, Debug)]
pub enum Credentials {
	/// Signed-assertion credentials.
	JwtBearer(JwtBearerCredentials),
	/// Refresh-token credentials.
	RefreshToken(RefreshTokenCredentials),
}
impl Credentials {
	/// Strategy these credentials belong to.
	pub fn kind(&self) -> StrategyKind {
		match self {
			Self::JwtBearer(_) => StrategyKind::JwtBearer,
			Self::RefreshToken(_) => StrategyKind::RefreshToken,
		}
	}
}

/// Inputs for the signed-assertion strategy.
#[derive(Clone, Debug)]
pub struct JwtBearerCredentials {
	/// Client identifier, used as the assertion issuer.
	pub client_id: String,
	/// Username, used as the assertion subject.
	pub username: String,
	/// RSA private key in PEM form.
	pub private_key: Secret,
}

/// Inputs for the refresh-token strategy.
#[derive(Clone, Debug)]
pub struct RefreshTokenCredentials {
	/// Client identifier.
	pub client_id: String,
	/// Client secret.
	pub client_secret: Secret,
	/// Long-lived refresh token.
	pub refresh_token: Secret,
}

/// Source of raw credential values.
///
/// Only [`CredentialSource::value`] is required. Sources are consulted on every authentication
/// attempt, so rotated values are picked up without rebuilding the gateway.
pub trait CredentialSource
where
	Self: Send + Sync,
{
	/// Returns the raw value stored under `key`, if any.
	fn value(&self, key: &str) -> Option<String>;

	/// Returns the value under `key`, treating empty or whitespace-only values as absent.
	fn lookup(&self, key: &str) -> Option<String> {
		self.value(key).filter(|value| !value.trim().is_empty())
	}

	/// Lists every required key for `kind` that is currently absent.
	fn missing(&self, kind: StrategyKind) -> Vec<&'static str> {
		kind.required_keys().iter().copied().filter(|key| self.lookup(key).is_none()).collect()
	}

	/// Loads and validates the credentials for `kind` without touching the network.
	fn load(&self, kind: StrategyKind) -> Result<Credentials> {
		let mut values = HashMap::new();
		let mut missing = Vec::new();

		for key in kind.required_keys() {
			match self.lookup(key) {
				Some(value) => {
					values.insert(*key, value);
				},
				None => missing.push((*key).to_owned()),
			}
		}

		if !missing.is_empty() {
			return Err(Error::MissingCredentials { fields: missing });
		}

		let mut take = |key: &str| values.remove(key).unwrap_or_default();
		let credentials = match kind {
			StrategyKind::JwtBearer => Credentials::JwtBearer(JwtBearerCredentials {
				client_id: take(CLIENT_ID_KEY),
				username: take(USERNAME_KEY),
				private_key: Secret::new(normalize_pem(&take(PRIVATE_KEY_KEY))),
			}),
			StrategyKind::RefreshToken => Credentials::RefreshToken(RefreshTokenCredentials {
				client_id: take(CLIENT_ID_KEY),
				client_secret: Secret::new(take(CLIENT_SECRET_KEY)),
				refresh_token: Secret::new(take(REFRESH_TOKEN_KEY)),
			}),
		};

		Ok(credentials)
	}
}

/// Reads credentials from the process environment.
#[derive(Clone, Debug, Default)]
pub struct EnvCredentialSource {
	prefix: String,
}
impl EnvCredentialSource {
	/// Reads keys verbatim (`CRM_CLIENT_ID`, ...).
	pub fn new() -> Self {
		Self::default()
	}

	/// Reads keys with `prefix` prepended, e.g. `APP_CRM_CLIENT_ID`.
	pub fn with_prefix(prefix: impl Into<String>) -> Self {
		Self { prefix: prefix.into() }
	}
}
impl CredentialSource for EnvCredentialSource {
	fn value(&self, key: &str) -> Option<String> {
		std::env::var(format!("{}{key}", self.prefix)).ok()
	}
}

/// In-memory credential source.
#[derive(Clone, Debug, Default)]
pub struct MapCredentialSource(HashMap<String, String>);
impl MapCredentialSource {
	/// Creates an empty source.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds or replaces a value, returning the updated source.
	pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.0.insert(key.into(), value.into());

		self
	}

	/// Adds or replaces a value in place.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.0.insert(key.into(), value.into());
	}

	/// Removes a value.
	pub fn remove(&mut self, key: &str) -> Option<String> {
		self.0.remove(key)
	}
}
impl CredentialSource for MapCredentialSource {
	fn value(&self, key: &str) -> Option<String> {
		self.0.get(key).cloned()
	}
}
impl<K, V> FromIterator<(K, V)> for MapCredentialSource
where
	K: Into<String>,
	V: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self(iter.into_iter().map(|(key, value)| (key.into(), value.into())).collect())
	}
}

fn normalize_pem(raw: &str) -> String {
	raw.trim().replace("\\n", "\n")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn missing_fields_are_reported_together() {
		let source = MapCredentialSource::from_iter([(CLIENT_ID_KEY, "client")]);
		let err = source
			.load(StrategyKind::RefreshToken)
			.expect_err("Incomplete credentials must be rejected.");

		match err {
			Error::MissingCredentials { fields } => assert_eq!(
				fields,
				vec![CLIENT_SECRET_KEY.to_owned(), REFRESH_TOKEN_KEY.to_owned()]
			),
			other => panic!("Unexpected error variant: {other:?}."),
		}
		assert_eq!(source.missing(StrategyKind::RefreshToken).len(), 2);
	}

	#[test]
	fn blank_values_count_as_missing() {
		let source = MapCredentialSource::new()
			.with(CLIENT_ID_KEY, "client")
			.with(USERNAME_KEY, "   ")
			.with(PRIVATE_KEY_KEY, "");

		assert_eq!(source.missing(StrategyKind::JwtBearer), vec![USERNAME_KEY, PRIVATE_KEY_KEY]);
	}

	#[test]
	fn jwt_credentials_normalize_escaped_newlines() {
		let source = MapCredentialSource::new()
			.with(CLIENT_ID_KEY, "client")
			.with(USERNAME_KEY, "user@example.com")
			.with(PRIVATE_KEY_KEY, "-----BEGIN KEY-----\\nabc\\n-----END KEY-----");
		let credentials =
			source.load(StrategyKind::JwtBearer).expect("Complete credentials should load.");

		assert_eq!(credentials.kind(), StrategyKind::JwtBearer);

		match credentials {
			Credentials::JwtBearer(jwt) => {
				assert_eq!(jwt.username, "user@example.com");
				assert_eq!(jwt.private_key.expose(), "-----BEGIN KEY-----\nabc\n-----END KEY-----");
			},
			other => panic!("Unexpected credentials: {other:?}."),
		}
	}

	#[test]
	fn debug_output_redacts_secrets() {
		let credentials = MapCredentialSource::new()
			.with(CLIENT_ID_KEY, "client")
			.with(CLIENT_SECRET_KEY, "shh")
			.with(REFRESH_TOKEN_KEY, "rt-123")
			.load(StrategyKind::RefreshToken)
			.expect("Complete credentials should load.");
		let rendered = format!("{credentials:?}");

		assert!(!rendered.contains("shh"));
		assert!(!rendered.contains("rt-123"));
	}

	#[test]
	fn env_source_applies_prefix() {
		let source = EnvCredentialSource::with_prefix("CRM_GATEWAY_TEST_UNSET_PREFIX_");

		assert_eq!(source.value(CLIENT_ID_KEY), None);
		assert_eq!(source.missing(StrategyKind::JwtBearer).len(), 3);
	}
}
