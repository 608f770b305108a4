//! Validated gateway configuration and its builder.

// crates.io
use oauth2::http::{HeaderName, HeaderValue};
use url::Host;
// self
use crate::{
	_prelude::*,
	auth::StrategyKind,
	credentials::{API_VERSION_KEY, CredentialSource, LOGIN_URL_KEY},
	retry::RetryPolicy,
};

const TOKEN_PATH: &str = "services/oauth2/token";

/// Errors raised while constructing or validating a [`GatewayConfig`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum GatewayConfigError {
	/// Login URL could not be parsed.
	#[error("Login URL `{value}` is not a valid URL.")]
	InvalidLoginUrl {
		/// Raw value that failed to parse.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Login URL must use HTTPS unless it points at a loopback host.
	#[error("The login URL must use HTTPS: {url}.")]
	InsecureLoginUrl {
		/// Offending URL.
		url: String,
	},
	/// API version must look like `59.0`.
	#[error("API version `{version}` must be in `<major>.<minor>` form.")]
	InvalidApiVersion {
		/// Offending version string.
		version: String,
	},
	/// Durations that bound token lifetimes must be positive.
	#[error("The {field} must be positive.")]
	NonPositiveDuration {
		/// Which setting failed validation.
		field: &'static str,
	},
	/// Retry pause cannot be negative.
	#[error("The retry pause cannot be negative.")]
	NegativeRetryPause,
	/// Tenant header name or value is not a valid HTTP header.
	#[error("Tenant header `{name}` is not a valid HTTP header.")]
	InvalidTenantHeader {
		/// Offending header name.
		name: String,
	},
}

/// Extra header attached to tenant-scoped data requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantHeader {
	/// Header name.
	pub name: String,
	/// Header value.
	pub value: String,
}
impl TenantHeader {
	/// Creates a tenant header.
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self { name: name.into(), value: value.into() }
	}

	fn validate(&self) -> Result<(), GatewayConfigError> {
		let valid = HeaderName::from_bytes(self.name.as_bytes()).is_ok()
			&& HeaderValue::from_str(&self.value).is_ok();

		if valid {
			Ok(())
		} else {
			Err(GatewayConfigError::InvalidTenantHeader { name: self.name.clone() })
		}
	}
}

/// Gateway configuration shared by the authenticator, session, and executor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "GatewayConfigBuilder")]
pub struct GatewayConfig {
	/// Authentication strategy.
	pub strategy: StrategyKind,
	/// Login host hosting the token endpoint.
	pub login_url: Url,
	/// Data API version, e.g. `59.0`.
	pub api_version: String,
	/// How long a fresh token is handed out before re-authenticating.
	pub token_validity: Duration,
	/// Lifetime of signed assertions.
	pub assertion_lifetime: Duration,
	/// Retry policy wrapped around each authentication attempt.
	pub retry_policy: RetryPolicy,
	/// Header attached to tenant-scoped data requests.
	pub tenant_header: Option<TenantHeader>,
	#[serde(skip_serializing)]
	token_endpoint: Url,
}
impl GatewayConfig {
	/// Default login host.
	pub const DEFAULT_LOGIN_URL: &'static str = "https://login.salesforce.com";
	/// Default data API version.
	pub const DEFAULT_API_VERSION: &'static str = "59.0";
	/// Default token validity window; the safety margin is already subtracted.
	pub const DEFAULT_TOKEN_VALIDITY: Duration = Duration::minutes(55);
	/// Default signed-assertion lifetime.
	pub const DEFAULT_ASSERTION_LIFETIME: Duration = Duration::minutes(3);

	/// Creates a builder for the provided strategy.
	pub fn builder(strategy: StrategyKind) -> GatewayConfigBuilder {
		GatewayConfigBuilder::new(strategy)
	}

	/// Reads optional `CRM_LOGIN_URL` / `CRM_API_VERSION` overrides from `source`.
	pub fn from_source(
		strategy: StrategyKind,
		source: &dyn CredentialSource,
	) -> Result<Self, GatewayConfigError> {
		let mut builder = Self::builder(strategy);

		if let Some(raw) = source.lookup(LOGIN_URL_KEY) {
			let url = Url::parse(raw.trim())
				.map_err(|e| GatewayConfigError::InvalidLoginUrl { value: raw.clone(), source: e })?;

			builder = builder.login_url(url);
		}
		if let Some(version) = source.lookup(API_VERSION_KEY) {
			builder = builder.api_version(version.trim());
		}

		builder.build()
	}

	/// Token endpoint derived from the login URL.
	pub fn token_endpoint(&self) -> &Url {
		&self.token_endpoint
	}

	/// Audience claim for signed assertions: the login URL's origin.
	pub fn login_audience(&self) -> String {
		self.login_url.origin().ascii_serialization()
	}

	/// Path of a data resource under the configured API version.
	pub fn data_path(&self, resource: &str) -> String {
		format!("/services/data/v{}/{}", self.api_version, resource.trim_start_matches('/'))
	}
}

/// Builder for [`GatewayConfig`] values.
#[derive(Clone, Debug, Deserialize)]
pub struct GatewayConfigBuilder {
	/// Authentication strategy.
	pub strategy: StrategyKind,
	/// Login host hosting the token endpoint; defaults to [`GatewayConfig::DEFAULT_LOGIN_URL`].
	#[serde(default)]
	pub login_url: Option<Url>,
	/// Data API version.
	#[serde(default = "default_api_version")]
	pub api_version: String,
	/// Token validity window.
	#[serde(default = "default_token_validity")]
	pub token_validity: Duration,
	/// Signed-assertion lifetime.
	#[serde(default = "default_assertion_lifetime")]
	pub assertion_lifetime: Duration,
	/// Retry policy.
	#[serde(default)]
	pub retry_policy: RetryPolicy,
	/// Optional tenant header.
	#[serde(default)]
	pub tenant_header: Option<TenantHeader>,
}
impl GatewayConfigBuilder {
	/// Creates a builder seeded with defaults.
	pub fn new(strategy: StrategyKind) -> Self {
		Self {
			strategy,
			login_url: None,
			api_version: default_api_version(),
			token_validity: default_token_validity(),
			assertion_lifetime: default_assertion_lifetime(),
			retry_policy: RetryPolicy::default(),
			tenant_header: None,
		}
	}

	/// Overrides the login URL.
	pub fn login_url(mut self, url: Url) -> Self {
		self.login_url = Some(url);

		self
	}

	/// Overrides the API version.
	pub fn api_version(mut self, version: impl Into<String>) -> Self {
		self.api_version = version.into();

		self
	}

	/// Overrides the token validity window.
	pub fn token_validity(mut self, validity: Duration) -> Self {
		self.token_validity = validity;

		self
	}

	/// Overrides the signed-assertion lifetime.
	pub fn assertion_lifetime(mut self, lifetime: Duration) -> Self {
		self.assertion_lifetime = lifetime;

		self
	}

	/// Overrides the retry policy.
	pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.retry_policy = policy;

		self
	}

	/// Sets the tenant header attached to tenant-scoped requests.
	pub fn tenant_header(mut self, header: TenantHeader) -> Self {
		self.tenant_header = Some(header);

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<GatewayConfig, GatewayConfigError> {
		let login_url = match self.login_url {
			Some(url) => url,
			None => Url::parse(GatewayConfig::DEFAULT_LOGIN_URL).map_err(|e| {
				GatewayConfigError::InvalidLoginUrl {
					value: GatewayConfig::DEFAULT_LOGIN_URL.into(),
					source: e,
				}
			})?,
		};

		validate_login_url(&login_url)?;
		validate_api_version(&self.api_version)?;

		if !self.token_validity.is_positive() {
			return Err(GatewayConfigError::NonPositiveDuration { field: "token validity" });
		}
		if !self.assertion_lifetime.is_positive() {
			return Err(GatewayConfigError::NonPositiveDuration { field: "assertion lifetime" });
		}
		if self.retry_policy.pause.is_negative() {
			return Err(GatewayConfigError::NegativeRetryPause);
		}
		if let Some(header) = self.tenant_header.as_ref() {
			header.validate()?;
		}

		let token_endpoint = token_endpoint(&login_url)?;

		Ok(GatewayConfig {
			strategy: self.strategy,
			login_url,
			api_version: self.api_version,
			token_validity: self.token_validity,
			assertion_lifetime: self.assertion_lifetime,
			retry_policy: self.retry_policy,
			tenant_header: self.tenant_header,
			token_endpoint,
		})
	}
}
impl TryFrom<GatewayConfigBuilder> for GatewayConfig {
	type Error = GatewayConfigError;

	fn try_from(builder: GatewayConfigBuilder) -> Result<Self, Self::Error> {
		builder.build()
	}
}

fn default_api_version() -> String {
	GatewayConfig::DEFAULT_API_VERSION.to_owned()
}

fn default_token_validity() -> Duration {
	GatewayConfig::DEFAULT_TOKEN_VALIDITY
}

fn default_assertion_lifetime() -> Duration {
	GatewayConfig::DEFAULT_ASSERTION_LIFETIME
}

fn validate_login_url(url: &Url) -> Result<(), GatewayConfigError> {
	if url.scheme() == "https" || (url.scheme() == "http" && is_loopback(url)) {
		Ok(())
	} else {
		Err(GatewayConfigError::InsecureLoginUrl { url: url.to_string() })
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback(),
		Some(Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}

fn validate_api_version(version: &str) -> Result<(), GatewayConfigError> {
	let valid = version.split_once('.').is_some_and(|(major, minor)| {
		!major.is_empty()
			&& !minor.is_empty()
			&& major.bytes().all(|b| b.is_ascii_digit())
			&& minor.bytes().all(|b| b.is_ascii_digit())
	});

	if valid {
		Ok(())
	} else {
		Err(GatewayConfigError::InvalidApiVersion { version: version.to_owned() })
	}
}

fn token_endpoint(login_url: &Url) -> Result<Url, GatewayConfigError> {
	let mut base = login_url.clone();

	base.set_query(None);
	base.set_fragment(None);

	if !base.path().ends_with('/') {
		let path = format!("{}/", base.path());

		base.set_path(&path);
	}

	base.join(TOKEN_PATH).map_err(|e| GatewayConfigError::InvalidLoginUrl {
		value: login_url.to_string(),
		source: e,
	})
}
