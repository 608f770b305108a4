//! Gateway-level error types shared across credentials, sessions, and request execution.

// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
///
/// Every variant is cheap to clone so a single refresh failure can be handed to every caller
/// that joined the refresh.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// One or more required credential values are unset.
	#[error("Missing required credentials: {}.", fields.join(", "))]
	MissingCredentials {
		/// Every absent configuration key, in declaration order.
		fields: Vec<String>,
	},
	/// Token endpoint answered with a non-success status.
	#[error("Token endpoint returned HTTP {status}: {body}")]
	AuthEndpoint {
		/// HTTP status code.
		status: u16,
		/// Raw response body.
		body: String,
		/// Whether the retry policy classified the response as transient.
		transient: bool,
	},
	/// Data endpoint answered with a non-success status.
	#[error("Upstream request failed with HTTP {status}: {body}")]
	Upstream {
		/// HTTP status code.
		status: u16,
		/// Raw response body.
		body: String,
	},
	/// Object type is not present in the configured catalog.
	#[error("Object type `{name}` is not supported.")]
	UnsupportedObject {
		/// Requested object type.
		name: String,
	},
	/// Filter targets a field the object does not declare as filterable.
	#[error("Object type `{object}` does not support filtering on `{field}`.")]
	UnsupportedFilter {
		/// Object type the query targets.
		object: String,
		/// Rejected filter field.
		field: String,
	},
	/// Endpoint responded with JSON that does not match the expected shape.
	#[error("The {endpoint} endpoint returned a malformed response.")]
	MalformedResponse {
		/// Endpoint label (token, query, describe).
		endpoint: &'static str,
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
	},
}
impl Error {
	/// Returns `true` when the error can only be fixed by changing configuration or credentials.
	///
	/// Token-endpoint 4xx responses without the transient marker (revoked refresh tokens, bad
	/// client credentials) count as reconfiguration, except for 408 and 429. Everything else is
	/// worth a manual retry by the caller.
	pub fn needs_reconfiguration(&self) -> bool {
		match self {
			Self::Config(_) | Self::MissingCredentials { .. } => true,
			Self::AuthEndpoint { status, transient: false, .. } =>
				(400..500).contains(status) && !matches!(status, 408 | 429),
			_ => false,
		}
	}

	/// HTTP status associated with the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::AuthEndpoint { status, .. } | Self::Upstream { status, .. } => Some(*status),
			_ => None,
		}
	}

	pub(crate) fn malformed(
		endpoint: &'static str,
		source: serde_path_to_error::Error<serde_json::Error>,
	) -> Self {
		Self::MalformedResponse { endpoint, source: Arc::new(source) }
	}
}

/// Configuration and validation failures raised by the gateway.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying request builder failure.
		#[source]
		source: Arc<oauth2::http::Error>,
	},
	/// A URL could not be derived from the cached instance URL.
	#[error("Request path `{path}` cannot be joined onto the instance URL.")]
	InvalidRequestPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request path would leave the instance host.
	#[error("Request path `{path}` must be relative to the instance URL.")]
	RequestPathNotRelative {
		/// Offending path.
		path: String,
	},
	/// Signing key could not be parsed as an RSA PEM.
	#[error("Signing key is not a valid RSA PEM.")]
	InvalidSigningKey {
		/// Underlying key parsing failure.
		#[source]
		source: Arc<jsonwebtoken::errors::Error>,
	},
	/// Assertion could not be signed.
	#[error("Unable to sign the authentication assertion.")]
	AssertionSigning {
		/// Underlying signing failure.
		#[source]
		source: Arc<jsonwebtoken::errors::Error>,
	},
	/// Request asked for the tenant header but none is configured.
	#[error("Request is tenant-scoped but no tenant header is configured.")]
	TenantHeaderNotConfigured,
	/// Gateway configuration failed validation.
	#[error(transparent)]
	Gateway(#[from] crate::config::GatewayConfigError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the {stage} endpoint.")]
	Network {
		/// Endpoint family being called.
		stage: &'static str,
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the {stage} endpoint.")]
	Io {
		/// Endpoint family being called.
		stage: &'static str,
		/// Underlying IO failure.
		#[source]
		source: Arc<std::io::Error>,
	},
	/// HTTP client failed without a structured error.
	#[error("HTTP client error occurred while calling the {stage} endpoint: {message}")]
	Other {
		/// Endpoint family being called.
		stage: &'static str,
		/// Client-supplied message.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(stage: &'static str, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { stage, source: Arc::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn missing_credentials_lists_every_field() {
		let err = Error::MissingCredentials {
			fields: vec!["CRM_CLIENT_SECRET".into(), "CRM_REFRESH_TOKEN".into()],
		};

		assert_eq!(
			err.to_string(),
			"Missing required credentials: CRM_CLIENT_SECRET, CRM_REFRESH_TOKEN."
		);
		assert!(err.needs_reconfiguration());
	}

	#[test]
	fn endpoint_errors_expose_status() {
		let auth = Error::AuthEndpoint { status: 503, body: "down".into(), transient: false };
		let upstream = Error::Upstream { status: 503, body: "down".into() };

		assert_eq!(auth.status(), Some(503));
		assert_eq!(upstream.status(), Some(503));
		assert!(!auth.needs_reconfiguration());
		assert!(!upstream.needs_reconfiguration());
		assert_eq!(Error::UnsupportedObject { name: "Widget".into() }.status(), None);
	}

	#[test]
	fn rejected_credentials_need_reconfiguration() {
		let auth = |status, body: &str, transient| Error::AuthEndpoint {
			status,
			body: body.into(),
			transient,
		};

		assert!(auth(400, "{\"error\":\"invalid_grant\"}", false).needs_reconfiguration());
		assert!(auth(401, "{\"error\":\"invalid_client\"}", false).needs_reconfiguration());
		assert!(!auth(400, "unknown_error: retry your request", true).needs_reconfiguration());
		assert!(!auth(429, "rate limited", false).needs_reconfiguration());
		assert!(!auth(500, "internal", false).needs_reconfiguration());
	}

	#[test]
	fn cloned_errors_keep_their_source() {
		let err: Error = TransportError::network(
			"token",
			std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer"),
		)
		.into();
		let cloned = err.clone();
		let source = StdError::source(&cloned)
			.expect("Network errors should expose the underlying transport failure.");

		assert_eq!(source.to_string(), "reset by peer");
		assert_eq!(err.to_string(), cloned.to_string());
	}
}
