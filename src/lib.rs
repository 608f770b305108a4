//! Single-flight credential and session gateway for CRM data APIs: cached bearer tokens,
//! transient-aware re-authentication, and requests that heal themselves after a 401.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod http;
pub mod obs;
pub mod query;
pub mod retry;
pub mod session;
pub mod transport;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature. Provides a scripted in-process transport plus (with `reqwest`) an
	//! insecure client for `httpmock`'s self-signed certificates.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse, http::StatusCode};
	// self
	use crate::{
		auth::StrategyKind,
		config::GatewayConfig,
		credentials::{CredentialSource, MapCredentialSource},
		gateway::Gateway,
		http::GatewayHttpClient,
		query::{ObjectCatalog, ObjectConfig},
		session::Clock,
		transport::{CallStage, TransportErrorMapper},
	};
	#[cfg(feature = "reqwest")]
	use crate::{http::ReqwestHttpClient, transport::ReqwestTransportErrorMapper};

	/// Gateway type alias used by scripted integration tests.
	pub type ScriptedGateway = Gateway<ScriptedHttpClient, ScriptedTransportErrorMapper>;
	#[cfg(feature = "reqwest")]
	/// Gateway type alias used by reqwest-backed integration tests.
	pub type ReqwestTestGateway = Gateway<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Request captured by [`ScriptedHttpClient`].
	#[derive(Clone, Debug)]
	pub struct RecordedRequest {
		/// HTTP method.
		pub method: String,
		/// Absolute request URL.
		pub url: Url,
		/// Header pairs in lowercase-name form.
		pub headers: Vec<(String, String)>,
		/// Raw request body.
		pub body: Vec<u8>,
	}
	impl RecordedRequest {
		/// Request path without the query string.
		pub fn path(&self) -> &str {
			self.url.path()
		}

		/// Returns the first header value with the provided (lowercase) name.
		pub fn header(&self, name: &str) -> Option<&str> {
			self.headers.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
		}

		/// Decodes an `application/x-www-form-urlencoded` body into key/value pairs.
		pub fn form(&self) -> BTreeMap<String, String> {
			url::form_urlencoded::parse(&self.body).into_owned().collect()
		}

		/// Returns the first query parameter with the provided name.
		pub fn query_param(&self, name: &str) -> Option<String> {
			self.url.query_pairs().find(|(key, _)| key == name).map(|(_, value)| value.into_owned())
		}
	}

	/// Canned outcome returned by a [`ScriptedHttpClient`] responder.
	#[derive(Clone, Debug)]
	pub enum ScriptedResponse {
		/// HTTP response with a status and body.
		Reply {
			/// HTTP status code.
			status: u16,
			/// Response body.
			body: String,
		},
		/// Transport failure carrying the provided message.
		Fail(String),
	}
	impl ScriptedResponse {
		/// Builds a JSON reply.
		pub fn json(status: u16, body: impl Into<String>) -> Self {
			Self::Reply { status, body: body.into() }
		}

		/// Builds a successful token endpoint reply.
		pub fn token(access_token: &str, instance_url: &str) -> Self {
			Self::json(
				200,
				format!(
					"{{\"access_token\":\"{access_token}\",\"instance_url\":\"{instance_url}\",\"token_type\":\"Bearer\"}}"
				),
			)
		}
	}

	/// Transport error emitted by [`ScriptedResponse::Fail`].
	#[derive(Debug)]
	pub struct ScriptedTransportError(pub String);
	impl Display for ScriptedTransportError {
		fn fmt(&self, f: &mut Formatter) -> FmtResult {
			f.write_str(&self.0)
		}
	}
	impl StdError for ScriptedTransportError {}

	type Responder = dyn Fn(&RecordedRequest) -> ScriptedResponse + Send + Sync;

	struct ScriptedState {
		responder: Box<Responder>,
		latency: std::time::Duration,
		log: Mutex<Vec<RecordedRequest>>,
	}

	/// In-process transport that records every request and answers through a responder closure.
	#[derive(Clone)]
	pub struct ScriptedHttpClient(Arc<ScriptedState>);
	impl ScriptedHttpClient {
		/// Creates a client answering through `responder`.
		pub fn new(
			responder: impl 'static + Send + Sync + Fn(&RecordedRequest) -> ScriptedResponse,
		) -> Self {
			Self(Arc::new(ScriptedState {
				responder: Box::new(responder),
				latency: std::time::Duration::ZERO,
				log: Mutex::new(Vec::new()),
			}))
		}

		/// Creates a client that sleeps for `latency` before answering each request.
		pub fn with_latency(
			latency: std::time::Duration,
			responder: impl 'static + Send + Sync + Fn(&RecordedRequest) -> ScriptedResponse,
		) -> Self {
			Self(Arc::new(ScriptedState {
				responder: Box::new(responder),
				latency,
				log: Mutex::new(Vec::new()),
			}))
		}

		/// Returns every recorded request.
		pub fn requests(&self) -> Vec<RecordedRequest> {
			self.0.log.lock().clone()
		}

		/// Counts recorded requests whose path equals `path`.
		pub fn calls_to(&self, path: &str) -> usize {
			self.0.log.lock().iter().filter(|request| request.path() == path).count()
		}
	}
	impl GatewayHttpClient for ScriptedHttpClient {
		type Handle = ScriptedHandle;
		type TransportError = ScriptedTransportError;

		fn handle(&self) -> Self::Handle {
			ScriptedHandle(self.0.clone())
		}
	}

	/// Handle returned by [`ScriptedHttpClient`].
	pub struct ScriptedHandle(Arc<ScriptedState>);
	impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
		type Error = HttpClientError<ScriptedTransportError>;
		type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

		fn call(&'c self, request: HttpRequest) -> Self::Future {
			let state = self.0.clone();

			Box::pin(async move {
				let recorded = RecordedRequest {
					method: request.method().to_string(),
					url: Url::parse(&request.uri().to_string())
						.map_err(|e| HttpClientError::Other(e.to_string()))?,
					headers: request
						.headers()
						.iter()
						.map(|(name, value)| {
							(
								name.as_str().to_owned(),
								String::from_utf8_lossy(value.as_bytes()).into_owned(),
							)
						})
						.collect(),
					body: request.body().clone(),
				};

				state.log.lock().push(recorded.clone());

				if !state.latency.is_zero() {
					tokio::time::sleep(state.latency).await;
				}

				match (state.responder)(&recorded) {
					ScriptedResponse::Reply { status, body } => {
						let mut response = HttpResponse::new(body.into_bytes());

						*response.status_mut() = StatusCode::from_u16(status)
							.map_err(|e| HttpClientError::Other(e.to_string()))?;

						Ok(response)
					},
					ScriptedResponse::Fail(message) =>
						Err(HttpClientError::Reqwest(Box::new(ScriptedTransportError(message)))),
				}
			})
		}
	}

	/// Mapper that turns scripted transport failures into network errors.
	#[derive(Clone, Debug, Default)]
	pub struct ScriptedTransportErrorMapper;
	impl TransportErrorMapper<ScriptedTransportError> for ScriptedTransportErrorMapper {
		fn map_transport_error(
			&self,
			stage: CallStage,
			error: HttpClientError<ScriptedTransportError>,
		) -> Error {
			match error {
				HttpClientError::Reqwest(inner) =>
					crate::error::TransportError::network(stage.as_str(), *inner).into(),
				other => crate::error::TransportError::Other {
					stage: stage.as_str(),
					message: other.to_string(),
				}
				.into(),
			}
		}
	}

	/// Counter helper for responders that hand out numbered tokens.
	#[derive(Debug, Default)]
	pub struct Sequence(AtomicUsize);
	impl Sequence {
		/// Returns the next value, starting at 1.
		pub fn advance(&self) -> usize {
			self.0.fetch_add(1, Ordering::SeqCst) + 1
		}

		/// Returns how many values were handed out.
		pub fn count(&self) -> usize {
			self.0.load(Ordering::SeqCst)
		}
	}

	/// Clock that only moves when told to.
	#[derive(Debug)]
	pub struct ManualClock(Mutex<OffsetDateTime>);
	impl ManualClock {
		/// Creates a clock frozen at `now`.
		pub fn at(now: OffsetDateTime) -> Self {
			Self(Mutex::new(now))
		}

		/// Moves the clock forward by `by`.
		pub fn advance(&self, by: Duration) {
			*self.0.lock() += by;
		}
	}
	impl Default for ManualClock {
		fn default() -> Self {
			Self::at(time::macros::datetime!(2025-01-01 00:00 UTC))
		}
	}
	impl Clock for ManualClock {
		fn now(&self) -> OffsetDateTime {
			*self.0.lock()
		}
	}

	/// Credential source holding a complete refresh-token credential set.
	pub fn refresh_token_source() -> MapCredentialSource {
		MapCredentialSource::from_iter([
			("CRM_CLIENT_ID", "client-id"),
			("CRM_CLIENT_SECRET", "client-secret"),
			("CRM_REFRESH_TOKEN", "refresh-token"),
		])
	}

	/// Login host used by scripted tests.
	pub const SCRIPTED_LOGIN_URL: &str = "https://login.example.com";
	/// Instance host returned by scripted token replies.
	pub const SCRIPTED_INSTANCE_URL: &str = "https://acme.my.example.com";
	/// Token endpoint path.
	pub const TOKEN_PATH: &str = "/services/oauth2/token";
	/// Query endpoint path under the default API version.
	pub const QUERY_PATH: &str = "/services/data/v59.0/query";

	/// Configuration pointing at [`SCRIPTED_LOGIN_URL`].
	pub fn scripted_config(strategy: StrategyKind) -> GatewayConfig {
		GatewayConfig::builder(strategy)
			.login_url(
				Url::parse(SCRIPTED_LOGIN_URL).expect("Scripted login URL fixture should parse."),
			)
			.build()
			.expect("Scripted configuration should be valid.")
	}

	/// Catalog with an `accounts` object type filterable on `Industry`.
	pub fn account_catalog() -> ObjectCatalog {
		let accounts = ObjectConfig::new("Account", ["Id", "Name", "Industry"], "Name")
			.and_then(|config| config.with_filterable(["Industry"]))
			.expect("Account catalog fixture should be valid.");

		ObjectCatalog::new().with("accounts", accounts)
	}

	/// Builds a scripted gateway for the refresh-token strategy.
	pub fn build_scripted_gateway(
		config: GatewayConfig,
		source: impl 'static + CredentialSource,
		catalog: ObjectCatalog,
		client: ScriptedHttpClient,
	) -> ScriptedGateway {
		Gateway::with_http_client(
			config,
			Arc::new(source),
			catalog,
			client,
			ScriptedTransportErrorMapper,
		)
	}

	#[cfg(feature = "reqwest")]
	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	#[cfg(feature = "reqwest")]
	/// Constructs a reqwest-backed [`Gateway`] for integration tests.
	pub fn build_reqwest_test_gateway(
		config: GatewayConfig,
		source: impl 'static + CredentialSource,
		catalog: ObjectCatalog,
	) -> ReqwestTestGateway {
		Gateway::with_http_client(
			config,
			Arc::new(source),
			catalog,
			test_reqwest_http_client(),
			ReqwestTransportErrorMapper,
		)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
