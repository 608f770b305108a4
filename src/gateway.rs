//! Gateway facade tying credentials, the token session, and request execution together.

pub mod execute;
pub mod records;

pub use execute::*;
pub use oauth2::http::Method;
pub use records::*;

// self
use crate::{
	_prelude::*,
	auth::{Authenticator, CachedToken},
	config::GatewayConfig,
	credentials::CredentialSource,
	http::GatewayHttpClient,
	obs::{self, Operation, OperationOutcome, OperationSpan},
	query::ObjectCatalog,
	session::{Clock, SessionMetrics, SystemClock, TokenSession},
	transport::TransportErrorMapper,
};
#[cfg(feature = "reqwest")]
use crate::{
	auth::StrategyKind, credentials::EnvCredentialSource, http::ReqwestHttpClient,
	transport::ReqwestTransportErrorMapper,
};

#[cfg(feature = "reqwest")]
/// Gateway specialized for the crate's default reqwest transport stack.
pub type ReqwestGateway = Gateway<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Connection details returned by [`Gateway::login`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoginInfo {
	/// Base URL data requests are issued against.
	pub instance_url: Url,
}

/// Credential and session gateway for one CRM org.
///
/// The gateway owns the transport, the credential source, and exactly one token session.
/// Clones share the session, so every clone sees the same cached token and joins the same
/// refresh.
pub struct Gateway<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Validated configuration.
	pub config: Arc<GatewayConfig>,
	/// HTTP client wrapper used for every outbound request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	credentials: Arc<dyn CredentialSource>,
	catalog: Arc<ObjectCatalog>,
	authenticator: Arc<Authenticator<C, M>>,
	session: TokenSession,
}
impl<C, M> Gateway<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a gateway that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		config: GatewayConfig,
		credentials: Arc<dyn CredentialSource>,
		catalog: ObjectCatalog,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		let config = Arc::new(config);
		let http_client = http_client.into();
		let transport_mapper = mapper.into();
		let clock: Arc<dyn Clock> = Arc::new(SystemClock);
		let authenticator = Arc::new(Authenticator::new(
			&config,
			http_client.clone(),
			transport_mapper.clone(),
			clock.clone(),
		));
		let session = TokenSession::new(clock, config.token_validity);

		Self {
			config,
			http_client,
			transport_mapper,
			credentials,
			catalog: Arc::new(catalog),
			authenticator,
			session,
		}
	}

	/// Replaces the clock used for token freshness and assertion timestamps.
	///
	/// Starts a fresh session, so call it before the gateway is shared.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.authenticator = Arc::new(Authenticator::new(
			&self.config,
			self.http_client.clone(),
			self.transport_mapper.clone(),
			clock.clone(),
		));
		self.session = TokenSession::new(clock, self.config.token_validity);

		self
	}

	/// Object catalog consulted by [`Gateway::query`] and [`Gateway::describe_field`].
	pub fn catalog(&self) -> &ObjectCatalog {
		&self.catalog
	}

	/// Session counters (cache hits, refreshes, invalidations).
	pub fn metrics(&self) -> &SessionMetrics {
		self.session.metrics()
	}

	/// Token session backing this gateway and its clones.
	pub fn session(&self) -> &TokenSession {
		&self.session
	}

	/// Returns `true` when every credential the configured strategy needs is present.
	pub fn check_configured(&self) -> bool {
		self.missing_credentials().is_empty()
	}

	/// Lists the credential keys the configured strategy still needs.
	pub fn missing_credentials(&self) -> Vec<&'static str> {
		self.credentials.missing(self.config.strategy)
	}

	/// Returns a valid token, authenticating when the cache is empty or expired.
	///
	/// Concurrent callers share one authentication run and all observe its result.
	pub async fn token(&self) -> Result<Arc<CachedToken>> {
		self.session
			.get_or_refresh(|| {
				let authenticator = self.authenticator.clone();
				let credentials = self.credentials.clone();
				let retry_policy = self.config.retry_policy.clone();
				let strategy = self.config.strategy;

				async move {
					const KIND: Operation = Operation::Authenticate;

					let span = OperationSpan::new(KIND, strategy.as_str());

					obs::record_outcome(KIND, OperationOutcome::Attempt);

					let result = span
						.instrument(retry_policy.run(|_| {
							let authenticator = authenticator.clone();
							let credentials = credentials.clone();

							async move {
								let loaded = credentials.load(strategy)?;

								authenticator.authenticate(&loaded).await
							}
						}))
						.await;

					obs::record_result(KIND, &result);

					result
				}
			})
			.await
	}

	/// Authenticates (or reuses the cached token) and reports the instance URL.
	pub async fn login(&self) -> Result<LoginInfo> {
		let token = self.token().await?;

		Ok(LoginInfo { instance_url: token.instance_url.clone() })
	}

	/// Forgets the cached token and detaches any in-flight refresh.
	pub fn disconnect(&self) {
		self.session.disconnect();
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a gateway backed by a reqwest client that never follows redirects.
	pub fn new(
		config: GatewayConfig,
		credentials: Arc<dyn CredentialSource>,
		catalog: ObjectCatalog,
	) -> Result<Self> {
		Ok(Self::with_http_client(
			config,
			credentials,
			catalog,
			ReqwestHttpClient::new()?,
			ReqwestTransportErrorMapper,
		))
	}

	/// Creates a gateway reading credentials and overrides from the process environment.
	pub fn from_env(strategy: StrategyKind, catalog: ObjectCatalog) -> Result<Self> {
		let source = EnvCredentialSource::new();
		let config = GatewayConfig::from_source(strategy, &source)
			.map_err(crate::error::ConfigError::from)?;

		Self::new(config, Arc::new(source), catalog)
	}
}
impl<C, M> Clone for Gateway<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			config: self.config.clone(),
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			credentials: self.credentials.clone(),
			catalog: self.catalog.clone(),
			authenticator: self.authenticator.clone(),
			session: self.session.clone(),
		}
	}
}
impl<C, M> Debug for Gateway<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("config", &self.config)
			.field("object_types", &self.catalog.object_types().collect::<Vec<_>>())
			.field("session", &self.session)
			.finish()
	}
}
