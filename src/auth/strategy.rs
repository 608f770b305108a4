//! Authentication strategies and the token-endpoint exchange that runs them.

// self
use crate::{
	_prelude::*,
	auth::{AuthResult, sign_assertion},
	config::GatewayConfig,
	credentials::{
		CLIENT_ID_KEY, CLIENT_SECRET_KEY, Credentials, PRIVATE_KEY_KEY, REFRESH_TOKEN_KEY,
		USERNAME_KEY,
	},
	http::GatewayHttpClient,
	retry::RetryPolicy,
	session::Clock,
	transport::{self, CallStage, TransportErrorMapper},
};

/// `grant_type` value for signed-assertion exchanges.
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// `grant_type` value for refresh-token exchanges.
pub const REFRESH_TOKEN_GRANT: &str = "refresh_token";

/// Authentication strategy selected once per gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
	/// RS256 signed assertion exchanged for a token.
	JwtBearer,
	/// Long-lived refresh token exchanged for a token.
	RefreshToken,
}
impl StrategyKind {
	/// Returns a stable label for logs and configuration files.
	pub const fn as_str(self) -> &'static str {
		match self {
			StrategyKind::JwtBearer => "jwt_bearer",
			StrategyKind::RefreshToken => "refresh_token",
		}
	}

	/// `grant_type` posted to the token endpoint.
	pub const fn grant_type(self) -> &'static str {
		match self {
			StrategyKind::JwtBearer => JWT_BEARER_GRANT,
			StrategyKind::RefreshToken => REFRESH_TOKEN_GRANT,
		}
	}

	/// Credential keys that must be present before the strategy can run.
	pub const fn required_keys(self) -> &'static [&'static str] {
		match self {
			StrategyKind::JwtBearer => &[CLIENT_ID_KEY, USERNAME_KEY, PRIVATE_KEY_KEY],
			StrategyKind::RefreshToken => &[CLIENT_ID_KEY, CLIENT_SECRET_KEY, REFRESH_TOKEN_KEY],
		}
	}
}
impl Display for StrategyKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for StrategyKind {
	type Err = UnknownStrategy;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"jwt_bearer" | "jwt" => Ok(Self::JwtBearer),
			"refresh_token" | "refresh" => Ok(Self::RefreshToken),
			_ => Err(UnknownStrategy(s.to_owned())),
		}
	}
}

/// Error returned when a strategy label is not recognized.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Unknown authentication strategy `{0}`.")]
pub struct UnknownStrategy(pub String);

#[derive(Deserialize)]
struct TokenResponse {
	access_token: String,
	instance_url: Url,
}

/// Runs one token-endpoint exchange for the configured strategy.
///
/// The authenticator only talks to the token endpoint; caching and retries live in the session
/// and retry modules.
pub struct Authenticator<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	mapper: Arc<M>,
	clock: Arc<dyn Clock>,
	token_endpoint: Url,
	audience: String,
	assertion_lifetime: Duration,
	retry_policy: RetryPolicy,
}
impl<C, M> Authenticator<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an authenticator bound to the configured login host.
	pub fn new(
		config: &GatewayConfig,
		http_client: Arc<C>,
		mapper: Arc<M>,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			http_client,
			mapper,
			clock,
			token_endpoint: config.token_endpoint().clone(),
			audience: config.login_audience(),
			assertion_lifetime: config.assertion_lifetime,
			retry_policy: config.retry_policy.clone(),
		}
	}

	/// Token endpoint every exchange is posted to.
	pub fn token_endpoint(&self) -> &Url {
		&self.token_endpoint
	}

	/// Exchanges `credentials` for a fresh access token.
	///
	/// Non-success statuses surface as [`Error::AuthEndpoint`] with the raw body, flagged
	/// transient when the configured retry policy's marker matches.
	pub async fn authenticate(&self, credentials: &Credentials) -> Result<AuthResult> {
		let request = match credentials {
			Credentials::JwtBearer(jwt) => {
				let assertion = sign_assertion(
					jwt,
					&self.audience,
					self.assertion_lifetime,
					self.clock.now(),
				)?;

				transport::form_request(
					&self.token_endpoint,
					&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)],
				)?
			},
			Credentials::RefreshToken(refresh) => transport::form_request(
				&self.token_endpoint,
				&[
					("grant_type", REFRESH_TOKEN_GRANT),
					("client_id", &refresh.client_id),
					("client_secret", refresh.client_secret.expose()),
					("refresh_token", refresh.refresh_token.expose()),
				],
			)?,
		};
		let response = transport::dispatch(
			self.http_client.as_ref(),
			self.mapper.as_ref(),
			CallStage::Token,
			request,
		)
		.await?;
		let status = response.status();

		if !status.is_success() {
			let body = transport::body_text(&response);
			let transient = self.retry_policy.is_transient_response(status.as_u16(), &body);

			return Err(Error::AuthEndpoint { status: status.as_u16(), body, transient });
		}

		let payload = transport::parse_json::<TokenResponse>("token", response.body())?;

		Ok(AuthResult::new(payload.access_token, payload.instance_url))
	}
}
impl<C, M> Debug for Authenticator<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("Authenticator")
			.field("token_endpoint", &self.token_endpoint.as_str())
			.field("audience", &self.audience)
			.field("assertion_lifetime", &self.assertion_lifetime)
			.finish()
	}
}
