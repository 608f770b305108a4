//! Bearer-authenticated data requests with a single re-authentication on 401.

// crates.io
use oauth2::{
	HttpRequest, HttpResponse,
	http::{
		Method, StatusCode,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::CachedToken,
	error::ConfigError,
	gateway::Gateway,
	http::GatewayHttpClient,
	obs::{self, Operation, OperationOutcome, OperationSpan},
	transport::{self, CallStage, TransportErrorMapper},
};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Data request issued relative to the cached instance URL.
#[derive(Clone, Debug, PartialEq)]
pub struct DataRequest {
	/// HTTP method.
	pub method: Method,
	/// Path on the instance host starting with a single `/`, e.g. `/services/data/v59.0/query`.
	///
	/// Absolute URLs and `//host` forms are rejected so the bearer token stays on the instance.
	pub path: String,
	/// Query parameters appended to the URL.
	pub query: Vec<(String, String)>,
	/// Extra headers.
	pub headers: Vec<(String, String)>,
	/// Optional JSON body.
	pub body: Option<serde_json::Value>,
	/// Attaches the configured tenant header when set.
	pub tenant_scoped: bool,
}
impl DataRequest {
	/// Creates a request with no query, headers, or body.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			headers: Vec::new(),
			body: None,
			tenant_scoped: false,
		}
	}

	/// Creates a `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// Appends a query parameter.
	pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Appends a header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Sets a JSON body.
	pub fn json(mut self, body: serde_json::Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Marks the request as tenant-scoped.
	pub fn tenant_scoped(mut self, scoped: bool) -> Self {
		self.tenant_scoped = scoped;

		self
	}
}

/// Successful data response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataResponse {
	/// HTTP status code (always 2xx).
	pub status: u16,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl DataResponse {
	/// Lossy UTF-8 view of the body.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Deserializes the body, labeling parse failures with `endpoint`.
	pub fn json<T>(&self, endpoint: &'static str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		transport::parse_json(endpoint, &self.body)
	}
}

impl<C, M> Gateway<C, M>
where
	C: ?Sized + GatewayHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Sends `request` with the current bearer token.
	///
	/// A 401 invalidates the cached token and the request is reissued once with a freshly
	/// obtained token; that second outcome is final. Any other non-success status surfaces as
	/// [`Error::Upstream`].
	pub async fn execute(&self, request: DataRequest) -> Result<DataResponse> {
		const KIND: Operation = Operation::Execute;

		let span = OperationSpan::new(KIND, "execute");

		obs::record_outcome(KIND, OperationOutcome::Attempt);

		let result = span
			.instrument(async move {
				check_relative_path(&request.path)?;

				let tenant = self.tenant_header_for(&request)?;
				let token = self.token().await?;
				let response = self.send(&token, &request, tenant).await?;

				if response.status() != StatusCode::UNAUTHORIZED {
					return into_data_response(response);
				}

				obs::record_retry(
					KIND,
					1,
					&Error::Upstream { status: 401, body: transport::body_text(&response) },
				);
				self.session.invalidate();

				let token = self.token().await?;
				let response = self.send(&token, &request, tenant).await?;

				into_data_response(response)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	fn tenant_header_for(&self, request: &DataRequest) -> Result<Option<(&str, &str)>> {
		if !request.tenant_scoped {
			return Ok(None);
		}

		match self.config.tenant_header.as_ref() {
			Some(header) => Ok(Some((header.name.as_str(), header.value.as_str()))),
			None => Err(ConfigError::TenantHeaderNotConfigured.into()),
		}
	}

	async fn send(
		&self,
		token: &CachedToken,
		request: &DataRequest,
		tenant: Option<(&str, &str)>,
	) -> Result<HttpResponse> {
		let http_request = build_request(token, request, tenant)?;

		transport::dispatch(
			self.http_client.as_ref(),
			self.transport_mapper.as_ref(),
			CallStage::Data,
			http_request,
		)
		.await
	}
}

/// Paths must start with a single `/`; anything else could name another host.
fn check_relative_path(path: &str) -> Result<()> {
	let rest = path.strip_prefix('/');

	match rest {
		Some(rest) if !rest.starts_with(['/', '\\']) => Ok(()),
		_ => Err(ConfigError::RequestPathNotRelative { path: path.into() }.into()),
	}
}

fn build_request(
	token: &CachedToken,
	request: &DataRequest,
	tenant: Option<(&str, &str)>,
) -> Result<HttpRequest> {
	let mut url = token.instance_url.join(&request.path).map_err(|e| {
		ConfigError::InvalidRequestPath { path: request.path.clone(), source: e }
	})?;

	if url.origin() != token.instance_url.origin() {
		return Err(ConfigError::RequestPathNotRelative { path: request.path.clone() }.into());
	}

	if !request.query.is_empty() {
		url.query_pairs_mut().extend_pairs(request.query.iter());
	}

	let mut builder = oauth2::http::Request::builder()
		.method(request.method.clone())
		.uri(url.as_str())
		.header(AUTHORIZATION, token.bearer())
		.header(ACCEPT, JSON_CONTENT_TYPE);

	for (name, value) in &request.headers {
		builder = builder.header(name.as_str(), value.as_str());
	}
	if let Some((name, value)) = tenant {
		builder = builder.header(name, value);
	}

	let body = match request.body.as_ref() {
		Some(json) => {
			builder = builder.header(CONTENT_TYPE, JSON_CONTENT_TYPE);

			json.to_string().into_bytes()
		},
		None => Vec::new(),
	};

	builder.body(body).map_err(|e| ConfigError::from(e).into())
}

fn into_data_response(response: HttpResponse) -> Result<DataResponse> {
	let status = response.status();

	if status.is_success() {
		Ok(DataResponse { status: status.as_u16(), body: response.into_body() })
	} else {
		Err(Error::Upstream { status: status.as_u16(), body: transport::body_text(&response) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::AuthResult;

	fn token() -> CachedToken {
		let instance_url =
			Url::parse("https://acme.my.example.com").expect("Instance URL fixture should parse.");

		CachedToken::from_auth(
			AuthResult::new("access-1", instance_url),
			OffsetDateTime::now_utc(),
			Duration::minutes(55),
		)
	}

	#[test]
	fn requests_carry_bearer_query_and_tenant_headers() {
		let request = DataRequest::get("/services/data/v59.0/query")
			.query_param("q", "SELECT Id FROM Account WHERE Name = 'A&B'")
			.header("x-trace", "abc")
			.tenant_scoped(true);
		let built = build_request(&token(), &request, Some(("x-tenant-id", "acme")))
			.expect("Request should build.");
		let header = |name: &str| {
			built.headers().get(name).and_then(|value| value.to_str().ok()).map(str::to_owned)
		};

		assert_eq!(built.method(), Method::GET);
		assert_eq!(header("authorization").as_deref(), Some("Bearer access-1"));
		assert_eq!(header("x-tenant-id").as_deref(), Some("acme"));
		assert_eq!(header("x-trace").as_deref(), Some("abc"));

		let url = Url::parse(&built.uri().to_string()).expect("Built URI should parse.");

		assert_eq!(url.path(), "/services/data/v59.0/query");
		assert_eq!(
			url.query_pairs().find(|(key, _)| key == "q").map(|(_, value)| value.into_owned()),
			Some("SELECT Id FROM Account WHERE Name = 'A&B'".into())
		);
	}

	#[test]
	fn json_bodies_set_the_content_type() {
		let request = DataRequest::new(Method::PATCH, "/services/data/v59.0/sobjects/Account/001")
			.json(serde_json::json!({ "Name": "Acme" }));
		let built = build_request(&token(), &request, None).expect("Request should build.");

		assert_eq!(
			built.headers().get(CONTENT_TYPE).and_then(|value| value.to_str().ok()),
			Some(JSON_CONTENT_TYPE)
		);
		assert_eq!(built.body().as_slice(), br#"{"Name":"Acme"}"#);
	}

	#[test]
	fn paths_naming_another_host_are_rejected() {
		for path in [
			"https://evil.example.net/steal",
			"//evil.example.net/steal",
			"/\\evil.example.net/steal",
			"services/data",
			"",
		] {
			match check_relative_path(path) {
				Err(Error::Config(ConfigError::RequestPathNotRelative { path: rejected })) =>
					assert_eq!(rejected, path),
				other => panic!("Unexpected result for `{path}`: {other:?}."),
			}
		}

		check_relative_path("/services/data/v59.0/query").expect("Rooted paths should pass.");

		let request = DataRequest::get("/services/data/../../x");
		let built = build_request(&token(), &request, None).expect("Dot segments stay on host.");

		assert_eq!(built.uri().host(), Some("acme.my.example.com"));
	}

	#[test]
	fn non_success_statuses_become_upstream_errors() {
		let mut response = HttpResponse::new(b"[{\"errorCode\":\"MALFORMED_QUERY\"}]".to_vec());

		*response.status_mut() = StatusCode::BAD_REQUEST;

		match into_data_response(response) {
			Err(Error::Upstream { status, body }) => {
				assert_eq!(status, 400);
				assert!(body.contains("MALFORMED_QUERY"));
			},
			other => panic!("Unexpected result: {other:?}."),
		}
	}
}
