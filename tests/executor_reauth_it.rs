// self
use crm_gateway::{
	_preludet::*,
	auth::StrategyKind,
	config::{GatewayConfig, TenantHeader},
	error::ConfigError,
	gateway::{DataRequest, Method},
	query::QueryRequest,
};

const RECORDS_BODY: &str = "{\"totalSize\":1,\"done\":true,\"records\":[{\"attributes\":{\"type\":\"Account\"},\"Id\":\"001\",\"Name\":\"Acme\"}]}";

/// Token endpoint hands out `token-N`; data calls answer `stale` tokens with 401.
fn routed_client(issued: Arc<Sequence>, stale: &'static [&'static str]) -> ScriptedHttpClient {
	ScriptedHttpClient::new(move |request| {
		if request.path() == TOKEN_PATH {
			return ScriptedResponse::token(
				&format!("token-{}", issued.advance()),
				SCRIPTED_INSTANCE_URL,
			);
		}

		let bearer = request.header("authorization").unwrap_or_default();

		if stale.iter().any(|token| bearer == format!("Bearer {token}")) {
			ScriptedResponse::json(401, "[{\"errorCode\":\"INVALID_SESSION_ID\"}]")
		} else {
			ScriptedResponse::json(200, RECORDS_BODY)
		}
	})
}

fn gateway_with(client: ScriptedHttpClient) -> ScriptedGateway {
	build_scripted_gateway(
		scripted_config(StrategyKind::RefreshToken),
		refresh_token_source(),
		account_catalog(),
		client,
	)
}

#[tokio::test]
async fn unauthorized_responses_reauthenticate_once() {
	let issued = Arc::new(Sequence::default());
	let client = routed_client(issued.clone(), &["token-1"]);
	let gateway = gateway_with(client.clone());
	let response = gateway
		.execute(DataRequest::get(QUERY_PATH).query_param("q", "SELECT Id FROM Account"))
		.await
		.expect("Second attempt should succeed with a fresh token.");

	assert_eq!(response.status, 200);
	assert_eq!(issued.count(), 2);
	assert_eq!(client.calls_to(TOKEN_PATH), 2);
	assert_eq!(client.calls_to(QUERY_PATH), 2);
	assert_eq!(gateway.metrics().invalidations(), 1);

	let data_calls = client
		.requests()
		.into_iter()
		.filter(|request| request.path() == QUERY_PATH)
		.collect::<Vec<_>>();

	assert_eq!(data_calls[0].header("authorization"), Some("Bearer token-1"));
	assert_eq!(data_calls[1].header("authorization"), Some("Bearer token-2"));
	assert_eq!(data_calls[1].query_param("q").as_deref(), Some("SELECT Id FROM Account"));
	assert_eq!(
		gateway.token().await.expect("Fresh token should be cached.").access_token.expose(),
		"token-2"
	);
}

#[tokio::test]
async fn a_second_unauthorized_response_is_final() {
	let issued = Arc::new(Sequence::default());
	let client = routed_client(issued.clone(), &["token-1", "token-2", "token-3"]);
	let gateway = gateway_with(client.clone());
	let err = gateway
		.execute(DataRequest::get(QUERY_PATH))
		.await
		.expect_err("Repeated 401s should surface.");

	assert!(matches!(err, Error::Upstream { status: 401, .. }));
	assert_eq!(client.calls_to(TOKEN_PATH), 2);
	assert_eq!(client.calls_to(QUERY_PATH), 2);
}

#[tokio::test]
async fn other_failures_are_not_retried() {
	let issued = Arc::new(Sequence::default());
	let client = {
		let issued = issued.clone();

		ScriptedHttpClient::new(move |request| {
			if request.path() == TOKEN_PATH {
				let token = format!("token-{}", issued.advance());

				ScriptedResponse::token(&token, SCRIPTED_INSTANCE_URL)
			} else {
				ScriptedResponse::json(503, "unavailable")
			}
		})
	};
	let gateway = gateway_with(client.clone());
	let err = gateway
		.execute(DataRequest::get(QUERY_PATH))
		.await
		.expect_err("Server errors should surface.");

	match err {
		Error::Upstream { status, body } => {
			assert_eq!(status, 503);
			assert_eq!(body, "unavailable");
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	assert_eq!(client.calls_to(TOKEN_PATH), 1);
	assert_eq!(client.calls_to(QUERY_PATH), 1);
	assert_eq!(gateway.metrics().invalidations(), 0);
}

#[tokio::test]
async fn concurrent_unauthorized_responses_share_one_reauthentication() {
	let issued = Arc::new(Sequence::default());
	let client = {
		let issued = issued.clone();

		ScriptedHttpClient::with_latency(std::time::Duration::from_millis(10), move |request| {
			if request.path() == TOKEN_PATH {
				return ScriptedResponse::token(
					&format!("token-{}", issued.advance()),
					SCRIPTED_INSTANCE_URL,
				);
			}

			match request.header("authorization") {
				Some("Bearer token-1") => ScriptedResponse::json(401, "[]"),
				_ => ScriptedResponse::json(200, RECORDS_BODY),
			}
		})
	};
	let gateway = gateway_with(client.clone());

	gateway.token().await.expect("Initial token should be issued.");

	let (a, b) = tokio::join!(
		gateway.execute(DataRequest::get(QUERY_PATH)),
		gateway.execute(DataRequest::get(QUERY_PATH)),
	);

	a.expect("First request should recover.");
	b.expect("Second request should recover.");

	assert_eq!(client.calls_to(TOKEN_PATH), 2);
	assert_eq!(client.calls_to(QUERY_PATH), 4);
}

#[tokio::test]
async fn tenant_scoped_requests_carry_the_tenant_header() {
	let client = ScriptedHttpClient::new(|request| {
		if request.path() == TOKEN_PATH {
			ScriptedResponse::token("token-1", SCRIPTED_INSTANCE_URL)
		} else {
			ScriptedResponse::json(200, "{}")
		}
	});
	let config = GatewayConfig::builder(StrategyKind::RefreshToken)
		.login_url(Url::parse(SCRIPTED_LOGIN_URL).expect("Login URL fixture should parse."))
		.tenant_header(TenantHeader::new("x-tenant-id", "acme"))
		.build()
		.expect("Tenant configuration should be valid.");
	let gateway =
		build_scripted_gateway(config, refresh_token_source(), account_catalog(), client.clone());

	gateway
		.execute(
			DataRequest::new(Method::POST, "/services/apexrest/sync")
				.json(serde_json::json!({ "ids": ["001"] }))
				.tenant_scoped(true),
		)
		.await
		.expect("Tenant-scoped request should succeed.");

	let sent = client
		.requests()
		.into_iter()
		.find(|request| request.path() == "/services/apexrest/sync")
		.expect("Data request should be recorded.");

	assert_eq!(sent.method, "POST");
	assert_eq!(sent.header("x-tenant-id"), Some("acme"));
	assert_eq!(sent.header("content-type"), Some("application/json"));
	assert_eq!(sent.body, br#"{"ids":["001"]}"#.to_vec());
}

#[tokio::test]
async fn tenant_scoped_requests_need_a_configured_header() {
	let client =
		ScriptedHttpClient::new(|_| ScriptedResponse::token("token-1", SCRIPTED_INSTANCE_URL));
	let gateway = gateway_with(client.clone());
	let err = gateway
		.execute(DataRequest::get(QUERY_PATH).tenant_scoped(true))
		.await
		.expect_err("Missing tenant header configuration must be rejected.");

	assert!(matches!(err, Error::Config(ConfigError::TenantHeaderNotConfigured)));
	assert!(client.requests().is_empty());
}

#[tokio::test]
async fn query_returns_records_and_total_size() {
	let client = ScriptedHttpClient::new(|request| {
		if request.path() == TOKEN_PATH {
			return ScriptedResponse::token("token-1", SCRIPTED_INSTANCE_URL);
		}

		let soql = request.query_param("q").unwrap_or_default();

		if soql.starts_with("SELECT COUNT()") {
			ScriptedResponse::json(200, "{\"totalSize\":42,\"done\":true,\"records\":[]}")
		} else {
			ScriptedResponse::json(200, RECORDS_BODY)
		}
	});
	let gateway = gateway_with(client.clone());
	let page = gateway
		.query(
			QueryRequest::new("accounts").search("Ac'me").filter("Industry", "Energy").limit(10),
		)
		.await
		.expect("Query should succeed.");

	assert_eq!(page.total_size, 42);
	assert_eq!(page.records.len(), 1);
	assert_eq!(page.records[0].get("Name").and_then(|value| value.as_str()), Some("Acme"));
	assert!(!page.records[0].contains_key("attributes"));
	assert_eq!(client.calls_to(TOKEN_PATH), 1);

	let queries = client
		.requests()
		.into_iter()
		.filter_map(|request| request.query_param("q"))
		.collect::<Vec<_>>();

	assert!(queries.contains(
		&"SELECT Id, Name, Industry FROM Account WHERE Name LIKE '%Ac\\'me%' AND Industry = 'Energy' ORDER BY Name LIMIT 10 OFFSET 0"
			.to_owned()
	));
	assert!(queries.contains(
		&"SELECT COUNT() FROM Account WHERE Name LIKE '%Ac\\'me%' AND Industry = 'Energy'".to_owned()
	));
}

#[tokio::test]
async fn unsupported_objects_fail_without_network_calls() {
	let client =
		ScriptedHttpClient::new(|_| ScriptedResponse::token("token-1", SCRIPTED_INSTANCE_URL));
	let gateway = gateway_with(client.clone());
	let err = gateway
		.query(QueryRequest::new("widgets"))
		.await
		.expect_err("Unknown object types must be rejected.");

	assert!(matches!(err, Error::UnsupportedObject { ref name } if name == "widgets"));

	let err = gateway
		.describe_field("widgets", "Status")
		.await
		.expect_err("Unknown object types must be rejected.");

	assert!(matches!(err, Error::UnsupportedObject { .. }));
	assert!(client.requests().is_empty());
}

#[tokio::test]
async fn paths_that_leave_the_instance_host_are_never_sent() {
	let issued = Arc::new(Sequence::default());
	let client = routed_client(issued.clone(), &[]);
	let gateway = gateway_with(client.clone());

	gateway.login().await.expect("Login should succeed.");

	for path in ["https://evil.example.net/steal", "//evil.example.net/steal"] {
		let err = gateway
			.execute(DataRequest::get(path))
			.await
			.expect_err("Foreign hosts must be rejected.");

		assert!(
			matches!(err, Error::Config(ConfigError::RequestPathNotRelative { .. })),
			"Unexpected error variant: {err:?}."
		);
	}

	let requests = client.requests();

	assert_eq!(requests.len(), 1);
	assert_eq!(requests[0].path(), TOKEN_PATH);
	assert!(requests.iter().all(|request| request.header("authorization").is_none()));
}
