// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use httpmock::prelude::*;
use serde_json::json;
use time::{Duration, OffsetDateTime, macros};
use url::Url;
// self
use anon_token_broker::{
	auth::ClientIp,
	clock::FixedClock,
	config::BrokerConfig,
	error::{Error, UpstreamError},
	flows::Broker,
	http_types::{HeaderMap, HeaderValue, Method},
};

const RATE_LIMIT_PATH: &str = "/rest/v1/anon_rate_limits";
const AUDIT_PATH: &str = "/rest/v1/user_anon";
const USERS_PATH: &str = "/auth/v1/admin/users";
const TOKEN_PATH: &str = "/auth/v1/token";
const USER_ID: &str = "0b7d7c0e-8f4e-4c55-9a43-6f1f5a6f2c11";
const SERVICE_KEY: &str = "service-role-test-key";
const BEARER: &str = "Bearer service-role-test-key";
const GRANT: &str =
	"{\"access_token\":\"jwt-access\",\"token_type\":\"bearer\",\"expires_in\":3600}";
const INVALID_GRANT: &str =
	"{\"error\":\"invalid_grant\",\"error_description\":\"Invalid login credentials\"}";
const NOW: OffsetDateTime = macros::datetime!(2024-01-01 09:00 UTC);

fn build_broker(server: &MockServer) -> Broker {
	build_broker_with_timeout(server, StdDuration::from_secs(10))
}

fn build_broker_with_timeout(server: &MockServer, timeout: StdDuration) -> Broker {
	let base_url = Url::parse(&server.base_url()).expect("Mock server URL should parse.");
	let config = BrokerConfig::new(base_url, SERVICE_KEY)
		.with_daily_limit(10)
		.with_token_ttl(Duration::minutes(60))
		.with_request_timeout(timeout);

	Broker::from_config(config)
		.expect("Reqwest-backed broker should build.")
		.with_clock(Arc::new(FixedClock::new(NOW)))
}

fn forwarded(ip: &'static str) -> HeaderMap {
	let mut headers = HeaderMap::new();

	headers.insert("x-forwarded-for", HeaderValue::from_static(ip));

	headers
}

fn created_user_body() -> String {
	json!({
		"id": USER_ID,
		"email": "anon+fixture@example.com",
		"user_metadata": { "anon": true, "created_by": "edge-get-anon" }
	})
	.to_string()
}

async fn mock_rate_limit(server: &MockServer, count: u64) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path(RATE_LIMIT_PATH)
				.query_param("on_conflict", "ip,day")
				.header("apikey", SERVICE_KEY)
				.header("authorization", BEARER)
				.header("prefer", "resolution=merge-duplicates,return=representation")
				.json_body(json!({ "ip": "203.0.113.5", "day": "2024-01-01", "count": 1 }));
			then.status(201).header("content-type", "application/json").body(format!(
				"[{{\"ip\":\"203.0.113.5\",\"day\":\"2024-01-01\",\"count\":{count}}}]"
			));
		})
		.await
}

async fn mock_create_user(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path(USERS_PATH)
				.header("apikey", SERVICE_KEY)
				.header("authorization", BEARER)
				.header("content-type", "application/json")
				.body_includes("\"email_confirm\":true");
			then.status(200).header("content-type", "application/json").body(created_user_body());
		})
		.await
}

async fn mock_token<'a>(server: &'a MockServer, status: u16, body: &'static str) -> httpmock::Mock<'a> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.query_param("grant_type", "password")
				.header("apikey", SERVICE_KEY)
				.header("content-type", "application/x-www-form-urlencoded");
			then.status(status).header("content-type", "application/json").body(body);
		})
		.await
}

async fn mock_delete_user(server: &MockServer, status: u16) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(DELETE)
				.path(format!("{USERS_PATH}/{USER_ID}"))
				.header("apikey", SERVICE_KEY)
				.header("authorization", BEARER);
			then.status(status).header("content-type", "application/json").body("{}");
		})
		.await
}

async fn mock_audit(server: &MockServer, status: u16) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path(AUDIT_PATH)
				.header("prefer", "return=minimal")
				.json_body(json!({
					"user_id": USER_ID,
					"ip": "203.0.113.5",
					"created_at": "2024-01-01T09:00:00Z",
					"expires_at": "2024-01-01T10:00:00Z"
				}));
			then.status(status);
		})
		.await
}

#[tokio::test]
async fn successful_issuance_calls_every_upstream_once() {
	let server = MockServer::start_async().await;
	let rate_limit = mock_rate_limit(&server, 1).await;
	let create = mock_create_user(&server).await;
	let token = mock_token(&server, 200, GRANT).await;
	let delete = mock_delete_user(&server, 200).await;
	let audit = mock_audit(&server, 201).await;
	let broker = build_broker(&server);
	let response = broker.handle(&Method::POST, &forwarded("203.0.113.5, 10.0.0.1")).await;

	assert_eq!(response.status, 200);
	assert_eq!(response.body["access_token"], "jwt-access");
	assert_eq!(response.body["token_type"], "bearer");
	assert_eq!(response.body["user"]["id"], USER_ID);
	assert_eq!(response.body["user"]["user_metadata"]["anon"], true);

	assert_eq!(response.body["expires_at"], "2024-01-01T10:00:00Z");

	rate_limit.assert_async().await;
	create.assert_async().await;
	token.assert_async().await;
	audit.assert_async().await;
	delete.assert_calls_async(0).await;
}

#[tokio::test]
async fn failed_exchange_deletes_the_identity() {
	let server = MockServer::start_async().await;
	let _rate_limit = mock_rate_limit(&server, 1).await;
	let _create = mock_create_user(&server).await;
	let token = mock_token(&server, 400, INVALID_GRANT).await;
	let delete = mock_delete_user(&server, 200).await;
	let audit = mock_audit(&server, 201).await;
	let broker = build_broker(&server);
	let response = broker.handle(&Method::POST, &forwarded("203.0.113.5")).await;

	assert_eq!(response.status, 500);
	assert_eq!(response.body, json!({ "error": "Internal server error" }));

	token.assert_async().await;
	delete.assert_async().await;
	audit.assert_calls_async(0).await;
}

#[tokio::test]
async fn cleanup_failure_keeps_the_exchange_error() {
	let server = MockServer::start_async().await;
	let _rate_limit = mock_rate_limit(&server, 1).await;
	let _create = mock_create_user(&server).await;
	let _token = mock_token(&server, 400, INVALID_GRANT).await;
	let delete = mock_delete_user(&server, 500).await;
	let broker = build_broker(&server);
	let ip = ClientIp::new("203.0.113.5").expect("Client IP fixture should be valid.");
	let err = broker.issue(&ip).await.expect_err("Exchange should fail.");

	match &err {
		Error::Exchange(UpstreamError::Status { status, body }) => {
			assert_eq!(*status, 400);
			assert!(body.contains("invalid_grant"));
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	delete.assert_async().await;
}

#[tokio::test]
async fn audit_failure_still_returns_the_token() {
	let server = MockServer::start_async().await;
	let _rate_limit = mock_rate_limit(&server, 1).await;
	let _create = mock_create_user(&server).await;
	let _token = mock_token(&server, 200, GRANT).await;
	let delete = mock_delete_user(&server, 200).await;
	let audit = mock_audit(&server, 500).await;
	let broker = build_broker(&server);
	let response = broker.handle(&Method::POST, &forwarded("203.0.113.5")).await;

	assert_eq!(response.status, 200);
	assert_eq!(response.body["access_token"], "jwt-access");

	audit.assert_async().await;
	delete.assert_calls_async(0).await;
}

#[tokio::test]
async fn provisioning_failure_skips_the_exchange() {
	let server = MockServer::start_async().await;
	let _rate_limit = mock_rate_limit(&server, 1).await;
	let create = server
		.mock_async(|when, then| {
			when.method(POST).path(USERS_PATH);
			then.status(422)
				.header("content-type", "application/json")
				.body("{\"code\":422,\"error_code\":\"email_exists\"}");
		})
		.await;
	let token = mock_token(&server, 200, GRANT).await;
	let broker = build_broker(&server);
	let ip = ClientIp::new("203.0.113.5").expect("Client IP fixture should be valid.");
	let err = broker.issue(&ip).await.expect_err("Provisioning should fail.");

	assert!(matches!(err, Error::Provisioning(UpstreamError::Status { status: 422, .. })));
	assert_eq!(err.status_code(), 500);

	create.assert_async().await;
	token.assert_calls_async(0).await;
}

#[tokio::test]
async fn quota_overflow_is_rejected_before_provisioning() {
	let server = MockServer::start_async().await;
	let _rate_limit = mock_rate_limit(&server, 11).await;
	let create = mock_create_user(&server).await;
	let broker = build_broker(&server);
	let response = broker.handle(&Method::POST, &forwarded("203.0.113.5")).await;

	assert_eq!(response.status, 429);
	assert_eq!(response.body, json!({ "error": "Rate limit exceeded" }));

	create.assert_calls_async(0).await;
}

#[tokio::test]
async fn datastore_failures_fail_the_quota_check() {
	let server = MockServer::start_async().await;
	let rate_limit = server
		.mock_async(|when, then| {
			when.method(POST).path(RATE_LIMIT_PATH);
			then.status(503).body("upstream unavailable");
		})
		.await;
	let create = mock_create_user(&server).await;
	let broker = build_broker(&server);
	let response = broker.handle(&Method::POST, &HeaderMap::new()).await;

	assert_eq!(response.status, 500);

	rate_limit.assert_async().await;
	create.assert_calls_async(0).await;
}

#[tokio::test]
async fn object_and_empty_upsert_responses() {
	let server = MockServer::start_async().await;
	let mut rate_limit = server
		.mock_async(|when, then| {
			when.method(POST).path(RATE_LIMIT_PATH);
			then.status(201)
				.header("content-type", "application/json")
				.body("{\"ip\":\"unknown\",\"day\":\"2024-01-01\",\"count\":11}");
		})
		.await;
	let broker = build_broker(&server);
	let err = broker.issue(&ClientIp::unknown()).await.expect_err("Count 11 should be refused.");

	assert!(matches!(err, Error::RateLimitExceeded { count: 11, limit: 10 }));

	rate_limit.delete_async().await;
	server
		.mock_async(|when, then| {
			when.method(POST).path(RATE_LIMIT_PATH);
			then.status(201).header("content-type", "application/json").body("[]");
		})
		.await;

	let err = broker.issue(&ClientIp::unknown()).await.expect_err("Empty upserts should fail.");

	assert!(matches!(err, Error::RateLimitCheck(UpstreamError::EmptyResponse)));
}

#[tokio::test]
async fn slow_datastore_times_out_the_quota_check() {
	let server = MockServer::start_async().await;
	let rate_limit = server
		.mock_async(|when, then| {
			when.method(POST).path(RATE_LIMIT_PATH);
			then.status(201)
				.header("content-type", "application/json")
				.body("[{\"ip\":\"203.0.113.5\",\"day\":\"2024-01-01\",\"count\":1}]")
				.delay(StdDuration::from_millis(800));
		})
		.await;
	let create = mock_create_user(&server).await;
	let broker = build_broker_with_timeout(&server, StdDuration::from_millis(200));
	let ip = ClientIp::new("203.0.113.5").expect("Client IP fixture should be valid.");
	let err = broker.issue(&ip).await.expect_err("A stalled upsert should time out.");

	assert!(matches!(err, Error::RateLimitCheck(UpstreamError::Timeout)));

	let response = broker.handle(&Method::POST, &forwarded("203.0.113.5")).await;

	assert_eq!(response.status, 500);
	assert_eq!(response.body, json!({ "error": "Internal server error" }));

	rate_limit.assert_calls_async(2).await;
	create.assert_calls_async(0).await;
}

#[tokio::test]
async fn timed_out_exchange_still_deletes_the_identity() {
	let server = MockServer::start_async().await;
	let _rate_limit = mock_rate_limit(&server, 1).await;
	let create = mock_create_user(&server).await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).query_param("grant_type", "password");
			then.status(200)
				.header("content-type", "application/json")
				.body(GRANT)
				.delay(StdDuration::from_millis(800));
		})
		.await;
	let delete = mock_delete_user(&server, 200).await;
	let audit = mock_audit(&server, 201).await;
	let broker = build_broker_with_timeout(&server, StdDuration::from_millis(200));
	let ip = ClientIp::new("203.0.113.5").expect("Client IP fixture should be valid.");
	let err = broker.issue(&ip).await.expect_err("A stalled exchange should time out.");

	assert!(matches!(err, Error::Exchange(UpstreamError::Timeout)));
	assert_eq!(err.status_code(), 500);

	create.assert_async().await;
	token.assert_async().await;
	delete.assert_async().await;
	audit.assert_calls_async(0).await;
}
