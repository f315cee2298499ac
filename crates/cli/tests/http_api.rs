//! In-process tests for the HTTP query API, backed by the scripted mock.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use pv::testing::MockBackend;
use pv::{ReadOutcome, ValuationService};
use pv_cli::server;
use serde_json::{Value, json};
use tower::ServiceExt;

fn build_app(backend: &Arc<MockBackend>, ceiling: usize) -> (Router, ValuationService<MockBackend>) {
	let service = ValuationService::new(Arc::clone(backend), ceiling).unwrap();
	(server::router(service.clone()), service)
}

fn post(uri: &str, session: Option<(&str, &str)>, body: &str) -> Request<Body> {
	let mut builder = Request::post(uri).header("content-type", "application/json");
	if let Some((name, value)) = session {
		builder = builder.header(name, value);
	}
	builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
	let response = app.clone().oneshot(request).await.unwrap();
	let status = response.status();
	let session = response
		.headers()
		.get("session-id")
		.map(|v| v.to_str().unwrap().to_string());
	let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
	let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&bytes) }));
	(status, session, body)
}

#[tokio::test]
async fn health_probe_answers_ok() {
	let backend = Arc::new(MockBackend::new());
	let (app, _) = build_app(&backend, 3);

	let (status, _, body) = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["raw"], "OK");
}

#[tokio::test]
async fn search_then_valuation_over_http() {
	let backend = Arc::new(MockBackend::new().with_candidates("52 Walker St", &["52 Walker St, Turrella NSW 2205"]));
	let (app, service) = build_app(&backend, 3);

	let (status, echoed, body) = send(
		&app,
		post("/search", Some(("session-id", "s1")), r#"{"address":"52 Walker St"}"#),
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(echoed.as_deref(), Some("s1"));
	assert_eq!(body["ok"], true);
	assert_eq!(body["command"], "search");
	assert_eq!(body["sessionId"], "s1");
	assert_eq!(
		body["data"],
		json!([{ "id": 1, "display": "52 Walker St, Turrella NSW 2205" }])
	);
	assert!(body["timings"]["durationMs"].is_u64());
	assert_eq!(service.sessions(), 1);

	let (status, _, body) = send(&app, post("/valuation", Some(("session-id", "s1")), "{}")).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["data"]["address"], "52 Walker St, Turrella NSW 2205");
	assert_eq!(body["data"]["low"], "$1,000,000");
	assert_eq!(body["data"]["available"], true);
	assert_eq!(service.sessions(), 0);
	assert_eq!(backend.release_calls(), 1);
}

#[tokio::test]
async fn alternate_header_spelling_is_accepted() {
	let backend = Arc::new(MockBackend::new().with_advance(false));
	let (app, _) = build_app(&backend, 3);

	send(&app, post("/search", Some(("sessionid", "alt")), r#"{"address":"42 X St"}"#)).await;
	let (status, _, body) = send(&app, post("/valuation", Some(("sessionid", "alt")), "")).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(
		body["data"],
		json!({ "address": "42 X St", "low": null, "high": null, "confidence": null, "available": false })
	);
}

#[tokio::test]
async fn search_without_header_generates_session_id() {
	let backend = Arc::new(MockBackend::new());
	let (app, service) = build_app(&backend, 3);

	let (status, echoed, body) = send(&app, post("/search", None, r#"{"address":"1 A St"}"#)).await;
	assert_eq!(status, StatusCode::OK);

	let session = echoed.expect("session-id response header");
	assert!(session.starts_with("session-"));
	assert_eq!(body["sessionId"], session.as_str());

	let (status, _, _) = send(&app, post("/valuation", Some(("session-id", session.as_str())), "")).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(service.sessions(), 0);
}

#[tokio::test]
async fn valuation_for_unknown_session_is_not_found() {
	let backend = Arc::new(MockBackend::new());
	let (app, _) = build_app(&backend, 3);

	let (status, _, body) = send(&app, post("/valuation", Some(("session-id", "ghost")), "{}")).await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["ok"], false);
	assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
	assert_eq!(body["error"]["details"]["sessionId"], "ghost");
	assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn valuation_without_header_is_not_found() {
	let backend = Arc::new(MockBackend::new());
	let (app, _) = build_app(&backend, 3);

	let (status, _, body) = send(&app, post("/valuation", None, "{}")).await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn empty_search_result_is_a_conflict_on_valuation() {
	let backend = Arc::new(MockBackend::new().with_candidates("nowhere", &[]));
	let (app, service) = build_app(&backend, 3);

	let (_, _, body) = send(&app, post("/search", Some(("session-id", "s2")), r#"{"address":"nowhere"}"#)).await;
	assert_eq!(body["data"], json!([]));

	let (status, _, body) = send(&app, post("/valuation", Some(("session-id", "s2")), "{}")).await;
	assert_eq!(status, StatusCode::CONFLICT);
	assert_eq!(body["error"]["code"], "INVALID_SESSION_STATE");
	assert_eq!(service.sessions(), 1);
	assert_eq!(backend.release_calls(), 0);
}

#[tokio::test]
async fn valuation_override_by_candidate_id() {
	let backend = Arc::new(MockBackend::new().with_candidates("Walker", &["52 Walker St", "54 Walker St"]));
	let (app, _) = build_app(&backend, 3);

	send(&app, post("/search", Some(("session-id", "s3")), r#"{"address":"Walker"}"#)).await;
	let (status, _, body) = send(&app, post("/valuation", Some(("session-id", "s3")), r#"{"address":"2"}"#)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["data"]["address"], "54 Walker St");
}

#[tokio::test]
async fn missing_estimate_carries_site_message() {
	let backend = Arc::new(MockBackend::new().with_read(ReadOutcome::Missing("no estimate shown".into())));
	let (app, _) = build_app(&backend, 3);

	send(&app, post("/search", Some(("session-id", "s4")), r#"{"address":"9 Y Rd"}"#)).await;
	let (status, _, body) = send(&app, post("/valuation", Some(("session-id", "s4")), "{}")).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["data"]["available"], false);
	assert_eq!(body["data"]["error"], "no estimate shown");
}

#[tokio::test]
async fn backend_failures_are_bad_gateway() {
	let backend = Arc::new(MockBackend::new().failing_acquire("site unreachable"));
	let (app, service) = build_app(&backend, 3);

	let (status, _, body) = send(&app, post("/search", Some(("session-id", "s5")), r#"{"address":"1 A St"}"#)).await;
	assert_eq!(status, StatusCode::BAD_GATEWAY);
	assert_eq!(body["error"]["code"], "ACQUISITION_FAILED");
	assert_eq!(service.sessions(), 0);

	let backend = Arc::new(MockBackend::new().failing_read("selector timed out"));
	let (app, service) = build_app(&backend, 3);
	send(&app, post("/search", Some(("session-id", "s6")), r#"{"address":"1 A St"}"#)).await;
	let (status, _, body) = send(&app, post("/valuation", Some(("session-id", "s6")), "{}")).await;
	assert_eq!(status, StatusCode::BAD_GATEWAY);
	assert_eq!(body["error"]["code"], "READ_FAILED");
	assert_eq!(service.sessions(), 0);
	assert_eq!(backend.release_calls(), 1);
}

#[tokio::test]
async fn malformed_bodies_are_invalid_input() {
	let backend = Arc::new(MockBackend::new());
	let (app, _) = build_app(&backend, 3);

	let (status, _, body) = send(&app, post("/search", Some(("session-id", "s7")), "not json")).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error"]["code"], "INVALID_INPUT");

	let (status, _, _) = send(&app, post("/search", Some(("session-id", "s7")), r#"{"address":"   "}"#)).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);

	let (status, _, _) = send(&app, post("/valuation", Some(("session-id", "s7")), "[1,2]")).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn stats_report_broker_and_sessions() {
	let backend = Arc::new(MockBackend::new());
	let (app, _) = build_app(&backend, 2);

	send(&app, post("/search", Some(("session-id", "a")), r#"{"address":"1 A St"}"#)).await;
	send(&app, post("/search", Some(("session-id", "b")), r#"{"address":"2 B St"}"#)).await;

	let (status, _, body) = send(&app, Request::get("/stats").body(Body::empty()).unwrap()).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["data"]["ceiling"], 2);
	assert_eq!(body["data"]["queued"], 0);
	assert_eq!(body["data"]["openSessions"], 2);
	assert!(body["data"]["active"].as_u64().unwrap() <= 2);
}

#[tokio::test]
async fn graceful_shutdown_releases_open_sessions() {
	let backend = Arc::new(MockBackend::new());
	let service = ValuationService::new(Arc::clone(&backend), 3).unwrap();
	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

	let server = tokio::spawn(server::run(listener, service.clone(), None, async move {
		let _ = stop_rx.await;
	}));

	let client = reqwest::Client::new();
	let response = client
		.post(format!("http://{addr}/search"))
		.header("session-id", "live")
		.json(&json!({ "address": "1 A St" }))
		.send()
		.await
		.unwrap();
	assert_eq!(response.status(), reqwest::StatusCode::OK);
	assert_eq!(service.sessions(), 1);

	stop_tx.send(()).unwrap();
	server.await.unwrap().unwrap();

	assert_eq!(service.sessions(), 0);
	assert!(backend.open_handles().is_empty());
}
