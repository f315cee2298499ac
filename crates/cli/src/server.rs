//! HTTP query API over [`ValuationService`].
//!
//! | route             | body                      | data            |
//! |-------------------|---------------------------|-----------------|
//! | `POST /search`    | `{ "address": "..." }`    | candidate list  |
//! | `POST /valuation` | `{ "address": "..." }?`   | valuation       |
//! | `GET /stats`      |                           | service stats   |
//! | `GET /`           |                           | `OK`            |
//!
//! Calls are correlated by the `session-id` header (`sessionid` is accepted
//! too). Every JSON response is a [`CommandResult`] envelope.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pv::{PropertyBackend, ValuationService};
use pv_protocol::{Candidate, SESSION_HEADER, SESSION_HEADER_ALT, SearchRequest, ServiceStats, Valuation, ValuationRequest};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::{Result, service_command_error};
use crate::output::{CommandResult, ErrorCode, ResultBuilder};
use crate::site::SiteBackend;

/// Builds the API router for `service`.
pub fn router<B: PropertyBackend>(service: ValuationService<B>) -> Router {
	Router::new()
		.route("/", get(|| async { "OK" }))
		.route("/search", post(search::<B>))
		.route("/valuation", post(valuation::<B>))
		.route("/stats", get(stats::<B>))
		.with_state(service)
}

/// Loads the site backend from `config` and serves until Ctrl+C or SIGTERM.
pub async fn serve(config: ServiceConfig) -> Result<()> {
	config.validate()?;
	let addr = config.listen_addr()?;
	let backend = Arc::new(SiteBackend::new(config.site.clone())?);
	let service = ValuationService::new(backend, config.max_concurrent)?;

	let listener = TcpListener::bind(addr)
		.await
		.with_context(|| format!("Failed to bind query server to {addr}"))?;
	info!(
		target = "pv.server",
		%addr,
		max_concurrent = config.max_concurrent,
		base_url = %config.site.base_url,
		"starting query server"
	);

	run(listener, service, config.idle_session_timeout(), shutdown_signal()).await
}

/// Serves `service` on `listener` until `shutdown` resolves, then releases
/// every session still open.
pub async fn run<B, S>(listener: TcpListener, service: ValuationService<B>, idle_timeout: Option<Duration>, shutdown: S) -> Result<()>
where
	B: PropertyBackend,
	S: Future<Output = ()> + Send + 'static,
{
	let sweeper = idle_timeout.map(|max_age| spawn_idle_sweeper(service.clone(), max_age));

	axum::serve(listener, router(service.clone()).into_make_service())
		.with_graceful_shutdown(shutdown)
		.await
		.context("Query server error")?;

	if let Some(sweeper) = sweeper {
		sweeper.abort();
	}

	let released = service.shutdown().await?;
	info!(target = "pv.server", released, "query server stopped");
	Ok(())
}

fn spawn_idle_sweeper<B: PropertyBackend>(service: ValuationService<B>, max_age: Duration) -> JoinHandle<()> {
	let period = (max_age / 2).max(Duration::from_secs(1));
	debug!(target = "pv.server", max_age_secs = max_age.as_secs(), "idle session sweeper enabled");

	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(period);
		ticker.tick().await;
		loop {
			ticker.tick().await;
			match service.evict_idle(max_age).await {
				Ok(0) => {}
				Ok(evicted) => info!(target = "pv.server", evicted, "released idle sessions"),
				Err(err) => {
					warn!(target = "pv.server", error = %err, "idle sweep failed");
					break;
				}
			}
		}
	})
}

#[cfg(unix)]
async fn shutdown_signal() {
	use tokio::signal::unix::{SignalKind, signal};

	let mut sigterm = match signal(SignalKind::terminate()) {
		Ok(sigterm) => sigterm,
		Err(err) => {
			warn!(target = "pv.server", error = %err, "failed to install SIGTERM handler");
			let _ = tokio::signal::ctrl_c().await;
			return;
		}
	};

	tokio::select! {
		_ = tokio::signal::ctrl_c() => info!(target = "pv.server", "received Ctrl+C, shutting down"),
		_ = sigterm.recv() => info!(target = "pv.server", "received SIGTERM, shutting down"),
	}
}

#[cfg(not(unix))]
async fn shutdown_signal() {
	let _ = tokio::signal::ctrl_c().await;
	info!(target = "pv.server", "received Ctrl+C, shutting down");
}

async fn search<B: PropertyBackend>(State(service): State<ValuationService<B>>, headers: HeaderMap, body: Bytes) -> Response {
	let started = Instant::now();
	let session_id = session_id_from(&headers).unwrap_or_else(generated_session_id);
	let builder = ResultBuilder::<Vec<Candidate>>::started_at("search", started).session_id(session_id.clone());

	let request: SearchRequest = match serde_json::from_slice(&body) {
		Ok(request) => request,
		Err(err) => return respond(builder.error(ErrorCode::InvalidInput, format!("invalid search body: {err}")).build()),
	};
	let address = request.address.trim();
	if address.is_empty() {
		return respond(builder.error(ErrorCode::InvalidInput, "address must not be empty").build());
	}

	let result = match service.begin(session_id.as_str(), address).await {
		Ok(candidates) => builder.data(candidates).build(),
		Err(err) => {
			warn!(target = "pv.server", %session_id, error = %err, "search failed");
			builder.command_error(service_command_error(&err)).build()
		}
	};

	let mut response = respond(result);
	if let Ok(value) = HeaderValue::from_str(&session_id) {
		response.headers_mut().insert(SESSION_HEADER, value);
	}
	response
}

async fn valuation<B: PropertyBackend>(State(service): State<ValuationService<B>>, headers: HeaderMap, body: Bytes) -> Response {
	let started = Instant::now();
	let builder = ResultBuilder::<Valuation>::started_at("valuation", started);

	let Some(session_id) = session_id_from(&headers) else {
		return respond(
			builder
				.error(ErrorCode::SessionNotFound, format!("missing {SESSION_HEADER} header"))
				.build(),
		);
	};
	let builder = builder.session_id(session_id.clone());

	let request: ValuationRequest = if body.iter().all(u8::is_ascii_whitespace) {
		ValuationRequest::default()
	} else {
		match serde_json::from_slice(&body) {
			Ok(request) => request,
			Err(err) => return respond(builder.error(ErrorCode::InvalidInput, format!("invalid valuation body: {err}")).build()),
		}
	};

	let result = match service.complete(session_id.as_str(), request.address).await {
		Ok(valuation) => builder.data(valuation).build(),
		Err(err) => {
			warn!(target = "pv.server", %session_id, error = %err, "valuation failed");
			builder.command_error(service_command_error(&err)).build()
		}
	};
	respond(result)
}

async fn stats<B: PropertyBackend>(State(service): State<ValuationService<B>>) -> Response {
	respond(ResultBuilder::<ServiceStats>::new("stats").data(service.service_stats()).build())
}

fn respond<T: Serialize>(result: CommandResult<T>) -> Response {
	let status = result.error.as_ref().map_or(StatusCode::OK, |err| status_for(err.code));
	(status, Json(result)).into_response()
}

/// HTTP status for an envelope error code.
pub fn status_for(code: ErrorCode) -> StatusCode {
	match code {
		ErrorCode::SessionNotFound => StatusCode::NOT_FOUND,
		ErrorCode::InvalidSessionState => StatusCode::CONFLICT,
		ErrorCode::AcquisitionFailed | ErrorCode::NavigationFailed | ErrorCode::ReadFailed => StatusCode::BAD_GATEWAY,
		ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
		ErrorCode::ConfigError | ErrorCode::IoError | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
	}
}

fn session_id_from(headers: &HeaderMap) -> Option<String> {
	[SESSION_HEADER, SESSION_HEADER_ALT]
		.into_iter()
		.filter_map(|name| headers.get(name))
		.filter_map(|value| value.to_str().ok())
		.map(str::trim)
		.find(|value| !value.is_empty())
		.map(str::to_string)
}

fn generated_session_id() -> String {
	let millis = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_millis())
		.unwrap_or_default();
	format!("session-{millis}")
}
