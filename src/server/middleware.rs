//! Request gates, applied outside the handlers.
//!
//! Order per request: latency boundary → app-version gate → authentication
//! gate. Both gates answer HTTP 200 with the failure code in the envelope.

use crate::protocol::{ApiCode, ApiResponse, HDR_APP_VERSION, HDR_SEC_ACCOUNT, HDR_SEC_TOKEN};
use crate::identity::SYS_ACCOUNT;
use crate::server::context::AppContext;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Paths that bypass both gates.
const OPEN_PATHS: &[&str] = &["/", "/docs", "/openapi.json", "/favicon.ico"];

/// Paths exempt from the app-version gate in addition to [`OPEN_PATHS`]
/// (machine callers that carry no app version).
const VERSIONLESS_PATHS: &[&str] = &["/api/v1/game/result"];

/// Paths reachable without authentication in addition to [`OPEN_PATHS`].
const UNAUTHENTICATED_PATHS: &[&str] = &["/api/v1/sms", "/api/v1/sms/verify", "/api/v1/game/result"];

fn header<'h>(headers: &'h HeaderMap, name: &str) -> &'h str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

fn gate_response(code: ApiCode) -> Response {
    Json(ApiResponse::<()>::failure(code)).into_response()
}

/// Log per-request latency for the API routes.
pub async fn latency_boundary(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if OPEN_PATHS.contains(&path.as_str()) {
        return next.run(req).await;
    }
    let method = req.method().clone();
    let started = Instant::now();
    let response = next.run(req).await;
    debug!(
        %method,
        path,
        latency_ms = started.elapsed().as_millis() as u64,
        "request served"
    );
    response
}

/// Reject requests from stale client builds.
pub async fn app_version_gate(
    State(ctx): State<Arc<AppContext>>,
    req: Request,
    next: Next,
) -> Response {
    if ctx.config.server.skip_app_version_check {
        return next.run(req).await;
    }
    let path = req.uri().path();
    if OPEN_PATHS.contains(&path) || VERSIONLESS_PATHS.contains(&path) {
        return next.run(req).await;
    }
    // The system account operates tooling pinned to no particular build.
    if header(req.headers(), HDR_SEC_ACCOUNT) == SYS_ACCOUNT {
        return next.run(req).await;
    }

    let version = header(req.headers(), HDR_APP_VERSION);
    if version.is_empty() || version != ctx.config.server.app_version {
        return gate_response(ApiCode::StaleAppVersion);
    }
    next.run(req).await
}

/// Authenticate every gated route against the token and device binding.
pub async fn authentication_gate(
    State(ctx): State<Arc<AppContext>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if OPEN_PATHS.contains(&path) || UNAUTHENTICATED_PATHS.contains(&path) {
        return next.run(req).await;
    }

    let account = header(req.headers(), HDR_SEC_ACCOUNT).to_string();
    let token = header(req.headers(), HDR_SEC_TOKEN).to_string();
    if !ctx.auth.authenticate(&account, &token).await {
        return gate_response(ApiCode::Unauthorized);
    }
    next.run(req).await
}
