//! HTTP surface: router assembly and the middleware stack.

pub mod context;
pub mod handlers;
pub mod middleware;

pub use context::AppContext;

use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Assemble the full router with gates and CORS applied.
pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let cors = cors_layer(&ctx.config.server.cors_origins);

    Router::new()
        .route("/", get(handlers::index))
        .route("/api/v1/sms", post(handlers::sms_issue))
        .route("/api/v1/sms/verify", post(handlers::sms_verify))
        .route("/api/v1/room/enter", post(handlers::room_enter))
        .route("/api/v1/room/leave", post(handlers::room_leave))
        .route("/api/v1/room/queue/sit", post(handlers::queue_sit))
        .route("/api/v1/room/queue/stand", post(handlers::queue_stand))
        .route("/api/v1/room/queue/ready", post(handlers::queue_ready))
        .route("/api/v1/room/queue/unready", post(handlers::queue_unready))
        .route("/api/v1/room/battle/start", post(handlers::battle_start))
        .route("/api/v1/room/battle/end", post(handlers::battle_end))
        .route("/api/v1/room", get(handlers::room_get))
        .route("/api/v1/room/list", get(handlers::room_list))
        .route("/api/v1/game/result", post(handlers::game_result))
        .layer(from_fn_with_state(ctx.clone(), middleware::authentication_gate))
        .layer(from_fn_with_state(ctx.clone(), middleware::app_version_gate))
        .layer(axum::middleware::from_fn(middleware::latency_boundary))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

fn cors_layer(origins: &str) -> CorsLayer {
    if origins == "*" {
        return CorsLayer::permissive();
    }
    let parsed: Vec<HeaderValue> = origins
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    if parsed.is_empty() {
        tracing::warn!("no valid CORS origins configured, using permissive CORS");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
