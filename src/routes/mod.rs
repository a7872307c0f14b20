//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Optional Swagger UI / OpenAPI spec endpoint (disable with `AIRLIFT_ENABLE_SWAGGER=false`)
//! - Health / heartbeat route
//! - The update API under `/api`: upload, manifest poll, asset fetch,
//!   rollback, release/runtime catalogs and tracking metrics

mod assets;
pub mod doc;
mod health;
mod manifest;
mod releases;
mod rollback;
mod runtimes;
mod tracking;
mod upload;

use axum::http::StatusCode;
use axum::{Json, Router, middleware};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{cors, trace};
use crate::state::AppState;

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .merge(upload::router(&state))
        .merge(manifest::router())
        .merge(assets::router())
        .merge(rollback::router())
        .merge(releases::router())
        .merge(runtimes::router())
        .merge(tracking::router())
        .method_not_allowed_fallback(method_not_allowed);

    let mut app = Router::new()
        .merge(health::router())
        .nest("/api", api_router)
        .method_not_allowed_fallback(method_not_allowed);

    // ── Swagger UI ────────────────────────────────────────────────────────────
    // Enabled by default; disable with AIRLIFT_ENABLE_SWAGGER=false in
    // production to avoid exposing the API structure.
    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(state.clone())))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            trace::trace_middleware,
        ))
        .with_state(state)
}

/// Wrong-method responses carry the same `{error}` JSON shape as every
/// other failure.
async fn method_not_allowed() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
}
