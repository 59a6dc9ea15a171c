//! HTTP adapter for the Folio server

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::PdfEngine;
use crate::state::AppState;

pub mod documents;
pub mod error;
pub mod health;

pub use error::{ApiError, ApiResult};

/// Full application router
pub fn app<E: PdfEngine>(state: AppState<E>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload_bytes = state.config().server.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_check::<E>))
        .route("/api/v1/health", get(health::health_check::<E>))
        .nest("/api/v1/documents", documents::router::<E>(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
