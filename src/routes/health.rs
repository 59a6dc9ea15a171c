use axum::{extract::State, Json};
use serde::Serialize;

use crate::engine::PdfEngine;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    engine: &'static str,
    open_documents: usize,
}

pub async fn health_check<E: PdfEngine>(State(state): State<AppState<E>>) -> Json<HealthResponse> {
    let registry = state.viewer().registry();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        engine: registry.engine().name(),
        open_documents: registry.len(),
    })
}
