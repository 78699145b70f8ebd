use service_core::axum::{extract::State, response::IntoResponse};
use service_core::observability::render_metrics;

use crate::AppState;

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    render_metrics(state.metrics.as_ref())
}
