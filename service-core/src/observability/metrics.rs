use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::AppError;

/// Install the process-wide Prometheus recorder backing the `metrics` macros.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, AppError> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to install metrics recorder: {}", e)))
}

/// Render the current snapshot in the Prometheus text format.
pub fn render_metrics(handle: Option<&PrometheusHandle>) -> String {
    match handle {
        Some(handle) => handle.render(),
        None => "# Metrics recorder not installed\n".to_string(),
    }
}
