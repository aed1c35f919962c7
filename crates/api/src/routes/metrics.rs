use axum::extract::State;
use metrics_exporter_prometheus::PrometheusHandle;

/// Prometheus metrics in text exposition format.
pub async fn get(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
