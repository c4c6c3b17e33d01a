//! Métricas Prometheus y servidor de monitoreo

use axum::{routing::get, Router};
use once_cell::sync::Lazy;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

/// Eventos de telemetría reenviados con éxito
pub static SUCCESS_STATUS_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "oracle_success_status_event_total",
        "Total success events processed"
    )
    .expect("failed to register success counter")
});

/// Eventos de telemetría fallidos
pub static FAILED_STATUS_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "oracle_failed_status_events_total",
        "Total number of failed events"
    )
    .expect("failed to register failure counter")
});

/// Jobs completados por el runner
pub static COMPLETED_JOBS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("oracle_completed_jobs_total", "Total jobs completed")
        .expect("failed to register jobs counter")
});

/// Jobs descartados por error o timeout
pub static DISCARDED_JOBS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("oracle_discarded_jobs_total", "Total jobs discarded")
        .expect("failed to register jobs counter")
});

/// Router del servidor de monitoreo (puerto separado del API)
pub fn monitoring_router() -> Router {
    Router::new()
        .route("/", get(|| async { "" }))
        .route("/metrics", get(serve_metrics))
}

async fn serve_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = SUCCESS_STATUS_EVENTS.get();
        SUCCESS_STATUS_EVENTS.inc();
        assert_eq!(SUCCESS_STATUS_EVENTS.get(), before + 1);
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        SUCCESS_STATUS_EVENTS.inc();
        let body = serve_metrics().await;
        assert!(body.contains("oracle_success_status_event_total"));
    }
}
