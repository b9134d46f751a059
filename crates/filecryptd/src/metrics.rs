//! Prometheus metrics + health check endpoints
//!
//! Endpoints:
//!   GET /metrics  Prometheus text format
//!   GET /healthz  liveness check (always 200 if process is running)

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};
use std::sync::Arc;

use crate::server::AppState;

/// Counters and timings for the encryption endpoint.
#[derive(Clone)]
pub struct ServerMetrics {
    registry: Arc<Registry>,
    encryptions: Family<Vec<(String, String)>, Counter>,
    bytes_encrypted: Counter,
    encrypt_duration: Histogram,
}

impl ServerMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let encryptions = Family::default();
        let bytes_encrypted = Counter::default();
        let encrypt_duration = Histogram::new([0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]);

        registry.register(
            "filecrypt_encryptions",
            "Upload encryptions by outcome",
            encryptions.clone(),
        );
        registry.register(
            "filecrypt_container_bytes",
            "Encrypted container bytes written",
            bytes_encrypted.clone(),
        );
        registry.register(
            "filecrypt_encrypt_duration_seconds",
            "Time spent deriving the key and encrypting an upload",
            encrypt_duration.clone(),
        );

        ServerMetrics {
            registry: Arc::new(registry),
            encryptions,
            bytes_encrypted,
            encrypt_duration,
        }
    }

    pub fn record_success(&self, bytes: u64, seconds: f64) {
        self.encryptions.get_or_create(&outcome("success")).inc();
        self.bytes_encrypted.inc_by(bytes);
        self.encrypt_duration.observe(seconds);
    }

    pub fn record_failure(&self, reason: &str) {
        self.encryptions.get_or_create(&outcome(reason)).inc();
    }

    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn outcome(value: &str) -> Vec<(String, String)> {
    vec![("outcome".to_string(), value.to_string())]
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

/// Liveness check: returns 200 if the process is running.
pub async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
