//! Cliente mTLS del endpoint de ingesta
//!
//! Envía los CloudEvents estampados al nodo de ingesta. El material TLS
//! (cert de cliente, clave y CA raíz) llega por configuración y su ausencia
//! es fatal en el arranque.

use std::time::Duration;

use reqwest::{Certificate, Client, Identity, StatusCode};
use tracing::{debug, warn};

use crate::config::environment::EnvironmentConfig;
use crate::models::telemetry::CloudEvent;
use crate::utils::errors::{AppError, AppResult};

/// Resultado de un intento de forward, ya clasificado por clase de status
#[derive(Debug, PartialEq)]
pub enum IngestOutcome {
    /// 200: contabilizado como éxito
    Delivered,
    /// 400: se loguea y se descarta, sin reintento
    Dropped,
}

pub struct IngestService {
    api_url: String,
    client: Client,
}

impl IngestService {
    pub fn new(config: &EnvironmentConfig) -> AppResult<Self> {
        if config.ingest_endpoint.is_empty() {
            return Err(AppError::Internal(
                "invalid configuration: missing ingest endpoint".to_string(),
            ));
        }
        if config.cert.is_empty() || config.cert_key.is_empty() || config.ca_cert.is_empty() {
            return Err(AppError::Internal(
                "invalid configuration: missing TLS material".to_string(),
            ));
        }

        let mut identity_pem = Vec::new();
        identity_pem.extend_from_slice(config.cert.as_bytes());
        identity_pem.push(b'\n');
        identity_pem.extend_from_slice(config.cert_key.as_bytes());

        let identity = Identity::from_pem(&identity_pem)
            .map_err(|e| AppError::Internal(format!("failed to load client certificate: {}", e)))?;
        let ca = Certificate::from_pem(config.ca_cert.as_bytes())
            .map_err(|e| AppError::Internal(format!("failed to load CA certificate: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .use_rustls_tls()
            .identity(identity)
            .add_root_certificate(ca)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build mTLS client: {}", e)))?;

        Ok(Self {
            api_url: config.ingest_endpoint.clone(),
            client,
        })
    }

    /// Envía un CloudEvent. Los errores devueltos dejan el mensaje sin
    /// commitear en el broker para que sea redelivered.
    pub async fn send(&self, event: &CloudEvent) -> AppResult<IngestOutcome> {
        debug!("Enviando evento {} a {}", event.id, self.api_url);

        let response = self
            .client
            .post(&self.api_url)
            .json(event)
            .send()
            .await?;

        let status = response.status();

        match status {
            StatusCode::OK => Ok(IngestOutcome::Delivered),
            StatusCode::BAD_REQUEST => {
                warn!("Ingest rechazó el evento {} con 400, descartando", event.id);
                Ok(IngestOutcome::Dropped)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Err(
                AppError::ExternalApi(format!("ingest returned status {}", status)),
            ),
            s if s.is_server_error() => Err(AppError::ExternalApi(format!(
                "ingest returned retryable status {}",
                s
            ))),
            other => Err(AppError::ExternalApi(format!(
                "ingest returned unexpected status {}",
                other
            ))),
        }
    }
}
