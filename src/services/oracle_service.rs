//! Forwarder de telemetría
//!
//! Consume los CloudEvents crudos del vendor, resuelve los identificadores
//! NFT del VIN (con memoización de 10 minutos), estampa producer/subject
//! como DIDs `did:nft:` y reenvía al endpoint de ingesta por mTLS.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::cache::VinCache;
use crate::config::environment::EnvironmentConfig;
use crate::metrics;
use crate::models::telemetry::CloudEvent;
use crate::models::vin::Vin;
use crate::repositories::VinRepository;
use crate::services::ingest_service::{IngestOutcome, IngestService};
use crate::services::signals;
use crate::utils::errors::{AppError, AppResult};

pub struct OracleService {
    config: EnvironmentConfig,
    repository: VinRepository,
    ingest: Arc<IngestService>,
    cache: Arc<VinCache>,
}

impl OracleService {
    pub fn new(
        config: EnvironmentConfig,
        repository: VinRepository,
        ingest: Arc<IngestService>,
    ) -> Self {
        let cache = Arc::new(VinCache::default());

        // Janitor del cache, cada 15 minutos
        let janitor = cache.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(15 * 60));
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = janitor.cleanup_expired().await;
                if removed > 0 {
                    debug!("Cache de VINs: {} entradas expiradas eliminadas", removed);
                }
            }
        });

        Self {
            config,
            repository,
            ingest,
            cache,
        }
    }

    /// Procesa un mensaje crudo del topic de telemetría. Un error devuelto
    /// deja el offset sin commitear para que el broker lo redelivere.
    pub async fn handle_device_by_vin(&self, message: &[u8]) -> AppResult<()> {
        let mut event = parse_cloud_event(message)?;

        let data = event
            .data
            .clone()
            .ok_or_else(|| AppError::BadRequest("missing data in CloudEvent".to_string()))?;

        let vin = data
            .get("vin")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AppError::BadRequest(format!("VIN is missing for CloudEvent {}", event.id))
            })?
            .to_string();

        let signals_payload = data.get("signals").ok_or_else(|| {
            AppError::BadRequest(format!("signals are missing for VIN {}", vin))
        })?;
        signals::validate_signals(signals_payload, &vin)?;

        let record = self.lookup_vin(&vin).await?;

        // token 0: el dispositivo no terminó el onboarding, se descarta en silencio
        if record.vehicle_token_id.unwrap_or(0) == 0 {
            debug!("Vehicle token ID es 0 para VIN {}, no se reenvía", vin);
            return Ok(());
        }

        self.set_producer_and_subject(&record, &mut event);

        match self.ingest.send(&event).await {
            Ok(IngestOutcome::Delivered) => {
                metrics::SUCCESS_STATUS_EVENTS.inc();
                debug!("Evento {} entregado", event.id);
                Ok(())
            }
            Ok(IngestOutcome::Dropped) => {
                metrics::FAILED_STATUS_EVENTS.inc();
                Ok(())
            }
            Err(e) => {
                metrics::FAILED_STATUS_EVENTS.inc();
                error!("Fallo enviando evento al nodo de ingesta: {}", e);
                Err(e)
            }
        }
    }

    async fn lookup_vin(&self, vin: &str) -> AppResult<Vin> {
        if let Some(cached) = self.cache.get(vin).await {
            return Ok(cached);
        }

        let record = self
            .repository
            .get_by_vin(vin)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("vehicle {} not found", vin)))?;

        self.cache.set(record.clone()).await;
        Ok(record)
    }

    /// producer = DID del NFT sintético, subject = DID del NFT del vehículo
    fn set_producer_and_subject(&self, record: &Vin, event: &mut CloudEvent) {
        event.producer = nft_did(
            self.config.chain_id,
            &self.config.synthetic_nft_address,
            record.synthetic_token_id.unwrap_or(0),
        );

        let vehicle_token_id = record.vehicle_token_id.unwrap_or(0);
        if vehicle_token_id != 0 {
            event.subject = nft_did(
                self.config.chain_id,
                &self.config.vehicle_nft_address,
                vehicle_token_id,
            );
        }
    }
}

/// Parsea y valida el envelope: data y type son obligatorios
pub fn parse_cloud_event(message: &[u8]) -> AppResult<CloudEvent> {
    let event: CloudEvent = serde_json::from_slice(message)
        .map_err(|e| AppError::BadRequest(format!("invalid CloudEvent: {}", e)))?;

    if event.data.is_none() || event.event_type.is_empty() {
        return Err(AppError::BadRequest(
            "invalid CloudEvent: missing required fields".to_string(),
        ));
    }

    Ok(event)
}

/// DID de un NFT: `did:nft:<chain>:<contract>_<token_id>`
pub fn nft_did(chain_id: i64, contract: &str, token_id: i64) -> String {
    format!("did:nft:{}:{}_{}", chain_id, contract, token_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cloud_event_requires_data_and_type() {
        let valid = br#"{"id": "1", "type": "telemetry", "data": {"vin": "X"}}"#;
        assert!(parse_cloud_event(valid).is_ok());

        let no_data = br#"{"id": "1", "type": "telemetry"}"#;
        assert!(parse_cloud_event(no_data).is_err());

        let no_type = br#"{"id": "1", "data": {"vin": "X"}}"#;
        assert!(parse_cloud_event(no_type).is_err());

        assert!(parse_cloud_event(b"not json").is_err());
    }

    #[test]
    fn test_nft_did_format() {
        let did = nft_did(137, "0x4804e8D1661cd1a1e5dDdE1ff458A7f878c0aC6D", 202);
        assert_eq!(
            did,
            "did:nft:137:0x4804e8D1661cd1a1e5dDdE1ff458A7f878c0aC6D_202"
        );
    }
}
