//! Consumers de Kafka
//!
//! Dos consumers de larga vida, uno por topic: telemetría sin buffer
//! (reenviada por el forwarder) y operaciones del vendor (resultado
//! asíncrono de enroll/unenroll). Los offsets se commitean solo después de
//! procesar: un fallo deja el mensaje para redelivery.

use std::sync::Arc;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::telemetry::{OperationError, OperationMessage};
use crate::repositories::VinRepository;
use crate::services::oracle_service::OracleService;
use crate::utils::errors::{AppError, AppResult};

pub const OPERATION_TYPE_ENROLLMENT: &str = "enrollment";

pub const ACTION_ENROLL: &str = "enroll";
pub const ACTION_UNENROLL: &str = "unenroll";

pub const OPERATION_STATUS_IN_QUEUE: &str = "inQueue";
pub const OPERATION_STATUS_IN_PROGRESS: &str = "inProgress";
pub const OPERATION_STATUS_SUCCEEDED: &str = "succeeded";
pub const OPERATION_STATUS_FAILED: &str = "failed";

fn create_consumer(brokers: &str, group_id: &str, topic: &str) -> AppResult<StreamConsumer> {
    info!(
        "Creando consumer de Kafka: brokers={}, topic={}, group={}",
        brokers, topic, group_id
    );

    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("socket.timeout.ms", "10000")
        .create()
        .map_err(|e| AppError::Internal(format!("failed to create Kafka consumer: {}", e)))?;

    consumer
        .subscribe(&[topic])
        .map_err(|e| AppError::Internal(format!("failed to subscribe to {}: {}", topic, e)))?;

    Ok(consumer)
}

/// Consumer del topic de telemetría sin buffer
pub async fn run_telemetry_consumer(
    brokers: String,
    group_id: String,
    topic: String,
    oracle: Arc<OracleService>,
    cancellation: CancellationToken,
) -> AppResult<()> {
    let consumer = create_consumer(&brokers, &group_id, &topic)?;

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                info!("Consumer de telemetría detenido");
                return Ok(());
            }
            received = consumer.recv() => {
                let message = match received {
                    Ok(message) => message,
                    Err(e) => {
                        error!("Error consumiendo telemetría: {}", e);
                        continue;
                    }
                };

                let Some(payload) = message.payload() else {
                    continue;
                };

                debug!(
                    "Mensaje de telemetría: topic={}, partition={}, offset={}",
                    message.topic(),
                    message.partition(),
                    message.offset()
                );

                match oracle.handle_device_by_vin(payload).await {
                    Ok(()) => {
                        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                            error!("Fallo commiteando offset de telemetría: {}", e);
                        }
                    }
                    Err(e) => {
                        // sin commit: el broker redelivera el mensaje
                        error!("Fallo procesando mensaje de telemetría: {}", e);
                    }
                }
            }
        }
    }
}

/// Consumer del topic de operaciones del vendor
pub async fn run_operations_consumer(
    brokers: String,
    group_id: String,
    topic: String,
    repository: VinRepository,
    cancellation: CancellationToken,
) -> AppResult<()> {
    let consumer = create_consumer(&brokers, &group_id, &topic)?;

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                info!("Consumer de operaciones detenido");
                return Ok(());
            }
            received = consumer.recv() => {
                let message = match received {
                    Ok(message) => message,
                    Err(e) => {
                        error!("Error consumiendo operaciones: {}", e);
                        continue;
                    }
                };

                let Some(payload) = message.payload() else {
                    continue;
                };

                let operation: OperationMessage = match serde_json::from_slice(payload) {
                    Ok(operation) => operation,
                    Err(e) => {
                        warn!("Mensaje de operaciones no parseable: {}", e);
                        continue;
                    }
                };

                debug!(
                    "Operación recibida: type={}, action={}, status={}, vin={}",
                    operation.operation_type, operation.action, operation.status, operation.vin
                );

                match handle_operation(&repository, &operation).await {
                    Ok(()) => {
                        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                            error!("Fallo commiteando offset de operaciones: {}", e);
                        }
                    }
                    Err(e) => {
                        error!(
                            "Fallo actualizando la base para el VIN {}: {}",
                            operation.vin, e
                        );
                    }
                }
            }
        }
    }
}

/// Aplica un mensaje de operaciones sobre el registro VIN
pub async fn handle_operation(
    repository: &VinRepository,
    operation: &OperationMessage,
) -> AppResult<()> {
    if operation.operation_type != OPERATION_TYPE_ENROLLMENT {
        return Ok(());
    }

    match operation.action.as_str() {
        ACTION_ENROLL => {
            let operation_error: Option<&OperationError> =
                if operation.status == OPERATION_STATUS_FAILED {
                    Some(&operation.error)
                } else {
                    None
                };

            // Hasta que el vendor confirme, el external id es el id de la operación
            let external_id = if operation.status == OPERATION_STATUS_SUCCEEDED {
                operation.data.vehicle_id.as_str()
            } else {
                operation.id.as_str()
            };

            repository
                .update_enrollment(&operation.vin, &operation.status, external_id, operation_error)
                .await?;

            debug!(
                "Enrollment de {} actualizado: status={}, external_id={}",
                operation.vin, operation.status, external_id
            );
        }
        ACTION_UNENROLL => {
            repository
                .update_unenrollment(&operation.vin, &operation.status, None)
                .await?;

            debug!(
                "Unenrollment de {} actualizado: status={}",
                operation.vin, operation.status
            );
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_id_selection() {
        // succeeded usa data.vehicleId; cualquier otro estado usa el id de la operación
        let raw = r#"{
            "id": "op-1",
            "type": "enrollment",
            "action": "enroll",
            "status": "succeeded",
            "vin": "X",
            "data": {"vehicleId": "veh-77"}
        }"#;
        let operation: OperationMessage = serde_json::from_str(raw).unwrap();

        let external_id = if operation.status == OPERATION_STATUS_SUCCEEDED {
            operation.data.vehicle_id.as_str()
        } else {
            operation.id.as_str()
        };
        assert_eq!(external_id, "veh-77");

        for status in [OPERATION_STATUS_IN_QUEUE, OPERATION_STATUS_IN_PROGRESS] {
            let pending = OperationMessage {
                status: status.to_string(),
                ..operation.clone()
            };
            let external_id = if pending.status == OPERATION_STATUS_SUCCEEDED {
                pending.data.vehicle_id.as_str()
            } else {
                pending.id.as_str()
            };
            assert_eq!(external_id, "op-1");
        }
    }
}
