//! Controller de desconexión y borrado
//!
//! Entrega las user-operations de burn para firmar, valida la propiedad
//! contra identity y encola los jobs de disconnect/delete.

use std::collections::HashMap;

use tracing::{debug, error};

use crate::dto::vehicle_dto::{
    DeleteDataForVinsResponse, DisconnectDataForVinsResponse, StatusForVinsResponse,
    SubmitDeleteDataRequest, SubmitDisconnectDataRequest, VinStatus, VinUserOperationData,
};
use crate::jobs::JobKind;
use crate::models::identity::Vehicle;
use crate::models::vin::Vin;
use crate::onboarding::delete::DeleteArgs;
use crate::onboarding::disconnect::DisconnectArgs;
use crate::onboarding::status;
use crate::state::AppState;
use crate::utils::errors::{internal_error, AppError, AppResult};
use crate::utils::validation::{is_valid_vin, sanitize_vins};

pub struct VehicleDeleteController {
    state: AppState,
}

impl VehicleDeleteController {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn test_mode(&self) -> bool {
        self.state.config.enable_vendor_test_mode
    }

    /// User-operations de burn del SD para los VINs completamente onboardeados
    pub async fn get_disconnect_data(
        &self,
        wallet_address: &str,
        vins: &[String],
    ) -> AppResult<DisconnectDataForVinsResponse> {
        let valid_vins = sanitize_vins(vins, self.test_mode())?;
        debug!("Armando datos de desconexión para {} VINs", valid_vins.len());

        let records = self
            .state
            .repository
            .get_by_vins_and_status_range(
                &valid_vins,
                status::MINT_SUCCESS,
                status::BURN_SD_FAILURE,
                &[],
            )
            .await?;

        if records.len() != valid_vins.len() {
            return Err(AppError::BadRequest(
                "Some of the VINs are not fully onboarded".to_string(),
            ));
        }

        let identity_vehicles = self.indexed_identity_vehicles(wallet_address).await?;

        let mut disconnection_data = Vec::with_capacity(records.len());

        for record in &records {
            let identity_vehicle = self.owned_identity_vehicle(&identity_vehicles, record)?;

            let fully_connected =
                record.vehicle_token_id.is_some() && record.synthetic_token_id.is_some();
            if !fully_connected {
                return Err(AppError::BadRequest("VIN not minted".to_string()));
            }

            let fully_connected_identity = identity_vehicle.token_id
                == record.vehicle_token_id.unwrap_or(0)
                && identity_vehicle.synthetic_device.token_id
                    == record.synthetic_token_id.unwrap_or(0);
            if !fully_connected_identity {
                return Err(AppError::BadRequest("TokenIDs mismatch".to_string()));
            }

            let (user_operation, hash) = self
                .state
                .transactions
                .get_burn_sd_by_owner_user_operation_and_hash(
                    wallet_address,
                    record.synthetic_token_id.unwrap_or(0),
                )
                .map_err(|e| {
                    error!("Fallo armando la operación de burn SD: {}", e);
                    internal_error("Failed to get Burn SD operation data")
                })?;

            disconnection_data.push(VinUserOperationData {
                vin: record.vin.clone(),
                user_operation,
                hash,
                signature: String::new(),
            });
        }

        Ok(DisconnectDataForVinsResponse {
            vin_disconnect_data: disconnection_data,
        })
    }

    pub async fn submit_disconnect(
        &self,
        request: SubmitDisconnectDataRequest,
    ) -> AppResult<StatusForVinsResponse> {
        let validated = self.validated_user_operations(&request.vin_disconnect_data)?;

        let raw_vins: Vec<String> = validated.iter().map(|d| d.vin.clone()).collect();
        let valid_vins = sanitize_vins(&raw_vins, self.test_mode())?;

        debug!("Encolando desconexión para {} VINs", valid_vins.len());

        let records = self.state.repository.get_by_vins(&valid_vins).await?;
        let indexed: HashMap<String, Vin> =
            records.into_iter().map(|r| (r.vin.clone(), r)).collect();

        let mut statuses = Vec::with_capacity(validated.len());

        for disconnect in &validated {
            let record = indexed
                .get(&disconnect.vin)
                .cloned()
                .unwrap_or_else(|| Vin::new(&disconnect.vin, status::DISCONNECT_SUBMIT_UNKNOWN));

            if can_submit_disconnect_job(&record) {
                debug!("Encolando job de desconexión para {}", disconnect.vin);

                // La firma del dueño viaja dentro de la user-operation
                let mut user_operation = disconnect.user_operation.clone();
                user_operation.signature = disconnect.signature.clone();

                let enqueued = self
                    .state
                    .queue
                    .enqueue(
                        JobKind::Disconnect,
                        &DisconnectArgs {
                            vin: disconnect.vin.clone(),
                            user_operation,
                        },
                    )
                    .await;

                match enqueued {
                    Ok(_) => statuses.push(VinStatus {
                        vin: disconnect.vin.clone(),
                        status: "Pending".to_string(),
                        details: status::detailed_status(status::DISCONNECT_SUBMIT_PENDING)
                            .to_string(),
                    }),
                    Err(e) => {
                        error!(
                            "Fallo encolando la desconexión de {}: {}",
                            disconnect.vin, e
                        );
                        statuses.push(VinStatus {
                            vin: disconnect.vin.clone(),
                            status: "Failure".to_string(),
                            details: status::detailed_status(status::DISCONNECT_SUBMIT_FAILURE)
                                .to_string(),
                        });
                    }
                }
            } else {
                debug!("Gate cerrado, no se encola la desconexión de {}", disconnect.vin);
                statuses.push(VinStatus {
                    vin: disconnect.vin.clone(),
                    status: status::verification_status(record.onboarding_status).to_string(),
                    details: status::detailed_status(record.onboarding_status).to_string(),
                });
            }

            self.state.repository.upsert(&record).await?;
        }

        Ok(StatusForVinsResponse { statuses })
    }

    pub async fn get_disconnect_status(
        &self,
        vins: &[String],
    ) -> AppResult<StatusForVinsResponse> {
        let valid_vins = sanitize_vins(vins, self.test_mode())?;
        let statuses = self
            .project_statuses(&valid_vins, status::disconnect_status)
            .await?;

        Ok(StatusForVinsResponse { statuses })
    }

    /// User-operations de burn del vehículo para los VINs ya desconectados
    pub async fn get_delete_data(
        &self,
        wallet_address: &str,
        vins: &[String],
    ) -> AppResult<DeleteDataForVinsResponse> {
        let valid_vins = sanitize_vins(vins, self.test_mode())?;
        debug!("Armando datos de borrado para {} VINs", valid_vins.len());

        let records = self
            .state
            .repository
            .get_by_vins_and_status_range(
                &valid_vins,
                status::BURN_SD_SUCCESS,
                status::BURN_VEHICLE_FAILURE,
                &[],
            )
            .await?;

        if records.len() != valid_vins.len() {
            return Err(AppError::BadRequest(
                "Some of the VINs are not disconnected".to_string(),
            ));
        }

        let identity_vehicles = self.indexed_identity_vehicles(wallet_address).await?;

        let mut deletion_data = Vec::with_capacity(records.len());

        for record in &records {
            let identity_vehicle = self.owned_identity_vehicle(&identity_vehicles, record)?;

            // El burn del vehículo requiere el SD ya quemado
            let burnable =
                record.vehicle_token_id.is_some() && record.synthetic_token_id.is_none();
            if !burnable {
                return Err(AppError::BadRequest("VIN cannot be burned".to_string()));
            }

            let burnable_identity = identity_vehicle.token_id
                == record.vehicle_token_id.unwrap_or(0)
                && identity_vehicle.synthetic_device.token_id == 0;
            if !burnable_identity {
                return Err(AppError::BadRequest("TokenIDs mismatch".to_string()));
            }

            let (user_operation, hash) = self
                .state
                .transactions
                .get_burn_vehicle_by_owner_user_operation_and_hash(
                    wallet_address,
                    record.vehicle_token_id.unwrap_or(0),
                )
                .map_err(|e| {
                    error!("Fallo armando la operación de burn del vehículo: {}", e);
                    internal_error("Failed to get Burn Vehicle operation data")
                })?;

            deletion_data.push(VinUserOperationData {
                vin: record.vin.clone(),
                user_operation,
                hash,
                signature: String::new(),
            });
        }

        Ok(DeleteDataForVinsResponse {
            vin_delete_data: deletion_data,
        })
    }

    pub async fn submit_delete(
        &self,
        request: SubmitDeleteDataRequest,
    ) -> AppResult<StatusForVinsResponse> {
        let validated = self.validated_user_operations(&request.vin_delete_data)?;

        let raw_vins: Vec<String> = validated.iter().map(|d| d.vin.clone()).collect();
        let valid_vins = sanitize_vins(&raw_vins, self.test_mode())?;

        debug!("Encolando borrado para {} VINs", valid_vins.len());

        let records = self.state.repository.get_by_vins(&valid_vins).await?;
        let indexed: HashMap<String, Vin> =
            records.into_iter().map(|r| (r.vin.clone(), r)).collect();

        let mut statuses = Vec::with_capacity(validated.len());

        for delete in &validated {
            let record = indexed
                .get(&delete.vin)
                .cloned()
                .unwrap_or_else(|| Vin::new(&delete.vin, status::DELETE_SUBMIT_UNKNOWN));

            if can_submit_delete_job(&record) {
                debug!("Encolando job de borrado para {}", delete.vin);

                let mut user_operation = delete.user_operation.clone();
                user_operation.signature = delete.signature.clone();

                let enqueued = self
                    .state
                    .queue
                    .enqueue(
                        JobKind::Delete,
                        &DeleteArgs {
                            vin: delete.vin.clone(),
                            user_operation,
                        },
                    )
                    .await;

                match enqueued {
                    Ok(_) => statuses.push(VinStatus {
                        vin: delete.vin.clone(),
                        status: "Pending".to_string(),
                        details: status::detailed_status(status::DELETE_SUBMIT_PENDING)
                            .to_string(),
                    }),
                    Err(e) => {
                        error!("Fallo encolando el borrado de {}: {}", delete.vin, e);
                        statuses.push(VinStatus {
                            vin: delete.vin.clone(),
                            status: "Failure".to_string(),
                            details: status::detailed_status(status::DELETE_SUBMIT_FAILURE)
                                .to_string(),
                        });
                    }
                }
            } else {
                debug!("Gate cerrado, no se encola el borrado de {}", delete.vin);
                statuses.push(VinStatus {
                    vin: delete.vin.clone(),
                    status: status::burn_status(record.onboarding_status).to_string(),
                    details: status::detailed_status(record.onboarding_status).to_string(),
                });
            }

            self.state.repository.upsert(&record).await?;
        }

        Ok(StatusForVinsResponse { statuses })
    }

    pub async fn get_delete_status(&self, vins: &[String]) -> AppResult<StatusForVinsResponse> {
        let valid_vins = sanitize_vins(vins, self.test_mode())?;
        let statuses = self
            .project_statuses(&valid_vins, status::burn_status)
            .await?;

        Ok(StatusForVinsResponse { statuses })
    }

    async fn indexed_identity_vehicles(
        &self,
        wallet_address: &str,
    ) -> AppResult<HashMap<i64, Vehicle>> {
        let identity_vehicles = self
            .state
            .identity
            .fetch_vehicles_by_wallet_address(wallet_address)
            .await
            .map_err(|e| {
                error!("Fallo obteniendo los vehículos de identity: {}", e);
                internal_error("Failed to fetch identity vehicles")
            })?;

        Ok(identity_vehicles
            .into_iter()
            .map(|v| (v.token_id, v))
            .collect())
    }

    fn owned_identity_vehicle<'a>(
        &self,
        identity_vehicles: &'a HashMap<i64, Vehicle>,
        record: &Vin,
    ) -> AppResult<&'a Vehicle> {
        identity_vehicles
            .get(&record.vehicle_token_id.unwrap_or(0))
            .ok_or_else(|| AppError::BadRequest("VIN not owned".to_string()))
    }

    fn validated_user_operations(
        &self,
        data: &[VinUserOperationData],
    ) -> AppResult<Vec<VinUserOperationData>> {
        let mut validated = Vec::with_capacity(data.len());

        for entry in data {
            let vin = entry.vin.trim().to_string();
            if !is_valid_vin(&vin, self.test_mode()) {
                return Err(AppError::BadRequest("Invalid operation data".to_string()));
            }

            validated.push(VinUserOperationData {
                vin,
                user_operation: entry.user_operation.clone(),
                hash: entry.hash.clone(),
                signature: entry.signature.clone(),
            });
        }

        Ok(validated)
    }

    async fn project_statuses(
        &self,
        vins: &[String],
        view: fn(i32) -> &'static str,
    ) -> AppResult<Vec<VinStatus>> {
        let records = self.state.repository.get_by_vins(vins).await?;
        let indexed: HashMap<String, Vin> =
            records.into_iter().map(|r| (r.vin.clone(), r)).collect();

        Ok(vins
            .iter()
            .map(|vin| match indexed.get(vin) {
                Some(record) => VinStatus {
                    vin: vin.clone(),
                    status: view(record.onboarding_status).to_string(),
                    details: status::detailed_status(record.onboarding_status).to_string(),
                },
                None => VinStatus {
                    vin: vin.clone(),
                    status: "Unknown".to_string(),
                    details: "Unknown".to_string(),
                },
            })
            .collect())
    }
}

/// Gate de disconnect: minteado o con el disconnect fallido, sin otro en vuelo
pub fn can_submit_disconnect_job(record: &Vin) -> bool {
    let minted = status::is_minted(record.onboarding_status);
    let failed = status::is_disconnect_failed(record.onboarding_status);
    let pending = status::is_disconnect_pending(record.onboarding_status);

    (minted || failed) && !pending
}

/// Gate de delete: desconectado o fallado, sin burn en vuelo
pub fn can_submit_delete_job(record: &Vin) -> bool {
    let disconnected = status::is_disconnected(record.onboarding_status);
    let failed = status::is_failure(record.onboarding_status);
    let pending = status::is_burn_pending(record.onboarding_status);

    (disconnected || failed) && !pending
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(onboarding_status: i32) -> Vin {
        Vin::new("1FTFW1ET5DFA12345", onboarding_status)
    }

    #[test]
    fn test_disconnect_gate() {
        // minteado: admitido
        assert!(can_submit_disconnect_job(&record_at(status::MINT_SUCCESS)));
        // disconnect fallido en cualquiera de sus tres formas: admitido
        assert!(can_submit_disconnect_job(&record_at(
            status::DISCONNECT_SUBMIT_FAILURE
        )));
        assert!(can_submit_disconnect_job(&record_at(
            status::DISCONNECT_FAILURE
        )));
        assert!(can_submit_disconnect_job(&record_at(status::BURN_SD_FAILURE)));
        // disconnect en vuelo: rechazado
        assert!(!can_submit_disconnect_job(&record_at(
            status::DISCONNECT_PENDING
        )));
        assert!(!can_submit_disconnect_job(&record_at(status::BURN_SD_PENDING)));
        // sin mintear: rechazado
        assert!(!can_submit_disconnect_job(&record_at(
            status::VENDOR_VALIDATION_SUCCESS
        )));
        // SD ya quemado: rechazado
        assert!(!can_submit_disconnect_job(&record_at(status::BURN_SD_SUCCESS)));
    }

    #[test]
    fn test_delete_gate() {
        // desconectado: admitido
        assert!(can_submit_delete_job(&record_at(status::BURN_SD_SUCCESS)));
        // burn del vehículo fallido: admitido para reintentar
        assert!(can_submit_delete_job(&record_at(
            status::BURN_VEHICLE_FAILURE
        )));
        // burn en vuelo: rechazado
        assert!(!can_submit_delete_job(&record_at(
            status::BURN_VEHICLE_PENDING
        )));
        // minteado sin desconectar: rechazado
        assert!(!can_submit_delete_job(&record_at(status::MINT_SUCCESS)));
        // ya quemado: rechazado (103 no es failure ni disconnected)
        assert!(!can_submit_delete_job(&record_at(
            status::BURN_VEHICLE_SUCCESS
        )));
    }
}
