//! Controller de vehículos
//!
//! Lógica de los handlers: registro, listados, verificación y minting.
//! Los handlers son stateless; validan la entrada, consultan la FSM y el
//! store, encolan el job que corresponda y devuelven el estado por VIN.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use crate::dto::vehicle_dto::{
    MintDataForVinsResponse, RegisterVehicleRequest, StatusForVinsResponse,
    SubmitMintDataRequest, SubmitVinVerificationRequest, VehicleResponse, VehiclesResponse,
    VinStatus, VinTransactionData,
};
use crate::jobs::{JobKind, JobQueue};
use crate::models::identity::Vehicle;
use crate::models::vin::Vin;
use crate::onboarding::onboard::{OnboardingArgs, OnboardingSacd};
use crate::onboarding::status;
use crate::onboarding::verify::VerifyArgs;
use crate::repositories::VinRepository;
use crate::services::identity_service::IdentityService;
use crate::services::transactions_service::{AttributeInfoPair, TransactionsClient};
use crate::state::AppState;
use crate::utils::errors::{internal_error, AppError, AppResult};
use crate::utils::validation::sanitize_vins;

pub struct VehicleController {
    state: AppState,
}

impl VehicleController {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn repository(&self) -> &VinRepository {
        &self.state.repository
    }

    fn queue(&self) -> &JobQueue {
        &self.state.queue
    }

    fn identity(&self) -> &Arc<IdentityService> {
        &self.state.identity
    }

    fn transactions(&self) -> &Arc<TransactionsClient> {
        &self.state.transactions
    }

    fn test_mode(&self) -> bool {
        self.state.config.enable_vendor_test_mode
    }

    /// Vehículos del caller: identity + VIN local mergeados por token id
    pub async fn get_vehicles(&self, wallet_address: &str) -> AppResult<VehiclesResponse> {
        let identity_vehicles = self
            .identity()
            .fetch_vehicles_by_wallet_address(wallet_address)
            .await?;

        let token_ids: Vec<i64> = identity_vehicles.iter().map(|v| v.token_id).collect();
        let mut by_token_id: HashMap<i64, Vehicle> = identity_vehicles
            .into_iter()
            .map(|v| (v.token_id, v))
            .collect();

        let records = self.repository().get_by_token_ids(&token_ids).await?;

        let mut vehicles = Vec::with_capacity(records.len());
        for record in records {
            let Some(token_id) = record.vehicle_token_id else {
                continue;
            };
            let Some(mut vehicle) = by_token_id.remove(&token_id) else {
                continue;
            };

            vehicle.vin = record.vin.clone();
            vehicle.connection_status = record.connection_status.clone().unwrap_or_default();
            vehicle.disconnection_status =
                record.disconnection_status.clone().unwrap_or_default();
            vehicles.push(vehicle);
        }

        Ok(VehiclesResponse { vehicles })
    }

    pub async fn get_vehicle_by_external_id(
        &self,
        wallet_address: &str,
        external_id: &str,
    ) -> AppResult<VehicleResponse> {
        let identity_vehicles = self
            .identity()
            .fetch_vehicles_by_wallet_address(wallet_address)
            .await?;

        let record = self
            .repository()
            .get_by_external_id(external_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Could not find Vehicle".to_string()))?;

        let token_id = record
            .vehicle_token_id
            .ok_or_else(|| AppError::NotFound("Could not find Vehicle".to_string()))?;

        let mut vehicle = identity_vehicles
            .into_iter()
            .find(|v| v.token_id == token_id)
            .ok_or_else(|| AppError::NotFound("Could not find Vehicle".to_string()))?;

        vehicle.vin = record.vin;

        Ok(VehicleResponse { vehicle })
    }

    /// Registra un VIN ya minteado, verificando la propiedad contra identity
    pub async fn register_vehicle(
        &self,
        wallet_address: &str,
        request: RegisterVehicleRequest,
    ) -> AppResult<VehicleResponse> {
        use validator::Validate;

        let token_id = request.token_id.unwrap_or(0);
        if request.validate().is_err() || token_id == 0 {
            return Err(AppError::BadRequest(
                "Missing or invalid VIN or Token ID".to_string(),
            ));
        }
        let vin = request.vin.trim().to_string();

        let mut identity_vehicle = self.identity().fetch_vehicle_by_token_id(token_id).await?;

        // GraphQL responde 200 con objetos vacíos cuando no encuentra nada
        if identity_vehicle.token_id == 0 {
            return Err(AppError::NotFound("Vehicle not found".to_string()));
        }

        if !crate::services::sd_wallet_service::addresses_equal(
            &identity_vehicle.owner,
            wallet_address,
        ) {
            return Err(AppError::Unauthorized(
                "Vehicle not owned by wallet".to_string(),
            ));
        }

        let mut record = match self.repository().get_by_vin(&vin).await? {
            Some(existing) => {
                // Un VIN atado a otro token id es un conflicto
                if existing.vehicle_token_id.is_some()
                    && existing.vehicle_token_id != Some(token_id)
                {
                    return Err(AppError::Conflict(
                        "Vehicle VIN assigned to another TokenID".to_string(),
                    ));
                }
                existing
            }
            None => Vin::new(&vin, status::SUBMIT_UNKNOWN),
        };

        record.vehicle_token_id = Some(token_id);

        if identity_vehicle.synthetic_device.token_id != 0 {
            record.synthetic_token_id = Some(identity_vehicle.synthetic_device.token_id);
        }

        if !identity_vehicle.definition.id.is_empty() {
            record.device_definition_id = Some(identity_vehicle.definition.id.clone());
        }

        self.repository().upsert(&record).await?;

        identity_vehicle.vin = vin;

        Ok(VehicleResponse {
            vehicle: identity_vehicle,
        })
    }

    pub async fn get_verification_status(
        &self,
        vins: &[String],
    ) -> AppResult<StatusForVinsResponse> {
        let valid_vins = sanitize_vins(vins, self.test_mode())?;
        debug!("Consultando estado de verificación de {} VINs", valid_vins.len());

        let statuses = self
            .project_statuses(&valid_vins, status::verification_status)
            .await?;

        Ok(StatusForVinsResponse { statuses })
    }

    pub async fn submit_verification(
        &self,
        request: SubmitVinVerificationRequest,
    ) -> AppResult<StatusForVinsResponse> {
        let raw_vins: Vec<String> = request.vins.iter().map(|v| v.vin.clone()).collect();
        let valid_vins = sanitize_vins(&raw_vins, self.test_mode())?;

        debug!("Encolando verificación para {} VINs", valid_vins.len());

        let records = self.repository().get_by_vins(&valid_vins).await?;
        let indexed: HashMap<String, Vin> =
            records.into_iter().map(|r| (r.vin.clone(), r)).collect();

        let mut statuses = Vec::with_capacity(valid_vins.len());

        for entry in &request.vins {
            let vin = entry.vin.trim().to_string();
            let country_code = entry.country_code.trim().to_string();

            let record = indexed
                .get(&vin)
                .cloned()
                .unwrap_or_else(|| Vin::new(&vin, status::SUBMIT_UNKNOWN));

            if can_submit_verification_job(&record) {
                debug!("Encolando job de verificación para {}", vin);
                let enqueued = self
                    .queue()
                    .enqueue(
                        JobKind::Verify,
                        &VerifyArgs {
                            vin: vin.clone(),
                            country_code,
                        },
                    )
                    .await;

                match enqueued {
                    Ok(_) => statuses.push(VinStatus {
                        vin: vin.clone(),
                        status: "Pending".to_string(),
                        details: status::detailed_status(status::SUBMIT_PENDING).to_string(),
                    }),
                    Err(e) => {
                        error!("Fallo encolando la verificación de {}: {}", vin, e);
                        statuses.push(VinStatus {
                            vin: vin.clone(),
                            status: "Failure".to_string(),
                            details: status::detailed_status(status::SUBMIT_FAILURE).to_string(),
                        });
                    }
                }
            } else {
                debug!("Gate cerrado, no se encola la verificación de {}", vin);
                statuses.push(VinStatus {
                    vin: vin.clone(),
                    status: status::verification_status(record.onboarding_status).to_string(),
                    details: status::detailed_status(record.onboarding_status).to_string(),
                });
            }

            self.repository().upsert(&record).await?;
        }

        Ok(StatusForVinsResponse { statuses })
    }

    /// Typed-data de mint para los VINs admisibles
    pub async fn get_mint_data(
        &self,
        wallet_address: &str,
        vins: &[String],
    ) -> AppResult<MintDataForVinsResponse> {
        let valid_vins = sanitize_vins(vins, self.test_mode())?;
        debug!("Armando typed-data de mint para {} VINs", valid_vins.len());

        let records = self.mintable_records(&valid_vins).await?;

        if records.len() != valid_vins.len() {
            return Err(AppError::BadRequest(
                "Some of the VINs are not verified or already onboarded".to_string(),
            ));
        }

        let mut minting_data = Vec::with_capacity(records.len());

        for record in &records {
            let definition_id = record.device_definition_id.clone().unwrap_or_default();
            let definition = self
                .identity()
                .get_device_definition_by_id(&definition_id)
                .await
                .map_err(|e| {
                    error!("Fallo obteniendo la device definition: {}", e);
                    internal_error("Failed to load device definition")
                })?;

            let typed_data = if record.vehicle_token_id.is_none() {
                Some(self.transactions().get_mint_vehicle_with_dd_typed_data(
                    definition.manufacturer.token_id,
                    wallet_address,
                    &definition.device_definition_id,
                    &[
                        AttributeInfoPair {
                            attribute: "Make".to_string(),
                            info: definition.manufacturer.name.clone(),
                        },
                        AttributeInfoPair {
                            attribute: "Model".to_string(),
                            info: definition.model.clone(),
                        },
                        AttributeInfoPair {
                            attribute: "Year".to_string(),
                            info: definition.year.to_string(),
                        },
                    ],
                ))
            } else if record.synthetic_token_id.is_none() {
                let config = &self.state.config;
                let vehicle_node = record.vehicle_token_id.unwrap_or(0);
                if config.enable_minting_with_connection_token_id {
                    Some(
                        self.transactions()
                            .get_mint_sd_typed_data_v2(&config.connection_token_id, vehicle_node),
                    )
                } else {
                    Some(
                        self.transactions()
                            .get_mint_sd_typed_data(&config.integration_token_id, vehicle_node),
                    )
                }
            } else {
                // Completamente minteado: solo el retry de conexión lo admite
                if !record.connection_failed() {
                    return Err(AppError::BadRequest(
                        "VIN already fully minted and connected or connection in progress"
                            .to_string(),
                    ));
                }
                None
            };

            minting_data.push(VinTransactionData {
                vin: record.vin.clone(),
                typed_data,
                signature: String::new(),
            });
        }

        Ok(MintDataForVinsResponse {
            vin_minting_data: minting_data,
        })
    }

    pub async fn submit_mint(
        &self,
        wallet_address: &str,
        request: SubmitMintDataRequest,
    ) -> AppResult<StatusForVinsResponse> {
        let mut validated = Vec::with_capacity(request.vin_minting_data.len());
        for entry in &request.vin_minting_data {
            validated.push(self.validated_minting_data(entry).await?);
        }

        let raw_vins: Vec<String> = validated.iter().map(|d| d.vin.clone()).collect();
        let valid_vins = sanitize_vins(&raw_vins, self.test_mode())?;

        debug!("Encolando mint para {} VINs", valid_vins.len());

        let mut records = self.repository().get_by_vins(&valid_vins).await?;
        let minted = self
            .repository()
            .get_by_vins_and_status(&valid_vins, status::MINT_SUCCESS)
            .await?;
        records.extend(minted.into_iter().filter(|r| r.connection_failed()));

        let indexed: HashMap<String, Vin> =
            records.into_iter().map(|r| (r.vin.clone(), r)).collect();

        let sacd = request.sacd.as_ref().and_then(|sacd| {
            if sacd.expiration != 0 && sacd.permissions != 0 {
                Some(OnboardingSacd {
                    grantee: sacd.grantee.clone(),
                    permissions: sacd.permissions,
                    expiration: sacd.expiration,
                    source: sacd.source.clone(),
                })
            } else {
                None
            }
        });

        let mut statuses = Vec::with_capacity(validated.len());

        for mint in &validated {
            let record = indexed
                .get(&mint.vin)
                .cloned()
                .unwrap_or_else(|| Vin::new(&mint.vin, status::MINT_SUBMIT_UNKNOWN));

            if can_submit_minting_job(&record) {
                debug!("Encolando job de mint para {}", mint.vin);
                let enqueued = self
                    .queue()
                    .enqueue(
                        JobKind::Onboard,
                        &OnboardingArgs {
                            owner: wallet_address.to_string(),
                            vin: mint.vin.clone(),
                            typed_data: mint.typed_data.clone(),
                            signature: mint.signature.clone(),
                            sacd: sacd.clone(),
                        },
                    )
                    .await;

                match enqueued {
                    Ok(_) => statuses.push(VinStatus {
                        vin: mint.vin.clone(),
                        status: "Pending".to_string(),
                        details: status::detailed_status(status::MINT_SUBMIT_PENDING).to_string(),
                    }),
                    Err(e) => {
                        error!("Fallo encolando el mint de {}: {}", mint.vin, e);
                        statuses.push(VinStatus {
                            vin: mint.vin.clone(),
                            status: "Failure".to_string(),
                            details: status::detailed_status(status::MINT_SUBMIT_FAILURE)
                                .to_string(),
                        });
                    }
                }
            } else {
                debug!("Gate cerrado, no se encola el mint de {}", mint.vin);
                statuses.push(VinStatus {
                    vin: mint.vin.clone(),
                    status: status::verification_status(record.onboarding_status).to_string(),
                    details: status::detailed_status(record.onboarding_status).to_string(),
                });
            }

            self.repository().upsert(&record).await?;
        }

        Ok(StatusForVinsResponse { statuses })
    }

    pub async fn get_mint_status(&self, vins: &[String]) -> AppResult<StatusForVinsResponse> {
        let valid_vins = sanitize_vins(vins, self.test_mode())?;

        let statuses = self
            .project_statuses(&valid_vins, status::mint_status)
            .await?;

        Ok(StatusForVinsResponse { statuses })
    }

    /// Registros admisibles para mint: verificados sin mintear, quemados
    /// (re-onboarding) y minteados con la conexión del vendor fallida.
    async fn mintable_records(&self, vins: &[String]) -> AppResult<Vec<Vin>> {
        let mut records = self
            .repository()
            .get_by_vins_and_status_range(
                vins,
                status::VENDOR_VALIDATION_SUCCESS,
                status::MINT_FAILURE,
                &[status::BURN_SD_SUCCESS, status::BURN_VEHICLE_SUCCESS],
            )
            .await?;

        let minted = self
            .repository()
            .get_by_vins_and_status(vins, status::MINT_SUCCESS)
            .await?;

        records.extend(minted.into_iter().filter(|r| r.connection_failed()));

        Ok(records)
    }

    async fn validated_minting_data(
        &self,
        data: &VinTransactionData,
    ) -> AppResult<VinTransactionData> {
        let vin = data.vin.trim().to_string();
        if !crate::utils::validation::is_valid_vin(&vin, self.test_mode()) {
            return Err(AppError::BadRequest("Invalid minting data".to_string()));
        }

        // El typed-data de mint de vehículo referencia una device definition real
        if let Some(typed_data) = &data.typed_data {
            if typed_data.primary_type == "MintVehicleWithDeviceDefinitionSign" {
                let definition_id = typed_data
                    .message
                    .get("deviceDefinitionId")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();

                self.identity()
                    .get_device_definition_by_id(definition_id)
                    .await
                    .map_err(|_| AppError::BadRequest("Invalid minting data".to_string()))?;
            }
        }

        Ok(VinTransactionData {
            vin,
            typed_data: data.typed_data.clone(),
            signature: data.signature.clone(),
        })
    }

    async fn project_statuses(
        &self,
        vins: &[String],
        view: fn(i32) -> &'static str,
    ) -> AppResult<Vec<VinStatus>> {
        let records = self.repository().get_by_vins(vins).await?;
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

/// Gate de verify: registro nuevo, o no verificado y (fallado o no pendiente)
pub fn can_submit_verification_job(record: &Vin) -> bool {
    let verified = status::is_verified(record.onboarding_status);
    let failed = status::is_failure(record.onboarding_status);
    let pending = status::is_pending(record.onboarding_status);

    !verified && (failed || !pending)
}

/// Gate de mint: reconexión tras mint con conexión fallida, o VIN sin mintear
/// (incluye re-onboarding tras burn) sin mint/disconnect en vuelo
pub fn can_submit_minting_job(record: &Vin) -> bool {
    let minted = status::is_minted(record.onboarding_status);
    let burned = status::is_disconnected(record.onboarding_status);
    let failed = status::is_failure(record.onboarding_status);
    let failed_connection = record.connection_failed();
    let pending = status::is_mint_pending(record.onboarding_status)
        || status::is_disconnect_pending(record.onboarding_status);

    (minted && failed_connection) || (!minted || burned) && (failed || !pending)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(onboarding_status: i32) -> Vin {
        Vin::new("1FTFW1ET5DFA12345", onboarding_status)
    }

    #[test]
    fn test_verification_gate() {
        // registro nuevo (status 0): admitido
        assert!(can_submit_verification_job(&record_at(status::SUBMIT_UNKNOWN)));
        // fallo previo: admitido para reintentar
        assert!(can_submit_verification_job(&record_at(status::DECODING_FAILURE)));
        assert!(can_submit_verification_job(&record_at(
            status::VENDOR_VALIDATION_FAILURE
        )));
        // en vuelo: rechazado
        assert!(!can_submit_verification_job(&record_at(
            status::DECODING_PENDING
        )));
        // ya verificado: rechazado (idempotencia)
        assert!(!can_submit_verification_job(&record_at(
            status::VENDOR_VALIDATION_SUCCESS
        )));
        assert!(!can_submit_verification_job(&record_at(status::MINT_SUCCESS)));
    }

    #[test]
    fn test_minting_gate_basic() {
        // verificado, sin mintear: admitido
        assert!(can_submit_minting_job(&record_at(
            status::VENDOR_VALIDATION_SUCCESS
        )));
        // mint fallido: admitido para reintentar
        assert!(can_submit_minting_job(&record_at(status::MINT_FAILURE)));
        // mint en vuelo: rechazado
        assert!(!can_submit_minting_job(&record_at(status::MINT_PENDING)));
        assert!(!can_submit_minting_job(&record_at(status::CONNECT_PENDING)));
        // minteado con conexión sana: rechazado
        assert!(!can_submit_minting_job(&record_at(status::MINT_SUCCESS)));
    }

    #[test]
    fn test_minting_gate_connection_retry() {
        // minteado con conexión fallida: el retry de conexión se admite
        let mut record = record_at(status::MINT_SUCCESS);
        record.connection_status = Some("failed".to_string());
        assert!(can_submit_minting_job(&record));

        record.connection_status = Some("succeeded".to_string());
        assert!(!can_submit_minting_job(&record));
    }

    #[test]
    fn test_minting_gate_reonboarding_after_burn() {
        // SD quemado: re-onboarding admitido
        assert!(can_submit_minting_job(&record_at(status::BURN_SD_SUCCESS)));
        // vehículo quemado del todo: también
        assert!(can_submit_minting_job(&record_at(
            status::BURN_VEHICLE_SUCCESS
        )));
        // disconnect en vuelo: rechazado
        assert!(!can_submit_minting_job(&record_at(
            status::DISCONNECT_PENDING
        )));
    }
}
