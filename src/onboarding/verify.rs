//! Worker de verificación
//!
//! Decodifica el VIN a una device definition y valida la capacidad del
//! vehículo en el sistema del vendor. Cada etapa persiste el estado al
//! salir, con éxito o sin él, para que el progreso sea observable.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::environment::EnvironmentConfig;
use crate::models::identity::DeviceDefinition;
use crate::models::vin::Vin;
use crate::onboarding::status;
use crate::onboarding::vendor::{VendorCapabilityStatus, VendorOnboardingApi};
use crate::repositories::VinRepository;
use crate::services::device_definitions_service::DeviceDefinitionsService;
use crate::services::identity_service::IdentityService;
use crate::utils::errors::{AppError, AppResult};

const DEVICE_DEFINITION_POLL_ATTEMPTS: u32 = 12;
const DEVICE_DEFINITION_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyArgs {
    pub vin: String,
    #[serde(rename = "countryCode")]
    pub country_code: String,
}

pub struct VerifyWorker {
    config: EnvironmentConfig,
    identity: Arc<IdentityService>,
    device_definitions: Arc<DeviceDefinitionsService>,
    repository: VinRepository,
    vendor: Arc<dyn VendorOnboardingApi>,
}

impl VerifyWorker {
    pub fn new(
        config: EnvironmentConfig,
        identity: Arc<IdentityService>,
        device_definitions: Arc<DeviceDefinitionsService>,
        repository: VinRepository,
        vendor: Arc<dyn VendorOnboardingApi>,
    ) -> Self {
        Self {
            config,
            identity,
            device_definitions,
            repository,
            vendor,
        }
    }

    pub async fn work(&self, args: &VerifyArgs) -> AppResult<()> {
        debug!("Verificando VIN {} ({})", args.vin, args.country_code);

        let mut record = self.get_or_create_vin_record(args).await?;

        debug!(
            "Onboarding status de {}: {}",
            args.vin, record.onboarding_status
        );
        if record.onboarding_status == status::VENDOR_VALIDATION_SUCCESS {
            debug!("Verificación ya realizada para {}, omitiendo", args.vin);
            return Ok(());
        }

        self.decode_vin_and_update(&mut record, args).await?;
        self.validate_with_external_vendor_and_update(&mut record, args)
            .await?;

        Ok(())
    }

    async fn get_or_create_vin_record(&self, args: &VerifyArgs) -> AppResult<Vin> {
        if let Some(record) = self.repository.get_by_vin(&args.vin).await? {
            return Ok(record);
        }

        let record = Vin::new(&args.vin, status::DECODING_UNKNOWN);
        self.repository.insert(&record).await?;

        Ok(record)
    }

    async fn decode_vin_and_update(&self, record: &mut Vin, args: &VerifyArgs) -> AppResult<()> {
        let result = self.decode_vin(record, args).await;
        self.update(record).await;
        result
    }

    async fn decode_vin(&self, record: &mut Vin, args: &VerifyArgs) -> AppResult<()> {
        let already_decoded = record.onboarding_status >= status::DECODING_SUCCESS
            && record
                .device_definition_id
                .as_deref()
                .is_some_and(|id| !id.is_empty());

        if already_decoded {
            debug!("VIN {} ya decodificado", args.vin);
        } else {
            debug!("Decodificando VIN {}", args.vin);
            record.onboarding_status = status::DECODING_PENDING;
            self.update(record).await;

            let decoded = match self
                .device_definitions
                .decode_vin(&args.vin, &args.country_code)
                .await
            {
                Ok(decoded) => decoded,
                Err(e) => {
                    record.onboarding_status = status::DECODING_FAILURE;
                    return Err(e);
                }
            };
            debug!(
                "VIN {} decodificado a {}",
                args.vin, decoded.device_definition_id
            );

            let definition = match self
                .get_or_wait_for_device_definition(&decoded.device_definition_id)
                .await
            {
                Ok(definition) => definition,
                Err(e) => {
                    record.onboarding_status = status::DECODING_FAILURE;
                    return Err(e);
                }
            };
            debug!(
                "Device definition {} disponible en identity",
                definition.device_definition_id
            );

            record.device_definition_id = Some(definition.device_definition_id);
        }

        record.onboarding_status = status::DECODING_SUCCESS;
        Ok(())
    }

    async fn validate_with_external_vendor_and_update(
        &self,
        record: &mut Vin,
        args: &VerifyArgs,
    ) -> AppResult<()> {
        let result = self.validate_with_external_vendor(record, args).await;
        self.update(record).await;
        result
    }

    async fn validate_with_external_vendor(
        &self,
        record: &mut Vin,
        args: &VerifyArgs,
    ) -> AppResult<()> {
        debug!("Validando {} con el vendor externo", record.vin);

        record.onboarding_status = status::VENDOR_VALIDATION_UNKNOWN;

        if self.config.enable_vendor_capability_check {
            let validation = match self.vendor.validate(std::slice::from_ref(&args.vin)).await {
                Ok(validation) => validation,
                Err(e) => {
                    error!("Fallo validando el VIN {}: {}", args.vin, e);
                    record.onboarding_status = status::VENDOR_VALIDATION_FAILURE;
                    return Err(e);
                }
            };

            if validation_failed(&validation) {
                error!(
                    "Validación del VIN {} rechazada por el vendor: {:?}",
                    args.vin, validation
                );
                record.onboarding_status = status::VENDOR_VALIDATION_FAILURE;
                return Err(AppError::ExternalApi("vin validation failed".to_string()));
            }

            debug!("Validación del VIN {} exitosa", record.vin);
        } else {
            debug!("Chequeo de capacidad del vendor deshabilitado, omitiendo");
        }

        record.onboarding_status = status::VENDOR_VALIDATION_SUCCESS;
        Ok(())
    }

    /// El identity-api indexa con retraso: se espera la device definition
    /// hasta 12 intentos con 5 segundos entre cada uno.
    async fn get_or_wait_for_device_definition(
        &self,
        device_definition_id: &str,
    ) -> AppResult<DeviceDefinition> {
        debug!("Esperando device definition {}", device_definition_id);

        for attempt in 0..DEVICE_DEFINITION_POLL_ATTEMPTS {
            match self
                .identity
                .fetch_device_definition_by_id(device_definition_id)
                .await
            {
                Ok(definition) if !definition.device_definition_id.is_empty() => {
                    return Ok(definition);
                }
                _ => {
                    tokio::time::sleep(DEVICE_DEFINITION_POLL_INTERVAL).await;
                    debug!(
                        "Device definition {} todavía no disponible, intento {}",
                        device_definition_id,
                        attempt + 1
                    );
                }
            }
        }

        Err(AppError::NotFound("device definition not found".to_string()))
    }

    async fn update(&self, record: &Vin) {
        if let Err(e) = self.repository.update(record).await {
            error!("Fallo actualizando el registro VIN {}: {}", record.vin, e);
        }

        debug!("Registro VIN {} actualizado", record.vin);
    }
}

/// "notCapable" o "noDataFound" en la primera respuesta invalidan el VIN
fn validation_failed(validation: &[VendorCapabilityStatus]) -> bool {
    match validation.first() {
        Some(first) => first.status == "notCapable" || first.status == "noDataFound",
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability(status: &str) -> Vec<VendorCapabilityStatus> {
        vec![VendorCapabilityStatus {
            vin: "1FTFW1ET5DFA12345".to_string(),
            status: status.to_string(),
        }]
    }

    #[test]
    fn test_validation_failed() {
        assert!(validation_failed(&capability("notCapable")));
        assert!(validation_failed(&capability("noDataFound")));
        assert!(validation_failed(&[]));
        assert!(!validation_failed(&capability("capable")));
    }

    #[test]
    fn test_verify_args_wire_format() {
        let args: VerifyArgs = serde_json::from_str(
            r#"{"vin": "1FTFW1ET5DFA12345", "countryCode": "USA"}"#,
        )
        .unwrap();
        assert_eq!(args.country_code, "USA");

        let serialized = serde_json::to_value(&args).unwrap();
        assert_eq!(serialized["countryCode"], "USA");
    }
}
