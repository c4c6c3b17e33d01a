//! Worker de onboarding
//!
//! Conecta el VIN en el vendor y mintea los NFTs: vehículo + SD cuando no
//! existe ninguno, o solo el SD cuando el vehículo ya está minteado. El
//! índice de wallet sale de la secuencia monotónica del store y nunca se
//! reutiliza, incluso si el mint falla.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::environment::EnvironmentConfig;
use crate::models::vin::Vin;
use crate::onboarding::status;
use crate::onboarding::vendor::VendorOnboardingApi;
use crate::repositories::VinRepository;
use crate::services::identity_service::IdentityService;
use crate::services::sd_wallet_service::{SdWalletService, HARDENED_KEY_START};
use crate::services::transactions_service::{
    AttributeInfoPair, MintSdInput, MintVehicleAndSdInput, SacdInput, TransactionsClient,
};
use crate::utils::eip712::TypedData;
use crate::utils::errors::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingSacd {
    pub grantee: String,
    pub permissions: i64,
    pub expiration: i64,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingArgs {
    pub owner: String,
    pub vin: String,
    #[serde(rename = "typedData")]
    pub typed_data: Option<TypedData>,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sacd: Option<OnboardingSacd>,
}

pub struct OnboardingWorker {
    config: EnvironmentConfig,
    identity: Arc<IdentityService>,
    repository: VinRepository,
    transactions: Arc<TransactionsClient>,
    wallets: Arc<SdWalletService>,
    vendor: Arc<dyn VendorOnboardingApi>,
}

impl OnboardingWorker {
    pub fn new(
        config: EnvironmentConfig,
        identity: Arc<IdentityService>,
        repository: VinRepository,
        transactions: Arc<TransactionsClient>,
        wallets: Arc<SdWalletService>,
        vendor: Arc<dyn VendorOnboardingApi>,
    ) -> Self {
        Self {
            config,
            identity,
            repository,
            transactions,
            wallets,
            vendor,
        }
    }

    pub async fn work(&self, args: &OnboardingArgs) -> AppResult<()> {
        debug!("Minteando VIN {}", args.vin);

        let mut record = self.get_vin_record(&args.vin).await?;

        if record.onboarding_status < status::VENDOR_VALIDATION_SUCCESS {
            return Err(AppError::BadRequest(
                "insufficient verification status".to_string(),
            ));
        }

        // Ya minteado y con la conexión sana: no hay nada que hacer
        if record.onboarding_status == status::MINT_SUCCESS && !record.connection_failed() {
            return Ok(());
        }

        self.connect_to_vendor_and_update(&mut record, args).await?;

        if record.vehicle_token_id.is_none() {
            debug!("{} sin vehicle token, minteando vehículo + SD", args.vin);
            self.mint_vehicle_with_sd_and_update(&mut record, args)
                .await?;
        }

        if record.synthetic_token_id.is_none() {
            debug!("{} sin SD token, minteando SD", args.vin);
            self.mint_sd_and_update(&mut record, args).await?;
        } else {
            record.onboarding_status = status::MINT_SUCCESS;
            self.repository.update(&record).await?;
        }

        Ok(())
    }

    async fn get_vin_record(&self, vin: &str) -> AppResult<Vin> {
        self.repository
            .get_by_vin(vin)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("vehicle {} not found", vin)))
    }

    async fn connect_to_vendor_and_update(
        &self,
        record: &mut Vin,
        args: &OnboardingArgs,
    ) -> AppResult<()> {
        let result = self.connect_to_vendor(record, args).await;
        self.update(record).await;
        result
    }

    async fn connect_to_vendor(&self, record: &mut Vin, args: &OnboardingArgs) -> AppResult<()> {
        debug!("Conectando {} con el vendor", args.vin);

        record.onboarding_status = status::CONNECT_UNKNOWN;

        if self.config.enable_vendor_connection {
            let connection = match self.vendor.connect(std::slice::from_ref(&args.vin)).await {
                Ok(connection) => connection,
                Err(e) => {
                    error!("Fallo conectando {} con el vendor: {}", args.vin, e);
                    record.onboarding_status = status::CONNECT_FAILURE;
                    return Err(e);
                }
            };

            debug!("Vendor conectado para {}: {:?}", args.vin, connection);
        } else {
            debug!("Conexión con el vendor deshabilitada, omitiendo");
        }

        // Con la conexión deshabilitada igual se escriben los centinelas de éxito
        record.connection_status = Some("succeeded".to_string());
        record.disconnection_status = None;
        self.update(record).await;

        record.onboarding_status = status::CONNECT_SUCCESS;
        Ok(())
    }

    async fn mint_vehicle_with_sd_and_update(
        &self,
        record: &mut Vin,
        args: &OnboardingArgs,
    ) -> AppResult<()> {
        let result = self.mint_vehicle_with_sd(record, args).await;
        self.update(record).await;
        result
    }

    async fn mint_vehicle_with_sd(
        &self,
        record: &mut Vin,
        args: &OnboardingArgs,
    ) -> AppResult<()> {
        debug!("Minteando vehículo + SD para {}", args.vin);

        let definition_id = record.device_definition_id.clone().unwrap_or_default();
        let definition = match self.identity.get_device_definition_by_id(&definition_id).await {
            Ok(definition) => definition,
            Err(e) => {
                error!("Fallo obteniendo la device definition: {}", e);
                record.onboarding_status = status::MINT_FAILURE;
                return Err(e);
            }
        };

        let (index, sd_address) = match self.allocate_sd_wallet().await {
            Ok(allocated) => allocated,
            Err(e) => {
                record.onboarding_status = status::MINT_FAILURE;
                return Err(e);
            }
        };

        let (integration_or_connection_id, sd_typed_data) = match self.mint_all_typed_data() {
            Ok(built) => built,
            Err(e) => {
                record.onboarding_status = status::MINT_FAILURE;
                return Err(e);
            }
        };

        let sd_signature = match self.wallets.sign_typed_data(&sd_typed_data, index) {
            Ok(signature) => format!("0x{}", hex::encode(signature)),
            Err(e) => {
                error!("Fallo firmando el typed-data del SD: {}", e);
                record.onboarding_status = status::MINT_FAILURE;
                return Err(e);
            }
        };

        let mint_input = MintVehicleAndSdInput {
            owner: args.owner.clone(),
            vehicle_owner_sig: args.signature.clone(),
            manufacturer_node: definition.manufacturer.token_id,
            integration_node: integration_or_connection_id,
            device_definition_id: definition.device_definition_id.clone(),
            synthetic_device_addr: sd_address,
            synthetic_device_sig: sd_signature,
            attr_info_pairs_vehicle: vehicle_attributes(
                &definition.manufacturer.name,
                &definition.model,
                definition.year,
            ),
        };

        let sacd_input = args.sacd.as_ref().map(|sacd| SacdInput {
            grantee: sacd.grantee.clone(),
            permissions: sacd.permissions,
            expiration: sacd.expiration,
            source: sacd.source.clone(),
        });

        let result = match self
            .transactions
            .mint_vehicle_and_sd(&mint_input, sacd_input.as_ref())
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Fallo minteando vehículo + SD: {}", e);
                record.onboarding_status = status::MINT_FAILURE;
                return Err(e);
            }
        };

        let (Some(vehicle_token_id), Some(synthetic_token_id)) =
            (result.vehicle_token_id, result.synthetic_token_id)
        else {
            error!("El mint no reportó los token IDs esperados");
            record.onboarding_status = status::MINT_FAILURE;
            return Err(AppError::ExternalApi(
                "mint result is missing token ids".to_string(),
            ));
        };

        record.wallet_index = Some(index as i64);
        record.vehicle_token_id = Some(vehicle_token_id);
        record.synthetic_token_id = Some(synthetic_token_id);
        record.onboarding_status = status::MINT_SUCCESS;

        debug!(
            "Vehículo {} minteado: vehicle={}, sd={}",
            args.vin, vehicle_token_id, synthetic_token_id
        );

        Ok(())
    }

    async fn mint_sd_and_update(&self, record: &mut Vin, args: &OnboardingArgs) -> AppResult<()> {
        let result = self.mint_sd(record, args).await;
        self.update(record).await;
        result
    }

    async fn mint_sd(&self, record: &mut Vin, args: &OnboardingArgs) -> AppResult<()> {
        debug!("Minteando SD para {}", args.vin);

        let vehicle_token_id = record.vehicle_token_id.unwrap_or(0);

        let (index, sd_address) = match self.allocate_sd_wallet().await {
            Ok(allocated) => allocated,
            Err(e) => {
                record.onboarding_status = status::MINT_FAILURE;
                return Err(e);
            }
        };

        let (integration_or_connection_id, sd_typed_data) =
            match self.mint_sd_typed_data(vehicle_token_id) {
                Ok(built) => built,
                Err(e) => {
                    record.onboarding_status = status::MINT_FAILURE;
                    return Err(e);
                }
            };

        let sd_signature = match self.wallets.sign_typed_data(&sd_typed_data, index) {
            Ok(signature) => format!("0x{}", hex::encode(signature)),
            Err(e) => {
                error!("Fallo firmando el typed-data del SD: {}", e);
                record.onboarding_status = status::MINT_FAILURE;
                return Err(e);
            }
        };

        let mint_input = MintSdInput {
            vehicle_owner_sig: args.signature.clone(),
            synthetic_device_addr: sd_address,
            synthetic_device_sig: sd_signature,
            integration_node: integration_or_connection_id,
            vehicle_node: vehicle_token_id,
        };

        let result = match self.transactions.mint_sd(&mint_input).await {
            Ok(result) => result,
            Err(e) => {
                error!("Fallo minteando el SD: {}", e);
                record.onboarding_status = status::MINT_FAILURE;
                return Err(e);
            }
        };

        let Some(synthetic_token_id) = result.synthetic_token_id else {
            error!("El mint del SD no reportó el token ID");
            record.onboarding_status = status::MINT_FAILURE;
            return Err(AppError::ExternalApi(
                "mint result is missing the SD token id".to_string(),
            ));
        };

        record.wallet_index = Some(index as i64);
        record.synthetic_token_id = Some(synthetic_token_id);
        record.onboarding_status = status::MINT_SUCCESS;

        debug!("SD minteado para {}: {}", args.vin, synthetic_token_id);

        Ok(())
    }

    /// Índice nuevo de la secuencia + dirección derivada. La secuencia nunca
    /// entrega dos veces el mismo valor, así que dos mints jamás comparten wallet.
    async fn allocate_sd_wallet(&self) -> AppResult<(u32, String)> {
        let next = self.repository.next_wallet_index().await?;

        if next < 0 || next >= HARDENED_KEY_START as i64 {
            return Err(AppError::Crypto(format!(
                "wallet index {} out of range",
                next
            )));
        }

        let index = next as u32;
        let address = self.wallets.get_address_hex(index)?;

        Ok((index, address))
    }

    fn mint_all_typed_data(&self) -> AppResult<(String, TypedData)> {
        if self.config.enable_minting_with_connection_token_id {
            let id = parse_token_id(&self.config.connection_token_id)?;
            let typed_data = self.transactions.get_mint_vehicle_and_sd_typed_data_v2(&id);
            Ok((id, typed_data))
        } else {
            let id = parse_token_id(&self.config.integration_token_id)?;
            let typed_data = self.transactions.get_mint_vehicle_and_sd_typed_data(&id);
            Ok((id, typed_data))
        }
    }

    fn mint_sd_typed_data(&self, vehicle_token_id: i64) -> AppResult<(String, TypedData)> {
        if self.config.enable_minting_with_connection_token_id {
            let id = parse_token_id(&self.config.connection_token_id)?;
            let typed_data = self
                .transactions
                .get_mint_sd_typed_data_v2(&id, vehicle_token_id);
            Ok((id, typed_data))
        } else {
            let id = parse_token_id(&self.config.integration_token_id)?;
            let typed_data = self.transactions.get_mint_sd_typed_data(&id, vehicle_token_id);
            Ok((id, typed_data))
        }
    }

    async fn update(&self, record: &Vin) {
        if let Err(e) = self.repository.update(record).await {
            error!("Fallo actualizando el registro VIN {}: {}", record.vin, e);
        }

        debug!("Registro VIN {} actualizado", record.vin);
    }
}

fn parse_token_id(raw: &str) -> AppResult<String> {
    raw.parse::<u128>()
        .map(|parsed| parsed.to_string())
        .map_err(|_| {
            AppError::Internal(format!(
                "invalid integration or connection token ID: {:?}",
                raw
            ))
        })
}

fn vehicle_attributes(make: &str, model: &str, year: i32) -> Vec<AttributeInfoPair> {
    vec![
        AttributeInfoPair {
            attribute: "Make".to_string(),
            info: make.to_string(),
        },
        AttributeInfoPair {
            attribute: "Model".to_string(),
            info: model.to_string(),
        },
        AttributeInfoPair {
            attribute: "Year".to_string(),
            info: year.to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_id() {
        assert_eq!(parse_token_id("1").unwrap(), "1");
        assert_eq!(parse_token_id("1234567890123").unwrap(), "1234567890123");
        assert!(parse_token_id("").is_err());
        assert!(parse_token_id("abc").is_err());
    }

    #[test]
    fn test_vehicle_attributes() {
        let attrs = vehicle_attributes("Ford", "F-150", 2013);
        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[0].attribute, "Make");
        assert_eq!(attrs[2].info, "2013");
    }

    #[test]
    fn test_onboarding_args_wire_format() {
        let raw = r#"{
            "owner": "0xabc",
            "vin": "1FTFW1ET5DFA12345",
            "typedData": null,
            "signature": "0x1234",
            "sacd": {"grantee": "0xdef", "permissions": 6, "expiration": 1700000000}
        }"#;

        let args: OnboardingArgs = serde_json::from_str(raw).unwrap();
        assert_eq!(args.owner, "0xabc");
        assert!(args.typed_data.is_none());
        assert_eq!(args.sacd.as_ref().unwrap().permissions, 6);
        assert!(args.sacd.as_ref().unwrap().source.is_empty());
    }
}
