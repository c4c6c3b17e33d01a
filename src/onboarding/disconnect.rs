//! Worker de desconexión
//!
//! Da de baja la conexión en el vendor y quema el NFT del dispositivo
//! sintético con la user-operation firmada por el dueño. Al quemar el SD
//! se limpian juntos synthetic_token_id y wallet_index.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::environment::EnvironmentConfig;
use crate::models::vin::Vin;
use crate::onboarding::status;
use crate::onboarding::vendor::VendorOnboardingApi;
use crate::repositories::VinRepository;
use crate::services::transactions_service::{TransactionsClient, UserOperation};
use crate::utils::errors::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectArgs {
    pub vin: String,
    #[serde(rename = "userOperation")]
    pub user_operation: UserOperation,
}

pub struct DisconnectWorker {
    config: EnvironmentConfig,
    repository: VinRepository,
    transactions: Arc<TransactionsClient>,
    vendor: Arc<dyn VendorOnboardingApi>,
}

impl DisconnectWorker {
    pub fn new(
        config: EnvironmentConfig,
        repository: VinRepository,
        transactions: Arc<TransactionsClient>,
        vendor: Arc<dyn VendorOnboardingApi>,
    ) -> Self {
        Self {
            config,
            repository,
            transactions,
            vendor,
        }
    }

    pub async fn work(&self, args: &DisconnectArgs) -> AppResult<()> {
        debug!("Desconectando VIN {}", args.vin);

        let mut record = self.get_vin_record(&args.vin).await?;

        if record.onboarding_status < status::MINT_SUCCESS {
            return Err(AppError::BadRequest(
                "insufficient onboarding status".to_string(),
            ));
        }

        // SD ya quemado: nada que hacer
        if record.onboarding_status == status::BURN_SD_SUCCESS {
            return Ok(());
        }

        self.disconnect_from_vendor_and_update(&mut record, args)
            .await?;

        if record.synthetic_token_id.is_some() {
            debug!("Quemando SD de {}", args.vin);
            self.burn_sd_and_update(&mut record, args).await?;
        }

        Ok(())
    }

    async fn get_vin_record(&self, vin: &str) -> AppResult<Vin> {
        self.repository
            .get_by_vin(vin)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("vehicle {} not found", vin)))
    }

    async fn disconnect_from_vendor_and_update(
        &self,
        record: &mut Vin,
        args: &DisconnectArgs,
    ) -> AppResult<()> {
        let result = self.disconnect_from_vendor(record, args).await;
        self.update(record).await;
        result
    }

    async fn disconnect_from_vendor(
        &self,
        record: &mut Vin,
        args: &DisconnectArgs,
    ) -> AppResult<()> {
        debug!("Desconectando {} del vendor", args.vin);

        record.onboarding_status = status::DISCONNECT_UNKNOWN;

        if self.config.enable_vendor_connection {
            let disconnection = match self
                .vendor
                .disconnect(std::slice::from_ref(&args.vin))
                .await
            {
                Ok(disconnection) => disconnection,
                Err(e) => {
                    error!("Fallo desconectando {} del vendor: {}", args.vin, e);
                    record.onboarding_status = status::DISCONNECT_FAILURE;
                    return Err(e);
                }
            };

            debug!("Vendor desconectado para {}: {:?}", args.vin, disconnection);
        } else {
            debug!("Conexión con el vendor deshabilitada, omitiendo");
        }

        record.disconnection_status = Some("succeeded".to_string());
        record.connection_status = None;
        self.update(record).await;

        record.onboarding_status = status::DISCONNECT_SUCCESS;
        Ok(())
    }

    async fn burn_sd_and_update(&self, record: &mut Vin, args: &DisconnectArgs) -> AppResult<()> {
        let result = self.burn_sd(record, args).await;
        self.update(record).await;
        result
    }

    async fn burn_sd(&self, record: &mut Vin, args: &DisconnectArgs) -> AppResult<()> {
        debug!("Quemando SD de {}", args.vin);

        let result = match self
            .transactions
            .send_signed_user_operation(&args.user_operation)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Fallo quemando el SD: {}", e);
                record.onboarding_status = status::BURN_SD_FAILURE;
                return Err(e);
            }
        };

        apply_sd_burned(record);

        debug!(
            "SD de {} quemado (token {:?})",
            args.vin, result.synthetic_token_id
        );

        Ok(())
    }

    async fn update(&self, record: &Vin) {
        if let Err(e) = self.repository.update(record).await {
            error!("Fallo actualizando el registro VIN {}: {}", record.vin, e);
        }

        debug!("Registro VIN {} actualizado", record.vin);
    }
}

/// synthetic_token_id y wallet_index viven y mueren juntos
fn apply_sd_burned(record: &mut Vin) {
    record.wallet_index = None;
    record.synthetic_token_id = None;
    record.onboarding_status = status::BURN_SD_SUCCESS;
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use sqlx::postgres::PgPoolOptions;

    use crate::config::environment::EnvironmentConfig;
    use crate::onboarding::vendor::{
        VendorCapabilityStatus, VendorConnectionStatus, VendorOnboardingApi,
    };
    use crate::utils::errors::AppError;

    const VIN: &str = "1FTFW1ET5DFA12345";
    const OWNER: &str = "0xdddd1a1b1b1c1d1e1f10111213141516171819dd";

    /// Vendor en memoria; cuenta las llamadas a disconnect
    #[derive(Default)]
    struct FakeVendor {
        fail_disconnect: bool,
        disconnect_calls: AtomicUsize,
    }

    #[async_trait]
    impl VendorOnboardingApi for FakeVendor {
        async fn validate(&self, _vins: &[String]) -> crate::utils::errors::AppResult<Vec<VendorCapabilityStatus>> {
            Ok(Vec::new())
        }

        async fn connect(&self, _vins: &[String]) -> crate::utils::errors::AppResult<Vec<VendorConnectionStatus>> {
            Ok(Vec::new())
        }

        async fn disconnect(&self, vins: &[String]) -> crate::utils::errors::AppResult<Vec<VendorConnectionStatus>> {
            self.disconnect_calls.fetch_add(1, Ordering::SeqCst);

            if self.fail_disconnect {
                return Err(AppError::ExternalApi("vendor disconnect failed".to_string()));
            }

            Ok(vins
                .iter()
                .map(|vin| VendorConnectionStatus {
                    vin: vin.clone(),
                    external_id: String::new(),
                    status: "succeeded".to_string(),
                })
                .collect())
        }
    }

    // El pool es lazy y apunta a un puerto cerrado: los updates del worker
    // fallan rápido y quedan solo logueados, que es lo que se quiere acá.
    fn test_worker(
        config: EnvironmentConfig,
        vendor: std::sync::Arc<FakeVendor>,
    ) -> DisconnectWorker {
        let pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(100))
            .connect_lazy(&config.database_url)
            .unwrap();
        let repository = VinRepository::new(pool, config.database_schema.clone());
        let transactions =
            std::sync::Arc::new(TransactionsClient::new(&config).unwrap());

        DisconnectWorker::new(config, repository, transactions, vendor)
    }

    fn minted_record() -> Vin {
        let mut record = Vin::new(VIN, status::MINT_SUCCESS);
        record.vehicle_token_id = Some(101);
        record.synthetic_token_id = Some(202);
        record.wallet_index = Some(7);
        record.connection_status = Some("succeeded".to_string());
        record
    }

    fn burn_args(worker: &DisconnectWorker) -> DisconnectArgs {
        let (user_operation, _) = worker
            .transactions
            .get_burn_sd_by_owner_user_operation_and_hash(OWNER, 202)
            .unwrap();

        DisconnectArgs {
            vin: VIN.to_string(),
            user_operation,
        }
    }

    #[tokio::test]
    async fn test_vendor_disconnect_success_writes_sentinels() {
        let vendor = std::sync::Arc::new(FakeVendor::default());
        let worker = test_worker(EnvironmentConfig::for_tests(), vendor.clone());

        let mut record = minted_record();
        let args = burn_args(&worker);

        worker
            .disconnect_from_vendor(&mut record, &args)
            .await
            .unwrap();

        assert_eq!(record.disconnection_status.as_deref(), Some("succeeded"));
        assert!(record.connection_status.is_none());
        assert_eq!(record.onboarding_status, status::DISCONNECT_SUCCESS);
        assert_eq!(vendor.disconnect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_vendor_disconnect_disabled_still_succeeds() {
        let mut config = EnvironmentConfig::for_tests();
        config.enable_vendor_connection = false;

        // El vendor fallaría si se lo llamara; con el flag apagado no se llama
        let vendor = std::sync::Arc::new(FakeVendor {
            fail_disconnect: true,
            ..FakeVendor::default()
        });
        let worker = test_worker(config, vendor.clone());

        let mut record = minted_record();
        let args = burn_args(&worker);

        worker
            .disconnect_from_vendor(&mut record, &args)
            .await
            .unwrap();

        assert_eq!(record.disconnection_status.as_deref(), Some("succeeded"));
        assert!(record.connection_status.is_none());
        assert_eq!(record.onboarding_status, status::DISCONNECT_SUCCESS);
        assert_eq!(vendor.disconnect_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_vendor_disconnect_failure_sets_failure_status() {
        let vendor = std::sync::Arc::new(FakeVendor {
            fail_disconnect: true,
            ..FakeVendor::default()
        });
        let worker = test_worker(EnvironmentConfig::for_tests(), vendor);

        let mut record = minted_record();
        let args = burn_args(&worker);

        let result = worker.disconnect_from_vendor(&mut record, &args).await;

        assert!(result.is_err());
        assert_eq!(record.onboarding_status, status::DISCONNECT_FAILURE);
        // los centinelas de éxito no se escriben
        assert_eq!(record.connection_status.as_deref(), Some("succeeded"));
        assert!(record.disconnection_status.is_none());
    }

    #[tokio::test]
    async fn test_burn_sd_failure_keeps_token_and_wallet() {
        let worker = test_worker(
            EnvironmentConfig::for_tests(),
            std::sync::Arc::new(FakeVendor::default()),
        );

        let mut record = minted_record();
        record.onboarding_status = status::DISCONNECT_SUCCESS;
        // sin firma, el cliente de transacciones rechaza antes de tocar la red
        let args = burn_args(&worker);

        let result = worker.burn_sd(&mut record, &args).await;

        assert!(result.is_err());
        assert_eq!(record.onboarding_status, status::BURN_SD_FAILURE);
        assert_eq!(record.synthetic_token_id, Some(202));
        assert_eq!(record.wallet_index, Some(7));
    }

    #[test]
    fn test_apply_sd_burned_clears_token_and_wallet_together() {
        let mut record = minted_record();
        record.onboarding_status = status::DISCONNECT_SUCCESS;

        apply_sd_burned(&mut record);

        assert_eq!(record.onboarding_status, status::BURN_SD_SUCCESS);
        assert!(record.synthetic_token_id.is_none());
        assert!(record.wallet_index.is_none());
        assert!(record.wallet_invariant_holds());
        // el token del vehículo no se toca en el burn del SD
        assert_eq!(record.vehicle_token_id, Some(101));
    }
}
