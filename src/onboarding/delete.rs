//! Worker de borrado
//!
//! Quema el NFT del vehículo. Se rehúsa mientras el SD siga minteado: el
//! burn del vehículo solo es válido después del burn del SD.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::models::vin::Vin;
use crate::onboarding::status;
use crate::repositories::VinRepository;
use crate::services::transactions_service::{TransactionsClient, UserOperation};
use crate::utils::errors::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteArgs {
    pub vin: String,
    #[serde(rename = "userOperation")]
    pub user_operation: UserOperation,
}

pub struct DeleteWorker {
    repository: VinRepository,
    transactions: Arc<TransactionsClient>,
}

impl DeleteWorker {
    pub fn new(repository: VinRepository, transactions: Arc<TransactionsClient>) -> Self {
        Self {
            repository,
            transactions,
        }
    }

    pub async fn work(&self, args: &DeleteArgs) -> AppResult<()> {
        debug!("Borrando VIN {}", args.vin);

        let mut record = self.get_vin_record(&args.vin).await?;

        if record.onboarding_status < status::BURN_SD_SUCCESS {
            return Err(AppError::BadRequest(
                "insufficient disconnect status".to_string(),
            ));
        }

        // Vehículo ya quemado: nada que hacer
        if record.onboarding_status == status::BURN_VEHICLE_SUCCESS {
            return Ok(());
        }

        ensure_sd_burned(&record)?;

        if record.vehicle_token_id.is_some() {
            debug!("Quemando vehículo {}", args.vin);
            self.burn_vehicle_and_update(&mut record, args).await?;
        }

        Ok(())
    }

    async fn get_vin_record(&self, vin: &str) -> AppResult<Vin> {
        self.repository
            .get_by_vin(vin)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("vehicle {} not found", vin)))
    }

    async fn burn_vehicle_and_update(
        &self,
        record: &mut Vin,
        args: &DeleteArgs,
    ) -> AppResult<()> {
        let result = self.burn_vehicle(record, args).await;
        self.update(record).await;
        result
    }

    async fn burn_vehicle(&self, record: &mut Vin, args: &DeleteArgs) -> AppResult<()> {
        let result = match self
            .transactions
            .send_signed_user_operation(&args.user_operation)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Fallo quemando el vehículo: {}", e);
                record.onboarding_status = status::BURN_VEHICLE_FAILURE;
                return Err(e);
            }
        };

        apply_vehicle_burned(record);

        debug!(
            "Vehículo {} quemado (token {:?})",
            args.vin, result.vehicle_token_id
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

/// Invariante: no se quema el vehículo con el SD todavía vivo
fn ensure_sd_burned(record: &Vin) -> AppResult<()> {
    if record.synthetic_token_id.is_some() {
        error!("{} todavía tiene SD, no se puede quemar", record.vin);
        return Err(AppError::Conflict("sd not empty".to_string()));
    }

    Ok(())
}

fn apply_vehicle_burned(record: &mut Vin) {
    record.vehicle_token_id = None;
    record.onboarding_status = status::BURN_VEHICLE_SUCCESS;
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use sqlx::postgres::PgPoolOptions;

    use crate::config::environment::EnvironmentConfig;

    const VIN: &str = "1FTFW1ET5DFA12345";
    const OWNER: &str = "0xdddd1a1b1b1c1d1e1f10111213141516171819dd";

    fn test_worker(config: &EnvironmentConfig) -> DeleteWorker {
        let pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(100))
            .connect_lazy(&config.database_url)
            .unwrap();
        let repository = VinRepository::new(pool, config.database_schema.clone());
        let transactions = Arc::new(TransactionsClient::new(config).unwrap());

        DeleteWorker::new(repository, transactions)
    }

    fn disconnected_record() -> Vin {
        let mut record = Vin::new(VIN, status::BURN_SD_SUCCESS);
        record.vehicle_token_id = Some(101);
        record
    }

    #[test]
    fn test_refuses_while_sd_is_still_minted() {
        let mut record = disconnected_record();
        record.synthetic_token_id = Some(202);

        let result = ensure_sd_burned(&record);
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_proceeds_once_sd_is_burned() {
        let record = disconnected_record();
        assert!(ensure_sd_burned(&record).is_ok());
    }

    #[tokio::test]
    async fn test_burn_vehicle_failure_keeps_token() {
        let config = EnvironmentConfig::for_tests();
        let worker = test_worker(&config);

        let mut record = disconnected_record();
        // sin firma, el cliente de transacciones rechaza antes de tocar la red
        let (user_operation, _) = worker
            .transactions
            .get_burn_vehicle_by_owner_user_operation_and_hash(OWNER, 101)
            .unwrap();
        let args = DeleteArgs {
            vin: VIN.to_string(),
            user_operation,
        };

        let result = worker.burn_vehicle(&mut record, &args).await;

        assert!(result.is_err());
        assert_eq!(record.onboarding_status, status::BURN_VEHICLE_FAILURE);
        assert_eq!(record.vehicle_token_id, Some(101));
    }

    #[test]
    fn test_apply_vehicle_burned_clears_token() {
        let mut record = disconnected_record();

        apply_vehicle_burned(&mut record);

        assert_eq!(record.onboarding_status, status::BURN_VEHICLE_SUCCESS);
        assert!(record.vehicle_token_id.is_none());
        assert!(record.synthetic_token_id.is_none());
        assert!(record.wallet_invariant_holds());
    }
}
