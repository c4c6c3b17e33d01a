//! Registro por VIN
//!
//! Una fila por VIN; única fuente de verdad del ciclo de vida de onboarding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::onboarding::status;

/// Registro de un VIN en la base de datos
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Vin {
    pub vin: String,
    pub onboarding_status: i32,
    pub vehicle_token_id: Option<i64>,
    pub synthetic_token_id: Option<i64>,
    pub wallet_index: Option<i64>,
    pub device_definition_id: Option<String>,
    pub external_id: Option<String>,
    pub connection_status: Option<String>,
    pub disconnection_status: Option<String>,
    pub operation_error_type: Option<String>,
    pub operation_error_code: Option<String>,
    pub operation_error_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vin {
    pub fn new(vin: &str, onboarding_status: i32) -> Self {
        Self {
            vin: vin.to_string(),
            onboarding_status,
            vehicle_token_id: None,
            synthetic_token_id: None,
            wallet_index: None,
            device_definition_id: None,
            external_id: None,
            connection_status: None,
            disconnection_status: None,
            operation_error_type: None,
            operation_error_code: None,
            operation_error_description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn connection_failed(&self) -> bool {
        self.connection_status.as_deref() == Some("failed")
    }

    /// wallet_index y synthetic_token_id viven y mueren juntos
    pub fn wallet_invariant_holds(&self) -> bool {
        self.wallet_index.is_some() == self.synthetic_token_id.is_some()
    }

    pub fn is_minted(&self) -> bool {
        status::is_minted(self.onboarding_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = Vin::new("1FTFW1ET5DFA12345", status::SUBMIT_UNKNOWN);
        assert_eq!(record.onboarding_status, 0);
        assert!(record.vehicle_token_id.is_none());
        assert!(record.synthetic_token_id.is_none());
        assert!(record.wallet_invariant_holds());
    }

    #[test]
    fn test_wallet_invariant() {
        let mut record = Vin::new("1FTFW1ET5DFA12345", status::MINT_SUCCESS);
        record.synthetic_token_id = Some(202);
        assert!(!record.wallet_invariant_holds());
        record.wallet_index = Some(7);
        assert!(record.wallet_invariant_holds());
    }

    #[test]
    fn test_connection_failed() {
        let mut record = Vin::new("1FTFW1ET5DFA12345", status::MINT_SUCCESS);
        assert!(!record.connection_failed());
        record.connection_status = Some("failed".to_string());
        assert!(record.connection_failed());
        record.connection_status = Some("succeeded".to_string());
        assert!(!record.connection_failed());
    }
}
