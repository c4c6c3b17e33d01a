//! DTOs de la API de vehículos

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::identity::Vehicle;
use crate::services::transactions_service::UserOperation;
use crate::utils::eip712::TypedData;

/// Estado de un VIN proyectado por la vista que corresponda a la operación
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VinStatus {
    pub vin: String,
    pub status: String,
    pub details: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusForVinsResponse {
    pub statuses: Vec<VinStatus>,
}

#[derive(Debug, Serialize)]
pub struct VehiclesResponse {
    pub vehicles: Vec<Vehicle>,
}

#[derive(Debug, Serialize)]
pub struct VehicleResponse {
    pub vehicle: Vehicle,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterVehicleRequest {
    #[serde(default)]
    #[validate(length(equal = 17))]
    pub vin: String,
    #[serde(default)]
    pub token_id: Option<i64>,
}

/// Query `?vins=` en CSV
#[derive(Debug, Deserialize)]
pub struct VinsQuery {
    #[serde(default)]
    pub vins: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VinWithCountryCode {
    #[serde(default)]
    pub vin: String,
    #[serde(rename = "countryCode", default)]
    pub country_code: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitVinVerificationRequest {
    #[serde(default)]
    pub vins: Vec<VinWithCountryCode>,
}

/// Typed-data de mint por VIN: el GET lo entrega, el POST lo trae firmado
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VinTransactionData {
    pub vin: String,
    #[serde(rename = "typedData", skip_serializing_if = "Option::is_none")]
    pub typed_data: Option<TypedData>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct SacdRequest {
    #[serde(default)]
    pub grantee: String,
    #[serde(default)]
    pub permissions: i64,
    #[serde(default)]
    pub expiration: i64,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct MintDataForVinsResponse {
    #[serde(rename = "vinMintingData")]
    pub vin_minting_data: Vec<VinTransactionData>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitMintDataRequest {
    #[serde(rename = "vinMintingData", default)]
    pub vin_minting_data: Vec<VinTransactionData>,
    #[serde(default)]
    pub sacd: Option<SacdRequest>,
}

/// User-operation por VIN: burn del SD o del vehículo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VinUserOperationData {
    pub vin: String,
    #[serde(rename = "userOperation")]
    pub user_operation: UserOperation,
    #[serde(default)]
    pub hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct DisconnectDataForVinsResponse {
    #[serde(rename = "vinDisconnectData")]
    pub vin_disconnect_data: Vec<VinUserOperationData>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitDisconnectDataRequest {
    #[serde(rename = "vinDisconnectData", default)]
    pub vin_disconnect_data: Vec<VinUserOperationData>,
}

#[derive(Debug, Serialize)]
pub struct DeleteDataForVinsResponse {
    #[serde(rename = "vinDeleteData")]
    pub vin_delete_data: Vec<VinUserOperationData>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitDeleteDataRequest {
    #[serde(rename = "vinDeleteData", default)]
    pub vin_delete_data: Vec<VinUserOperationData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_verification_wire_format() {
        let raw = r#"{"vins": [{"vin": "1FTFW1ET5DFA12345", "countryCode": "USA"}]}"#;
        let request: SubmitVinVerificationRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.vins.len(), 1);
        assert_eq!(request.vins[0].country_code, "USA");
    }

    #[test]
    fn test_mint_submit_wire_format() {
        let raw = r#"{
            "vinMintingData": [{"vin": "1FTFW1ET5DFA12345", "signature": "0xabcd"}],
            "sacd": {"grantee": "0xdef", "permissions": 6, "expiration": 1700000000, "source": ""}
        }"#;
        let request: SubmitMintDataRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.vin_minting_data[0].signature, "0xabcd");
        assert!(request.vin_minting_data[0].typed_data.is_none());
        assert_eq!(request.sacd.unwrap().permissions, 6);
    }

    #[test]
    fn test_status_response_serialization() {
        let response = StatusForVinsResponse {
            statuses: vec![VinStatus {
                vin: "1FTFW1ET5DFA12345".to_string(),
                status: "Pending".to_string(),
                details: "VerificationSubmitPending".to_string(),
            }],
        };

        let serialized = serde_json::to_value(&response).unwrap();
        assert_eq!(serialized["statuses"][0]["details"], "VerificationSubmitPending");
    }
}
