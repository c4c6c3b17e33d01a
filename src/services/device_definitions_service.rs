//! Cliente REST del servicio de device definitions
//!
//! Decodifica VINs a device definitions. Las llamadas van autenticadas con
//! el JWT que entrega el [`AuthService`](crate::services::auth_service).

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::services::auth_service::AuthService;
use crate::utils::errors::{AppError, AppResult};

#[derive(Debug, Serialize)]
struct DecodeVinPayload {
    #[serde(rename = "countryCode")]
    country_code: String,
    vin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecodeVinResponse {
    #[serde(rename = "deviceDefinitionId", default)]
    pub device_definition_id: String,
    #[serde(rename = "newTransactionHash", default)]
    pub new_transaction_hash: String,
}

pub struct DeviceDefinitionsService {
    base_url: String,
    auth: Arc<AuthService>,
    client: Client,
}

impl DeviceDefinitionsService {
    pub fn new(base_url: String, auth: Arc<AuthService>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url,
            auth,
            client,
        }
    }

    pub async fn decode_vin(&self, vin: &str, country_code: &str) -> AppResult<DecodeVinResponse> {
        let token = self.auth.get_token().await?;

        debug!("Decodificando VIN {} ({})", vin, country_code);

        let response = self
            .client
            .post(format!("{}/device-definitions/decode-vin", self.base_url))
            .bearer_auth(token)
            .json(&DecodeVinPayload {
                country_code: country_code.to_string(),
                vin: vin.to_string(),
            })
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(AppError::ExternalApi(format!(
                "decode-vin failed with status {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}
