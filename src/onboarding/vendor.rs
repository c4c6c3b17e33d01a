//! API de onboarding del vendor externo
//!
//! Punto de integración con el sistema del vendor: chequeo de capacidad,
//! alta y baja de la conexión de telemetría. El resultado definitivo de
//! enroll/unenroll llega después, de forma asíncrona, por el topic de
//! operaciones.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::environment::EnvironmentConfig;
use crate::utils::errors::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorCapabilityStatus {
    pub vin: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorConnectionStatus {
    pub vin: String,
    #[serde(rename = "externalId", default)]
    pub external_id: String,
    pub status: String,
}

#[async_trait]
pub trait VendorOnboardingApi: Send + Sync {
    async fn validate(&self, vins: &[String]) -> AppResult<Vec<VendorCapabilityStatus>>;
    async fn connect(&self, vins: &[String]) -> AppResult<Vec<VendorConnectionStatus>>;
    async fn disconnect(&self, vins: &[String]) -> AppResult<Vec<VendorConnectionStatus>>;
}

pub struct ExternalOnboardingService {
    api_url: String,
    client_id: String,
    client_secret: String,
    client: Client,
}

impl ExternalOnboardingService {
    pub fn new(config: &EnvironmentConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            api_url: config.external_vendor_api_url.clone(),
            client_id: config.vendor_client_id.clone(),
            client_secret: config.vendor_client_secret.clone(),
            client,
        }
    }

    async fn post_vins<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        vins: &[String],
    ) -> AppResult<Vec<T>> {
        let response = self
            .client
            .post(format!("{}{}", self.api_url, path))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .json(&serde_json::json!({ "vins": vins }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::ExternalApi(format!(
                "vendor API returned status {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl VendorOnboardingApi for ExternalOnboardingService {
    async fn validate(&self, vins: &[String]) -> AppResult<Vec<VendorCapabilityStatus>> {
        debug!("vendor.Validate: {:?}", vins);
        self.post_vins("/vehicles/validate", vins).await
    }

    async fn connect(&self, vins: &[String]) -> AppResult<Vec<VendorConnectionStatus>> {
        debug!("vendor.Connect: {:?}", vins);
        self.post_vins("/vehicles/connect", vins).await
    }

    async fn disconnect(&self, vins: &[String]) -> AppResult<Vec<VendorConnectionStatus>> {
        debug!("vendor.Disconnect: {:?}", vins);
        self.post_vins("/vehicles/disconnect", vins).await
    }
}
