//! Cliente GraphQL del identity-api
//!
//! Resuelve vehículos y device definitions on-chain. Las respuestas se
//! memoizan 10 minutos: el identity-api indexa con retraso y los workers
//! lo consultan en loops.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::identity::{
    DeviceDefinition, GraphQlData, GraphQlRequest, PagedVehicles, PagedVehiclesNodes,
    SingleDeviceDefinition, SingleVehicle, Vehicle,
};
use crate::utils::errors::{AppError, AppResult};

const CACHE_TTL: Duration = Duration::from_secs(10 * 60);

const DEVICE_DEFINITION_BY_ID_QUERY: &str = r#"{
    deviceDefinition(by: {id: "%ID%"}) {
        deviceDefinitionId
        manufacturer {
            name
            tokenId
        }
        model
        year
    }
}"#;

const VEHICLES_BY_WALLET_AND_CURSOR_QUERY: &str = r#"{
    vehicles(filterBy: {owner: "%OWNER%"}, first: 100, after: %AFTER%) {
        nodes {
            id
            tokenId
            mintedAt
            owner
            definition {
                id
                make
                model
                year
            }
            syntheticDevice {
                id
                tokenId
                mintedAt
            }
        }
        pageInfo {
            hasPreviousPage
            hasNextPage
            startCursor
            endCursor
        }
    }
}"#;

const VEHICLE_BY_TOKEN_ID_QUERY: &str = r#"{
    vehicle(tokenId: %TOKEN_ID%) {
        id
        tokenId
        mintedAt
        owner
        definition {
            id
            make
            model
            year
        }
        syntheticDevice {
            id
            tokenId
            mintedAt
        }
    }
}"#;

struct CacheSlot {
    definition: DeviceDefinition,
    cached_at: Instant,
}

pub struct IdentityService {
    api_url: String,
    client: Client,
    cache: RwLock<HashMap<String, CacheSlot>>,
}

impl IdentityService {
    pub fn new(api_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            api_url,
            client,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn fetch_vehicle_by_token_id(&self, token_id: i64) -> AppResult<Vehicle> {
        let query = VEHICLE_BY_TOKEN_ID_QUERY.replace("%TOKEN_ID%", &token_id.to_string());
        let body = self.query(&query).await?;

        let parsed: GraphQlData<SingleVehicle> = serde_json::from_slice(&body)?;

        Ok(parsed.data.vehicle)
    }

    /// Todos los vehículos del wallet, siguiendo el cursor de paginación
    pub async fn fetch_vehicles_by_wallet_address(
        &self,
        wallet_address: &str,
    ) -> AppResult<Vec<Vehicle>> {
        let mut vehicles = Vec::new();

        let mut page = self.fetch_user_vehicles_page(wallet_address, "").await?;
        vehicles.extend(page.nodes);

        while page.page_info.has_next_page {
            let cursor = page.page_info.end_cursor.clone();
            page = self.fetch_user_vehicles_page(wallet_address, &cursor).await?;
            vehicles.extend(page.nodes);
        }

        Ok(vehicles)
    }

    async fn fetch_user_vehicles_page(
        &self,
        wallet_address: &str,
        after: &str,
    ) -> AppResult<PagedVehiclesNodes> {
        let after_cursor = if after.is_empty() {
            "null".to_string()
        } else {
            format!("\"{}\"", after)
        };

        let query = VEHICLES_BY_WALLET_AND_CURSOR_QUERY
            .replace("%OWNER%", wallet_address)
            .replace("%AFTER%", &after_cursor);

        let body = self.query(&query).await?;
        let parsed: GraphQlData<PagedVehicles> = serde_json::from_slice(&body)?;

        Ok(parsed.data.vehicles)
    }

    /// Device definition con cache; cae a la red cuando no está memoizada
    pub async fn get_device_definition_by_id(&self, id: &str) -> AppResult<DeviceDefinition> {
        if let Some(cached) = self.get_cached_device_definition_by_id(id).await {
            return Ok(cached);
        }

        self.fetch_device_definition_by_id(id).await
    }

    pub async fn get_cached_device_definition_by_id(&self, id: &str) -> Option<DeviceDefinition> {
        let cache = self.cache.read().await;
        match cache.get(id) {
            Some(slot) if slot.cached_at.elapsed() < CACHE_TTL => Some(slot.definition.clone()),
            _ => None,
        }
    }

    pub async fn fetch_device_definition_by_id(&self, id: &str) -> AppResult<DeviceDefinition> {
        let query = DEVICE_DEFINITION_BY_ID_QUERY.replace("%ID%", id);
        let body = self.query(&query).await?;

        let parsed: GraphQlData<SingleDeviceDefinition> = serde_json::from_slice(&body)?;
        let definition = parsed.data.device_definition;

        // No memoizar respuestas vacías: identity todavía puede estar indexando
        if !definition.device_definition_id.is_empty() {
            let mut cache = self.cache.write().await;
            cache.insert(
                id.to_string(),
                CacheSlot {
                    definition: definition.clone(),
                    cached_at: Instant::now(),
                },
            );
        }

        Ok(definition)
    }

    async fn query(&self, graphql_query: &str) -> AppResult<Vec<u8>> {
        debug!("Identity API query: {}", graphql_query);

        let response = self
            .client
            .post(&self.api_url)
            .json(&GraphQlRequest {
                query: graphql_query.to_string(),
            })
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            return Err(AppError::BadRequest(
                "identity API rejected the query".to_string(),
            ));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
