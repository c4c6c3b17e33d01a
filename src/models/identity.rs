//! Modelos del identity-api (GraphQL)

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct GraphQlRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlData<T> {
    pub data: T,
}

/// Vehículo tal como lo reporta el identity-api, enriquecido con el VIN
/// y los estados de conexión locales al devolverlo por la API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vehicle {
    #[serde(default)]
    pub vin: String,
    #[serde(default)]
    pub id: String,
    #[serde(rename = "tokenId", default)]
    pub token_id: i64,
    #[serde(rename = "mintedAt", default)]
    pub minted_at: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub definition: Definition,
    #[serde(rename = "syntheticDevice", default)]
    pub synthetic_device: SyntheticDevice,
    #[serde(rename = "connectionStatus", default)]
    pub connection_status: String,
    #[serde(rename = "disconnectionStatus", default)]
    pub disconnection_status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyntheticDevice {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "tokenId", default)]
    pub token_id: i64,
    #[serde(rename = "mintedAt", default)]
    pub minted_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub make: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub year: i32,
}

#[derive(Debug, Deserialize)]
pub struct SingleVehicle {
    #[serde(default)]
    pub vehicle: Vehicle,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageInfo {
    #[serde(rename = "hasPreviousPage", default)]
    pub has_previous_page: bool,
    #[serde(rename = "hasNextPage", default)]
    pub has_next_page: bool,
    #[serde(rename = "startCursor", default)]
    pub start_cursor: String,
    #[serde(rename = "endCursor", default)]
    pub end_cursor: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PagedVehiclesNodes {
    #[serde(default)]
    pub nodes: Vec<Vehicle>,
    #[serde(rename = "pageInfo", default)]
    pub page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
pub struct PagedVehicles {
    pub vehicles: PagedVehiclesNodes,
}

#[derive(Debug, Deserialize)]
pub struct SingleDeviceDefinition {
    #[serde(rename = "deviceDefinition", default)]
    pub device_definition: DeviceDefinition,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceDefinition {
    #[serde(rename = "deviceDefinitionId", default)]
    pub device_definition_id: String,
    #[serde(default)]
    pub manufacturer: Manufacturer,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub year: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manufacturer {
    #[serde(rename = "tokenId", default)]
    pub token_id: u64,
    #[serde(default)]
    pub name: String,
}
