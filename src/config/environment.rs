//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno y variables de configuración.
//! Los valores requeridos hacen fallar el arranque si faltan.

use std::env;

/// Configuración del entorno
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub log_level: String,
    pub port: u16,
    pub monitoring_port: u16,

    // Base de datos
    pub database_url: String,
    pub database_schema: String,

    // JWT con claim ethereum_address
    pub jwt_secret: String,

    // Comunicación con el sistema del vendor externo
    pub external_vendor_api_url: String,
    pub vendor_client_id: String,
    pub vendor_client_secret: String,

    // Kafka
    pub is_telemetry_consumer_enabled: bool,
    pub is_operations_consumer_enabled: bool,
    pub kafka_brokers: String,
    pub operations_topic: String,
    pub operations_consumer_group: String,
    pub unbuffered_telemetry_topic: String,
    pub unbuffered_telemetry_consumer_group: String,

    // Endpoint de ingesta (mTLS)
    pub ingest_endpoint: String,
    pub cert: String,
    pub cert_key: String,
    pub ca_cert: String,

    // Chain
    pub chain_id: i64,
    pub vehicle_nft_address: String,
    pub synthetic_nft_address: String,

    // Servicios de identidad y device definitions
    pub identity_api_endpoint: String,
    pub device_definitions_api_endpoint: String,

    // Cliente de transacciones
    pub developer_aa_wallet_address: String,
    pub developer_pk: String,
    pub rpc_url: String,
    pub paymaster_url: String,
    pub bundler_url: String,
    pub registry_address: String,

    // Auth web3 (challenge/response para las APIs autenticadas)
    pub auth_url: String,
    pub auth_client_id: String,
    pub auth_domain: String,

    // Semilla de las wallets SD (64 bytes hex)
    pub sd_wallets_seed: String,

    // Minting
    pub enable_minting_with_connection_token_id: bool,
    pub connection_token_id: String,
    pub integration_token_id: String,

    // Onboarding: flags útiles para testing local
    pub enable_vendor_capability_check: bool,
    pub enable_vendor_connection: bool,
    pub enable_vendor_test_mode: bool,

    // Cola de jobs
    pub job_max_workers: usize,
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

impl EnvironmentConfig {
    pub fn from_env() -> Self {
        Self {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("PORT must be a valid number"),
            monitoring_port: env::var("MONITORING_PORT")
                .unwrap_or_else(|_| "8888".to_string())
                .parse()
                .expect("MONITORING_PORT must be a valid number"),

            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            database_schema: env::var("DATABASE_SCHEMA")
                .unwrap_or_else(|_| "vehicle_oracle".to_string()),

            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),

            external_vendor_api_url: env::var("EXTERNAL_VENDOR_API_URL").unwrap_or_default(),
            vendor_client_id: env::var("VENDOR_CLIENT_ID").unwrap_or_default(),
            vendor_client_secret: env::var("VENDOR_CLIENT_SECRET").unwrap_or_default(),

            is_telemetry_consumer_enabled: env_bool("IS_TELEMETRY_CONSUMER_ENABLED", false),
            is_operations_consumer_enabled: env_bool("IS_OPERATIONS_CONSUMER_ENABLED", false),
            kafka_brokers: env::var("KAFKA_BROKERS").unwrap_or_default(),
            operations_topic: env::var("OPERATIONS_TOPIC").unwrap_or_default(),
            operations_consumer_group: env::var("OPERATIONS_CONSUMER_GROUP").unwrap_or_default(),
            unbuffered_telemetry_topic: env::var("UNBUFFERED_TELEMETRY_TOPIC").unwrap_or_default(),
            unbuffered_telemetry_consumer_group: env::var("UNBUFFERED_TELEMETRY_CONSUMER_GROUP")
                .unwrap_or_default(),

            ingest_endpoint: env::var("INGEST_ENDPOINT").unwrap_or_default(),
            cert: env::var("CERT").unwrap_or_default(),
            cert_key: env::var("CERT_KEY").unwrap_or_default(),
            ca_cert: env::var("CA_CERT").unwrap_or_default(),

            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .expect("CHAIN_ID must be a valid number"),
            vehicle_nft_address: env::var("VEHICLE_NFT_ADDRESS").unwrap_or_default(),
            synthetic_nft_address: env::var("SYNTHETIC_NFT_ADDRESS").unwrap_or_default(),

            identity_api_endpoint: env::var("IDENTITY_API_ENDPOINT").unwrap_or_default(),
            device_definitions_api_endpoint: env::var("DEVICE_DEFINITIONS_API_ENDPOINT")
                .unwrap_or_default(),

            developer_aa_wallet_address: env::var("DEVELOPER_AA_WALLET_ADDRESS")
                .unwrap_or_default(),
            developer_pk: env::var("DEVELOPER_PK").unwrap_or_default(),
            rpc_url: env::var("RPC_URL").unwrap_or_default(),
            paymaster_url: env::var("PAYMASTER_URL").unwrap_or_default(),
            bundler_url: env::var("BUNDLER_URL").unwrap_or_default(),
            registry_address: env::var("REGISTRY_ADDRESS").unwrap_or_default(),

            auth_url: env::var("AUTH_URL").unwrap_or_default(),
            auth_client_id: env::var("AUTH_CLIENT_ID").unwrap_or_default(),
            auth_domain: env::var("AUTH_DOMAIN").unwrap_or_default(),

            sd_wallets_seed: env::var("SD_WALLETS_SEED").expect("SD_WALLETS_SEED must be set"),

            enable_minting_with_connection_token_id: env_bool(
                "ENABLE_MINTING_WITH_CONNECTION_TOKEN_ID",
                false,
            ),
            connection_token_id: env::var("CONNECTION_TOKEN_ID").unwrap_or_default(),
            integration_token_id: env::var("INTEGRATION_TOKEN_ID").unwrap_or_default(),

            enable_vendor_capability_check: env_bool("ENABLE_VENDOR_CAPABILITY_CHECK", true),
            enable_vendor_connection: env_bool("ENABLE_VENDOR_CONNECTION", true),
            enable_vendor_test_mode: env_bool("ENABLE_VENDOR_TEST_MODE", false),

            job_max_workers: env::var("JOB_MAX_WORKERS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .expect("JOB_MAX_WORKERS must be a valid number"),
        }
    }

    /// Verificar si estamos en modo producción
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
impl EnvironmentConfig {
    /// Configuración mínima válida para los tests unitarios
    pub fn for_tests() -> Self {
        Self {
            environment: "test".to_string(),
            log_level: "debug".to_string(),
            port: 0,
            monitoring_port: 0,
            database_url: "postgres://postgres@127.0.0.1:1/oracle".to_string(),
            database_schema: "vehicle_oracle".to_string(),
            jwt_secret: "test-secret".to_string(),
            external_vendor_api_url: String::new(),
            vendor_client_id: String::new(),
            vendor_client_secret: String::new(),
            is_telemetry_consumer_enabled: false,
            is_operations_consumer_enabled: false,
            kafka_brokers: String::new(),
            operations_topic: String::new(),
            operations_consumer_group: String::new(),
            unbuffered_telemetry_topic: String::new(),
            unbuffered_telemetry_consumer_group: String::new(),
            ingest_endpoint: String::new(),
            cert: String::new(),
            cert_key: String::new(),
            ca_cert: String::new(),
            chain_id: 137,
            vehicle_nft_address: "0xaaaa1a1b1b1c1d1e1f10111213141516171819aa".to_string(),
            synthetic_nft_address: "0xbbbb1a1b1b1c1d1e1f10111213141516171819bb".to_string(),
            identity_api_endpoint: String::new(),
            device_definitions_api_endpoint: String::new(),
            developer_aa_wallet_address: "0xcccc1a1b1b1c1d1e1f10111213141516171819cc"
                .to_string(),
            developer_pk: String::new(),
            rpc_url: "https://rpc.example".to_string(),
            paymaster_url: "https://paymaster.example".to_string(),
            bundler_url: "https://bundler.example".to_string(),
            registry_address: "0x2902a1a1b1b1c1d1e1f101112131415161718191".to_string(),
            auth_url: String::new(),
            auth_client_id: String::new(),
            auth_domain: String::new(),
            sd_wallets_seed: String::new(),
            enable_minting_with_connection_token_id: false,
            connection_token_id: "9".to_string(),
            integration_token_id: "1".to_string(),
            enable_vendor_capability_check: true,
            enable_vendor_connection: true,
            enable_vendor_test_mode: false,
            job_max_workers: 100,
        }
    }
}
