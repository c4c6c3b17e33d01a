use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use vehicle_oracle_backend::config::environment::EnvironmentConfig;
use vehicle_oracle_backend::middleware::auth_middleware::{verify_token, JwtClaims};
use vehicle_oracle_backend::routes::vehicle_routes::create_vehicle_router;
use vehicle_oracle_backend::services::identity_service::IdentityService;
use vehicle_oracle_backend::services::transactions_service::TransactionsClient;
use vehicle_oracle_backend::state::AppState;

const JWT_SECRET: &str = "api-test-secret";
const WALLET: &str = "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826";

fn test_config() -> EnvironmentConfig {
    EnvironmentConfig {
        environment: "test".to_string(),
        log_level: "debug".to_string(),
        port: 0,
        monitoring_port: 0,
        // lazy y apuntando a un puerto cerrado: estos tests no tocan la base
        database_url: "postgres://postgres@127.0.0.1:1/oracle".to_string(),
        database_schema: "vehicle_oracle".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
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
        developer_aa_wallet_address: "0xcccc1a1b1b1c1d1e1f10111213141516171819cc".to_string(),
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

// App real: el router de vehículos con su middleware de autenticación,
// tal como lo monta el servidor.
fn create_test_app() -> Router {
    let config = test_config();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();
    let identity = Arc::new(IdentityService::new(config.identity_api_endpoint.clone()));
    let transactions = Arc::new(TransactionsClient::new(&config).unwrap());

    let state = AppState::new(pool, config, identity, transactions);

    Router::new()
        .route(
            "/health",
            get(|| async { Json(json!({"data": "Server is up and running"})) }),
        )
        .merge(create_vehicle_router(state.clone()))
        .with_state(state)
}

fn bearer_token(secret: &str) -> String {
    let claims = JwtClaims {
        sub: "user-1".to_string(),
        ethereum_address: WALLET.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["data"], "Server is up and running");
}

#[tokio::test]
async fn test_protected_route_requires_bearer_token() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/vehicles")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_with_wrong_secret_rejected() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/vehicle/verify?vins=1FTFW1ET5DFA12345")
                .header("Authorization", format!("Bearer {}", bearer_token("otro-secreto")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicated_vins_rejected_behind_auth() {
    let app = create_test_app();

    // el token válido pasa el middleware; el handler real rechaza los duplicados
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/vehicle/verify?vins=ABCDEFG1234567811,ABCDEFG1234567811")
                .header("Authorization", format!("Bearer {}", bearer_token(JWT_SECRET)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_vins_rejected_behind_auth() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/vehicle/verify?vins=")
                .header("Authorization", format!("Bearer {}", bearer_token(JWT_SECRET)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_verify_token_extracts_wallet_claim() {
    let token = bearer_token(JWT_SECRET);

    let claims = verify_token(&token, JWT_SECRET).unwrap();
    assert_eq!(claims.ethereum_address, WALLET);

    assert!(verify_token(&token, "otro-secreto").is_err());
    assert!(verify_token("garbage", JWT_SECRET).is_err());
}
