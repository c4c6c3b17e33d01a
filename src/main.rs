use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use dotenvy::dotenv;
use serde_json::json;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use vehicle_oracle_backend::config::environment::EnvironmentConfig;
use vehicle_oracle_backend::jobs::{JobQueue, JobRunner, Workers};
use vehicle_oracle_backend::middleware::cors::cors_middleware;
use vehicle_oracle_backend::onboarding::delete::DeleteWorker;
use vehicle_oracle_backend::onboarding::disconnect::DisconnectWorker;
use vehicle_oracle_backend::onboarding::onboard::OnboardingWorker;
use vehicle_oracle_backend::onboarding::vendor::ExternalOnboardingService;
use vehicle_oracle_backend::onboarding::verify::VerifyWorker;
use vehicle_oracle_backend::repositories::VinRepository;
use vehicle_oracle_backend::services::auth_service::AuthService;
use vehicle_oracle_backend::services::device_definitions_service::DeviceDefinitionsService;
use vehicle_oracle_backend::services::identity_service::IdentityService;
use vehicle_oracle_backend::services::ingest_service::IngestService;
use vehicle_oracle_backend::services::oracle_service::OracleService;
use vehicle_oracle_backend::services::sd_wallet_service::SdWalletService;
use vehicle_oracle_backend::services::transactions_service::TransactionsClient;
use vehicle_oracle_backend::state::AppState;
use vehicle_oracle_backend::{database, kafka, metrics, onboarding, routes};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let app_config = EnvironmentConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&app_config.log_level)),
        )
        .init();

    info!("🚗 Vehicle Oracle Backend");
    info!("=========================");

    // Base de datos y migraciones
    let pool = match database::create_pool(&app_config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("❌ Error conectando a la base de datos: {}", e);
            return Err(anyhow::anyhow!("Database error: {}", e));
        }
    };
    database::run_migrations(&pool, &app_config.database_schema).await?;
    info!("✅ Base de datos lista");

    // Singletons: fallar acá es fallar el arranque
    let wallets = Arc::new(
        SdWalletService::new(&app_config.sd_wallets_seed)
            .map_err(|e| anyhow::anyhow!("Failed to create SD wallets service: {}", e))?,
    );
    let transactions = Arc::new(
        TransactionsClient::new(&app_config)
            .map_err(|e| anyhow::anyhow!("Failed to create transactions client: {}", e))?,
    );
    let auth = Arc::new(
        AuthService::new(&app_config)
            .map_err(|e| anyhow::anyhow!("Failed to create auth service: {}", e))?,
    );
    let ingest = Arc::new(
        IngestService::new(&app_config)
            .map_err(|e| anyhow::anyhow!("Failed to create ingest client: {}", e))?,
    );

    let identity = Arc::new(IdentityService::new(app_config.identity_api_endpoint.clone()));
    let device_definitions = Arc::new(DeviceDefinitionsService::new(
        app_config.device_definitions_api_endpoint.clone(),
        auth.clone(),
    ));
    let vendor: Arc<dyn onboarding::vendor::VendorOnboardingApi> =
        Arc::new(ExternalOnboardingService::new(&app_config));

    let repository = VinRepository::new(pool.clone(), app_config.database_schema.clone());
    let queue = JobQueue::new(pool.clone(), app_config.database_schema.clone());

    let oracle = Arc::new(OracleService::new(
        app_config.clone(),
        repository.clone(),
        ingest.clone(),
    ));

    // Cancelación compartida: servidor, runner y consumers observan el token
    let cancellation = CancellationToken::new();

    // Runner de jobs con los cuatro workers del ciclo de vida
    let workers = Workers {
        verify: VerifyWorker::new(
            app_config.clone(),
            identity.clone(),
            device_definitions.clone(),
            repository.clone(),
            vendor.clone(),
        ),
        onboard: OnboardingWorker::new(
            app_config.clone(),
            identity.clone(),
            repository.clone(),
            transactions.clone(),
            wallets.clone(),
            vendor.clone(),
        ),
        disconnect: DisconnectWorker::new(
            app_config.clone(),
            repository.clone(),
            transactions.clone(),
            vendor.clone(),
        ),
        delete: DeleteWorker::new(repository.clone(), transactions.clone()),
    };

    let runner = Arc::new(JobRunner::new(
        queue.clone(),
        workers,
        app_config.job_max_workers,
    ));
    tokio::spawn(runner.run(cancellation.clone()));

    // Consumers de Kafka
    if app_config.is_telemetry_consumer_enabled {
        tokio::spawn(kafka::consumer::run_telemetry_consumer(
            app_config.kafka_brokers.clone(),
            app_config.unbuffered_telemetry_consumer_group.clone(),
            app_config.unbuffered_telemetry_topic.clone(),
            oracle.clone(),
            cancellation.clone(),
        ));
    }

    if app_config.is_operations_consumer_enabled {
        tokio::spawn(kafka::consumer::run_operations_consumer(
            app_config.kafka_brokers.clone(),
            app_config.operations_consumer_group.clone(),
            app_config.operations_topic.clone(),
            repository.clone(),
            cancellation.clone(),
        ));
    }

    // Router de la API
    let app_state = AppState::new(pool, app_config.clone(), identity, transactions);

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(routes::vehicle_routes::create_vehicle_router(
            app_state.clone(),
        ))
        .layer(cors_middleware())
        .with_state(app_state);

    let api_addr: SocketAddr = format!("0.0.0.0:{}", app_config.port).parse()?;
    let monitoring_addr: SocketAddr =
        format!("0.0.0.0:{}", app_config.monitoring_port).parse()?;

    // Señal de apagado compartida por ambos servidores
    {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancellation.cancel();
        });
    }

    info!("📈 Servidor de monitoreo en http://{}", monitoring_addr);
    let monitoring_server = {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(monitoring_addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("❌ Error iniciando el servidor de monitoreo: {}", e);
                    return;
                }
            };
            if let Err(e) = axum::serve(listener, metrics::monitoring_router())
                .with_graceful_shutdown(async move { cancellation.cancelled().await })
                .await
            {
                error!("❌ Error del servidor de monitoreo: {}", e);
            }
        })
    };

    info!("🌐 Servidor iniciando en http://{}", api_addr);
    let listener = tokio::net::TcpListener::bind(api_addr).await?;
    let serve_cancellation = cancellation.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_cancellation.cancelled().await })
        .await?;

    cancellation.cancel();
    let _ = monitoring_server.await;

    info!("👋 Servidor terminado");
    Ok(())
}

/// Liveness del servicio
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "data": "Server is up and running"
    }))
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
