//! Shared application state
//!
//! Estado compartido de la aplicación que se pasa a través del router de
//! Axum. Los singletons (identity, cliente de transacciones) se construyen
//! una vez en el arranque y se inyectan acá; no hay globals.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::environment::EnvironmentConfig;
use crate::jobs::JobQueue;
use crate::repositories::VinRepository;
use crate::services::identity_service::IdentityService;
use crate::services::transactions_service::TransactionsClient;

#[derive(Clone)]
pub struct AppState {
    pub config: EnvironmentConfig,
    pub repository: VinRepository,
    pub queue: JobQueue,
    pub identity: Arc<IdentityService>,
    pub transactions: Arc<TransactionsClient>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: EnvironmentConfig,
        identity: Arc<IdentityService>,
        transactions: Arc<TransactionsClient>,
    ) -> Self {
        let repository = VinRepository::new(pool.clone(), config.database_schema.clone());
        let queue = JobQueue::new(pool, config.database_schema.clone());

        Self {
            config,
            repository,
            queue,
            identity,
            transactions,
        }
    }
}
