pub mod auth_service;
pub mod device_definitions_service;
pub mod identity_service;
pub mod ingest_service;
pub mod oracle_service;
pub mod sd_wallet_service;
pub mod signals;
pub mod transactions_service;
