//! Conexión a PostgreSQL y migraciones
//!
//! El esquema es configurable, así que las migraciones embebidas se aplican
//! interpolando `{schema}` y llevando el historial en `<schema>.migrations`.

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Crear un pool de conexiones a la base de datos
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;

    Ok(pool)
}

const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_vins", include_str!("../../migrations/0001_vins.sql")),
    (
        "0002_sd_wallet_index_seq",
        include_str!("../../migrations/0002_sd_wallet_index_seq.sql"),
    ),
    ("0003_jobs", include_str!("../../migrations/0003_jobs.sql")),
];

/// Ejecutar las migraciones pendientes dentro del esquema configurado
pub async fn run_migrations(pool: &PgPool, schema: &str) -> Result<()> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
        .execute(pool)
        .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {}.migrations (
            version TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        schema
    ))
    .execute(pool)
    .await?;

    for (version, sql) in MIGRATIONS {
        let applied: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT version FROM {}.migrations WHERE version = $1",
            schema
        ))
        .bind(version)
        .fetch_optional(pool)
        .await?;

        if applied.is_some() {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in sql.replace("{schema}", schema).split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query(&format!(
            "INSERT INTO {}.migrations (version) VALUES ($1)",
            schema
        ))
        .bind(version)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!("📦 Migración aplicada: {}", version);
    }

    Ok(())
}
