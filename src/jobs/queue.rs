//! Cola de jobs durable
//!
//! Los jobs viven en la misma base Postgres que los registros VIN, así que
//! sobreviven reinicios del proceso. Reclamo con `FOR UPDATE SKIP LOCKED`:
//! una vez tomado, un job lo ejecuta a lo sumo un worker. Con max_attempts
//! en 1 (sin reintento automático), un job cuyo proceso murió no se vuelve
//! a correr en silencio.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::utils::errors::{AppError, AppResult};

/// Kinds de job soportados por el runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Verify,
    Onboard,
    Disconnect,
    Delete,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Verify => "verify",
            JobKind::Onboard => "onboard",
            JobKind::Disconnect => "disconnect",
            JobKind::Delete => "delete",
        }
    }

    pub fn from_str(kind: &str) -> Option<Self> {
        match kind {
            "verify" => Some(JobKind::Verify),
            "onboard" => Some(JobKind::Onboard),
            "disconnect" => Some(JobKind::Disconnect),
            "delete" => Some(JobKind::Delete),
            _ => None,
        }
    }
}

/// Fila de un job reclamado
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub kind: String,
    pub args: serde_json::Value,
    pub state: String,
    pub attempt: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn parsed_args<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(self.args.clone())
            .map_err(|e| AppError::Internal(format!("invalid job args: {}", e)))
    }
}

#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
    schema: String,
}

impl JobQueue {
    pub fn new(pool: PgPool, schema: String) -> Self {
        Self { pool, schema }
    }

    fn table(&self) -> String {
        format!("{}.jobs", self.schema)
    }

    /// Encola un job. Sin unicidad por args y sin reintentos automáticos.
    pub async fn enqueue<A: Serialize>(&self, kind: JobKind, args: &A) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_value(args)?;

        sqlx::query(&format!(
            "INSERT INTO {} (id, kind, args, state, max_attempts) \
             VALUES ($1, $2, $3, 'available', 1)",
            self.table()
        ))
        .bind(id)
        .bind(kind.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Reclama hasta `limit` jobs disponibles. El UPDATE con subselect
    /// `FOR UPDATE SKIP LOCKED` garantiza que cada job lo toma un solo runner.
    pub async fn claim(&self, limit: i64) -> AppResult<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "UPDATE {table} SET state = 'running', attempt = attempt + 1, attempted_at = now() \
             WHERE id IN ( \
                 SELECT id FROM {table} \
                 WHERE state = 'available' AND attempt < max_attempts AND scheduled_at <= now() \
                 ORDER BY created_at \
                 LIMIT $1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING *",
            table = self.table()
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    pub async fn complete(&self, id: Uuid) -> AppResult<()> {
        sqlx::query(&format!(
            "UPDATE {} SET state = 'completed', finished_at = now() WHERE id = $1",
            self.table()
        ))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn discard(&self, id: Uuid, error: &str) -> AppResult<()> {
        sqlx::query(&format!(
            "UPDATE {} SET state = 'discarded', finished_at = now(), last_error = $2 \
             WHERE id = $1",
            self.table()
        ))
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_roundtrip() {
        for kind in [
            JobKind::Verify,
            JobKind::Onboard,
            JobKind::Disconnect,
            JobKind::Delete,
        ] {
            assert_eq!(JobKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(JobKind::from_str("unknown"), None);
    }

    #[test]
    fn test_parsed_args() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Args {
            vin: String,
        }

        let job = Job {
            id: Uuid::new_v4(),
            kind: "verify".to_string(),
            args: serde_json::json!({"vin": "1FTFW1ET5DFA12345"}),
            state: "running".to_string(),
            attempt: 1,
            max_attempts: 1,
            last_error: None,
            scheduled_at: Utc::now(),
            attempted_at: None,
            finished_at: None,
            created_at: Utc::now(),
        };

        let parsed: Args = job.parsed_args().unwrap();
        assert_eq!(parsed.vin, "1FTFW1ET5DFA12345");

        let bad: AppResult<Vec<String>> = job.parsed_args();
        assert!(bad.is_err());
    }
}
