//! Repositorio de registros VIN
//!
//! Única fuente de verdad del estado por VIN. Cada operación corre en una
//! transacción (aislamiento `read committed`, el default de Postgres); las
//! lecturas abren transacción por simetría.

use sqlx::PgPool;
use tracing::error;

use crate::models::telemetry::OperationError;
use crate::models::vin::Vin;
use crate::utils::errors::AppResult;

#[derive(Clone)]
pub struct VinRepository {
    pool: PgPool,
    schema: String,
}

impl VinRepository {
    pub fn new(pool: PgPool, schema: String) -> Self {
        Self { pool, schema }
    }

    fn table(&self) -> String {
        format!("{}.vins", self.schema)
    }

    pub async fn get_by_vin(&self, vin: &str) -> AppResult<Option<Vin>> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, Vin>(&format!(
            "SELECT * FROM {} WHERE vin = $1",
            self.table()
        ))
        .bind(vin)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    pub async fn get_by_external_id(&self, external_id: &str) -> AppResult<Option<Vin>> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, Vin>(&format!(
            "SELECT * FROM {} WHERE external_id = $1",
            self.table()
        ))
        .bind(external_id)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Una lista vacía de resultados no es un error: los controllers
    /// resuelven por su cuenta qué VINs faltan.
    pub async fn get_by_vins(&self, vins: &[String]) -> AppResult<Vec<Vin>> {
        let mut tx = self.pool.begin().await?;

        let records = sqlx::query_as::<_, Vin>(&format!(
            "SELECT * FROM {} WHERE vin = ANY($1)",
            self.table()
        ))
        .bind(vins)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(records)
    }

    pub async fn get_by_vins_and_status(
        &self,
        vins: &[String],
        status: i32,
    ) -> AppResult<Vec<Vin>> {
        let mut tx = self.pool.begin().await?;

        let records = sqlx::query_as::<_, Vin>(&format!(
            "SELECT * FROM {} WHERE vin = ANY($1) AND onboarding_status = $2",
            self.table()
        ))
        .bind(vins)
        .bind(status)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(records)
    }

    /// Registros en `[min_status, max_status]` o en el conjunto adicional
    pub async fn get_by_vins_and_status_range(
        &self,
        vins: &[String],
        min_status: i32,
        max_status: i32,
        additional_statuses: &[i32],
    ) -> AppResult<Vec<Vin>> {
        let mut tx = self.pool.begin().await?;

        let records = if additional_statuses.is_empty() {
            sqlx::query_as::<_, Vin>(&format!(
                "SELECT * FROM {} WHERE vin = ANY($1) \
                 AND onboarding_status >= $2 AND onboarding_status <= $3",
                self.table()
            ))
            .bind(vins)
            .bind(min_status)
            .bind(max_status)
            .fetch_all(&mut *tx)
            .await?
        } else {
            sqlx::query_as::<_, Vin>(&format!(
                "SELECT * FROM {} WHERE vin = ANY($1) \
                 AND ((onboarding_status >= $2 AND onboarding_status <= $3) \
                      OR onboarding_status = ANY($4))",
                self.table()
            ))
            .bind(vins)
            .bind(min_status)
            .bind(max_status)
            .bind(additional_statuses)
            .fetch_all(&mut *tx)
            .await?
        };

        tx.commit().await?;
        Ok(records)
    }

    pub async fn get_by_token_ids(&self, token_ids: &[i64]) -> AppResult<Vec<Vin>> {
        let mut tx = self.pool.begin().await?;

        let records = sqlx::query_as::<_, Vin>(&format!(
            "SELECT * FROM {} WHERE vehicle_token_id = ANY($1)",
            self.table()
        ))
        .bind(token_ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(records)
    }

    pub async fn insert(&self, record: &Vin) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO {} (vin, onboarding_status, vehicle_token_id, synthetic_token_id, \
             wallet_index, device_definition_id, external_id, connection_status, \
             disconnection_status, operation_error_type, operation_error_code, \
             operation_error_description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            self.table()
        ))
        .bind(&record.vin)
        .bind(record.onboarding_status)
        .bind(record.vehicle_token_id)
        .bind(record.synthetic_token_id)
        .bind(record.wallet_index)
        .bind(&record.device_definition_id)
        .bind(&record.external_id)
        .bind(&record.connection_status)
        .bind(&record.disconnection_status)
        .bind(&record.operation_error_type)
        .bind(&record.operation_error_code)
        .bind(&record.operation_error_description)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Inserta el registro o actualiza la fila existente para el mismo VIN
    pub async fn upsert(&self, record: &Vin) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO {} (vin, onboarding_status, vehicle_token_id, synthetic_token_id, \
             wallet_index, device_definition_id, external_id, connection_status, \
             disconnection_status, operation_error_type, operation_error_code, \
             operation_error_description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (vin) DO UPDATE SET \
             onboarding_status = EXCLUDED.onboarding_status, \
             vehicle_token_id = EXCLUDED.vehicle_token_id, \
             synthetic_token_id = EXCLUDED.synthetic_token_id, \
             wallet_index = EXCLUDED.wallet_index, \
             device_definition_id = EXCLUDED.device_definition_id, \
             external_id = EXCLUDED.external_id, \
             connection_status = EXCLUDED.connection_status, \
             disconnection_status = EXCLUDED.disconnection_status, \
             operation_error_type = EXCLUDED.operation_error_type, \
             operation_error_code = EXCLUDED.operation_error_code, \
             operation_error_description = EXCLUDED.operation_error_description, \
             updated_at = now()",
            self.table()
        ))
        .bind(&record.vin)
        .bind(record.onboarding_status)
        .bind(record.vehicle_token_id)
        .bind(record.synthetic_token_id)
        .bind(record.wallet_index)
        .bind(&record.device_definition_id)
        .bind(&record.external_id)
        .bind(&record.connection_status)
        .bind(&record.disconnection_status)
        .bind(&record.operation_error_type)
        .bind(&record.operation_error_code)
        .bind(&record.operation_error_description)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Actualización completa del registro; los workers la invocan en cada
    /// salida de etapa para que el progreso sea observable desde fuera.
    pub async fn update(&self, record: &Vin) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "UPDATE {} SET onboarding_status = $2, vehicle_token_id = $3, \
             synthetic_token_id = $4, wallet_index = $5, device_definition_id = $6, \
             external_id = $7, connection_status = $8, disconnection_status = $9, \
             operation_error_type = $10, operation_error_code = $11, \
             operation_error_description = $12, updated_at = now() \
             WHERE vin = $1",
            self.table()
        ))
        .bind(&record.vin)
        .bind(record.onboarding_status)
        .bind(record.vehicle_token_id)
        .bind(record.synthetic_token_id)
        .bind(record.wallet_index)
        .bind(&record.device_definition_id)
        .bind(&record.external_id)
        .bind(&record.connection_status)
        .bind(&record.disconnection_status)
        .bind(&record.operation_error_type)
        .bind(&record.operation_error_code)
        .bind(&record.operation_error_description)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Estado de enrollment reportado por el stream de operaciones del vendor.
    /// "succeeded" limpia el estado de desconexión; sin error se limpia la terna.
    pub async fn update_enrollment(
        &self,
        vin: &str,
        status: &str,
        external_id: &str,
        error: Option<&OperationError>,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let disconnection_clear = status == "succeeded";
        sqlx::query(&format!(
            "UPDATE {} SET connection_status = $2, external_id = $3, \
             disconnection_status = CASE WHEN $4 THEN NULL ELSE disconnection_status END, \
             operation_error_type = $5, operation_error_code = $6, \
             operation_error_description = $7, updated_at = now() \
             WHERE vin = $1",
            self.table()
        ))
        .bind(vin)
        .bind(status)
        .bind(external_id)
        .bind(disconnection_clear)
        .bind(error.map(|e| e.error_type.clone()))
        .bind(error.map(|e| e.code.clone()))
        .bind(error.map(|e| e.description.clone()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Estado de unenrollment; "succeeded" limpia connection_status y external_id
    pub async fn update_unenrollment(
        &self,
        vin: &str,
        status: &str,
        error: Option<&OperationError>,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let connection_clear = status == "succeeded";
        sqlx::query(&format!(
            "UPDATE {} SET disconnection_status = $2, \
             connection_status = CASE WHEN $3 THEN NULL ELSE connection_status END, \
             external_id = CASE WHEN $3 THEN NULL ELSE external_id END, \
             operation_error_type = $4, operation_error_code = $5, \
             operation_error_description = $6, updated_at = now() \
             WHERE vin = $1",
            self.table()
        ))
        .bind(vin)
        .bind(status)
        .bind(connection_clear)
        .bind(error.map(|e| e.error_type.clone()))
        .bind(error.map(|e| e.code.clone()))
        .bind(error.map(|e| e.description.clone()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Siguiente índice de wallet SD. La secuencia avanza exactamente una vez
    /// por asignación y nunca recicla valores, ni siquiera tras un rollback.
    pub async fn next_wallet_index(&self) -> AppResult<i64> {
        let mut tx = self.pool.begin().await?;

        let row: (i64,) = sqlx::query_as(&format!(
            "SELECT nextval('{}.sd_wallet_index_seq')",
            self.schema
        ))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to get next SD wallet index: {}", e);
            e
        })?;

        tx.commit().await?;
        Ok(row.0)
    }
}
