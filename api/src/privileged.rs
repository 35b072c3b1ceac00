use async_trait::async_trait;
use cuota_core::adapters::PrivilegedExecutor;
use cuota_core::error::StoreError;
use cuota_core::model::Record;
use serde_json::Value;
use sqlx::PgPool;

use crate::store::{db_error, into_record};

/// Runs validated SELECT text through `cuota_execute_select`, created by the
/// `0001_cuota_execute_select` migration.
pub struct PgPrivilegedExecutor {
    pool: PgPool,
}

impl PgPrivilegedExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrivilegedExecutor for PgPrivilegedExecutor {
    async fn execute_select(
        &self,
        sql_text: &str,
        tenant_id: &str,
    ) -> Result<Vec<Record>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let rows: Vec<Value> =
            sqlx::query_scalar("SELECT row_value FROM cuota_execute_select($1, $2) AS r(row_value)")
                .bind(sql_text)
                .bind(tenant_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        rows.into_iter().map(into_record).collect()
    }
}
