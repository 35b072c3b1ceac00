//! Postgres-backed [`RecordStore`].
//!
//! Statements are assembled with `QueryBuilder`: identifiers pass
//! `is_identifier` and are quoted, every predicate value is bound. Each call
//! runs in its own read-only transaction with `cuota.current_tenant_id` set
//! so row-level security policies see the same tenant as the predicates.

use async_trait::async_trait;
use cuota_core::adapters::RecordStore;
use cuota_core::error::StoreError;
use cuota_core::model::{Operator, Predicate, Record};
use cuota_core::restricted::is_identifier;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

pub struct PgRecordStore {
    pool: PgPool,
    tenant_column: String,
}

impl PgRecordStore {
    pub fn new(pool: PgPool, tenant_column: impl Into<String>) -> Self {
        Self {
            pool,
            tenant_column: tenant_column.into(),
        }
    }

    fn tenant_of<'p>(&self, predicates: &'p [Predicate]) -> Result<&'p str, StoreError> {
        predicates
            .iter()
            .find(|p| p.operator == Operator::Eq && p.field.eq_ignore_ascii_case(&self.tenant_column))
            .map(|p| p.value.as_str())
            .ok_or_else(|| StoreError::Query("statement carries no tenant predicate".to_string()))
    }

    async fn begin_scoped(&self, tenant_id: &str) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        sqlx::query("SELECT set_config('cuota.current_tenant_id', $1, true)")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        Ok(tx)
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn count(&self, table: &str, predicates: &[Predicate]) -> Result<u64, StoreError> {
        let tenant_id = self.tenant_of(predicates)?;
        let mut builder = count_query(table, predicates)?;

        let mut tx = self.begin_scoped(tenant_id).await?;
        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn select(
        &self,
        table: &str,
        columns: &[String],
        predicates: &[Predicate],
        limit: u64,
    ) -> Result<Vec<Record>, StoreError> {
        let tenant_id = self.tenant_of(predicates)?;
        let mut builder = select_query(table, columns, predicates, limit)?;

        let mut tx = self.begin_scoped(tenant_id).await?;
        let rows: Vec<Value> = builder
            .build_query_scalar()
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        rows.into_iter().map(into_record).collect()
    }

    async fn select_column(
        &self,
        table: &str,
        column: &str,
        predicates: &[Predicate],
        limit: u64,
    ) -> Result<Vec<Value>, StoreError> {
        let tenant_id = self.tenant_of(predicates)?;
        let mut builder = column_query(table, column, predicates, limit)?;

        let mut tx = self.begin_scoped(tenant_id).await?;
        let values: Vec<Option<Value>> = builder
            .build_query_scalar()
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        Ok(values.into_iter().map(Option::unwrap_or_default).collect())
    }
}

pub(crate) fn db_error(err: sqlx::Error) -> StoreError {
    StoreError::Query(err.to_string())
}

pub(crate) fn into_record(value: Value) -> Result<Record, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Query(format!("expected a JSON object row, got {other}"))),
    }
}

/// Unquoted Postgres identifiers fold to lower case; quoting keeps that.
fn quote_ident(name: &str) -> Result<String, StoreError> {
    if is_identifier(name) {
        Ok(format!("\"{}\"", name.to_ascii_lowercase()))
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

fn count_query(table: &str, predicates: &[Predicate]) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM ");
    builder.push(quote_ident(table)?);
    push_where(&mut builder, predicates)?;
    Ok(builder)
}

fn select_query(
    table: &str,
    columns: &[String],
    predicates: &[Predicate],
    limit: u64,
) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns
            .iter()
            .map(|column| quote_ident(column))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ")
    };

    // row_to_json keeps the projection order; jsonb would sort the keys.
    let mut builder = QueryBuilder::new("SELECT row_to_json(t) FROM (SELECT ");
    builder.push(projection);
    builder.push(" FROM ");
    builder.push(quote_ident(table)?);
    push_where(&mut builder, predicates)?;
    push_limit(&mut builder, limit);
    builder.push(") t");
    Ok(builder)
}

fn column_query(
    table: &str,
    column: &str,
    predicates: &[Predicate],
    limit: u64,
) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    let mut builder = QueryBuilder::new("SELECT to_json(");
    builder.push(quote_ident(column)?);
    builder.push(") FROM ");
    builder.push(quote_ident(table)?);
    push_where(&mut builder, predicates)?;
    push_limit(&mut builder, limit);
    Ok(builder)
}

fn push_limit(builder: &mut QueryBuilder<'static, Postgres>, limit: u64) {
    builder.push(" LIMIT ");
    builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
}

/// Range comparisons against numeric literals compare numerically. Everything
/// else compares against the column's text form, so equality works the same
/// for text, uuid, enum and integer tenant columns.
fn push_where(builder: &mut QueryBuilder<'static, Postgres>, predicates: &[Predicate]) -> Result<(), StoreError> {
    for (idx, predicate) in predicates.iter().enumerate() {
        builder.push(if idx == 0 { " WHERE " } else { " AND " });
        let column = quote_ident(&predicate.field)?;

        if predicate.operator == Operator::Like {
            builder.push(format!("{column}::text ILIKE "));
            builder.push_bind(predicate.value.clone());
            continue;
        }

        match numeric_bound(predicate) {
            Some(number) => {
                builder.push(format!("{column} {} ", predicate.operator.as_sql()));
                builder.push_bind(number);
            }
            None => {
                builder.push(format!("{column}::text {} ", predicate.operator.as_sql()));
                builder.push_bind(text_literal(&predicate.value));
            }
        }
    }
    Ok(())
}

fn numeric_bound(predicate: &Predicate) -> Option<f64> {
    if matches!(predicate.operator, Operator::Eq | Operator::Like) {
        return None;
    }
    predicate
        .value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

fn text_literal(value: &str) -> String {
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
        value.to_ascii_lowercase()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;

    use super::*;

    fn tenant() -> Predicate {
        Predicate::new("cliente_id", Operator::Eq, "t1")
    }

    async fn db_pool_if_available() -> Option<PgPool> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return None;
        };

        PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .ok()
    }

    #[test]
    fn count_binds_every_value() {
        let predicates = vec![
            Predicate::new("estado", Operator::Eq, "vencida"),
            Predicate::new("monto", Operator::Gt, "1500"),
            Predicate::new("nombre", Operator::Like, "%perez%"),
            tenant(),
        ];
        let builder = count_query("Cuotas", &predicates).expect("query should build");

        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM \"cuotas\" WHERE \"estado\"::text = $1 AND \"monto\" > $2 \
             AND \"nombre\"::text ILIKE $3 AND \"cliente_id\"::text = $4"
        );
    }

    #[test]
    fn select_wraps_rows_as_json() {
        let columns = vec!["numero_contrato".to_string(), "monto".to_string()];
        let builder = select_query("contratos", &columns, &[tenant()], 25).expect("query should build");

        assert_eq!(
            builder.sql(),
            "SELECT row_to_json(t) FROM (SELECT \"numero_contrato\", \"monto\" FROM \"contratos\" \
             WHERE \"cliente_id\"::text = $1 LIMIT $2) t"
        );
    }

    #[test]
    fn empty_projection_selects_everything() {
        let builder = select_query("pagos", &[], &[tenant()], 10).expect("query should build");
        assert!(builder.sql().starts_with("SELECT row_to_json(t) FROM (SELECT * FROM \"pagos\""));
    }

    #[test]
    fn column_scan_uses_to_json() {
        let builder = column_query("pagos", "monto", &[tenant()], 10_000).expect("query should build");
        assert_eq!(
            builder.sql(),
            "SELECT to_json(\"monto\") FROM \"pagos\" WHERE \"cliente_id\"::text = $1 LIMIT $2"
        );
    }

    #[test]
    fn hostile_identifiers_are_refused() {
        let predicates = vec![Predicate::new("x\" OR 1=1 --", Operator::Eq, "a")];
        assert!(matches!(
            count_query("pagos", &predicates),
            Err(StoreError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            count_query("pagos; DROP TABLE pagos", &[]),
            Err(StoreError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn boolean_literals_match_text_form() {
        assert_eq!(text_literal("TRUE"), "true");
        assert_eq!(text_literal("Vencida"), "Vencida");
    }

    #[test]
    fn non_object_rows_are_rejected() {
        assert!(into_record(json!({"a": 1})).is_ok());
        assert!(into_record(json!([1, 2])).is_err());
    }

    #[tokio::test]
    async fn unscoped_calls_fail_before_touching_the_database() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://cuota@127.0.0.1:1/cuota")
            .expect("lazy pool should build");
        let store = PgRecordStore::new(pool, "cliente_id");

        let err = store
            .count("pagos", &[Predicate::new("estado", Operator::Eq, "x")])
            .await
            .expect_err("count without tenant must fail");
        assert!(matches!(err, StoreError::Query(_)));
    }

    #[tokio::test]
    async fn reads_tenant_rows_from_live_database() {
        let Some(pool) = db_pool_if_available().await else {
            return;
        };

        sqlx::query(
            "CREATE TEMP TABLE IF NOT EXISTS cuotas_scratch \
             (numero_contrato text, monto numeric(12,2), estado text, cliente_id text)",
        )
        .execute(&pool)
        .await
        .expect("temp table should be created");
        sqlx::query("TRUNCATE cuotas_scratch")
            .execute(&pool)
            .await
            .expect("temp table should truncate");
        sqlx::query(
            "INSERT INTO cuotas_scratch VALUES \
             ('C-001', 1500.00, 'vencida', 't1'), \
             ('C-002', 800.50, 'pagada', 't1'), \
             ('C-003', 990.00, 'vencida', 't2')",
        )
        .execute(&pool)
        .await
        .expect("rows should insert");

        let store = PgRecordStore::new(pool, "cliente_id");
        let overdue = vec![Predicate::new("estado", Operator::Eq, "vencida"), tenant()];

        assert_eq!(store.count("cuotas_scratch", &overdue).await.expect("count"), 1);

        let rows = store
            .select("cuotas_scratch", &["numero_contrato".to_string()], &[tenant()], 10)
            .await
            .expect("select");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["numero_contrato"]);

        let amounts = store
            .select_column(
                "cuotas_scratch",
                "monto",
                &[Predicate::new("monto", Operator::Gte, "1000"), tenant()],
                10,
            )
            .await
            .expect("column scan");
        assert_eq!(amounts, vec![json!(1500.00)]);
    }
}
