use serde_json::{Number, Value};

use crate::adapters::RecordStore;
use crate::config::EngineConfig;
use crate::error::QueryError;
use crate::model::{
    AggregateKind, Operator, Predicate, QueryResult, ScopedStatement, TenantScope, numeric_value,
};
use crate::restricted::parser::{ParseError, parse};

/// Interprets restricted SELECT text against a [`RecordStore`].
pub struct RestrictedExecutor<'a> {
    store: &'a dyn RecordStore,
    config: &'a EngineConfig,
}

impl<'a> RestrictedExecutor<'a> {
    pub fn new(store: &'a dyn RecordStore, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Parse, bind to `scope` and run.
    pub async fn execute(&self, sql: &str, scope: &TenantScope) -> Result<QueryResult, QueryError> {
        let scoped = self.prepare(sql, scope)?;
        self.run(&scoped).await
    }

    /// Parse and check the table against the allow-list, then bind to
    /// `scope`. Anything outside the restricted grammar is an error here.
    pub fn prepare(&self, sql: &str, scope: &TenantScope) -> Result<ScopedStatement, QueryError> {
        let parsed = parse(sql)?;
        if !self.config.table_allowed(&parsed.table) {
            return Err(ParseError::TableNotAllowed(parsed.table).into());
        }
        for term in &parsed.dropped_terms {
            tracing::debug!(
                tenant_id = %scope.tenant_id,
                table = %parsed.table,
                term = %term,
                "Dropped WHERE term outside the restricted grammar"
            );
        }

        Ok(parsed.into_scoped(scope))
    }

    pub async fn run(&self, scoped: &ScopedStatement) -> Result<QueryResult, QueryError> {
        let statement = scoped.statement();
        let predicates = store_predicates(scoped.predicates());
        let table = statement.table.as_str();

        match &statement.aggregate {
            AggregateKind::Count => {
                let count = self.store.count(table, &predicates).await?;
                Ok(QueryResult::aggregate(&statement.aggregate, Value::from(count)))
            }
            AggregateKind::Sum(column) | AggregateKind::Avg(column) => {
                let scan_limit = self.config.aggregate_scan_limit;
                let values = self
                    .store
                    .select_column(table, column, &predicates, scan_limit)
                    .await?;
                if values.len() as u64 >= scan_limit {
                    tracing::warn!(
                        tenant_id = %scoped.tenant_id(),
                        table = %table,
                        column = %column,
                        scan_limit,
                        "Aggregate scan hit its row cap, result may be partial"
                    );
                }
                let reduced = reduce(&statement.aggregate, &values);
                Ok(QueryResult::aggregate(&statement.aggregate, float_value(reduced)))
            }
            AggregateKind::None => {
                let limit = self.config.effective_limit(statement.limit);
                let rows = self
                    .store
                    .select(table, &statement.columns(), &predicates, limit)
                    .await?;
                Ok(QueryResult::from_rows(rows))
            }
        }
    }
}

/// Predicates as handed to the store: LIKE literals become `%value%`.
fn store_predicates(predicates: &[Predicate]) -> Vec<Predicate> {
    predicates
        .iter()
        .map(|predicate| match predicate.operator {
            Operator::Like => Predicate::new(
                predicate.field.clone(),
                Operator::Like,
                format!("%{}%", predicate.value.trim_matches('%')),
            ),
            _ => predicate.clone(),
        })
        .collect()
}

/// Sum or mean of `values`; anything non-numeric counts as 0 and an empty
/// set averages to 0.
fn reduce(kind: &AggregateKind, values: &[Value]) -> f64 {
    let sum: f64 = values.iter().map(|v| numeric_value(v).unwrap_or(0.0)).sum();
    match kind {
        AggregateKind::Avg(_) if values.is_empty() => 0.0,
        AggregateKind::Avg(_) => sum / values.len() as f64,
        _ => sum,
    }
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::from(0), Value::Number)
}
