use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row as returned by the record store, column order preserved.
pub type Record = serde_json::Map<String, Value>;

/// A natural-language question asked on behalf of one tenant.
#[derive(Debug, Clone)]
pub struct Question {
    pub text: String,
    pub tenant_id: String,
    pub prior_context: Option<String>,
}

impl Question {
    pub fn new(text: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tenant_id: tenant_id.into(),
            prior_context: None,
        }
    }

    pub fn with_prior_context(mut self, prior_context: Option<String>) -> Self {
        self.prior_context = prior_context
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }
}

/// SQL proposed by the generator. Untrusted until validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedStatement {
    pub sql_text: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Case-insensitive substring match; `ILIKE` in the source text lands here too.
    Like,
}

impl Operator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.to_ascii_uppercase().as_str() {
            "=" => Some(Operator::Eq),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Gte),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Lte),
            "LIKE" | "ILIKE" => Some(Operator::Like),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "ILIKE",
        }
    }
}

/// A single `field op literal` filter. The value is an opaque literal and is
/// only ever handed to the store as a bound parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub operator: Operator,
    pub value: String,
}

impl Predicate {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "column", rename_all = "snake_case")]
pub enum AggregateKind {
    None,
    Count,
    Sum(String),
    Avg(String),
}

impl AggregateKind {
    pub fn is_aggregate(&self) -> bool {
        !matches!(self, AggregateKind::None)
    }

    /// Canonical result key the composer recognises for this aggregate.
    pub fn result_key(&self) -> Option<&'static str> {
        match self {
            AggregateKind::None => None,
            AggregateKind::Count => Some("count"),
            AggregateKind::Sum(_) => Some("total"),
            AggregateKind::Avg(_) => Some("average"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionItem {
    Wildcard,
    Column(String),
    Aggregate(AggregateKind),
}

/// Binding of rows to the requesting tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    pub column: String,
    pub tenant_id: String,
}

impl TenantScope {
    pub fn new(column: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            tenant_id: tenant_id.into(),
        }
    }

    pub fn predicate(&self) -> Predicate {
        Predicate::new(self.column.clone(), Operator::Eq, self.tenant_id.clone())
    }

    pub fn binds(&self, field: &str) -> bool {
        field.eq_ignore_ascii_case(&self.column)
    }
}

/// Structured form of a restricted `SELECT`, as extracted from SQL text.
///
/// Not executable on its own: execution takes a [`ScopedStatement`], which
/// can only be built through [`ParsedStatement::into_scoped`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedStatement {
    pub table: String,
    pub projection: Vec<ProjectionItem>,
    pub predicates: Vec<Predicate>,
    pub limit: Option<u64>,
    pub aggregate: AggregateKind,
    /// WHERE terms that did not match `field op literal` and were left out.
    pub dropped_terms: Vec<String>,
}

impl ParsedStatement {
    /// Columns requested by a plain projection; empty means every column.
    pub fn columns(&self) -> Vec<String> {
        if self
            .projection
            .iter()
            .any(|item| matches!(item, ProjectionItem::Wildcard))
        {
            return Vec::new();
        }
        self.projection
            .iter()
            .filter_map(|item| match item {
                ProjectionItem::Column(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Bind the statement to `scope`. Any tenant-column predicate that came
    /// from the text is discarded and the scope's own predicate is appended,
    /// so applying this twice still yields exactly one tenant predicate.
    pub fn into_scoped(self, scope: &TenantScope) -> ScopedStatement {
        let mut predicates: Vec<Predicate> = self
            .predicates
            .into_iter()
            .filter(|predicate| !scope.binds(&predicate.field))
            .collect();
        predicates.push(scope.predicate());

        ScopedStatement {
            statement: ParsedStatement {
                predicates,
                ..self
            },
            tenant_id: scope.tenant_id.clone(),
        }
    }
}

/// A [`ParsedStatement`] carrying the tenant predicate. The only type the
/// restricted executor will run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopedStatement {
    #[serde(flatten)]
    statement: ParsedStatement,
    tenant_id: String,
}

impl ScopedStatement {
    pub fn statement(&self) -> &ParsedStatement {
        &self.statement
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.statement.predicates
    }

    /// Re-apply a scope. Used to prove enforcement is idempotent.
    pub fn rescoped(self, scope: &TenantScope) -> ScopedStatement {
        self.statement.into_scoped(scope)
    }
}

/// Rows or aggregate produced for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Record>,
    pub row_count: u64,
    pub scalar: Option<f64>,
}

impl QueryResult {
    pub fn from_rows(rows: Vec<Record>) -> Self {
        let row_count = rows.len() as u64;
        Self {
            rows,
            row_count,
            scalar: None,
        }
    }

    /// Single-row result for an aggregate, keyed by the canonical name.
    pub fn aggregate(kind: &AggregateKind, value: Value) -> Self {
        let key = kind.result_key().unwrap_or("value");
        let scalar = numeric_value(&value);
        let mut record = Record::new();
        record.insert(key.to_string(), value);
        Self {
            rows: vec![record],
            row_count: 1,
            scalar,
        }
    }

    /// Normalise rows coming back from the privileged channel. A one-row,
    /// one-column answer to an aggregate statement is re-keyed canonically
    /// (Postgres names these `count`, `sum`, `avg` or whatever alias the
    /// generator chose).
    pub fn from_channel_rows(rows: Vec<Record>, kind: &AggregateKind) -> Self {
        if kind.is_aggregate() && rows.len() == 1 && rows[0].len() == 1 {
            if let Some(value) = rows[0].values().next() {
                if numeric_value(value).is_some() || value.is_null() {
                    let value = if value.is_null() {
                        Value::from(0)
                    } else {
                        value.clone()
                    };
                    return Self::aggregate(kind, value);
                }
            }
        }
        Self::from_rows(rows)
    }
}

/// Numeric view of a field value; numeric strings count, anything else does not.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// One presented `label: value` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentedField {
    pub label: String,
    pub value: String,
    pub key: String,
}

/// Response handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    /// Final natural-language answer
    pub answer_text: String,
    /// Matching rows with internal fields removed (plain projections only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Record>>,
    /// Executed SQL, only present when SQL debugging is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_sql: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parsed_with(predicates: Vec<Predicate>) -> ParsedStatement {
        ParsedStatement {
            table: "installments".to_string(),
            projection: vec![ProjectionItem::Aggregate(AggregateKind::Count)],
            predicates,
            limit: None,
            aggregate: AggregateKind::Count,
            dropped_terms: Vec::new(),
        }
    }

    #[test]
    fn scoping_appends_tenant_predicate() {
        let scope = TenantScope::new("cliente_id", "t1");
        let scoped = parsed_with(vec![Predicate::new("estado_pago_id", Operator::Eq, "x")])
            .into_scoped(&scope);

        assert_eq!(
            scoped.predicates(),
            &[
                Predicate::new("estado_pago_id", Operator::Eq, "x"),
                Predicate::new("cliente_id", Operator::Eq, "t1"),
            ]
        );
    }

    #[test]
    fn scoping_replaces_foreign_tenant_value() {
        let scope = TenantScope::new("cliente_id", "t1");
        let scoped = parsed_with(vec![Predicate::new("CLIENTE_ID", Operator::Eq, "t2")])
            .into_scoped(&scope);

        assert_eq!(scoped.predicates(), &[Predicate::new("cliente_id", Operator::Eq, "t1")]);
        assert_eq!(scoped.tenant_id(), "t1");
    }

    #[test]
    fn scoping_twice_keeps_exactly_one_tenant_predicate() {
        let scope = TenantScope::new("cliente_id", "t1");
        let scoped = parsed_with(Vec::new()).into_scoped(&scope).rescoped(&scope);

        let tenant_predicates = scoped
            .predicates()
            .iter()
            .filter(|predicate| scope.binds(&predicate.field))
            .count();
        assert_eq!(tenant_predicates, 1);
    }

    #[test]
    fn channel_count_row_is_rekeyed() {
        let mut row = Record::new();
        row.insert("count".to_string(), json!(7));
        let result = QueryResult::from_channel_rows(vec![row], &AggregateKind::Count);
        assert_eq!(result.scalar, Some(7.0));
        assert_eq!(result.rows[0].get("count"), Some(&json!(7)));

        let mut row = Record::new();
        row.insert("sum".to_string(), json!("1500.5"));
        let result =
            QueryResult::from_channel_rows(vec![row], &AggregateKind::Sum("monto".to_string()));
        assert_eq!(result.scalar, Some(1500.5));
        assert!(result.rows[0].contains_key("total"));
    }

    #[test]
    fn channel_null_aggregate_becomes_zero() {
        let mut row = Record::new();
        row.insert("avg".to_string(), Value::Null);
        let result =
            QueryResult::from_channel_rows(vec![row], &AggregateKind::Avg("monto".to_string()));
        assert_eq!(result.scalar, Some(0.0));
    }

    #[test]
    fn numeric_value_accepts_numeric_strings_only() {
        assert_eq!(numeric_value(&json!(" 12.5 ")), Some(12.5));
        assert_eq!(numeric_value(&json!(3)), Some(3.0));
        assert_eq!(numeric_value(&json!("abc")), None);
        assert_eq!(numeric_value(&json!(true)), None);
    }
}
