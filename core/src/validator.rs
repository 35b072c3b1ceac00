//! Text-level safety gate for generated SQL.
//!
//! Rejects anything that is not a single SELECT or that mentions a
//! data-modifying keyword, and makes sure the tenant predicate is present,
//! injecting it when it is not. This is a best-effort repair of the text;
//! the restricted executor applies the tenant scope structurally on its own.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::QueryError;
use crate::model::{AggregateKind, TenantScope};
use crate::restricted::lexer::{Token, TokenKind, tokenize};
use crate::restricted::parser::{SET_OPERATIONS, detect_aggregate, find_top_level, is_identifier};

pub const DENIED_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "CREATE", "TRUNCATE", "EXEC", "EXECUTE",
    "GRANT", "REVOKE",
];

static DENY_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", DENIED_KEYWORDS.join("|")))
        .expect("valid deny-list regex")
});
static SELECT_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^SELECT\b").expect("valid select regex"));
static BRANCHING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:OR|NOT)\b").expect("valid branching regex"));

const SUFFIX_CLAUSES: &[&str] = &["GROUP", "ORDER", "LIMIT", "OFFSET", "HAVING", "FETCH"];

/// SQL that passed validation, with the tenant predicate guaranteed in the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafeSql {
    /// Comment-free statement without a trailing `;`.
    pub sql: String,
    pub aggregate: AggregateKind,
    pub tenant_injected: bool,
}

pub fn validate(sql: &str, scope: &TenantScope) -> Result<SafeSql, QueryError> {
    if let Some(found) = DENY_LIST_RE.find(sql) {
        return Err(QueryError::UnsafeStatement(format!(
            "forbidden keyword {}",
            found.as_str().to_ascii_uppercase()
        )));
    }

    let stripped = strip_comments(sql)
        .ok_or_else(|| QueryError::UnsafeStatement("unterminated comment".to_string()))?;
    let body = stripped.trim();
    if !SELECT_START_RE.is_match(body) {
        return Err(QueryError::UnsafeStatement(
            "statement must start with SELECT".to_string(),
        ));
    }
    let body = body.strip_suffix(';').map_or(body, str::trim_end);

    let tokens = tokenize(body)
        .map_err(|err| QueryError::UnsafeStatement(format!("malformed statement: {err}")))?;
    if tokens.iter().any(|t| t.kind == TokenKind::Semicolon) {
        return Err(QueryError::UnsafeStatement("multiple statements".to_string()));
    }
    if let Some(op) = tokens.iter().find(|t| t.is_any_keyword(SET_OPERATIONS)) {
        return Err(QueryError::UnsafeStatement(format!(
            "set operation {}",
            body[op.span.clone()].to_ascii_uppercase()
        )));
    }
    if tokens.iter().skip(1).any(|t| t.is_keyword("SELECT")) {
        return Err(QueryError::UnsafeStatement("nested SELECT".to_string()));
    }

    if !is_identifier(&scope.column) {
        return Err(QueryError::Configuration(format!(
            "tenant column '{}' is not a plain identifier",
            scope.column
        )));
    }

    let tenant_injected = !has_tenant_predicate(body, scope)?;
    let sql = if tenant_injected {
        inject_tenant_predicate(body, &tokens, scope)
    } else {
        body.to_string()
    };

    Ok(SafeSql {
        sql,
        aggregate: detect_aggregate(&tokens),
        tenant_injected,
    })
}

/// `column = 'tenant'` as a SQL literal predicate.
pub fn tenant_predicate_sql(scope: &TenantScope) -> String {
    format!("{} = '{}'", scope.column, scope.tenant_id.replace('\'', "''"))
}

/// True when the text already binds the tenant column to this tenant, as
/// `col = 'id'`, `col='id'` or `alias.col = 'id'`. A statement containing OR
/// or NOT never counts, since the binding may sit in one branch or be negated.
fn has_tenant_predicate(body: &str, scope: &TenantScope) -> Result<bool, QueryError> {
    if BRANCHING_RE.is_match(body) {
        return Ok(false);
    }
    let pattern = format!(
        r"(?:^|[^A-Za-z0-9_.])(?:[A-Za-z_][A-Za-z0-9_]*\.)?(?i:{})\s*=\s*'{}'(?:[^']|$)",
        regex::escape(&scope.column),
        regex::escape(&scope.tenant_id.replace('\'', "''")),
    );
    let re = Regex::new(&pattern).map_err(|err| QueryError::Configuration(err.to_string()))?;
    Ok(re.is_match(body))
}

/// AND the predicate into an existing top-level WHERE (wrapping the old
/// condition in parentheses) or add a WHERE ahead of GROUP/ORDER/LIMIT.
fn inject_tenant_predicate(body: &str, tokens: &[Token], scope: &TenantScope) -> String {
    let predicate = tenant_predicate_sql(scope);
    let from = find_top_level(tokens, 0, &["FROM"]).unwrap_or(0);
    let where_idx = find_top_level(tokens, from, &["WHERE"]);
    let suffix_start = find_top_level(tokens, where_idx.unwrap_or(from), SUFFIX_CLAUSES)
        .map_or(body.len(), |idx| tokens[idx].span.start);
    let rest = &body[suffix_start..];

    match where_idx {
        Some(idx) => {
            let head = &body[..tokens[idx].span.end];
            let condition = body[tokens[idx].span.end..suffix_start].trim();
            if condition.is_empty() {
                append_clause(format!("{head} {predicate}"), rest)
            } else {
                append_clause(format!("{head} ({condition}) AND {predicate}"), rest)
            }
        }
        None => append_clause(
            format!("{} WHERE {predicate}", body[..suffix_start].trim_end()),
            rest,
        ),
    }
}

fn append_clause(head: String, rest: &str) -> String {
    let rest = rest.trim();
    if rest.is_empty() {
        head
    } else {
        format!("{head} {rest}")
    }
}

/// Replace `-- …` and `/* … */` comments with a space, leaving quoted text
/// alone. `None` on an unterminated block comment.
fn strip_comments(sql: &str) -> Option<String> {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((idx, ch)) = chars.next() {
        if let Some(open) = quote {
            out.push(ch);
            if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                out.push(ch);
            }
            '-' if sql[idx..].starts_with("--") => {
                for (_, skipped) in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
                out.push(' ');
            }
            '/' if sql[idx..].starts_with("/*") => {
                let close = sql[idx + 2..].find("*/")? + idx + 2;
                while chars.peek().is_some_and(|(next, _)| *next < close + 2) {
                    chars.next();
                }
                out.push(' ');
            }
            _ => out.push(ch),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restricted::parser::parse;

    fn scope() -> TenantScope {
        TenantScope::new("cliente_id", "t1")
    }

    fn unsafe_reason(sql: &str) -> String {
        match validate(sql, &scope()) {
            Err(QueryError::UnsafeStatement(reason)) => reason,
            other => panic!("expected unsafe statement for {sql:?}, got {other:?}"),
        }
    }

    #[test]
    fn deny_listed_keywords_are_rejected_in_any_case() {
        for sql in [
            "SELECT * FROM usuarios; DROP TABLE usuarios;",
            "select * from pagos where 1 = 1; delete from pagos",
            "SELECT * FROM pagos /* TrUnCaTe */",
            "-- grant all\nSELECT * FROM pagos",
            "UPDATE cuotas SET monto = 0",
            "SELECT exec FROM x",
        ] {
            assert!(unsafe_reason(sql).starts_with("forbidden keyword"), "{sql}");
        }
    }

    #[test]
    fn keywords_inside_identifiers_are_fine() {
        let safe = validate(
            "SELECT updated_at, fecha_creacion, created_by FROM pagos WHERE cliente_id = 't1'",
            &scope(),
        )
        .expect("should validate");
        assert!(!safe.tenant_injected);
    }

    #[test]
    fn must_be_a_single_select() {
        let not_select = "statement must start with SELECT";
        assert_eq!(unsafe_reason("WITH x AS (SELECT 1) SELECT * FROM x"), not_select);
        assert_eq!(unsafe_reason("EXPLAIN SELECT * FROM pagos"), not_select);
        assert_eq!(unsafe_reason("SELECT 1; SELECT 2"), "multiple statements");
        assert_eq!(unsafe_reason("SELECT * FROM pagos;;"), "multiple statements");
        assert_eq!(unsafe_reason("SELECT * /* open"), "unterminated comment");
    }

    #[test]
    fn set_operations_and_nested_selects_are_rejected() {
        assert_eq!(
            unsafe_reason("SELECT * FROM pagos WHERE cliente_id = 't1' UNION SELECT * FROM pagos"),
            "set operation UNION"
        );
        assert_eq!(
            unsafe_reason("SELECT monto FROM pagos WHERE cliente_id = 't1' except select monto FROM pagos"),
            "set operation EXCEPT"
        );
        assert_eq!(
            unsafe_reason(
                "SELECT (SELECT SUM(monto) FROM pagos) AS total FROM clientes WHERE cliente_id = 't1'"
            ),
            "nested SELECT"
        );
        assert_eq!(
            unsafe_reason("SELECT * FROM pagos WHERE cliente_id IN (SELECT cliente_id FROM clientes)"),
            "nested SELECT"
        );
    }

    #[test]
    fn keywords_inside_literals_do_not_count_as_clauses() {
        let safe = validate(
            "SELECT * FROM pagos WHERE concepto = 'union select' AND cliente_id = 't1'",
            &scope(),
        )
        .expect("should validate");
        assert!(!safe.tenant_injected);
    }

    #[test]
    fn negated_tenant_predicate_triggers_injection() {
        let safe = validate("SELECT * FROM pagos WHERE NOT cliente_id = 't1'", &scope())
            .expect("should validate");
        assert!(safe.tenant_injected);
        assert_eq!(
            safe.sql,
            "SELECT * FROM pagos WHERE (NOT cliente_id = 't1') AND cliente_id = 't1'"
        );
    }

    #[test]
    fn leading_comments_and_trailing_semicolon_are_accepted() {
        let safe = validate("/* informe */ SELECT * FROM pagos WHERE cliente_id = 't1';", &scope())
            .expect("should validate");
        assert_eq!(safe.sql, "SELECT * FROM pagos WHERE cliente_id = 't1'");
    }

    #[test]
    fn injects_where_when_absent() {
        let safe = validate("SELECT COUNT(*) FROM cuotas", &scope()).expect("should validate");
        assert_eq!(safe.sql, "SELECT COUNT(*) FROM cuotas WHERE cliente_id = 't1'");
        assert!(safe.tenant_injected);
        assert_eq!(safe.aggregate, AggregateKind::Count);

        let safe = validate("SELECT * FROM pagos ORDER BY fecha_pago DESC LIMIT 5", &scope())
            .expect("should validate");
        assert_eq!(
            safe.sql,
            "SELECT * FROM pagos WHERE cliente_id = 't1' ORDER BY fecha_pago DESC LIMIT 5"
        );
    }

    #[test]
    fn ands_into_existing_where() {
        let safe = validate(
            "SELECT SUM(monto) FROM pagos WHERE monto > 100 OR banco = 'Sur' LIMIT 5",
            &scope(),
        )
        .expect("should validate");
        assert_eq!(
            safe.sql,
            "SELECT SUM(monto) FROM pagos WHERE (monto > 100 OR banco = 'Sur') AND cliente_id = 't1' LIMIT 5"
        );
        assert_eq!(safe.aggregate, AggregateKind::Sum("monto".to_string()));
    }

    #[test]
    fn existing_tenant_predicate_forms_are_recognised() {
        for sql in [
            "SELECT * FROM pagos WHERE cliente_id = 't1'",
            "SELECT * FROM pagos WHERE CLIENTE_ID='t1'",
            "SELECT * FROM pagos p WHERE p.cliente_id = 't1' AND monto > 5",
        ] {
            let safe = validate(sql, &scope()).expect("should validate");
            assert!(!safe.tenant_injected, "{sql}");
            assert_eq!(safe.sql, sql);
        }
    }

    #[test]
    fn foreign_or_partial_tenant_values_trigger_injection() {
        for sql in [
            "SELECT * FROM pagos WHERE cliente_id = 't2'",
            "SELECT * FROM pagos WHERE cliente_id = 't10'",
            "SELECT * FROM pagos WHERE otro_cliente_id = 't1'",
            "SELECT * FROM pagos WHERE cliente_id = 't1' OR 1 = 1",
        ] {
            let safe = validate(sql, &scope()).expect("should validate");
            assert!(safe.tenant_injected, "{sql}");
            assert!(safe.sql.ends_with("AND cliente_id = 't1'"), "{}", safe.sql);
        }
    }

    #[test]
    fn tenant_id_quotes_are_escaped() {
        let scope = TenantScope::new("cliente_id", "o'hara");
        let safe = validate("SELECT * FROM pagos", &scope).expect("should validate");
        assert_eq!(safe.sql, "SELECT * FROM pagos WHERE cliente_id = 'o''hara'");

        let again = validate(&safe.sql, &scope).expect("should validate");
        assert!(!again.tenant_injected);
    }

    #[test]
    fn comment_markers_inside_literals_are_kept() {
        let safe = validate(
            "SELECT * FROM pagos WHERE referencia = 'a--b' AND cliente_id = 't1'",
            &scope(),
        )
        .expect("should validate");
        assert!(safe.sql.contains("'a--b'"));
    }

    #[test]
    fn repaired_text_parses_with_original_predicates() {
        let safe = validate("SELECT * FROM pagos WHERE monto > 100 LIMIT 5", &scope())
            .expect("should validate");
        let parsed = parse(&safe.sql).expect("repaired sql should parse");
        assert_eq!(parsed.predicates.len(), 2);
        assert_eq!(parsed.predicates[0].field, "monto");
        assert_eq!(parsed.predicates[1].field, "cliente_id");
        assert_eq!(parsed.limit, Some(5));
    }
}
