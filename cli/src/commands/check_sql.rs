//! Offline dry run of the validation pipeline: no API, no database.

use cuota_core::model::TenantScope;
use cuota_core::restricted::{ParseError, parse};
use cuota_core::validator::validate;
use cuota_core::{EngineConfig, QueryError};
use serde_json::{Value, json};

use crate::util::print_json;

pub fn inspect(sql: &str, tenant_id: &str, config: &EngineConfig) -> Result<Value, QueryError> {
    let scope = TenantScope::new(config.tenant_column.clone(), tenant_id);
    let safe = validate(sql, &scope)?;
    let parsed = parse(&safe.sql)?;
    if !config.table_allowed(&parsed.table) {
        return Err(ParseError::TableNotAllowed(parsed.table).into());
    }

    Ok(json!({
        "repaired_sql": safe.sql,
        "tenant_injected": safe.tenant_injected,
        "aggregate": safe.aggregate,
        "statement": parsed.into_scoped(&scope),
    }))
}

pub fn run(sql: &str, tenant_id: &str, raw: bool) -> i32 {
    let config = EngineConfig::from_env();
    match inspect(sql, tenant_id, &config) {
        Ok(report) => {
            print_json(&report, raw);
            0
        }
        Err(err) => {
            let body = json!({
                "error": err.code(),
                "message": err.to_string(),
                "user_message": err.user_message(),
            });
            eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string()));
            1
        }
    }
}
