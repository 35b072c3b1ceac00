use std::time::Duration;

pub const TENANT_COLUMN_ENV: &str = "CUOTA_TENANT_COLUMN";
pub const DEFAULT_LIMIT_ENV: &str = "CUOTA_DEFAULT_LIMIT";
pub const MAX_LIMIT_ENV: &str = "CUOTA_MAX_LIMIT";
pub const AGGREGATE_SCAN_LIMIT_ENV: &str = "CUOTA_AGGREGATE_SCAN_LIMIT";
pub const PRIVILEGED_TIMEOUT_ENV: &str = "CUOTA_PRIVILEGED_TIMEOUT_MS";
pub const PRIVILEGED_CHANNEL_ENV: &str = "CUOTA_PRIVILEGED_CHANNEL";
pub const DEBUG_SQL_ENV: &str = "CUOTA_DEBUG_SQL";
pub const ALLOWED_TABLES_ENV: &str = "CUOTA_ALLOWED_TABLES";

pub const DEFAULT_TENANT_COLUMN: &str = "cliente_id";
pub const DEFAULT_ROW_LIMIT: u64 = 50;
pub const MAX_ROW_LIMIT: u64 = 200;
pub const AGGREGATE_SCAN_LIMIT: u64 = 10_000;
pub const PRIVILEGED_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_ALLOWED_TABLES: &[&str] = &[
    "contracts",
    "installments",
    "payments",
    "clients",
    "banks",
    "contratos",
    "cuotas",
    "pagos",
    "clientes",
    "bancos",
];

/// Immutable engine settings, built once at startup and shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub tenant_column: String,
    pub default_limit: u64,
    pub max_limit: u64,
    pub aggregate_scan_limit: u64,
    pub privileged_timeout: Duration,
    pub privileged_channel: bool,
    pub debug_sql: bool,
    /// Lowercased table names the restricted interpreter may touch.
    /// Empty disables the check.
    pub allowed_tables: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tenant_column: DEFAULT_TENANT_COLUMN.to_string(),
            default_limit: DEFAULT_ROW_LIMIT,
            max_limit: MAX_ROW_LIMIT,
            aggregate_scan_limit: AGGREGATE_SCAN_LIMIT,
            privileged_timeout: PRIVILEGED_TIMEOUT,
            privileged_channel: true,
            debug_sql: false,
            allowed_tables: DEFAULT_ALLOWED_TABLES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or malformed values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let flag = |key: &str| lookup(key).map(|v| parse_flag(&v));

        let tenant_column = lookup(TENANT_COLUMN_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.tenant_column);

        let default_limit = number(DEFAULT_LIMIT_ENV)
            .filter(|n| *n > 0)
            .unwrap_or(defaults.default_limit);
        let max_limit = number(MAX_LIMIT_ENV)
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_limit)
            .max(default_limit);

        let allowed_tables = match lookup(ALLOWED_TABLES_ENV) {
            Some(raw) => raw
                .split(',')
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            None => defaults.allowed_tables,
        };

        Self {
            tenant_column,
            default_limit,
            max_limit,
            aggregate_scan_limit: number(AGGREGATE_SCAN_LIMIT_ENV)
                .filter(|n| *n > 0)
                .unwrap_or(defaults.aggregate_scan_limit),
            privileged_timeout: number(PRIVILEGED_TIMEOUT_ENV)
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.privileged_timeout),
            privileged_channel: flag(PRIVILEGED_CHANNEL_ENV).unwrap_or(defaults.privileged_channel),
            debug_sql: flag(DEBUG_SQL_ENV).unwrap_or(defaults.debug_sql),
            allowed_tables,
        }
    }

    pub fn table_allowed(&self, table: &str) -> bool {
        self.allowed_tables.is_empty()
            || self
                .allowed_tables
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(table))
    }

    /// Requested limit → effective limit: default when absent, clamped to the max.
    pub fn effective_limit(&self, requested: Option<u64>) -> u64 {
        requested
            .filter(|n| *n > 0)
            .unwrap_or(self.default_limit)
            .min(self.max_limit)
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
