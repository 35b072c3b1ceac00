use clap::{Parser, Subcommand};

mod commands;
mod util;

use util::exit_error;

#[derive(Parser)]
#[command(
    name = "cuota",
    version,
    about = "Cuota CLI: ask the chat API about contracts and payments, or dry-run generated SQL"
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "CUOTA_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Print compact single-line JSON
    #[arg(long, global = true)]
    raw: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API and database health
    Health,
    /// Ask a question in natural language on behalf of a tenant
    Ask {
        /// The question, e.g. "¿Cuántas cuotas vencidas tengo?"
        question: String,
        /// Earlier conversation the generator may use
        #[arg(long)]
        prior_context: Option<String>,
        /// Tenant the question is asked for
        #[arg(long, env = "CUOTA_TENANT_ID")]
        tenant_id: Option<String>,
    },
    /// Validate, repair and parse SQL locally without executing it
    CheckSql {
        /// SQL text as the generator would produce it
        sql: String,
        /// Tenant the statement must be scoped to
        #[arg(long, env = "CUOTA_TENANT_ID")]
        tenant_id: Option<String>,
    },
}

fn require_tenant(tenant_id: Option<String>) -> String {
    tenant_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| {
            exit_error(
                "tenant_id is required",
                Some("Set --tenant-id or CUOTA_TENANT_ID env var"),
            )
        })
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Health => commands::health::run(&cli.api_url, cli.raw).await,
        Commands::Ask {
            question,
            prior_context,
            tenant_id,
        } => {
            let tenant_id = require_tenant(tenant_id);
            commands::ask::run(
                &cli.api_url,
                &tenant_id,
                &question,
                prior_context.as_deref(),
                cli.raw,
            )
            .await
        }
        Commands::CheckSql { sql, tenant_id } => {
            let tenant_id = require_tenant(tenant_id);
            commands::check_sql::run(&sql, &tenant_id, cli.raw)
        }
    };

    std::process::exit(code);
}
