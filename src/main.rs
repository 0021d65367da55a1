use anyhow::Result;
use authgate_core::domain::StringUuid;
use authgate_core::jwt::JwtManager;
use authgate_core::config::{Config, JwtConfig};
use authgate_core::{server, telemetry};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "authgate-core")]
#[command(about = "Multi-tenant authorization service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (default)
    Serve,

    /// Sign a bearer credential with the configured key
    IssueToken {
        #[command(subcommand)]
        kind: TokenCommand,
    },
}

#[derive(Subcommand)]
enum TokenCommand {
    /// Platform operator token
    System {
        #[arg(long)]
        username: String,
    },
    /// Tenant application token
    App {
        #[arg(long)]
        tenant_id: StringUuid,
        #[arg(long)]
        tenant_code: String,
    },
    /// End-user token
    User {
        #[arg(long)]
        user_id: StringUuid,
        #[arg(long)]
        tenant_id: StringUuid,
        #[arg(long)]
        username: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config = Config::from_env()?;
            let prometheus_handle = telemetry::init(&config.telemetry)?;
            info!("Starting Authgate Core");
            info!(
                backend = ?config.store_backend,
                path_match_mode = ?config.authz.path_match_mode,
                "HTTP server listening on {}",
                config.http_addr()
            );
            server::run(config, prometheus_handle).await
        }
        Command::IssueToken { kind } => {
            let jwt = JwtManager::new(JwtConfig::from_env()?)?;
            let token = match kind {
                TokenCommand::System { username } => jwt.create_system_token(&username)?,
                TokenCommand::App {
                    tenant_id,
                    tenant_code,
                } => jwt.create_app_token(tenant_id, &tenant_code)?,
                TokenCommand::User {
                    user_id,
                    tenant_id,
                    username,
                } => jwt.create_user_token(user_id, tenant_id, username.as_deref())?,
            };
            println!("{}", token);
            Ok(())
        }
    }
}
