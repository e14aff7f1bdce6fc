use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use featuregate::auth::JwtSessionVerifier;
use featuregate::cli::{Cli, Commands, TokenCommands};
use featuregate::store::postgres::PgStore;
use featuregate::{api, config, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "featuregate=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Serve { port }) => run_server(cfg, port).await,
        Some(Commands::Token { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            db.migrate().await?;
            handle_token_command(&db, command).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    let sessions = JwtSessionVerifier::new(cfg.session_jwt_public_key.as_deref())
        .context("invalid session JWT public key")?;

    let state = Arc::new(AppState {
        db,
        sessions: Arc::new(sessions),
    });

    let app = api::app_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handle_token_command(db: &PgStore, command: TokenCommands) -> anyhow::Result<()> {
    match command {
        TokenCommands::Create { name, created_by } => {
            let (meta, plaintext) = db.create_token(&name, &created_by).await?;
            println!("Token created: {} ({})", meta.name, meta.id);
            println!("Secret (shown once, store it now): {}", plaintext);
        }
        TokenCommands::List => {
            let tokens = db.list_tokens().await?;
            if tokens.is_empty() {
                println!("No tokens.");
            }
            for t in tokens {
                let last_used = t
                    .last_used_at
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| "never".into());
                println!(
                    "{}  {}  created_by={}  last_used={}",
                    t.id, t.name, t.created_by_uid, last_used
                );
            }
        }
        TokenCommands::Delete { id } => {
            let id: Uuid = id.parse().context("token id must be a UUID")?;
            db.delete_token(id).await?;
            println!("Token {} deleted.", id);
        }
    }
    Ok(())
}
