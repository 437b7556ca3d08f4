//! Digital wallet HTTP server.
//!
//! Serves the wallet API from PostgreSQL, or from the in-process store with
//! `--in-memory`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Error;
use digital_wallet::db::{Database, MemoryWalletStore, PgWalletStore};
use digital_wallet::{WalletManager, WalletService};
use dw_server::api::{self, AppState};
use dw_server::config::ServerConfig;
use dw_server::logging;
use pico_args::Arguments;
use tracing::info;

const HELP: &str = "\
Run the digital wallet server

USAGE:
  dw_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL or postgres://postgres@localhost/digital_wallet]

FLAGS:
  --in-memory              Serve from the in-process store instead of PostgreSQL
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND                      Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL                     PostgreSQL connection string
  DB_LOCK_TIMEOUT_MS               Row lock wait limit, 0 disables  [default: 5000]
  WALLET_DEFAULT_CURRENCY          Currency of new wallets  [default: IDR]
  WALLET_TRANSACTION_TIMEOUT_SECS  Withdrawal deadline  [default: 10]
  RUST_LOG                         Log filter
  (See .env.example for all configuration options)
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        in_memory: pargs.contains("--in-memory"),
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url, args.in_memory)?;
    config.validate()?;

    info!("Starting digital wallet server at {}", config.bind);

    let (wallet_service, database): (Arc<dyn WalletService>, Option<Database>) =
        if config.in_memory {
            info!("Using in-memory store, data is lost on shutdown");
            let manager = WalletManager::new(MemoryWalletStore::new(), config.wallet.clone());
            (Arc::new(manager), None)
        } else {
            info!("Connecting to database");
            let db = Database::new(&config.database)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
            db.migrate()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to apply migrations: {}", e))?;
            info!("Database connected successfully");

            let store = PgWalletStore::from_database(&db, &config.database);
            let manager = WalletManager::new(store, config.wallet.clone());
            (Arc::new(manager), Some(db))
        };

    let app = api::create_router(AppState { wallet_service });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");
    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
