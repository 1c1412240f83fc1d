//! Chastor - directory of fractional real-estate investment platforms

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chastor::{config::Args, db::MemoryPlatformStore, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chastor={},info", log_level).into()),
        )
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(tracing_subscriber::fmt::layer))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Chastor - fractional real estate directory");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("DB target: {}", args.db_target);
    match args.selected_uri() {
        Some(_) => info!("MongoDB: {} is set", args.db_target.uri_variable()),
        None => warn!("MongoDB: {} is not set", args.db_target.uri_variable()),
    }
    if let Some(ref db) = args.mongodb_db {
        info!("Database: {}", db);
    }
    info!("======================================");

    let state = match args.fixtures.clone() {
        Some(path) => AppState::with_fixtures(args, MemoryPlatformStore::from_file(&path)?),
        None => AppState::with_mongo(args),
    };

    server::run(Arc::new(state)).await?;

    Ok(())
}
