use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use vigil_core::{
    AnalysisStore, MemoryAnalysisStore, OpenAiVisionClient, PgAnalysisStore, VigilConfig,
    VisionClientConfig,
};

use vigil_server::http::{self, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "vigil.toml")]
    config: String,

    /// Check database connectivity and exit
    #[arg(long)]
    health: bool,

    /// Keep analyses in process memory instead of PostgreSQL
    #[arg(long, conflicts_with = "health")]
    memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match VigilConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let vision = OpenAiVisionClient::new(VisionClientConfig::from(&config.vision))?;
    if config.vision.api_key.trim().is_empty() {
        tracing::warn!("No vision API key configured; /api/analyze will return 500 until one is set");
    }

    // Shutdown signal
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    if args.memory {
        tracing::warn!("Using in-memory store; analyses are lost on exit");
        let store: Arc<dyn AnalysisStore> = Arc::new(MemoryAnalysisStore::new());
        let state = Arc::new(HttpState {
            store,
            vision: Arc::new(vision),
            config,
        });
        return http::start_http_server(state, tx.subscribe()).await;
    }

    // Connect to DB
    let pool = match vigil_core::db::connect(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        let result = vigil_core::db::health_check(&pool).await;
        pool.close().await;
        match result {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ Vigil DB health check passed");
        return Ok(());
    }

    let state = Arc::new(HttpState {
        store: Arc::new(PgAnalysisStore::new(pool.clone())),
        vision: Arc::new(vision),
        config,
    });

    let served = http::start_http_server(state, tx.subscribe()).await;

    pool.close().await;
    tracing::info!("Database pool closed");

    served
}
