//! Foundry MES server entry point.
//!
//! # Environment Variables
//!
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `BIND_ADDRESS`: HTTP listen address (default: "0.0.0.0:8080")
//! - `RUST_LOG`: Logging level (default: info)
//! - see `config::AppConfig::from_env` for scheduler/generator/CORS overrides

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use foundry_mes::clock::SystemClock;
use foundry_mes::config::AppConfig;
use foundry_mes::http::{self, AppState};
use foundry_mes::repository::PostgresRepository;
use foundry_mes::rng::SharedRng;

#[derive(Parser, Debug)]
#[command(name = "foundry-mes")]
#[command(about = "Fab control plane: dispatch scheduler, lot generator, lifecycle processor, anomaly safety circuit")]
#[command(version)]
struct CliArgs {
    /// Override DATABASE_URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Override BIND_ADDRESS
    #[arg(long, env = "BIND_ADDRESS")]
    bind_address: Option<String>,

    /// Shorthand for overriding just the port of BIND_ADDRESS
    #[arg(short, long)]
    port: Option<u16>,
}

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();

    let config = match AppConfig::from_env(args.database_url, args.bind_address, args.port) {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {e:#}");
            return ExitCode::from(1);
        }
    };

    info!("connecting to {}", redact_database_url(&config.database_url));

    let mut attempt = 0;
    let repo = loop {
        attempt += 1;
        match PostgresRepository::connect(&config.database_url).await {
            Ok(repo) => break repo,
            Err(e) if attempt < RETRY_ATTEMPTS => {
                warn!("repository connection attempt {attempt} failed: {e}, retrying...");
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => {
                error!("repository unreachable after {RETRY_ATTEMPTS} attempts: {e}");
                return ExitCode::from(2);
            }
        }
    };

    if let Err(e) = repo.run_migrations().await {
        error!("migration failure: {e}");
        return ExitCode::from(2);
    }

    let repo: foundry_mes::repository::SharedRepository = Arc::new(repo);
    let clock: foundry_mes::clock::SharedClock = Arc::new(SystemClock);
    let rng = match config.random_seed {
        Some(seed) => SharedRng::from_seed(seed),
        None => SharedRng::from_entropy(),
    };

    let state = AppState::new(
        repo,
        clock,
        rng,
        config.scheduler.clone(),
        config.generator.clone(),
        config.lifecycle_interval_secs,
        config.generator.interval_secs,
        config.anomaly_ring_size,
    );

    if let Err(e) = state.lifecycle.reconcile_on_startup().await {
        error!("startup reconciliation failed: {e}");
        return ExitCode::from(2);
    }

    let lifecycle = state.lifecycle.clone();
    let lifecycle_interval = state.lifecycle_interval_secs;
    state
        .lifecycle_task
        .start(move |token| tokio::spawn(async move { lifecycle.run(lifecycle_interval, token).await }));

    let generator = state.generator.clone();
    let generator_cfg = (**state.generator_config.load()).clone();
    state
        .generator_task
        .start(move |token| tokio::spawn(async move { generator.run(generator_cfg, token).await }));

    let telemetry = state.telemetry.clone();
    let telemetry_interval = state.telemetry_interval_secs;
    state
        .telemetry_task
        .start(move |token| tokio::spawn(async move { telemetry.run(telemetry_interval, token).await }));

    let bind_address = config.bind_address.clone();
    let app = http::create_app(state.clone(), &config.cors);

    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind {bind_address}: {e}");
            return ExitCode::from(2);
        }
    };
    info!("listening on {bind_address}");

    let shutdown_token = CancellationToken::new();
    let ctrl_c_token = shutdown_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        ctrl_c_token.cancel();
    });

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
        })
        .await;

    state.lifecycle_task.stop();
    state.generator_task.stop();
    state.telemetry_task.stop();

    match result {
        Ok(()) => {
            info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("server error: {e}");
            ExitCode::from(2)
        }
    }
}

fn redact_database_url(url: &str) -> String {
    match url.find('@') {
        Some(at) => match url.find("://") {
            Some(scheme_end) => format!("{}://***@{}", &url[..scheme_end], &url[at + 1..]),
            None => "***".to_string(),
        },
        None => url.to_string(),
    }
}
