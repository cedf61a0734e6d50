//! Reliquary Daemon
//!
//! Serves public ARK resolution and drives queued reconstruction runs.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (resolver only; runs stay queued for an
//! # out-of-process executor)
//! reliquary
//!
//! # Start with custom config
//! reliquary --config /path/to/config.toml
//!
//! # Drive runs through an external reconstruction command
//! reliquary --reconstructor-command /usr/local/bin/photogrammetry-run
//!
//! # Custom issuer prefix
//! reliquary --naan 12345 --shoulder s2
//! ```
//!
//! On startup the recovery sweep repairs interrupted state: succeeded runs
//! without an ARK get one minted, stale active runs are failed with a
//! timeout so their meshes free up.

use anyhow::Context;
use clap::Parser;
use reliquary::orchestrator::{recovery_sweep, CommandReconstructor, Orchestrator};
use reliquary::{Config, Db, HttpServer, OrchestratorConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "reliquary")]
#[command(about = "Run orchestration and ARK minting daemon")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(long, env = "RELIQUARY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// HTTP port for the public ARK resolver
    #[arg(long)]
    http_port: Option<u16>,

    /// Name Assigning Authority Number for minted ARKs
    #[arg(long, env = "RELIQUARY_NAAN")]
    naan: Option<String>,

    /// Shoulder prefix for assigned names
    #[arg(long, env = "RELIQUARY_SHOULDER")]
    shoulder: Option<String>,

    /// Seconds of executor silence before a run is failed
    #[arg(long)]
    executor_timeout_secs: Option<u64>,

    /// External reconstruction command to dispatch queued runs with
    #[arg(long, env = "RELIQUARY_RECONSTRUCTOR")]
    reconstructor_command: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("reliquary=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(naan) = args.naan {
        config.naan = naan;
    }
    if let Some(shoulder) = args.shoulder {
        config.shoulder = shoulder;
    }
    if let Some(secs) = args.executor_timeout_secs {
        config.executor_timeout_secs = secs;
    }
    if let Some(command) = args.reconstructor_command {
        config.reconstructor_command = Some(command);
    }

    info!(
        data_dir = %config.data_dir.display(),
        http_port = config.http_port,
        naan = %config.naan,
        shoulder = %config.shoulder,
        "Starting reliquary"
    );

    tokio::fs::create_dir_all(&config.data_dir).await?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(
        Db::open(&config.db_path())
            .with_context(|| format!("Failed to open database at {}", config.db_path().display()))?,
    );
    let orchestrator_config = OrchestratorConfig::from(&config);

    // Repair interrupted state before serving anything
    let report = recovery_sweep(&db, &orchestrator_config)?;
    if !report.is_clean() {
        info!(
            minted = report.minted.len(),
            timed_out = report.timed_out.len(),
            unresolved = report.unresolved.len(),
            "Recovery sweep applied repairs"
        );
        for (run_id, reason) in &report.unresolved {
            warn!(run_id = %run_id, reason = %reason, "Run needs operator attention");
        }
    }

    // Dispatch loop, when an executor command is configured
    let dispatch_handle = if let Some(command) = config.reconstructor_command.clone() {
        info!(command = %command.display(), "Run dispatch enabled");
        let executor = Arc::new(CommandReconstructor::new(command, config.runs_dir()));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&db),
            executor,
            orchestrator_config,
        ));
        let interval = Duration::from_secs(config.dispatch_interval_secs);

        Some(tokio::spawn(async move {
            loop {
                match orchestrator.dispatch_pending().await {
                    Ok(0) => {}
                    Ok(n) => info!(dispatched = n, "Dispatched queued runs"),
                    Err(e) => error!(error = %e, "Dispatch scan failed"),
                }
                tokio::time::sleep(interval).await;
            }
        }))
    } else {
        info!("No reconstructor command configured; queued runs are left for an external executor");
        None
    };

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_server = Arc::new(HttpServer::new(Arc::clone(&db), http_addr));

    info!("HTTP API available at http://{}", http_addr);
    info!("Endpoints:");
    info!("  GET /health                - Health check");
    info!("  GET /ark:/{{naan}}/{{name}}    - Resolve a minted ARK");
    info!("  GET /run/{{run_id}}          - Run status");

    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    if let Some(handle) = dispatch_handle {
        handle.abort();
    }

    if let Ok(stats) = db.stats() {
        info!(
            meshes = stats.mesh_count,
            runs = stats.run_count,
            arks = stats.ark_count,
            "Final registry stats"
        );
    }

    Ok(())
}
