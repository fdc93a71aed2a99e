//! poolgridd: the poolgrid daemon.
//!
//! Assembles the state store, the provider gateway, the reconciler and the
//! REST API into one process.
//!
//! # Usage
//!
//! ```text
//! poolgridd serve --port 8460 --data-dir /var/lib/poolgrid --config poolgrid.toml
//! poolgridd run --pool eu-1
//! poolgridd config
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use poolgrid_core::PoolgridConfig;
use poolgrid_core::config::ProviderKind;
use poolgrid_provider::{ProviderGateway, SimulatedProvider};
use poolgrid_reconcile::{ReconcileSettings, Reconciler};
use poolgrid_state::StateStore;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "poolgridd", about = "poolgrid daemon")]
struct Cli {
    /// Path to poolgrid.toml. Missing file means defaults.
    #[arg(long, global = true, default_value = "poolgrid.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the REST API and run reconciliations on request.
    Serve {
        /// Port to listen on. Overrides the config file.
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state. Overrides the config file.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Reconcile one pool in the foreground and print the report.
    Run {
        /// Pool to reconcile.
        #[arg(long)]
        pool: String,

        /// Re-drive an existing run id instead of starting a new run.
        #[arg(long)]
        run_id: Option<String>,

        /// Data directory for persistent state. Overrides the config file.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = PoolgridConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Command::Serve { port, data_dir } => {
            let port = port.unwrap_or(config.server.port);
            let data_dir = data_dir.unwrap_or_else(|| config.server.data_dir.clone());
            serve(config, port, data_dir).await
        }
        Command::Run {
            pool,
            run_id,
            data_dir,
        } => {
            let data_dir = data_dir.unwrap_or_else(|| config.server.data_dir.clone());
            run_once(config, data_dir, pool, run_id).await
        }
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,poolgridd=debug,poolgrid_reconcile=debug")
        });
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Open the store, seed configured pools and build the reconciler.
fn assemble(config: &PoolgridConfig, data_dir: &Path) -> anyhow::Result<(StateStore, Arc<Reconciler>)> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db_path = data_dir.join("poolgrid.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    for pool in &config.pools {
        store.put_pool(pool)?;
        info!(pool = %pool.id, desired = pool.desired_vm_count, "pool seeded from config");
    }

    let provider: Arc<dyn ProviderGateway> = match config.provider.kind {
        ProviderKind::Simulated => Arc::new(
            SimulatedProvider::new().with_latency(Duration::from_millis(config.provider.latency_ms)),
        ),
    };
    warn!(provider = %provider.name(), "resources live only as long as this process");

    let settings = ReconcileSettings::from(&config.reconcile);
    info!(
        max_parallel = settings.max_parallel_instances,
        call_timeout_secs = settings.call_timeout.as_secs(),
        max_attempts = settings.retry.max_attempts,
        "reconciler initialized"
    );
    let reconciler = Reconciler::with_store(provider, store.clone(), settings);
    Ok((store, Arc::new(reconciler)))
}

async fn serve(config: PoolgridConfig, port: u16, data_dir: PathBuf) -> anyhow::Result<()> {
    info!("poolgrid daemon starting");
    let (store, reconciler) = assemble(&config, &data_dir)?;

    let router = poolgrid_api::build_router(poolgrid_api::ApiState { store, reconciler });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("poolgrid daemon stopped");
    Ok(())
}

async fn run_once(
    config: PoolgridConfig,
    data_dir: PathBuf,
    pool_id: String,
    run_id: Option<String>,
) -> anyhow::Result<()> {
    let (_store, reconciler) = assemble(&config, &data_dir)?;
    let run_id = run_id.unwrap_or_else(Reconciler::new_run_id);

    let report = reconciler.run(&run_id, &pool_id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_success() {
        Ok(())
    } else {
        anyhow::bail!("run {run_id} did not fully succeed")
    }
}
