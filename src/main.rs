use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use nntp_archive::models::Newsgroup;
use nntp_archive::storage::{MemoryStorage, Storage};
use nntp_archive::{create_default_config, load_config, server};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short, long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    nntp_archive::logging::init_dual_logging();

    let args = Args::parse();

    let num_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    let worker_threads = args.threads.unwrap_or(num_cpus);

    if worker_threads == 1 {
        info!("starting NNTP archive server with single-threaded runtime");
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        rt.block_on(run_server(args))
    } else {
        info!(
            "starting NNTP archive server with {} worker threads (detected {} CPUs)",
            worker_threads, num_cpus
        );
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .enable_all()
            .build()?;
        rt.block_on(run_server(args))
    }
}

async fn run_server(args: Args) -> Result<()> {
    let config = if std::path::Path::new(&args.config).exists() {
        load_config(&args.config)?
    } else {
        warn!(
            "config file '{}' not found, creating default config",
            args.config
        );
        let default_config = create_default_config();
        std::fs::write(&args.config, toml::to_string_pretty(&default_config)?)?;
        info!("created default config file: {}", args.config);
        default_config
    };

    info!(
        hostname = %config.server.hostname,
        listeners = config.listeners.len(),
        posting = config.server.posting_allowed,
        "configuration loaded"
    );

    // Seed the reference store from the config: administrators and any
    // bootstrap newsgroups that do not exist yet.
    let storage = Arc::new(MemoryStorage::new());
    for admin in &config.administrators {
        storage.add_administrator(admin.clone());
    }
    for bootstrap in &config.newsgroups {
        let mut group = Newsgroup::new(
            bootstrap.name.clone(),
            bootstrap.description.clone(),
            "archive-bootstrap",
        );
        group.moderated = bootstrap.moderated;
        storage.add_newsgroup(group);
    }
    info!(
        administrators = config.administrators.len(),
        newsgroups = config.newsgroups.len(),
        "store seeded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let storage: Arc<dyn Storage> = storage;
    server::run(config, storage, shutdown_rx).await
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
