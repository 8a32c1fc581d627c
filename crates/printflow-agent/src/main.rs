// SPDX-License-Identifier: PMPL-1.0-or-later
//
// printflow-agentd: the PrintFlow agent daemon.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use printflow_agent::web::api::{router, AppState, AppStateInner};
use printflow_core::config::AgentConfig;
use printflow_core::error::Result;
use printflow_spool::{
    DiscoveryTask, MdnsBrowser, Normalizer, PrinterRegistry, Reporter, SpoolService,
    SystemCourier, JobStore,
};

#[derive(Debug, Parser)]
#[command(name = "printflow-agentd", version, about = "Local print agent for PrintFlow POS terminals")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configured one.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Args::parse()).await {
        error!(error = %e, "agent failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    let store = Arc::new(match &config.store_path {
        Some(path) => JobStore::open(path)?,
        None => JobStore::open_in_memory()?,
    });
    let interrupted = store.recover_interrupted()?;
    if interrupted > 0 {
        warn!(count = interrupted, "closed out jobs interrupted by the previous run");
    }

    let registry = Arc::new(PrinterRegistry::with_seeds(&config.printers));

    let (reporter, reporter_handle) = Reporter::new(config.erp.log_url.as_deref())?;
    tokio::spawn(reporter.run());

    let courier = Arc::new(SystemCourier::new(config.spool_dir.clone()));
    let spool = SpoolService::start(
        Arc::clone(&registry),
        Arc::clone(&store),
        courier,
        reporter_handle,
        &config.limits,
        Duration::from_secs(config.discovery.offline_grace_secs),
    );

    let refresh = Arc::new(Notify::new());
    let discovery = DiscoveryTask::new(
        Arc::clone(&registry),
        Duration::from_secs(config.discovery.interval_secs),
        Arc::clone(&refresh),
    );
    tokio::spawn(discovery.run());

    // Keep the browser handle alive for the life of the process.
    let _mdns = if config.discovery.mdns {
        match MdnsBrowser::start(Arc::clone(&registry)) {
            Ok(browser) => Some(browser),
            Err(e) => {
                warn!(error = %e, "mDNS discovery unavailable, continuing without it");
                None
            }
        }
    } else {
        None
    };

    let state: AppState = Arc::new(AppStateInner {
        registry,
        store,
        spool,
        normalizer: Normalizer::new(config.limits.max_payload_bytes),
        refresh,
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "PrintFlow agent listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
