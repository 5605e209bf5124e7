//! hackbatchd — runs the batcher against a simulated network.
//!
//! Usage: hackbatchd [target] [network.json]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use hackbatch_core::config::BatcherConfig;
use hackbatch_core::{Formulas, StandardFormulas};
use hackbatch_engine::{NetworkSpec, RunLoop, SimHost};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = BatcherConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = BatcherConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        BatcherConfig::default()
    });

    let mut args = std::env::args().skip(1);
    if let Some(target) = args.next() {
        config.target.name = target;
    }
    if let Some(path) = args.next() {
        config.sim.network_path = Some(PathBuf::from(path));
    }

    // Network
    let network = match &config.sim.network_path {
        Some(path) => NetworkSpec::load(path)
            .with_context(|| format!("failed to load network {}", path.display()))?,
        None => NetworkSpec::demo(),
    };
    tracing::info!(
        target_node = %config.target.name,
        workers = network.workers.len(),
        targets = network.targets.len(),
        time_scale = config.sim.time_scale,
        "hackbatchd starting"
    );

    let formulas: Arc<dyn Formulas> = Arc::new(StandardFormulas);
    let host = SimHost::from_network(network)
        .with_formulas(formulas.clone())
        .with_scripts(config.scripts.clone())
        .with_time_scale(config.sim.time_scale)
        .with_max_security(config.policy.max_security);

    // Ctrl-C requests a stop; launched work is left to finish.
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            let _ = shutdown_tx.send(());
        }
    });

    let mut run = RunLoop::new(&host, formulas.as_ref(), &config).with_shutdown(shutdown_rx);
    match run.run().await {
        Ok(report) => {
            let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;
            println!("{json}");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, target_node = %config.target.name, "run aborted");
            std::process::exit(1);
        }
    }
}
