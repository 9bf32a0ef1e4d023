//! Minimal process entry point (§10.4): parse flags, init logging, build
//! config, start the monitor, wait for an interrupt, stop. No daemonization
//! or signal multiplexing lives here; that is explicitly out of scope.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use source_harvester::config::Config;
use source_harvester::metrics::Metrics;

#[derive(Debug, Parser)]
#[command(name = "source-harvester", about = "Harvests smart-contract verification material from configured chains")]
struct Cli {
    /// Path to a TOML config file layered over the compiled-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the config file's repository root.
    #[arg(long)]
    repository: Option<PathBuf>,

    /// Overrides the config file's Infura project id.
    #[arg(long)]
    infura_project_id: Option<String>,

    /// Runs a single custom chain instead of the default chain set, given as
    /// `name=endpoint-url`.
    #[arg(long, value_parser = parse_custom_chain)]
    custom_chain: Option<(String, url::Url)>,

    /// Overrides the config file's block-time tick interval, e.g. "15s".
    #[arg(long, value_parser = humantime::parse_duration)]
    block_time: Option<std::time::Duration>,
}

fn parse_custom_chain(s: &str) -> Result<(String, url::Url), String> {
    let (name, endpoint) = s
        .split_once('=')
        .ok_or_else(|| "expected name=endpoint-url".to_string())?;
    let endpoint = endpoint.parse().map_err(|e| format!("invalid endpoint url: {e}"))?;
    Ok((name.to_string(), endpoint))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(repository) = cli.repository {
        config.repository = repository;
    }
    if let Some(project_id) = cli.infura_project_id {
        config.infura_project_id = project_id;
    }

    source_harvester::logging::init(&config.log_level, config.log_format);
    tracing::info!(?config, "starting");

    let metrics = Arc::new(Metrics::new());

    if let Some(metrics_address) = config.metrics_address {
        let listener = tokio::net::TcpListener::bind(metrics_address)
            .await
            .map_err(|source| anyhow::anyhow!("could not bind metrics listener to {metrics_address}: {source}"))?;
        tracing::info!(%metrics_address, "metrics server started");
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(error) = source_harvester::metrics_server::serve(listener, metrics).await {
                tracing::error!(%error, "metrics server exited");
            }
        });
    }

    let contexts =
        source_harvester::build_chain_contexts(&config, cli.custom_chain, metrics).await?;

    let block_time = cli.block_time.unwrap_or_else(|| config.block_time());
    let mut monitor = source_harvester::chain::Monitor::start(contexts, block_time);

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, stopping");
    monitor.stop().await;

    Ok(())
}
