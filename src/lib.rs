//! Discovery and ingestion pipeline for on-chain smart-contract source
//! verification material: tails configured chains for contract creations,
//! decodes their bytecode footer, and fetches the referenced metadata and
//! source files into a content-addressed local repository.

pub mod address;
pub mod block_detector;
pub mod chain;
pub mod config;
pub mod error;
pub mod footer;
pub mod gateway;
pub mod logging;
pub mod metadata_fetcher;
pub mod metrics;
pub mod metrics_server;
pub mod queue;
pub mod repository;
pub mod rpc;
pub mod source_fetcher;

use std::sync::Arc;

use crate::chain::{ChainContext, DEFAULT_CHAINS};
use crate::config::Config;
use crate::error::RpcError;
use crate::gateway::Gateway;
use crate::metrics::Metrics;
use crate::repository::Repository;
use crate::rpc::JsonRpcClient;

/// Builds one [`ChainContext`] per chain: either `custom_chain` alone (a
/// name paired with an explicit endpoint), or the default chain set against
/// `https://<chain>.infura.io/v3/<project-id>` (§4.1). Each context reads its
/// own starting cursor from the chain head.
pub async fn build_chain_contexts(
    config: &Config,
    custom_chain: Option<(String, url::Url)>,
    metrics: Arc<Metrics>,
) -> Result<Vec<Arc<ChainContext>>, RpcError> {
    let http = reqwest::Client::new();
    let repository = Arc::new(Repository::new(config.repository.clone()));
    let gateway = Arc::new(Gateway::new(
        http.clone(),
        config.swarm_gateway.clone(),
        config.ipfs_cat_request.clone(),
    ));

    let endpoints: Vec<(String, url::Url)> = match custom_chain {
        Some((name, endpoint)) => vec![(name, endpoint)],
        None => DEFAULT_CHAINS
            .iter()
            .map(|name| {
                let endpoint = format!(
                    "https://{name}.infura.io/v3/{project_id}",
                    project_id = config.infura_project_id
                )
                .parse()
                .expect("chain endpoint url is well-formed");
                (name.to_string(), endpoint)
            })
            .collect(),
    };

    let mut contexts = Vec::with_capacity(endpoints.len());
    for (name, endpoint) in endpoints {
        let client = Arc::new(JsonRpcClient::new(http.clone(), endpoint));

        let ctx = ChainContext::new(
            name,
            client,
            gateway.clone(),
            repository.clone(),
            metrics.clone(),
            config.fetch_concurrency_cap,
        )
        .await?;
        contexts.push(Arc::new(ctx));
    }

    Ok(contexts)
}
