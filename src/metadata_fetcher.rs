//! Metadata document fetching and promotion into the source queue (§4.4).

use std::collections::HashMap;

use serde::Deserialize;

use crate::chain::ChainContext;
use crate::queue::{MetadataPointer, SourceDescriptor, SourceEntry};

const RETENTION_SECS: u64 = 3600;

#[derive(Debug, Deserialize)]
struct MetadataDocument {
    #[serde(default)]
    sources: HashMap<String, SourceDescriptor>,
}

/// Fetches every surviving entry's metadata document concurrently; `ctx`'s
/// own `fetch_permits` semaphore is what actually bounds how many of these
/// run at once (§5's per-chain, per-stage concurrency cap).
#[tracing::instrument(skip(ctx), fields(chain = %ctx.name))]
pub async fn run_metadata_tick(ctx: &ChainContext) {
    ctx.state.lock().metadata_queue.evict(RETENTION_SECS);
    let addresses = ctx.state.lock().metadata_queue.keys_snapshot();

    let fetches = addresses.into_iter().filter_map(|address| {
        let pointer = ctx.state.lock().metadata_queue.get(&address).map(|e| e.pointer.clone())?;
        Some(fetch_one(ctx, address, pointer))
    });
    futures::future::join_all(fetches).await;
}

async fn fetch_one(ctx: &ChainContext, address: String, pointer: MetadataPointer) {
    let _permit = ctx.fetch_permits.acquire().await.expect("semaphore is never closed");

    let fetched = match &pointer {
        MetadataPointer::SwarmBzzr1 { hash } => ctx.gateway.fetch_swarm_hash(hash).await,
        MetadataPointer::Ipfs { cid } => ctx.gateway.fetch_ipfs(cid).await,
    };

    let bytes = match fetched {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(stage = "metadata", chain = %ctx.name, %address, %error, "fetch failed, retrying next tick");
            ctx.metrics.record_metadata_fetch(&ctx.name, false);
            return;
        }
    };

    let swarm_or_ipfs_path = match &pointer {
        MetadataPointer::SwarmBzzr1 { hash } => ctx.repository.swarm_bzzr1_path(hash),
        MetadataPointer::Ipfs { cid } => ctx.repository.ipfs_path(cid),
    };
    if let Err(error) = ctx.repository.write(swarm_or_ipfs_path, bytes.clone()).await {
        tracing::error!(stage = "metadata", chain = %ctx.name, %address, %error, "failed to persist raw metadata bytes");
    }

    let metadata_path = ctx.repository.metadata_path(&ctx.name, &address);
    if let Err(error) = ctx.repository.write(metadata_path, bytes.clone()).await {
        tracing::error!(stage = "metadata", chain = %ctx.name, %address, %error, "failed to persist contract metadata.json");
    }

    ctx.metrics.record_metadata_fetch(&ctx.name, true);

    // The metadata document has already been written to disk at this point;
    // a parse failure below leaves it there for operator inspection but the
    // queue entry is still removed (frozen per DESIGN.md: not retried).
    ctx.state.lock().metadata_queue.remove(&address);

    match serde_json::from_slice::<MetadataDocument>(&bytes) {
        Ok(document) => {
            if document.sources.is_empty() {
                return;
            }
            let entry = SourceEntry {
                raw_metadata: bytes,
                pending_sources: document.sources,
                timestamp_ms: 0,
            };
            ctx.state.lock().source_queue.add(address.clone(), entry);
            tracing::info!(stage = "metadata", chain = %ctx.name, %address, "metadata fetched, promoted to source queue");
        }
        Err(error) => {
            tracing::warn!(stage = "metadata", chain = %ctx.name, %address, %error, "metadata document is not valid JSON, dropping without retry");
        }
    }
}
