//! Per-source fetching with multi-provider racing and content verification
//! (§4.5).

use keccak_hash::keccak;

use crate::chain::ChainContext;
use crate::error::FetchError;
use crate::gateway::SourceUrl;
use crate::queue::SourceDescriptor;
use crate::repository::sanitize_source_key;

const RETENTION_SECS: u64 = 432_000;

/// Fetches every surviving entry's pending sources concurrently, across
/// every address at once; `ctx`'s own `fetch_permits` semaphore is what
/// actually bounds how many fetches run at a time (§5's per-chain,
/// per-stage concurrency cap), since both metadata and source ticks used to
/// drain their work one entry at a time regardless of the permit count.
#[tracing::instrument(skip(ctx), fields(chain = %ctx.name))]
pub async fn run_source_tick(ctx: &ChainContext) {
    ctx.state.lock().source_queue.evict(RETENTION_SECS);
    let addresses = ctx.state.lock().source_queue.keys_snapshot();

    let pending_by_address: Vec<(String, Vec<(String, SourceDescriptor)>)> = addresses
        .iter()
        .filter_map(|address| {
            let entry = ctx.state.lock().source_queue.get(address)?.pending_sources.clone();
            Some((address.clone(), entry.into_iter().collect()))
        })
        .collect();

    let fetches = pending_by_address.iter().flat_map(|(address, pending)| {
        pending
            .iter()
            .map(move |(source_key, descriptor)| fetch_one(ctx, address, source_key, descriptor))
    });
    futures::future::join_all(fetches).await;

    for address in addresses {
        let emptied = ctx
            .state
            .lock()
            .source_queue
            .get(&address)
            .map(|entry| entry.pending_sources.is_empty())
            .unwrap_or(false);
        if emptied {
            ctx.state.lock().source_queue.remove(&address);
        }
    }
}

async fn fetch_one(ctx: &ChainContext, address: &str, source_key: &str, descriptor: &SourceDescriptor) {
    let bytes = match ctx.repository.read_keccak_cache(&descriptor.keccak256).await {
        Some(cached) => cached,
        None => match race_urls(ctx, descriptor).await {
            Some(bytes) => bytes,
            None => {
                tracing::warn!(stage = "source", chain = %ctx.name, address, source_key, "all urls failed, retrying next tick");
                ctx.metrics.record_source_fetch(&ctx.name, false);
                return;
            }
        },
    };

    let sanitized = sanitize_source_key(source_key);
    let path = ctx.repository.source_path(&ctx.name, address, &sanitized);
    if let Err(error) = ctx.repository.write(path, bytes).await {
        tracing::error!(stage = "source", chain = %ctx.name, address, source_key, %error, "failed to persist source file");
        return;
    }

    ctx.metrics.record_source_fetch(&ctx.name, true);
    if let Some(entry) = ctx.state.lock().source_queue.get_mut(address) {
        entry.pending_sources.remove(source_key);
    }
    tracing::info!(stage = "source", chain = %ctx.name, address, source_key, "source fetched");
}

/// Races every URL in `descriptor.urls` concurrently; the first fetch that
/// both succeeds and verifies against `descriptor.keccak256` wins. Every
/// losing attempt's reason (transport failure, unroutable URL, or digest
/// mismatch) is logged at debug level rather than silently discarded.
async fn race_urls(ctx: &ChainContext, descriptor: &SourceDescriptor) -> Option<Vec<u8>> {
    let attempts = descriptor.urls.iter().map(|url| {
        let url = url.clone();
        let digest = descriptor.keccak256.clone();
        async move {
            let _permit = ctx.fetch_permits.acquire().await.expect("semaphore is never closed");
            let fetched: Result<Vec<u8>, FetchError> = match SourceUrl::parse(&url) {
                SourceUrl::SwarmRaw(raw_url) => ctx.gateway.fetch_swarm_url(&raw_url).await,
                SourceUrl::IpfsDweb(cid) => ctx.gateway.fetch_ipfs(&cid).await,
                SourceUrl::Unrecognized(_) => Err(FetchError::NoIpfsProvider),
            };
            let result = fetched.and_then(|bytes| {
                if verify_digest(&bytes, &digest) {
                    Ok(bytes)
                } else {
                    Err(FetchError::DigestMismatch)
                }
            });
            if let Err(error) = &result {
                tracing::debug!(chain = %ctx.name, url, %error, "source url attempt failed");
            }
            result.ok()
        }
    });

    let results = futures::future::join_all(attempts).await;
    results.into_iter().flatten().next()
}

fn verify_digest(bytes: &[u8], expected_hex: &str) -> bool {
    let expected = expected_hex.strip_prefix("0x").unwrap_or(expected_hex);
    let Ok(expected) = hex::decode(expected) else {
        return false;
    };
    keccak(bytes).0.as_slice() == expected.as_slice()
}
