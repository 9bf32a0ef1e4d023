//! Chain contexts and the monitor that drives their tickers (§2, §4.1, §5).

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_stream::wrappers::IntervalStream;

use crate::error::RpcError;
use crate::gateway::Gateway;
use crate::queue::{MetadataEntry, Queue, SourceEntry};
use crate::repository::Repository;
use crate::rpc::BlockchainClient;
use crate::{block_detector, metadata_fetcher, source_fetcher};
use crate::metrics::Metrics;

pub const DEFAULT_CHAINS: &[&str] = &["mainnet", "ropsten", "rinkeby", "kovan", "goerli"];

pub struct ChainState {
    pub cursor: u64,
    pub metadata_queue: Queue<MetadataEntry>,
    pub source_queue: Queue<SourceEntry>,
}

/// Everything one chain's three tickers need: its own client and cursor, and
/// the gateway/repository/metrics shared across every chain the monitor runs.
pub struct ChainContext {
    pub name: String,
    pub client: Arc<dyn BlockchainClient>,
    pub gateway: Arc<Gateway>,
    pub repository: Arc<Repository>,
    pub metrics: Arc<Metrics>,
    pub state: Mutex<ChainState>,
    /// Bounds simultaneous in-flight fetches per chain per stage (§5).
    pub fetch_permits: Arc<Semaphore>,
}

impl ChainContext {
    pub async fn new(
        name: String,
        client: Arc<dyn BlockchainClient>,
        gateway: Arc<Gateway>,
        repository: Arc<Repository>,
        metrics: Arc<Metrics>,
        concurrency_cap: usize,
    ) -> Result<Self, RpcError> {
        let cursor = client.block_number().await?;
        Ok(Self {
            name,
            client,
            gateway,
            repository,
            metrics,
            state: Mutex::new(ChainState {
                cursor,
                metadata_queue: Queue::new(),
                source_queue: Queue::new(),
            }),
            fetch_permits: Arc::new(Semaphore::new(concurrency_cap)),
        })
    }
}

/// Owns the set of chain contexts and the tasks driving their tickers.
/// `start`/`stop` are the only two operations exposed to callers (§4.1).
pub struct Monitor {
    tasks: JoinSet<()>,
    cancel: Arc<tokio_util::sync::CancellationToken>,
    stopped: bool,
}

impl Monitor {
    /// Arms one merged block/metadata/source ticker per context, all firing
    /// at `block_time`, and returns immediately; tickers run until `stop`.
    pub fn start(contexts: Vec<Arc<ChainContext>>, block_time: Duration) -> Self {
        let cancel = Arc::new(tokio_util::sync::CancellationToken::new());
        let mut tasks = JoinSet::new();

        for ctx in contexts {
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let mut ticks = IntervalStream::new(tokio::time::interval(block_time));
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        tick = ticks.next() => {
                            if tick.is_none() {
                                break;
                            }
                            block_detector::run_block_tick(&ctx).await;
                            metadata_fetcher::run_metadata_tick(&ctx).await;
                            source_fetcher::run_source_tick(&ctx).await;
                            ctx.metrics.set_metadata_queue_depth(&ctx.name, ctx.state.lock().metadata_queue.len() as i64);
                            ctx.metrics.set_source_queue_depth(&ctx.name, ctx.state.lock().source_queue.len() as i64);
                        }
                    }
                }
            });
        }

        Self { tasks, cancel, stopped: false }
    }

    /// Cancels future ticks. Idempotent: a second call is a no-op.
    /// In-flight fetches are not aborted; they run to completion or their
    /// own transport timeout.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.cancel.cancel();
        while self.tasks.join_next().await.is_some() {}
    }
}
