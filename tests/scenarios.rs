//! End-to-end scenario tests driving the tick functions directly against an
//! HTTP mock server standing in for storage gateways, rather than waiting on
//! the real periodic interval.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use httpmock::prelude::*;
use parking_lot::Mutex;

use source_harvester::address::{derive_contract_address, to_hex_address};
use source_harvester::chain::{ChainContext, ChainState};
use source_harvester::error::{FetchError, RpcError};
use source_harvester::footer::encode_footer;
use source_harvester::gateway::{Gateway, IpfsProvider};
use source_harvester::metrics::Metrics;
use source_harvester::queue::{MetadataEntry, MetadataPointer, Queue, SourceDescriptor, SourceEntry};
use source_harvester::repository::Repository;
use source_harvester::rpc::{Block, BlockchainClient, Transaction};
use source_harvester::{block_detector, metadata_fetcher, source_fetcher};

/// A fixture blockchain client whose responses are supplied by the test.
struct FixtureClient {
    head: u64,
    blocks: HashMap<u64, Block>,
    code: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl BlockchainClient for FixtureClient {
    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.head)
    }
    async fn block_by_number(&self, number: u64) -> Result<Option<Block>, RpcError> {
        Ok(self.blocks.get(&number).cloned())
    }
    async fn code_at(&self, address: &str) -> Result<Vec<u8>, RpcError> {
        Ok(self.code.get(address).cloned().unwrap_or_default())
    }
}

/// Always reports an empty block at every number, with no chain head limit
/// other than what the test sets directly.
struct EmptyChainClient {
    head: u64,
}

#[async_trait]
impl BlockchainClient for EmptyChainClient {
    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.head)
    }
    async fn block_by_number(&self, number: u64) -> Result<Option<Block>, RpcError> {
        Ok(Some(Block { number, transactions: Vec::new() }))
    }
    async fn code_at(&self, _address: &str) -> Result<Vec<u8>, RpcError> {
        Ok(Vec::new())
    }
}

struct FixedIpfsProvider(Vec<u8>);

#[async_trait]
impl IpfsProvider for FixedIpfsProvider {
    async fn cat(&self, _cid: &str) -> Result<Vec<u8>, FetchError> {
        Ok(self.0.clone())
    }
}

fn test_context(client: Arc<dyn BlockchainClient>, gateway: Gateway, cursor: u64) -> (ChainContext, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let repository = Repository::new(dir.path());
    let ctx = ChainContext {
        name: "mainnet".into(),
        client,
        gateway: Arc::new(gateway),
        repository: Arc::new(repository),
        metrics: Arc::new(Metrics::new()),
        state: Mutex::new(ChainState {
            cursor,
            metadata_queue: Queue::new(),
            source_queue: Queue::new(),
        }),
        fetch_permits: Arc::new(tokio::sync::Semaphore::new(16)),
    };
    (ctx, dir)
}

#[tokio::test]
async fn swarm_footer_end_to_end() {
    let server = MockServer::start();
    let sender = [0xabu8; 20];
    let address = to_hex_address(&derive_contract_address(&sender, 0));
    let hash = "11".repeat(32);

    let mut blocks = HashMap::new();
    blocks.insert(
        0,
        Block {
            number: 0,
            transactions: vec![Transaction {
                hash: "0xtx".into(),
                from: format!("0x{}", hex::encode(sender)),
                to: None,
                nonce: 0,
            }],
        },
    );
    let mut code = HashMap::new();
    code.insert(
        address.clone(),
        encode_footer(b"\x60\x80", &MetadataPointer::SwarmBzzr1 { hash: hash.clone() }),
    );

    let client = Arc::new(FixtureClient { head: 1, blocks, code });
    let gateway = Gateway::new(reqwest::Client::new(), server.url("/"), String::new());
    let (ctx, _dir) = test_context(client, gateway, 0);

    let swarm_mock = server.mock(|when, then| {
        when.method(GET).path(format!("/bzz-raw:/{hash}"));
        then.status(200).body("raw metadata bytes");
    });

    block_detector::run_block_tick(&ctx).await;
    assert!(ctx.state.lock().metadata_queue.contains(&address));

    metadata_fetcher::run_metadata_tick(&ctx).await;
    swarm_mock.assert();

    let written = tokio::fs::read(ctx.repository.swarm_bzzr1_path(&hash)).await.unwrap();
    assert_eq!(written, b"raw metadata bytes");
}

#[tokio::test]
async fn ipfs_footer_end_to_end() {
    let multihash = vec![0x12u8; 34];
    let cid = bs58::encode(&multihash).into_string();

    let sender = [0xcdu8; 20];
    let address = to_hex_address(&derive_contract_address(&sender, 3));

    let mut blocks = HashMap::new();
    blocks.insert(
        0,
        Block {
            number: 0,
            transactions: vec![Transaction {
                hash: "0xtx".into(),
                from: format!("0x{}", hex::encode(sender)),
                to: None,
                nonce: 3,
            }],
        },
    );
    let mut code = HashMap::new();
    code.insert(
        address.clone(),
        encode_footer(b"\x60\x80", &MetadataPointer::Ipfs { cid: cid.clone() }),
    );

    let client = Arc::new(FixtureClient { head: 1, blocks, code });
    let gateway = Gateway::new(reqwest::Client::new(), String::new(), String::new())
        .with_ipfs_provider(Box::new(FixedIpfsProvider(b"ipfs metadata bytes".to_vec())));
    let (ctx, _dir) = test_context(client, gateway, 0);

    block_detector::run_block_tick(&ctx).await;
    assert!(ctx.state.lock().metadata_queue.contains(&address));

    metadata_fetcher::run_metadata_tick(&ctx).await;

    let written = tokio::fs::read(ctx.repository.ipfs_path(&cid)).await.unwrap();
    assert_eq!(written, b"ipfs metadata bytes");
}

#[tokio::test]
async fn two_source_metadata_race() {
    let server = MockServer::start();
    let body = b"contract A {}";
    let digest = hex::encode(keccak_hash::keccak(body.as_slice()).0);

    server.mock(|when, then| {
        when.method(GET).path("/bzz-raw:/2222");
        then.status(200).body(body.as_slice());
    });

    let gateway = Gateway::new(reqwest::Client::new(), server.url("/"), String::new())
        .with_ipfs_provider(Box::new(FixedIpfsProvider(b"wrong content".to_vec())));
    let client: Arc<dyn BlockchainClient> = Arc::new(EmptyChainClient { head: 0 });
    let (ctx, _dir) = test_context(client, gateway, 0);

    let mut sources = HashMap::new();
    sources.insert(
        "contracts/A.sol".to_string(),
        SourceDescriptor { keccak256: digest, urls: vec!["bzz-raw:/2222".into(), "dweb:/ipfs/QmSrc".into()] },
    );
    ctx.state.lock().source_queue.add(
        "0xabc".into(),
        SourceEntry { raw_metadata: Vec::new(), pending_sources: sources, timestamp_ms: 0 },
    );

    source_fetcher::run_source_tick(&ctx).await;

    assert!(!ctx.state.lock().source_queue.contains("0xabc"));
    let written = tokio::fs::read(ctx.repository.source_path("mainnet", "0xabc", "contracts/A.sol"))
        .await
        .unwrap();
    assert_eq!(written, body);
}

#[tokio::test]
async fn path_traversal_is_contained_under_the_repository_root() {
    let server = MockServer::start();
    let body = b"malicious payload";
    let digest = hex::encode(keccak_hash::keccak(body.as_slice()).0);

    server.mock(|when, then| {
        when.method(GET).path("/bzz-raw:/3333");
        then.status(200).body(body.as_slice());
    });

    let gateway = Gateway::new(reqwest::Client::new(), server.url("/"), String::new());
    let client: Arc<dyn BlockchainClient> = Arc::new(EmptyChainClient { head: 0 });
    let (ctx, dir) = test_context(client, gateway, 0);

    let mut sources = HashMap::new();
    sources.insert(
        "../../etc/passwd".to_string(),
        SourceDescriptor { keccak256: digest, urls: vec!["bzz-raw:/3333".into()] },
    );
    ctx.state.lock().source_queue.add(
        "0xabc".into(),
        SourceEntry { raw_metadata: Vec::new(), pending_sources: sources, timestamp_ms: 0 },
    );

    source_fetcher::run_source_tick(&ctx).await;

    let expected = dir.path().join("contract/mainnet/0xabc/sources/__/__/etc/passwd");
    assert_eq!(tokio::fs::read(&expected).await.unwrap(), body);
    assert!(expected.starts_with(dir.path()));
}

#[tokio::test]
async fn catch_up_cap_bounds_ingestion_per_tick() {
    let client: Arc<dyn BlockchainClient> = Arc::new(EmptyChainClient { head: 1000 });
    let gateway = Gateway::new(reqwest::Client::new(), String::new(), String::new());
    let (ctx, _dir) = test_context(client, gateway, 100);

    block_detector::run_block_tick(&ctx).await;
    assert_eq!(ctx.state.lock().cursor, 104);

    for _ in 0..224 {
        block_detector::run_block_tick(&ctx).await;
    }
    assert_eq!(ctx.state.lock().cursor, 1000);
}

#[tokio::test]
async fn lagging_head_never_regresses_the_cursor() {
    let client: Arc<dyn BlockchainClient> = Arc::new(EmptyChainClient { head: 50 });
    let gateway = Gateway::new(reqwest::Client::new(), String::new(), String::new());
    let (ctx, _dir) = test_context(client, gateway, 100);

    block_detector::run_block_tick(&ctx).await;
    assert_eq!(ctx.state.lock().cursor, 100);
}

#[tokio::test]
async fn staleness_eviction_drops_an_aged_metadata_entry() {
    let client: Arc<dyn BlockchainClient> = Arc::new(EmptyChainClient { head: 0 });
    let gateway = Gateway::new(reqwest::Client::new(), "http://127.0.0.1:1/".to_string(), String::new());
    let (ctx, _dir) = test_context(client, gateway, 0);

    let now = source_harvester::queue::now_ms();
    ctx.state.lock().metadata_queue.add_at(
        "0xabc".into(),
        MetadataEntry { pointer: MetadataPointer::SwarmBzzr1 { hash: "11".repeat(32) }, timestamp_ms: 0 },
        now - 3601 * 1000,
    );

    metadata_fetcher::run_metadata_tick(&ctx).await;

    assert!(!ctx.state.lock().metadata_queue.contains("0xabc"));
}
