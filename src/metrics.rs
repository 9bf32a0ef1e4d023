//! Per-chain counters for the three pipeline stages (§10.3). Scraped
//! independently of the pipeline's own control flow: a metrics failure never
//! affects ingestion.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
struct ChainLabel {
    chain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
struct ChainStageLabel {
    chain: String,
    stage: ChainStage,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelValue)]
enum ChainStage {
    Metadata,
    Source,
}

pub struct Metrics {
    registry: Registry,
    blocks_processed: Family<ChainLabel, Counter>,
    contracts_detected: Family<ChainLabel, Counter>,
    fetch_successes: Family<ChainStageLabel, Counter>,
    fetch_failures: Family<ChainStageLabel, Counter>,
    metadata_queue_depth: Family<ChainLabel, Gauge>,
    source_queue_depth: Family<ChainLabel, Gauge>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let blocks_processed = Family::default();
        registry.register(
            "blocks_processed",
            "Total blocks ingested per chain",
            blocks_processed.clone(),
        );

        let contracts_detected = Family::default();
        registry.register(
            "contracts_detected",
            "Total contract-creation transactions observed per chain",
            contracts_detected.clone(),
        );

        let fetch_successes = Family::default();
        registry.register(
            "fetch_successes",
            "Successful fetches per chain and stage",
            fetch_successes.clone(),
        );

        let fetch_failures = Family::default();
        registry.register(
            "fetch_failures",
            "Failed fetches per chain and stage",
            fetch_failures.clone(),
        );

        let metadata_queue_depth = Family::default();
        registry.register(
            "metadata_queue_depth",
            "Current metadata queue size per chain",
            metadata_queue_depth.clone(),
        );

        let source_queue_depth = Family::default();
        registry.register(
            "source_queue_depth",
            "Current source queue size per chain",
            source_queue_depth.clone(),
        );

        Self {
            registry,
            blocks_processed,
            contracts_detected,
            fetch_successes,
            fetch_failures,
            metadata_queue_depth,
            source_queue_depth,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_blocks_processed(&self, chain: &str, count: u64) {
        self.blocks_processed
            .get_or_create(&ChainLabel { chain: chain.to_string() })
            .inc_by(count);
    }

    pub fn record_contract_detected(&self, chain: &str) {
        self.contracts_detected
            .get_or_create(&ChainLabel { chain: chain.to_string() })
            .inc();
    }

    pub fn record_metadata_fetch(&self, chain: &str, success: bool) {
        self.record_fetch(chain, ChainStage::Metadata, success);
    }

    pub fn record_source_fetch(&self, chain: &str, success: bool) {
        self.record_fetch(chain, ChainStage::Source, success);
    }

    fn record_fetch(&self, chain: &str, stage: ChainStage, success: bool) {
        let label = ChainStageLabel { chain: chain.to_string(), stage };
        if success {
            self.fetch_successes.get_or_create(&label).inc();
        } else {
            self.fetch_failures.get_or_create(&label).inc();
        }
    }

    pub fn set_metadata_queue_depth(&self, chain: &str, depth: i64) {
        self.metadata_queue_depth
            .get_or_create(&ChainLabel { chain: chain.to_string() })
            .set(depth);
    }

    pub fn set_source_queue_depth(&self, chain: &str, depth: i64) {
        self.source_queue_depth
            .get_or_create(&ChainLabel { chain: chain.to_string() })
            .set(depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_chain() {
        let metrics = Metrics::new();
        metrics.record_blocks_processed("mainnet", 3);
        metrics.record_blocks_processed("mainnet", 1);
        metrics.record_blocks_processed("ropsten", 10);

        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, metrics.registry()).unwrap();
        assert!(buf.contains("blocks_processed_total{chain=\"mainnet\"} 4"));
        assert!(buf.contains("blocks_processed_total{chain=\"ropsten\"} 10"));
    }

    #[test]
    fn fetch_outcomes_are_split_by_stage() {
        let metrics = Metrics::new();
        metrics.record_metadata_fetch("mainnet", true);
        metrics.record_source_fetch("mainnet", false);

        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, metrics.registry()).unwrap();
        assert!(buf.contains("fetch_successes_total"));
        assert!(buf.contains("fetch_failures_total"));
    }
}
