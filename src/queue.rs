//! The first-write-wins, timestamp-evicted map that backs both the metadata
//! and source queues of a chain context.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// 20-byte contract address, kept as the lowercase hex string used throughout
/// the pipeline (block responses, repository paths, log fields).
pub type Address = String;

/// Anything that can report and carry the wall-clock millisecond timestamp
/// the queue stamps it with on insertion.
pub trait Aged {
    fn timestamp_ms(&self) -> i64;
    fn set_timestamp_ms(&mut self, ts: i64);
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_millis() as i64
}

/// Where the deployed bytecode's CBOR footer pointed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataPointer {
    SwarmBzzr1 { hash: String },
    Ipfs { cid: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub pointer: MetadataPointer,
    pub timestamp_ms: i64,
}

impl Aged for MetadataEntry {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }
    fn set_timestamp_ms(&mut self, ts: i64) {
        self.timestamp_ms = ts;
    }
}

/// Where to find one compilation source file, and the digest it must hash to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub keccak256: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub raw_metadata: Vec<u8>,
    pub pending_sources: HashMap<String, SourceDescriptor>,
    pub timestamp_ms: i64,
}

impl Aged for SourceEntry {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }
    fn set_timestamp_ms(&mut self, ts: i64) {
        self.timestamp_ms = ts;
    }
}

/// A map from contract address to queue entry, with first-write-wins
/// insertion and age-based eviction. Every mutator is `&mut self`; callers
/// are expected to hold the owning chain's lock for the duration of a tick.
#[derive(Debug, Default)]
pub struct Queue<V> {
    entries: HashMap<Address, V>,
}

impl<V: Aged> Queue<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Inserts `entry` under `key` unless the key is already present, in
    /// which case this is a no-op that preserves the original entry
    /// (including its timestamp). Returns whether the insertion happened.
    pub fn add(&mut self, key: Address, mut entry: V) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        entry.set_timestamp_ms(now_ms());
        self.entries.insert(key, entry);
        true
    }

    /// Removes every entry whose age exceeds `max_age_secs`.
    pub fn evict(&mut self, max_age_secs: u64) {
        let now = now_ms();
        let max_age_ms = max_age_secs as i64 * 1000;
        self.entries
            .retain(|_, entry| now - entry.timestamp_ms() <= max_age_ms);
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key)
    }

    /// Inserts `entry` under `key` with an explicit timestamp, bypassing the
    /// first-write-wins check and the `now_ms()` stamp. For fixtures that
    /// need to seed an already-aged entry, such as a staleness-eviction test.
    pub fn add_at(&mut self, key: Address, mut entry: V, timestamp_ms: i64) {
        entry.set_timestamp_ms(timestamp_ms);
        self.entries.insert(key, entry);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &V)> {
        self.entries.iter()
    }

    /// Snapshots the current keys, so a tick can iterate a stable list while
    /// mutating the queue (e.g. removing entries it has just drained).
    pub fn keys_snapshot(&self) -> Vec<Address> {
        self.entries.keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries.get_mut(key)
    }
}
