//! Block tailing and contract-creation detection (§4.2).

use crate::address::{derive_contract_address, parse_address_hex, to_hex_address};
use crate::chain::ChainContext;
use crate::footer;
use crate::queue::MetadataEntry;

/// The monitor never ingests more than this many blocks in a single tick,
/// biasing toward the chain tip instead of draining a long backlog at once.
const CATCH_UP_CAP: u64 = 4;

/// Runs one block tick for `ctx`: reads the chain head, advances the cursor
/// by at most [`CATCH_UP_CAP`] blocks, and queues a metadata lookup for every
/// contract-creation transaction found along the way.
#[tracing::instrument(skip(ctx), fields(chain = %ctx.name))]
pub async fn run_block_tick(ctx: &ChainContext) {
    let head = match ctx.client.block_number().await {
        Ok(head) => head,
        Err(error) => {
            tracing::warn!(stage = "blocks", chain = %ctx.name, %error, "failed to read chain head; tick aborted");
            return;
        }
    };

    let cursor = ctx.state.lock().cursor;
    // `.max(cursor)` guards against a lagging or reorg'd head reported below
    // the cursor: the cursor must never regress (§3), so such a head simply
    // leaves it unchanged for this tick rather than rewinding it.
    let target = head.min(cursor + CATCH_UP_CAP).max(cursor);

    for number in cursor..target {
        match ctx.client.block_by_number(number).await {
            Ok(Some(block)) => {
                for tx in &block.transactions {
                    if tx.to.is_some() {
                        continue;
                    }
                    process_creation(ctx, &tx.from, tx.nonce).await;
                }
            }
            Ok(None) => {
                tracing::warn!(stage = "blocks", chain = %ctx.name, number, "block not found, skipping");
            }
            Err(error) => {
                tracing::warn!(stage = "blocks", chain = %ctx.name, number, %error, "failed to fetch block, skipping");
            }
        }
    }

    ctx.state.lock().cursor = target;
    ctx.metrics.record_blocks_processed(&ctx.name, target.saturating_sub(cursor));
}

async fn process_creation(ctx: &ChainContext, sender_hex: &str, nonce: u64) {
    let Some(sender) = parse_address_hex(sender_hex) else {
        tracing::warn!(stage = "blocks", chain = %ctx.name, sender_hex, "unparsable sender address");
        return;
    };
    let address = derive_contract_address(&sender, nonce);
    let address_hex = to_hex_address(&address);

    let bytecode = match ctx.client.code_at(&address_hex).await {
        Ok(bytecode) => bytecode,
        Err(error) => {
            tracing::warn!(stage = "blocks", chain = %ctx.name, address = %address_hex, %error, "failed to fetch deployed bytecode, skipping");
            return;
        }
    };

    let pointer = match footer::decode_footer(&bytecode) {
        Ok(pointer) => pointer,
        Err(error) => {
            tracing::debug!(stage = "blocks", chain = %ctx.name, address = %address_hex, %error, "no recognized footer, dropping contract");
            return;
        }
    };

    let entry = MetadataEntry { pointer, timestamp_ms: 0 };
    let inserted = ctx.state.lock().metadata_queue.add(address_hex.clone(), entry);
    if inserted {
        ctx.metrics.record_contract_detected(&ctx.name);
        tracing::info!(stage = "blocks", chain = %ctx.name, address = %address_hex, "contract detected");
    }
}
