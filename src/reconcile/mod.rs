//! Rebuilding marketplace activity from contract logs.
//!
//! Every operation here is a pure read: it scans the ledger in bounded block
//! chunks, decodes the five event kinds concurrently, and derives its view
//! from the result. Chunk and timestamp failures degrade the output and are
//! reported as [`PartialDataWarning`]s; only an unreachable ledger is fatal.

pub mod account;
pub mod activity;
pub mod chunks;
pub mod stats;
pub mod timestamps;

pub use account::{AccountAction, AccountEntry, AccountHistory, reconcile_account_history};
pub use activity::{
    ActivityEntry, ActivityKind, ActivityLog, NO_PRICE, format_ether, reconcile_activity,
};
pub use chunks::{block_ranges, fetch_chunked};
pub use stats::{Leaderboard, MarketStats, RecentSale, SellerStanding, leaderboard, market_stats};

use crate::config::{
    Config, DEFAULT_BLOCK_LOOKUP_CONCURRENCY, DEFAULT_EVENT_QUERY_BATCH_SIZE,
    DEFAULT_MAX_RANGE_SPLITS,
};
use crate::ledger::{EventFilter, EventKind, EventRecord, Ledger};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Lowest block scanned, usually the contract's deployment block.
    pub start_height: u64,
    /// Width of each `eth_getLogs` sub-range.
    pub chunk_size: u64,
    /// How many times a chunk rejected as too large is halved before giving up.
    pub max_range_splits: u32,
    pub block_lookup_concurrency: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            start_height: 0,
            chunk_size: DEFAULT_EVENT_QUERY_BATCH_SIZE,
            max_range_splits: DEFAULT_MAX_RANGE_SPLITS,
            block_lookup_concurrency: DEFAULT_BLOCK_LOOKUP_CONCURRENCY,
        }
    }
}

impl ReconcileOptions {
    pub fn from_config(config: &Config, start_height: u64) -> Self {
        Self {
            start_height,
            chunk_size: config.event_query_batch_size,
            max_range_splits: config.max_range_splits,
            block_lookup_concurrency: config.block_lookup_concurrency,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),
}

/// Data the ledger could not supply; the result is missing these pieces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialDataWarning {
    ChunkDropped {
        kind: EventKind,
        from_height: u64,
        to_height: u64,
        reason: String,
    },
    BlockLookupFailed {
        height: u64,
        dropped_events: usize,
        reason: String,
    },
}

impl fmt::Display for PartialDataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartialDataWarning::ChunkDropped {
                kind,
                from_height,
                to_height,
                reason,
            } => write!(
                f,
                "{kind} events for blocks {from_height}-{to_height} unavailable: {reason}"
            ),
            PartialDataWarning::BlockLookupFailed {
                height,
                dropped_events,
                reason,
            } => write!(
                f,
                "{dropped_events} event(s) in block {height} dropped, no timestamp: {reason}"
            ),
        }
    }
}

/// Raw result of scanning the ledger for a set of event kinds.
#[derive(Debug)]
pub(crate) struct LedgerScan {
    pub from_height: u64,
    pub to_height: u64,
    /// Grouped by kind in the requested order, ascending height within a kind.
    pub records: Vec<EventRecord>,
    pub warnings: Vec<PartialDataWarning>,
}

impl LedgerScan {
    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &EventRecord> {
        self.records.iter().filter(move |r| r.kind() == kind)
    }
}

/// Queries every kind in `kinds` over `[start_height, current_height]`
/// concurrently and joins the results.
pub(crate) async fn scan_ledger<L: Ledger + ?Sized>(
    ledger: &L,
    kinds: &[EventKind],
    filter: EventFilter,
    options: &ReconcileOptions,
) -> Result<LedgerScan, ReconcileError> {
    let to_height = ledger
        .current_height()
        .await
        .map_err(|e| ReconcileError::LedgerUnavailable(e.to_string()))?;
    let from_height = options.start_height;

    debug!(
        "Scanning {} event kind(s) over blocks {}-{}",
        kinds.len(),
        from_height,
        to_height
    );

    let queries = kinds.iter().map(|&kind| {
        chunks::fetch_chunked(ledger, kind, filter, from_height, to_height, options)
    });
    let results = futures::future::join_all(queries).await;

    let mut records = Vec::new();
    let mut warnings = Vec::new();
    for (batch, batch_warnings) in results {
        records.extend(batch);
        warnings.extend(batch_warnings);
    }

    Ok(LedgerScan {
        from_height,
        to_height,
        records,
        warnings,
    })
}

/// Newest first: timestamp, then block height, then log position, all descending.
pub(crate) fn newest_first_key(timestamp: u64, block_height: u64, log_position: u64) -> impl Ord {
    std::cmp::Reverse((timestamp, block_height, log_position))
}
