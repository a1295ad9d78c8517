use super::PartialDataWarning;
use crate::ledger::{EventRecord, Ledger};
use futures::StreamExt;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

/// Block timestamps resolved for one reconciliation call. Each height is
/// looked up at most once; nothing is shared between calls.
#[derive(Debug, Default)]
pub(crate) struct BlockTimestamps {
    resolved: HashMap<u64, u64>,
    failed: BTreeMap<u64, String>,
}

impl BlockTimestamps {
    pub async fn resolve<L: Ledger + ?Sized>(
        ledger: &L,
        heights: impl IntoIterator<Item = u64>,
        concurrency: usize,
    ) -> Self {
        let unique: BTreeSet<u64> = heights.into_iter().collect();

        let lookups: Vec<_> = futures::stream::iter(unique)
            .map(|height| async move { (height, ledger.block_timestamp(height).await) })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut timestamps = Self::default();
        for (height, outcome) in lookups {
            match outcome {
                Ok(ts) => {
                    timestamps.resolved.insert(height, ts);
                }
                Err(e) => {
                    warn!("Timestamp lookup for block {} failed: {}", height, e);
                    timestamps.failed.insert(height, e.to_string());
                }
            }
        }
        timestamps
    }

    pub fn get(&self, height: u64) -> Option<u64> {
        self.resolved.get(&height).copied()
    }
}

/// Pairs each record with its block timestamp. Records whose block could not
/// be resolved are dropped and reported once per block.
pub(crate) async fn stamp_records<L: Ledger + ?Sized>(
    ledger: &L,
    records: Vec<EventRecord>,
    concurrency: usize,
    warnings: &mut Vec<PartialDataWarning>,
) -> Vec<(EventRecord, u64)> {
    let clock =
        BlockTimestamps::resolve(ledger, records.iter().map(|r| r.block_height), concurrency)
            .await;

    let mut dropped: BTreeMap<u64, usize> = BTreeMap::new();
    let mut stamped = Vec::with_capacity(records.len());
    for record in records {
        match clock.get(record.block_height) {
            Some(ts) => stamped.push((record, ts)),
            None => *dropped.entry(record.block_height).or_default() += 1,
        }
    }

    for (height, dropped_events) in dropped {
        let reason = clock
            .failed
            .get(&height)
            .cloned()
            .unwrap_or_else(|| "no timestamp".to_string());
        warnings.push(PartialDataWarning::BlockLookupFailed {
            height,
            dropped_events,
            reason,
        });
    }

    stamped
}
