use super::{PartialDataWarning, ReconcileOptions};
use crate::ledger::{EventFilter, EventKind, EventRecord, Ledger, LedgerError};
use tracing::{debug, warn};

/// Splits `[from, to]` into consecutive inclusive sub-ranges of `chunk_size`
/// blocks, ending at `to`. The last sub-range takes at most one extra block,
/// so no query is ever wider than `chunk_size + 1`.
pub fn block_ranges(from: u64, to: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    if from > to {
        return ranges;
    }

    let size = chunk_size.max(1);
    let mut start = from;
    loop {
        if to - start <= size {
            ranges.push((start, to));
            return ranges;
        }
        ranges.push((start, start + size - 1));
        start += size;
    }
}

/// All events of one kind over `[from, to]`, queried chunk by chunk in
/// ascending order.
///
/// A chunk the ledger rejects as too large is halved, up to
/// `options.max_range_splits` times. Any chunk that still fails is skipped and
/// reported as a warning.
pub async fn fetch_chunked<L: Ledger + ?Sized>(
    ledger: &L,
    kind: EventKind,
    filter: EventFilter,
    from: u64,
    to: u64,
    options: &ReconcileOptions,
) -> (Vec<EventRecord>, Vec<PartialDataWarning>) {
    let mut records = Vec::new();
    let mut warnings = Vec::new();

    // popped from the back, so keep it in descending order
    let mut pending: Vec<(u64, u64, u32)> = block_ranges(from, to, options.chunk_size)
        .into_iter()
        .rev()
        .map(|(start, end)| (start, end, 0))
        .collect();

    while let Some((start, end, depth)) = pending.pop() {
        match ledger.query_events(kind, filter, start, end).await {
            Ok(batch) => records.extend(batch),
            Err(LedgerError::RangeTooLarge { .. })
                if depth < options.max_range_splits && start < end =>
            {
                let mid = start + (end - start) / 2;
                debug!(
                    "{} query for blocks {}-{} too large, splitting at {}",
                    kind, start, end, mid
                );
                pending.push((mid + 1, end, depth + 1));
                pending.push((start, mid, depth + 1));
            }
            Err(e) => {
                warn!(
                    "Dropping {} events for blocks {}-{}: {}",
                    kind, start, end, e
                );
                warnings.push(PartialDataWarning::ChunkDropped {
                    kind,
                    from_height: start,
                    to_height: end,
                    reason: e.to_string(),
                });
            }
        }
    }

    (records, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_range_into_fixed_chunks() {
        assert_eq!(
            block_ranges(0, 10_000, 2000),
            vec![
                (0, 1999),
                (2000, 3999),
                (4000, 5999),
                (6000, 7999),
                (8000, 10_000)
            ]
        );
    }

    #[test]
    fn exact_multiple_has_no_stub_chunk() {
        assert_eq!(block_ranges(0, 3999, 2000), vec![(0, 1999), (2000, 3999)]);
    }

    #[test]
    fn short_range_is_a_single_chunk() {
        assert_eq!(
            block_ranges(9_710_000, 9_710_500, 2000),
            vec![(9_710_000, 9_710_500)]
        );
        assert_eq!(block_ranges(5, 5, 2000), vec![(5, 5)]);
    }

    #[test]
    fn inverted_range_is_empty() {
        assert!(block_ranges(10, 9, 2000).is_empty());
    }

    #[test]
    fn zero_chunk_size_degrades_to_single_blocks() {
        assert_eq!(block_ranges(3, 6, 0), vec![(3, 3), (4, 4), (5, 6)]);
    }

    #[test]
    fn long_remainder_gets_its_own_chunk() {
        assert_eq!(block_ranges(0, 3998, 2000), vec![(0, 1999), (2000, 3998)]);
        assert_eq!(
            block_ranges(0, 5998, 2000),
            vec![(0, 1999), (2000, 3999), (4000, 5998)]
        );
    }

    #[test]
    fn no_chunk_exceeds_size_plus_one() {
        let cases = [
            (0, 3998, 2000),
            (17, 9_999, 2000),
            (0, 10_000, 2000),
            (5, 1_234, 100),
        ];
        for (from, to, size) in cases {
            for (start, end) in block_ranges(from, to, size) {
                assert!(end - start <= size, "{start}-{end} wider than {size} + 1");
            }
        }
    }

    #[test]
    fn chunks_cover_range_without_gaps() {
        let ranges = block_ranges(123, 98_765, 1000);
        assert_eq!(ranges.first().map(|r| r.0), Some(123));
        assert_eq!(ranges.last().map(|r| r.1), Some(98_765));
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].1 + 1, pair[1].0);
        }
    }
}
