use super::timestamps::stamp_records;
use super::{PartialDataWarning, ReconcileError, ReconcileOptions, newest_first_key, scan_ledger};
use crate::ledger::{EventFilter, EventKind, EventPayload, EventRecord, Ledger};
use alloy_primitives::utils::format_units;
use alloy_primitives::{Address, B256, U256};
use std::collections::HashSet;
use std::fmt;
use tracing::info;

/// Shown wherever a price does not apply.
pub const NO_PRICE: &str = "—";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Minted,
    Listed,
    Sold,
    Delisted,
    Transferred,
}

impl ActivityKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActivityKind::Minted => "Minted",
            ActivityKind::Listed => "Listed/Price Update",
            ActivityKind::Sold => "Sold",
            ActivityKind::Delisted => "Delisted",
            ActivityKind::Transferred => "Transferred",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<EventKind> for ActivityKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Minted => ActivityKind::Minted,
            EventKind::Listed => ActivityKind::Listed,
            EventKind::Sold => ActivityKind::Sold,
            EventKind::Delisted => ActivityKind::Delisted,
            EventKind::Transferred => ActivityKind::Transferred,
        }
    }
}

/// One display-ready line of a token's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    /// `{tx_hash}-{log_position}-{kind}`; stable across runs.
    pub id: String,
    pub kind: ActivityKind,
    pub token_id: U256,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub price: Option<U256>,
    pub price_label: String,
    pub timestamp: u64,
    pub block_height: u64,
    pub transaction_id: B256,
    pub log_position: u64,
}

/// A token's reconciled timeline, newest first.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    pub token_id: U256,
    pub from_height: u64,
    pub to_height: u64,
    pub entries: Vec<ActivityEntry>,
    pub warnings: Vec<PartialDataWarning>,
}

impl ActivityLog {
    /// False when some chunk or block could not be read.
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Renders a wei amount in ether with the shortest exact fraction,
/// keeping at least one fractional digit (`1.5`, `2.0`).
pub fn format_ether(value: U256) -> String {
    let raw = format_units(value, 18u8).unwrap_or_else(|_| value.to_string());
    match raw.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                format!("{whole}.0")
            } else {
                format!("{whole}.{fraction}")
            }
        }
        None => format!("{raw}.0"),
    }
}

fn price_label(kind: EventKind, price: Option<U256>) -> String {
    match (kind, price) {
        (EventKind::Minted, Some(p)) if !p.is_zero() => {
            format!("{} ETH (Initial List)", format_ether(p))
        }
        (EventKind::Listed | EventKind::Sold, Some(p)) => format!("{} ETH", format_ether(p)),
        _ => NO_PRICE.to_string(),
    }
}

/// `(transaction, seller, buyer)` of every sale; the matching `Transfer`
/// emitted in the same transaction is the sale's settlement leg.
pub(crate) fn sale_legs<'a>(
    records: impl IntoIterator<Item = &'a EventRecord>,
) -> HashSet<(B256, Address, Address)> {
    records
        .into_iter()
        .filter_map(|r| match r.payload {
            EventPayload::Sold { seller, buyer, .. } => Some((r.transaction_id, seller, buyer)),
            _ => None,
        })
        .collect()
}

/// Maps a record to its activity entry, or `None` for transfers already
/// represented by a mint or a sale.
pub fn to_activity_entry(
    record: &EventRecord,
    timestamp: u64,
    sale_legs: &HashSet<(B256, Address, Address)>,
) -> Option<ActivityEntry> {
    let (from, to) = match record.payload {
        EventPayload::Minted { creator, .. } => (Some(Address::ZERO), Some(creator)),
        EventPayload::Listed { seller, .. } | EventPayload::Delisted { seller } => {
            (Some(seller), None)
        }
        EventPayload::Sold { seller, buyer, .. } => (Some(seller), Some(buyer)),
        EventPayload::Transferred { from, to } => {
            if from == Address::ZERO || sale_legs.contains(&(record.transaction_id, from, to)) {
                return None;
            }
            (Some(from), Some(to))
        }
    };

    let kind = record.kind();
    let price = record.price();
    Some(ActivityEntry {
        id: format!(
            "{:?}-{}-{}",
            record.transaction_id,
            record.log_position,
            kind.slug()
        ),
        kind: kind.into(),
        token_id: record.token_id,
        from,
        to,
        price,
        price_label: price_label(kind, price),
        timestamp,
        block_height: record.block_height,
        transaction_id: record.transaction_id,
        log_position: record.log_position,
    })
}

/// Reconstructs the full history of `token_id` from the ledger.
///
/// Unknown tokens yield an empty log. Fails only when the ledger cannot be
/// reached at all; anything less is reported in [`ActivityLog::warnings`].
pub async fn reconcile_activity<L: Ledger + ?Sized>(
    ledger: &L,
    token_id: U256,
    options: &ReconcileOptions,
) -> Result<ActivityLog, ReconcileError> {
    let scan = scan_ledger(ledger, &EventKind::ALL, EventFilter::token(token_id), options).await?;
    let legs = sale_legs(scan.of_kind(EventKind::Sold));

    // Suppressed transfers never reach a timestamp lookup or a drop count.
    let reported: Vec<EventRecord> = scan
        .records
        .into_iter()
        .filter(|r| to_activity_entry(r, 0, &legs).is_some())
        .collect();

    let mut warnings = scan.warnings;
    let stamped = stamp_records(
        ledger,
        reported,
        options.block_lookup_concurrency,
        &mut warnings,
    )
    .await;

    let mut entries: Vec<ActivityEntry> = stamped
        .iter()
        .filter_map(|(record, ts)| to_activity_entry(record, *ts, &legs))
        .collect();
    entries.sort_by_key(|e| newest_first_key(e.timestamp, e.block_height, e.log_position));

    info!(
        "Token #{}: {} activity entries from blocks {}-{} ({} warning(s))",
        token_id,
        entries.len(),
        scan.from_height,
        scan.to_height,
        warnings.len()
    );

    Ok(ActivityLog {
        token_id,
        from_height: scan.from_height,
        to_height: scan.to_height,
        entries,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETH: u128 = 1_000_000_000_000_000_000;

    fn record(tx: u8, log: u64, payload: EventPayload) -> EventRecord {
        EventRecord {
            token_id: U256::from(42),
            block_height: 151,
            transaction_id: B256::repeat_byte(tx),
            log_position: log,
            payload,
        }
    }

    #[test]
    fn formats_ether_amounts() {
        assert_eq!(format_ether(U256::from(ETH * 3 / 2)), "1.5");
        assert_eq!(format_ether(U256::from(2 * ETH)), "2.0");
        assert_eq!(format_ether(U256::ZERO), "0.0");
        assert_eq!(format_ether(U256::from(1u64)), "0.000000000000000001");
    }

    #[test]
    fn free_mint_has_no_price() {
        let rec = record(
            1,
            0,
            EventPayload::Minted {
                creator: Address::repeat_byte(0xa),
                price: U256::ZERO,
            },
        );
        let entry = to_activity_entry(&rec, 1000, &HashSet::new()).unwrap();
        assert_eq!(entry.price_label, NO_PRICE);
        assert_eq!(entry.from, Some(Address::ZERO));
        assert_eq!(entry.to, Some(Address::repeat_byte(0xa)));
    }

    #[test]
    fn priced_mint_shows_initial_listing() {
        let rec = record(
            1,
            0,
            EventPayload::Minted {
                creator: Address::repeat_byte(0xa),
                price: U256::from(1_500_000_000_000_000_000u128),
            },
        );
        let entry = to_activity_entry(&rec, 1000, &HashSet::new()).unwrap();
        assert!(entry.price_label.contains("1.5"));
        assert_eq!(entry.price_label, "1.5 ETH (Initial List)");
    }

    #[test]
    fn listing_has_no_recipient() {
        let rec = record(
            2,
            1,
            EventPayload::Listed {
                seller: Address::repeat_byte(0xa),
                price: U256::from(2 * ETH),
            },
        );
        let entry = to_activity_entry(&rec, 1000, &HashSet::new()).unwrap();
        assert_eq!(entry.kind.label(), "Listed/Price Update");
        assert_eq!(entry.to, None);
        assert_eq!(entry.price_label, "2.0 ETH");
    }

    #[test]
    fn delisting_has_no_price() {
        let rec = record(
            2,
            1,
            EventPayload::Delisted {
                seller: Address::repeat_byte(0xa),
            },
        );
        let entry = to_activity_entry(&rec, 1000, &HashSet::new()).unwrap();
        assert_eq!(entry.price_label, NO_PRICE);
        assert_eq!(entry.price, None);
    }

    #[test]
    fn id_combines_transaction_position_and_kind() {
        let rec = record(
            0xab,
            7,
            EventPayload::Transferred {
                from: Address::repeat_byte(1),
                to: Address::repeat_byte(2),
            },
        );
        let entry = to_activity_entry(&rec, 1000, &HashSet::new()).unwrap();
        assert_eq!(
            entry.id,
            format!("{:?}-7-transfer", B256::repeat_byte(0xab))
        );
    }

    #[test]
    fn mint_transfer_is_suppressed() {
        let rec = record(
            1,
            0,
            EventPayload::Transferred {
                from: Address::ZERO,
                to: Address::repeat_byte(0xa),
            },
        );
        assert!(to_activity_entry(&rec, 1000, &HashSet::new()).is_none());
    }

    #[test]
    fn sale_leg_is_suppressed_only_for_matching_parties() {
        let seller = Address::repeat_byte(0xa);
        let buyer = Address::repeat_byte(0xb);
        let sold = record(
            9,
            0,
            EventPayload::Sold {
                seller,
                buyer,
                price: U256::from(ETH),
            },
        );
        let legs = sale_legs([&sold]);

        let leg = record(9, 1, EventPayload::Transferred { from: seller, to: buyer });
        assert!(to_activity_entry(&leg, 1000, &legs).is_none());

        let onward = record(
            9,
            2,
            EventPayload::Transferred {
                from: buyer,
                to: Address::repeat_byte(0xc),
            },
        );
        assert!(to_activity_entry(&onward, 1000, &legs).is_some());

        let other_tx = record(10, 0, EventPayload::Transferred { from: seller, to: buyer });
        assert!(to_activity_entry(&other_tx, 1000, &legs).is_some());
    }
}
