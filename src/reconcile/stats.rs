use super::timestamps::stamp_records;
use super::{PartialDataWarning, ReconcileError, ReconcileOptions, scan_ledger};
use crate::ledger::{EventFilter, EventKind, EventPayload, EventRecord, Ledger};
use alloy_primitives::{Address, B256, U256};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use tracing::info;

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
pub const DEFAULT_RECENT_SALES: usize = 5;

/// Marketplace-wide totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketStats {
    pub prompts_created: u64,
    pub active_creators: u64,
    pub total_trades: u64,
    /// Sum of sale prices, in wei.
    pub volume_traded: U256,
    pub from_height: u64,
    pub to_height: u64,
    pub warnings: Vec<PartialDataWarning>,
}

impl MarketStats {
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellerStanding {
    pub seller: Address,
    pub volume: U256,
    pub sales: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentSale {
    pub token_id: U256,
    pub seller: Address,
    pub buyer: Address,
    pub price: U256,
    /// `None` when the block's timestamp could not be read.
    pub timestamp: Option<u64>,
    pub block_height: u64,
    pub transaction_id: B256,
    pub log_position: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Leaderboard {
    pub top_sellers: Vec<SellerStanding>,
    pub recent_sales: Vec<RecentSale>,
    pub top_volume: Option<SellerStanding>,
    pub most_sales: Option<SellerStanding>,
    pub active_sellers: usize,
    pub from_height: u64,
    pub to_height: u64,
    pub warnings: Vec<PartialDataWarning>,
}

impl Leaderboard {
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Folds mint and sale records into totals. Other kinds are ignored.
pub fn summarize<'a>(records: impl IntoIterator<Item = &'a EventRecord>) -> MarketStats {
    let mut stats = MarketStats::default();
    let mut creators = HashSet::new();

    for record in records {
        match record.payload {
            EventPayload::Minted { creator, .. } => {
                stats.prompts_created += 1;
                creators.insert(creator);
            }
            EventPayload::Sold { price, .. } => {
                stats.total_trades += 1;
                stats.volume_traded = stats.volume_traded.saturating_add(price);
            }
            _ => {}
        }
    }

    stats.active_creators = creators.len() as u64;
    stats
}

/// Every seller's volume and sale count, best first: volume, then sales,
/// then address.
pub fn rank_sellers<'a>(records: impl IntoIterator<Item = &'a EventRecord>) -> Vec<SellerStanding> {
    let mut by_seller: HashMap<Address, SellerStanding> = HashMap::new();

    for record in records {
        if let EventPayload::Sold { seller, price, .. } = record.payload {
            let standing = by_seller.entry(seller).or_insert(SellerStanding {
                seller,
                volume: U256::ZERO,
                sales: 0,
            });
            standing.volume = standing.volume.saturating_add(price);
            standing.sales += 1;
        }
    }

    let mut ranked: Vec<SellerStanding> = by_seller.into_values().collect();
    ranked.sort_by(|a, b| {
        b.volume
            .cmp(&a.volume)
            .then(b.sales.cmp(&a.sales))
            .then(a.seller.cmp(&b.seller))
    });
    ranked
}

fn recent_sale(record: &EventRecord, timestamp: Option<u64>) -> Option<RecentSale> {
    match record.payload {
        EventPayload::Sold {
            seller,
            buyer,
            price,
        } => Some(RecentSale {
            token_id: record.token_id,
            seller,
            buyer,
            price,
            timestamp,
            block_height: record.block_height,
            transaction_id: record.transaction_id,
            log_position: record.log_position,
        }),
        _ => None,
    }
}

/// Counts mints, creators, trades and traded volume across the marketplace.
pub async fn market_stats<L: Ledger + ?Sized>(
    ledger: &L,
    options: &ReconcileOptions,
) -> Result<MarketStats, ReconcileError> {
    let scan = scan_ledger(
        ledger,
        &[EventKind::Minted, EventKind::Sold],
        EventFilter::any(),
        options,
    )
    .await?;

    let mut stats = summarize(&scan.records);
    stats.from_height = scan.from_height;
    stats.to_height = scan.to_height;
    stats.warnings = scan.warnings;

    info!(
        "Market stats: {} prompts, {} creators, {} trades",
        stats.prompts_created, stats.active_creators, stats.total_trades
    );

    Ok(stats)
}

/// Top `limit` sellers by volume and the `recent` newest sales.
pub async fn leaderboard<L: Ledger + ?Sized>(
    ledger: &L,
    limit: usize,
    recent: usize,
    options: &ReconcileOptions,
) -> Result<Leaderboard, ReconcileError> {
    let scan = scan_ledger(ledger, &[EventKind::Sold], EventFilter::any(), options).await?;

    let ranked = rank_sellers(&scan.records);
    let top_volume = ranked.first().cloned();
    let most_sales = ranked
        .iter()
        .max_by(|a, b| a.sales.cmp(&b.sales).then(b.seller.cmp(&a.seller)))
        .cloned();
    let active_sellers = ranked.len();
    let top_sellers: Vec<SellerStanding> = ranked.into_iter().take(limit).collect();

    let mut sales = scan.records;
    sales.sort_by_key(|r| Reverse((r.block_height, r.log_position)));
    sales.truncate(recent);

    let mut warnings = scan.warnings;
    let mut stamp_warnings = Vec::new();
    let stamped = stamp_records(
        ledger,
        sales.clone(),
        options.block_lookup_concurrency,
        &mut stamp_warnings,
    )
    .await;
    let times: HashMap<(B256, u64), u64> = stamped
        .iter()
        .map(|(r, ts)| ((r.transaction_id, r.log_position), *ts))
        .collect();

    // An unknown timestamp only blanks the column here, nothing is dropped.
    let recent_sales = sales
        .iter()
        .filter_map(|r| {
            let ts = times.get(&(r.transaction_id, r.log_position)).copied();
            recent_sale(r, ts)
        })
        .collect();
    warnings.extend(stamp_warnings.into_iter().map(|w| match w {
        PartialDataWarning::BlockLookupFailed { height, reason, .. } => {
            PartialDataWarning::BlockLookupFailed {
                height,
                dropped_events: 0,
                reason,
            }
        }
        other => other,
    }));

    info!(
        "Leaderboard: {} seller(s), {} recent sale(s)",
        active_sellers,
        sales.len()
    );

    Ok(Leaderboard {
        top_sellers,
        recent_sales,
        top_volume,
        most_sales,
        active_sellers,
        from_height: scan.from_height,
        to_height: scan.to_height,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sold(seller: u8, price: u64, height: u64) -> EventRecord {
        EventRecord {
            token_id: U256::from(height),
            block_height: height,
            transaction_id: B256::repeat_byte(height as u8),
            log_position: 0,
            payload: EventPayload::Sold {
                seller: Address::repeat_byte(seller),
                buyer: Address::repeat_byte(0xee),
                price: U256::from(price),
            },
        }
    }

    fn minted(creator: u8, height: u64) -> EventRecord {
        EventRecord {
            token_id: U256::from(height),
            block_height: height,
            transaction_id: B256::repeat_byte(height as u8),
            log_position: 0,
            payload: EventPayload::Minted {
                creator: Address::repeat_byte(creator),
                price: U256::ZERO,
            },
        }
    }

    #[test]
    fn summarizes_mints_and_sales() {
        let records = vec![
            minted(1, 10),
            minted(1, 11),
            minted(2, 12),
            sold(1, 300, 20),
            sold(2, 200, 21),
        ];
        let stats = summarize(&records);
        assert_eq!(stats.prompts_created, 3);
        assert_eq!(stats.active_creators, 2);
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.volume_traded, U256::from(500));
    }

    #[test]
    fn empty_market_is_all_zero() {
        let stats = summarize(&Vec::<EventRecord>::new());
        assert_eq!(stats, MarketStats::default());
    }

    #[test]
    fn ranks_by_volume_then_sales_then_address() {
        let records = vec![
            sold(3, 100, 1),
            sold(3, 100, 2),
            sold(2, 200, 3),
            sold(1, 200, 4),
            sold(4, 500, 5),
        ];
        let ranked = rank_sellers(&records);
        let order: Vec<Address> = ranked.iter().map(|s| s.seller).collect();
        assert_eq!(
            order,
            vec![
                Address::repeat_byte(4),
                Address::repeat_byte(3),
                Address::repeat_byte(1),
                Address::repeat_byte(2),
            ]
        );
        assert_eq!(ranked[1].sales, 2);
        assert_eq!(ranked[1].volume, U256::from(200));
    }

    #[test]
    fn recent_sale_ignores_other_kinds() {
        assert!(recent_sale(&minted(1, 1), None).is_none());
        let sale = recent_sale(&sold(1, 9, 3), Some(77)).unwrap();
        assert_eq!(sale.price, U256::from(9));
        assert_eq!(sale.timestamp, Some(77));
    }
}
