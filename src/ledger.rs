//! The ledger seam: typed contract events and the read-only interface the
//! reconciliation engine queries them through.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::fmt;

/// Category of marketplace log emitted by the prompt contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Minted,
    Listed,
    Sold,
    Delisted,
    Transferred,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Minted,
        EventKind::Listed,
        EventKind::Sold,
        EventKind::Delisted,
        EventKind::Transferred,
    ];

    /// Short lowercase tag used when deriving activity ids.
    pub fn slug(&self) -> &'static str {
        match self {
            EventKind::Minted => "minted",
            EventKind::Listed => "listed",
            EventKind::Sold => "sold",
            EventKind::Delisted => "delisted",
            EventKind::Transferred => "transfer",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Minted => "PromptMinted",
            EventKind::Listed => "PromptListed",
            EventKind::Sold => "PromptSold",
            EventKind::Delisted => "PromptDelisted",
            EventKind::Transferred => "Transfer",
        };
        f.write_str(name)
    }
}

/// Kind-specific fields of a decoded log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Minted { creator: Address, price: U256 },
    Listed { seller: Address, price: U256 },
    Sold { seller: Address, buyer: Address, price: U256 },
    Delisted { seller: Address },
    Transferred { from: Address, to: Address },
}

/// One decoded contract log. `(transaction_id, log_position)` is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub token_id: U256,
    pub block_height: u64,
    pub transaction_id: B256,
    pub log_position: u64,
    pub payload: EventPayload,
}

impl EventRecord {
    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Minted { .. } => EventKind::Minted,
            EventPayload::Listed { .. } => EventKind::Listed,
            EventPayload::Sold { .. } => EventKind::Sold,
            EventPayload::Delisted { .. } => EventKind::Delisted,
            EventPayload::Transferred { .. } => EventKind::Transferred,
        }
    }

    pub fn price(&self) -> Option<U256> {
        match self.payload {
            EventPayload::Minted { price, .. }
            | EventPayload::Listed { price, .. }
            | EventPayload::Sold { price, .. } => Some(price),
            EventPayload::Delisted { .. } | EventPayload::Transferred { .. } => None,
        }
    }
}

/// Server-side filter applied to an event query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub token_id: Option<U256>,
}

impl EventFilter {
    pub fn token(token_id: U256) -> Self {
        Self {
            token_id: Some(token_id),
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn matches(&self, record: &EventRecord) -> bool {
        self.token_id.is_none_or(|id| id == record.token_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The ledger refused to serve a height span this wide.
    #[error("block range {from}-{to} rejected as too large: {reason}")]
    RangeTooLarge { from: u64, to: u64, reason: String },

    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("timestamp lookup for block {height} failed: {reason}")]
    BlockLookupFailed { height: u64, reason: String },

    #[error("ledger query failed: {0}")]
    Query(String),
}

/// Append-only, block-indexed event log.
///
/// Implementations must be safe to share read-only between concurrent
/// reconciliation calls.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn current_height(&self) -> Result<u64, LedgerError>;

    /// Events of one kind in the inclusive height range `[from_height, to_height]`,
    /// ordered by `(block_height, log_position)`.
    async fn query_events(
        &self,
        kind: EventKind,
        filter: EventFilter,
        from_height: u64,
        to_height: u64,
    ) -> Result<Vec<EventRecord>, LedgerError>;

    /// Unix timestamp (seconds) of the block at `height`.
    async fn block_timestamp(&self, height: u64) -> Result<u64, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(token: u64, payload: EventPayload) -> EventRecord {
        EventRecord {
            token_id: U256::from(token),
            block_height: 10,
            transaction_id: B256::repeat_byte(0xaa),
            log_position: 0,
            payload,
        }
    }

    #[test]
    fn kind_follows_payload() {
        let seller = Address::repeat_byte(1);
        let rec = record(1, EventPayload::Delisted { seller });
        assert_eq!(rec.kind(), EventKind::Delisted);
        assert_eq!(rec.price(), None);

        let rec = record(
            1,
            EventPayload::Sold {
                seller,
                buyer: Address::repeat_byte(2),
                price: U256::from(5),
            },
        );
        assert_eq!(rec.kind(), EventKind::Sold);
        assert_eq!(rec.price(), Some(U256::from(5)));
    }

    #[test]
    fn token_filter_matches_only_its_token() {
        let rec = record(
            7,
            EventPayload::Transferred {
                from: Address::repeat_byte(1),
                to: Address::repeat_byte(2),
            },
        );
        assert!(EventFilter::any().matches(&rec));
        assert!(EventFilter::token(U256::from(7)).matches(&rec));
        assert!(!EventFilter::token(U256::from(8)).matches(&rec));
    }

    #[test]
    fn slugs_are_distinct() {
        let mut slugs: Vec<_> = EventKind::ALL.iter().map(|k| k.slug()).collect();
        slugs.sort();
        slugs.dedup();
        assert_eq!(slugs.len(), EventKind::ALL.len());
    }
}
