#![allow(dead_code)]

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use prompt_ledger::ledger::{EventFilter, EventKind, EventPayload, EventRecord, Ledger, LedgerError};
use std::collections::HashSet;
use std::sync::Mutex;

pub const ETH: u128 = 1_000_000_000_000_000_000;
pub const GENESIS_TIME: u64 = 1_700_000_000;

pub fn addr(n: u8) -> Address {
    Address::repeat_byte(n)
}

pub fn tx(n: u8) -> B256 {
    B256::repeat_byte(n)
}

pub fn eth(amount: u128) -> U256 {
    U256::from(amount * ETH)
}

pub fn block_time(height: u64) -> u64 {
    GENESIS_TIME + height * 12
}

#[derive(Default)]
struct State {
    height: u64,
    events: Vec<EventRecord>,
    max_span: Option<u64>,
    failing_blocks: HashSet<u64>,
    unavailable: bool,
    queries: Vec<(EventKind, u64, u64)>,
    timestamp_lookups: Vec<u64>,
}

/// In-memory ledger with injectable failures.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new(height: u64) -> Self {
        let ledger = Self::default();
        ledger.set_height(height);
        ledger
    }

    pub fn with_events(self, events: impl IntoIterator<Item = EventRecord>) -> Self {
        for event in events {
            self.push(event);
        }
        self
    }

    /// Rejects any query wider than `span` blocks as too large.
    pub fn with_max_span(self, span: u64) -> Self {
        self.state.lock().unwrap().max_span = Some(span);
        self
    }

    pub fn fail_timestamp(&self, height: u64) {
        self.state.lock().unwrap().failing_blocks.insert(height);
    }

    pub fn clear_timestamp_failures(&self) {
        self.state.lock().unwrap().failing_blocks.clear();
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().unwrap().height = height;
    }

    pub fn push(&self, event: EventRecord) {
        self.state.lock().unwrap().events.push(event);
    }

    pub fn queries(&self) -> Vec<(EventKind, u64, u64)> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn queries_for(&self, kind: EventKind) -> Vec<(u64, u64)> {
        self.queries()
            .into_iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, from, to)| (from, to))
            .collect()
    }

    pub fn timestamp_lookups(&self) -> Vec<u64> {
        self.state.lock().unwrap().timestamp_lookups.clone()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn current_height(&self) -> Result<u64, LedgerError> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(LedgerError::Unavailable("connection refused".to_string()));
        }
        Ok(state.height)
    }

    async fn query_events(
        &self,
        kind: EventKind,
        filter: EventFilter,
        from_height: u64,
        to_height: u64,
    ) -> Result<Vec<EventRecord>, LedgerError> {
        let mut state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(LedgerError::Unavailable("connection refused".to_string()));
        }
        state.queries.push((kind, from_height, to_height));

        if let Some(span) = state.max_span {
            if to_height - from_height + 1 > span {
                return Err(LedgerError::RangeTooLarge {
                    from: from_height,
                    to: to_height,
                    reason: format!("query exceeds max block range {span}"),
                });
            }
        }

        let mut found: Vec<EventRecord> = state
            .events
            .iter()
            .filter(|e| e.kind() == kind)
            .filter(|e| filter.matches(e))
            .filter(|e| (from_height..=to_height).contains(&e.block_height))
            .cloned()
            .collect();
        found.sort_by_key(|e| (e.block_height, e.log_position));
        Ok(found)
    }

    async fn block_timestamp(&self, height: u64) -> Result<u64, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.timestamp_lookups.push(height);
        if state.failing_blocks.contains(&height) {
            return Err(LedgerError::BlockLookupFailed {
                height,
                reason: "header not found".to_string(),
            });
        }
        Ok(block_time(height))
    }
}

fn record(token: u64, height: u64, tx_id: u8, log: u64, payload: EventPayload) -> EventRecord {
    EventRecord {
        token_id: U256::from(token),
        block_height: height,
        transaction_id: tx(tx_id),
        log_position: log,
        payload,
    }
}

pub fn minted(token: u64, height: u64, tx_id: u8, creator: Address, price: U256) -> EventRecord {
    record(token, height, tx_id, 1, EventPayload::Minted { creator, price })
}

pub fn listed(token: u64, height: u64, tx_id: u8, seller: Address, price: U256) -> EventRecord {
    record(token, height, tx_id, 0, EventPayload::Listed { seller, price })
}

pub fn sold(
    token: u64,
    height: u64,
    tx_id: u8,
    seller: Address,
    buyer: Address,
    price: U256,
) -> EventRecord {
    record(
        token,
        height,
        tx_id,
        1,
        EventPayload::Sold {
            seller,
            buyer,
            price,
        },
    )
}

pub fn delisted(token: u64, height: u64, tx_id: u8, seller: Address) -> EventRecord {
    record(token, height, tx_id, 0, EventPayload::Delisted { seller })
}

pub fn transfer(token: u64, height: u64, tx_id: u8, from: Address, to: Address) -> EventRecord {
    record(token, height, tx_id, 0, EventPayload::Transferred { from, to })
}
