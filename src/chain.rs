use crate::catalog::{PromptRecord, SaleState};
use crate::events::{
    decode_event, getPromptDataCall, getSaleDataCall, getTokensByCreatorCall,
    getTokensByOwnerCall, getTokensForSaleCall, ownerOfCall, signature_hash, token_topic_index,
    tokenURICall,
};
use crate::ledger::{EventFilter, EventKind, EventRecord, Ledger, LedgerError};
use crate::rpc::{LogQueryError, RpcClient};
use alloy::rpc::types::Filter;
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

/// [`Ledger`] backed by the prompt contract on a JSON-RPC chain.
#[derive(Clone)]
pub struct ChainLedger {
    client: RpcClient,
    contract_address: Address,
}

impl ChainLedger {
    pub fn new(client: RpcClient, contract_address: Address) -> Self {
        Self {
            client,
            contract_address,
        }
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    fn build_filter(
        &self,
        kind: EventKind,
        filter: EventFilter,
        from_height: u64,
        to_height: u64,
    ) -> Filter {
        let base = Filter::new()
            .address(self.contract_address)
            .event_signature(signature_hash(kind))
            .from_block(from_height)
            .to_block(to_height);

        match filter.token_id {
            Some(token_id) => {
                let topic = B256::from(token_id.to_be_bytes::<32>());
                match token_topic_index(kind) {
                    3 => base.topic3(topic),
                    _ => base.topic1(topic),
                }
            }
            None => base,
        }
    }

    async fn view<C: SolCall>(&self, call: C, name: &str) -> Result<C::Return> {
        let output = self
            .client
            .call(self.contract_address, call.abi_encode().into())
            .await
            .with_context(|| format!("{name} call failed"))?;
        C::abi_decode_returns(&output)
            .with_context(|| format!("Failed to decode {name} return value"))
    }

    /// The metadata locator stored on-chain for `token_id`.
    pub async fn token_uri(&self, token_id: U256) -> Result<String> {
        self.view(tokenURICall { tokenId: token_id }, &format!("tokenURI({token_id})")).await
    }

    pub async fn owner_of(&self, token_id: U256) -> Result<Address> {
        self.view(ownerOfCall { tokenId: token_id }, &format!("ownerOf({token_id})")).await
    }

    pub async fn prompt_data(&self, token_id: U256) -> Result<PromptRecord> {
        let data = self
            .view(
                getPromptDataCall { tokenId: token_id },
                &format!("getPromptData({token_id})"),
            )
            .await?;
        Ok(data.into())
    }

    pub async fn sale_data(&self, token_id: U256) -> Result<SaleState> {
        let data = self
            .view(
                getSaleDataCall { tokenId: token_id },
                &format!("getSaleData({token_id})"),
            )
            .await?;
        Ok(data.into())
    }

    pub async fn tokens_for_sale(&self) -> Result<Vec<U256>> {
        self.view(getTokensForSaleCall {}, "getTokensForSale").await
    }

    pub async fn tokens_by_creator(&self, creator: Address) -> Result<Vec<U256>> {
        self.view(getTokensByCreatorCall { creator }, "getTokensByCreator").await
    }

    pub async fn tokens_by_owner(&self, owner: Address) -> Result<Vec<U256>> {
        self.view(getTokensByOwnerCall { owner }, "getTokensByOwner").await
    }
}

#[async_trait]
impl Ledger for ChainLedger {
    async fn current_height(&self) -> Result<u64, LedgerError> {
        self.client
            .get_latest_block()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))
    }

    async fn query_events(
        &self,
        kind: EventKind,
        filter: EventFilter,
        from_height: u64,
        to_height: u64,
    ) -> Result<Vec<EventRecord>, LedgerError> {
        let query = self.build_filter(kind, filter, from_height, to_height);
        let logs = self.client.get_logs(&query).await.map_err(|e| match e {
            LogQueryError::RangeLimit(reason) => LedgerError::RangeTooLarge {
                from: from_height,
                to: to_height,
                reason,
            },
            LogQueryError::Other(e) => LedgerError::Query(e.to_string()),
        })?;

        debug!(
            "{} logs for {} in blocks {}-{}",
            logs.len(),
            kind,
            from_height,
            to_height
        );

        let mut records = Vec::with_capacity(logs.len());
        for log in &logs {
            match decode_event(kind, log) {
                Ok(record) if filter.matches(&record) => records.push(record),
                Ok(_) => {}
                Err(e) => warn!("Failed to decode {} event: {}", kind, e),
            }
        }
        records.sort_by_key(|r| (r.block_height, r.log_position));
        Ok(records)
    }

    async fn block_timestamp(&self, height: u64) -> Result<u64, LedgerError> {
        self.client
            .get_block_timestamp(height)
            .await
            .map_err(|e| LedgerError::BlockLookupFailed {
                height,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> ChainLedger {
        let client = RpcClient::new(&["http://localhost:8545".to_string()], 0).unwrap();
        ChainLedger::new(client, Address::repeat_byte(0x42))
    }

    #[test]
    fn marketplace_filters_index_token_in_first_topic() {
        let filter =
            ledger().build_filter(EventKind::Sold, EventFilter::token(U256::from(42)), 0, 1999);
        let expected = B256::from(U256::from(42).to_be_bytes::<32>());
        assert!(filter.topics[1].matches(&expected));
        assert!(filter.topics[3].is_empty());
        assert!(filter.topics[0].matches(&signature_hash(EventKind::Sold)));
    }

    #[test]
    fn transfer_filter_indexes_token_in_third_topic() {
        let filter = ledger().build_filter(
            EventKind::Transferred,
            EventFilter::token(U256::from(42)),
            0,
            1999,
        );
        let expected = B256::from(U256::from(42).to_be_bytes::<32>());
        assert!(filter.topics[3].matches(&expected));
        assert!(filter.topics[1].is_empty());
    }

    #[test]
    fn unfiltered_query_leaves_token_topics_open() {
        let filter = ledger().build_filter(EventKind::Minted, EventFilter::any(), 100, 200);
        assert!(filter.topics[1].is_empty());
        assert_eq!(filter.get_from_block(), Some(100));
        assert_eq!(filter.get_to_block(), Some(200));
    }
}
