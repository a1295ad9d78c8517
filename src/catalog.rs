//! Current on-chain state of prompt tokens: details, listings and the tokens
//! an account created or owns. These are direct contract reads, unlike the
//! log-derived views in [`crate::reconcile`].

use crate::chain::ChainLedger;
use crate::events::{PromptData, SaleData};
use crate::reconcile::format_ether;
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use futures::StreamExt;
use tracing::{info, warn};

pub const NOT_FOR_SALE: &str = "Not for sale";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleState {
    pub price: U256,
    pub is_for_sale: bool,
    pub seller: Address,
}

impl SaleState {
    /// Listed at a non-zero price.
    pub fn is_listed(&self) -> bool {
        self.is_for_sale && !self.price.is_zero()
    }

    pub fn price_label(&self) -> String {
        if self.is_listed() {
            format!("{} ETH", format_ether(self.price))
        } else {
            NOT_FOR_SALE.to_string()
        }
    }
}

impl From<SaleData> for SaleState {
    fn from(data: SaleData) -> Self {
        Self {
            price: data.price,
            is_for_sale: data.isForSale,
            seller: data.seller,
        }
    }
}

/// The prompt fields stored by the contract at mint time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRecord {
    pub title: String,
    pub platform: String,
    pub description: String,
    pub prompt_text: String,
    pub creator: Address,
    pub created_at: u64,
    pub include_media: bool,
    pub include_output_sample: bool,
    pub prompt_hash: B256,
}

impl From<PromptData> for PromptRecord {
    fn from(data: PromptData) -> Self {
        Self {
            title: data.title,
            platform: data.platform,
            description: data.description,
            prompt_text: data.promptText,
            creator: data.creator,
            created_at: data.createdAt.saturating_to(),
            include_media: data.includeMedia,
            include_output_sample: data.includeOutputSample,
            prompt_hash: data.promptHash,
        }
    }
}

/// `title`, or `Prompt #id` when the contract stored none.
pub fn display_title(title: &str, token_id: U256) -> String {
    if title.trim().is_empty() {
        format!("Prompt #{token_id}")
    } else {
        title.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct TokenDetails {
    pub token_id: U256,
    pub prompt: PromptRecord,
    pub sale: SaleState,
    pub owner: Address,
    pub token_uri: String,
}

impl TokenDetails {
    pub fn title(&self) -> String {
        display_title(&self.prompt.title, self.token_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub token_id: U256,
    pub sale: SaleState,
    pub token_uri: String,
}

/// Tokens currently for sale, newest token id first.
#[derive(Debug, Clone, Default)]
pub struct ForSale {
    pub listings: Vec<Listing>,
    /// Token ids whose sale data or URI could not be read.
    pub unreadable: Vec<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCard {
    pub token_id: U256,
    pub title: String,
    pub creator: Address,
    pub sale: SaleState,
}

impl TokenCard {
    pub fn new(token_id: U256, prompt: &PromptRecord, sale: SaleState) -> Self {
        Self {
            token_id,
            title: display_title(&prompt.title, token_id),
            creator: prompt.creator,
            sale,
        }
    }
}

/// Tokens an account minted and tokens it holds; the two may overlap.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub account: Address,
    pub created: Vec<TokenCard>,
    pub owned: Vec<TokenCard>,
    pub unreadable: Vec<U256>,
}

fn newest_first(ids: &mut [U256]) {
    ids.sort_unstable_by(|a, b| b.cmp(a));
}

/// Everything the contract holds about one token.
pub async fn token_details(chain: &ChainLedger, token_id: U256) -> Result<TokenDetails> {
    let (prompt, sale, token_uri, owner) = tokio::try_join!(
        chain.prompt_data(token_id),
        chain.sale_data(token_id),
        chain.token_uri(token_id),
        chain.owner_of(token_id),
    )?;

    Ok(TokenDetails {
        token_id,
        prompt,
        sale,
        owner,
        token_uri,
    })
}

async fn read_listing(chain: &ChainLedger, token_id: U256) -> Result<Listing> {
    let (sale, token_uri) = tokio::try_join!(chain.sale_data(token_id), chain.token_uri(token_id))?;
    Ok(Listing {
        token_id,
        sale,
        token_uri,
    })
}

async fn read_card(chain: &ChainLedger, token_id: U256) -> Result<TokenCard> {
    let (prompt, sale) = tokio::try_join!(chain.prompt_data(token_id), chain.sale_data(token_id))?;
    Ok(TokenCard::new(token_id, &prompt, sale))
}

/// Every token the contract reports as for sale, with its price and URI.
/// A token whose reads fail is listed in [`ForSale::unreadable`].
pub async fn tokens_for_sale(chain: &ChainLedger, concurrency: usize) -> Result<ForSale> {
    let ids = chain.tokens_for_sale().await?;

    let reads: Vec<(U256, Result<Listing>)> = futures::stream::iter(ids)
        .map(|token_id| async move { (token_id, read_listing(chain, token_id).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut for_sale = ForSale::default();
    for (token_id, read) in reads {
        match read {
            Ok(listing) => for_sale.listings.push(listing),
            Err(e) => {
                warn!("Skipping listed token #{}: {:#}", token_id, e);
                for_sale.unreadable.push(token_id);
            }
        }
    }
    for_sale
        .listings
        .sort_unstable_by(|a, b| b.token_id.cmp(&a.token_id));
    newest_first(&mut for_sale.unreadable);

    info!(
        "{} token(s) for sale ({} unreadable)",
        for_sale.listings.len(),
        for_sale.unreadable.len()
    );
    Ok(for_sale)
}

async fn token_cards(
    chain: &ChainLedger,
    mut ids: Vec<U256>,
    concurrency: usize,
    unreadable: &mut Vec<U256>,
) -> Vec<TokenCard> {
    newest_first(&mut ids);

    let reads: Vec<(U256, Result<TokenCard>)> = futures::stream::iter(ids)
        .map(|token_id| async move { (token_id, read_card(chain, token_id).await) })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut cards = Vec::with_capacity(reads.len());
    for (token_id, read) in reads {
        match read {
            Ok(card) => cards.push(card),
            Err(e) => {
                warn!("Skipping token #{}: {:#}", token_id, e);
                if !unreadable.contains(&token_id) {
                    unreadable.push(token_id);
                }
            }
        }
    }
    cards
}

/// Created and owned tokens of `account`. A contract without one of the
/// index functions yields an empty list for it rather than an error.
pub async fn portfolio(
    chain: &ChainLedger,
    account: Address,
    concurrency: usize,
) -> Result<Portfolio> {
    let created_ids = chain.tokens_by_creator(account).await.unwrap_or_else(|e| {
        warn!("getTokensByCreator failed for {}: {:#}", account, e);
        Vec::new()
    });
    let owned_ids = chain.tokens_by_owner(account).await.unwrap_or_else(|e| {
        warn!("getTokensByOwner failed for {}: {:#}", account, e);
        Vec::new()
    });

    let mut unreadable = Vec::new();
    let created = token_cards(chain, created_ids, concurrency, &mut unreadable).await;
    let owned = token_cards(chain, owned_ids, concurrency, &mut unreadable).await;
    newest_first(&mut unreadable);

    Ok(Portfolio {
        account,
        created,
        owned,
        unreadable,
    })
}
