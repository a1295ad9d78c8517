use crate::ledger::{EventKind, EventPayload, EventRecord};
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy_primitives::B256;
use anyhow::Context;

sol! {
    event PromptMinted(
        uint256 indexed tokenId,
        address indexed creator,
        string title,
        string platform,
        uint256 price,
        string tokenURI
    );
    event PromptListed(uint256 indexed tokenId, address indexed seller, uint256 price);
    event PromptSold(
        uint256 indexed tokenId,
        address indexed seller,
        address indexed buyer,
        uint256 price
    );
    event PromptDelisted(uint256 indexed tokenId, address indexed seller);
    event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

    struct PromptData {
        string title;
        string platform;
        string description;
        string promptText;
        address creator;
        uint256 createdAt;
        bool includeMedia;
        bool includeOutputSample;
        bytes32 promptHash;
    }

    struct SaleData {
        uint256 price;
        bool isForSale;
        address seller;
    }

    function tokenURI(uint256 tokenId) external view returns (string);
    function ownerOf(uint256 tokenId) external view returns (address);
    function getPromptData(uint256 tokenId) external view returns (PromptData memory);
    function getSaleData(uint256 tokenId) external view returns (SaleData memory);
    function getTokensForSale() external view returns (uint256[] memory);
    function getTokensByCreator(address creator) external view returns (uint256[] memory);
    function getTokensByOwner(address owner) external view returns (uint256[] memory);
}

pub fn signature_hash(kind: EventKind) -> B256 {
    match kind {
        EventKind::Minted => PromptMinted::SIGNATURE_HASH,
        EventKind::Listed => PromptListed::SIGNATURE_HASH,
        EventKind::Sold => PromptSold::SIGNATURE_HASH,
        EventKind::Delisted => PromptDelisted::SIGNATURE_HASH,
        EventKind::Transferred => Transfer::SIGNATURE_HASH,
    }
}

/// Topic slot holding the indexed token id: first for the marketplace
/// events, third for the ERC721 `Transfer`.
pub fn token_topic_index(kind: EventKind) -> usize {
    match kind {
        EventKind::Transferred => 3,
        _ => 1,
    }
}

pub fn decode_event(kind: EventKind, log: &Log) -> anyhow::Result<EventRecord> {
    let block_height = log.block_number.context("log is missing its block number")?;
    let transaction_id = log
        .transaction_hash
        .context("log is missing its transaction hash")?;
    let log_position = log.log_index.context("log is missing its log index")?;

    let topics = log.topics();
    let data = &log.data().data;

    let (token_id, payload) = match kind {
        EventKind::Minted => {
            let event = PromptMinted::decode_raw_log(topics, data)?;
            (
                event.tokenId,
                EventPayload::Minted {
                    creator: event.creator,
                    price: event.price,
                },
            )
        }
        EventKind::Listed => {
            let event = PromptListed::decode_raw_log(topics, data)?;
            (
                event.tokenId,
                EventPayload::Listed {
                    seller: event.seller,
                    price: event.price,
                },
            )
        }
        EventKind::Sold => {
            let event = PromptSold::decode_raw_log(topics, data)?;
            (
                event.tokenId,
                EventPayload::Sold {
                    seller: event.seller,
                    buyer: event.buyer,
                    price: event.price,
                },
            )
        }
        EventKind::Delisted => {
            let event = PromptDelisted::decode_raw_log(topics, data)?;
            (
                event.tokenId,
                EventPayload::Delisted {
                    seller: event.seller,
                },
            )
        }
        EventKind::Transferred => {
            let event = Transfer::decode_raw_log(topics, data)?;
            (
                event.tokenId,
                EventPayload::Transferred {
                    from: event.from,
                    to: event.to,
                },
            )
        }
    };

    Ok(EventRecord {
        token_id,
        block_height,
        transaction_id,
        log_position,
        payload,
    })
}
