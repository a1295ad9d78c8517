//! Off-chain prompt metadata: IPFS gateway resolution, typed metadata
//! documents and pinning through Pinata.

pub mod rate_limit;
pub mod store;
pub mod validation;

pub use rate_limit::RateLimiter;
pub use store::{MetadataStore, PinataCredentials, resolve_with_gateway};
pub use validation::{UploadPolicy, is_valid_cid, sanitize_filename};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Pinata API keys not configured")]
    NotConfigured,
    #[error("Too many requests for {identifier}, try again later")]
    RateLimited { identifier: String },
    #[error("Invalid or incomplete metadata: {0}")]
    InvalidMetadata(String),
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Pinata(String),
    #[error("Pinata response did not include IpfsHash")]
    MissingCid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub trait_type: String,
    pub value: serde_json::Value,
}

/// A prompt's metadata document with every media URI already resolved to a
/// fetchable URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptMetadata {
    pub name: String,
    pub description: Option<String>,
    pub platform: Option<String>,
    pub prompt_text: Option<String>,
    pub image: Option<String>,
    pub input_media_uris: Vec<String>,
    pub output_sample_uris: Vec<String>,
    pub attributes: Vec<Attribute>,
}
