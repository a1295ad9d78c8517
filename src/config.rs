use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_EVENT_QUERY_BATCH_SIZE: u64 = 2000;
pub const DEFAULT_MAX_RANGE_SPLITS: u32 = 2;
pub const DEFAULT_BLOCK_LOOKUP_CONCURRENCY: usize = 8;
pub const DEFAULT_IPFS_GATEWAY: &str = "https://gateway.pinata.cloud/ipfs/";

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_urls: Vec<String>,
    pub contract_address: Address,
    pub deployment_block: Option<u64>,
    pub event_query_batch_size: u64,
    pub max_range_splits: u32,
    pub block_lookup_concurrency: usize,
    pub rpc_max_retries: usize,
    pub ipfs_gateway: String,
    pub pinata_api_key: Option<String>,
    pub pinata_api_secret: Option<String>,
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let raw_urls = std::env::var("JSON_RPC_URLS")
            .or_else(|_| std::env::var("JSON_RPC_URL"))
            .context("JSON_RPC_URLS (or JSON_RPC_URL) must be set in .env")?;
        let json_rpc_urls = parse_rpc_urls(&raw_urls);
        if json_rpc_urls.is_empty() {
            anyhow::bail!("JSON_RPC_URLS contains no endpoints");
        }

        let contract_address_str = std::env::var("CONTRACT_ADDRESS")
            .context("CONTRACT_ADDRESS must be set in .env")?;
        let contract_address = Address::from_str(contract_address_str.trim())
            .context("Invalid CONTRACT_ADDRESS format")?;

        let deployment_block = optional_var("DEPLOYMENT_BLOCK")?;

        let event_query_batch_size: u64 =
            parse_var("EVENT_QUERY_BATCH_SIZE", DEFAULT_EVENT_QUERY_BATCH_SIZE)?;
        if event_query_batch_size == 0 {
            anyhow::bail!("EVENT_QUERY_BATCH_SIZE must be at least 1");
        }

        let block_lookup_concurrency: usize =
            parse_var("BLOCK_LOOKUP_CONCURRENCY", DEFAULT_BLOCK_LOOKUP_CONCURRENCY)?;
        if block_lookup_concurrency == 0 {
            anyhow::bail!("BLOCK_LOOKUP_CONCURRENCY must be at least 1");
        }

        Ok(Config {
            json_rpc_urls,
            contract_address,
            deployment_block,
            event_query_batch_size,
            max_range_splits: parse_var("MAX_RANGE_SPLITS", DEFAULT_MAX_RANGE_SPLITS)?,
            block_lookup_concurrency,
            rpc_max_retries: parse_var("RPC_MAX_RETRIES", 3)?,
            ipfs_gateway: std::env::var("IPFS_GATEWAY")
                .unwrap_or_else(|_| DEFAULT_IPFS_GATEWAY.to_string()),
            pinata_api_key: non_empty_var("PINATA_API_KEY"),
            pinata_api_secret: non_empty_var("PINATA_API_SECRET"),
            poll_interval: Duration::from_secs(parse_var("POLL_INTERVAL_SECS", 12)?),
        })
    }
}

/// Splits a comma separated endpoint list, dropping blanks.
pub fn parse_rpc_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn optional_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid {name} value: {raw}")),
        None => Ok(None),
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(optional_var(name)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_endpoint_list() {
        let urls = parse_rpc_urls(" http://a:8545 ,,https://b.example/rpc, ");
        assert_eq!(urls, vec!["http://a:8545", "https://b.example/rpc"]);
    }

    #[test]
    fn single_endpoint_is_a_list_of_one() {
        assert_eq!(parse_rpc_urls("http://localhost:8545").len(), 1);
        assert!(parse_rpc_urls(" , ").is_empty());
    }
}
