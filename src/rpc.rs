use alloy::network::TransactionBuilder;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log, TransactionRequest};
use alloy_primitives::{Address, Bytes};
use anyhow::Result;
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// Providers word this differently; all of them mean "ask for fewer blocks".
static RANGE_LIMIT_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(exceeds max(imum)? (results|rpc range limit|block range)|block range (is )?too (large|wide)|range too large|query returned more than \d+ results|log response size exceeded|retry with the range \d+-\d+)",
    )
    .ok()
});

/// True when an RPC error message means the requested block span was too wide.
pub fn is_range_limit_error(message: &str) -> bool {
    RANGE_LIMIT_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(message))
}

/// Failure of a `eth_getLogs` call, split by whether retrying the same span can help.
#[derive(Debug, thiserror::Error)]
pub enum LogQueryError {
    #[error("{0}")]
    RangeLimit(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<DynProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String], max_retries: usize) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::with_capacity(rpc_urls.len());
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            providers.push(ProviderBuilder::new().connect_http(parsed_url).erased());
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries,
        })
    }

    fn get_provider(&self) -> &DynProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn endpoint_count(&self) -> usize {
        self.urls.len()
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, error_str: &str) {
        warn!(
            "RPC error on {}: {}, rotating provider",
            self.get_current_url(),
            error_str
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self) -> anyhow::Error {
        warn!(
            "Request timeout after {} seconds on {}, rotating provider",
            REQUEST_TIMEOUT.as_secs(),
            self.get_current_url()
        );
        self.rotate_provider();
        anyhow::anyhow!(
            "Request timeout after {} seconds",
            REQUEST_TIMEOUT.as_secs()
        )
    }

    pub async fn get_latest_block(&self) -> Result<u64> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                match timeout(REQUEST_TIMEOUT, provider.get_block_number()).await {
                    Ok(Ok(block_number)) => Ok(block_number),
                    Ok(Err(e)) => {
                        client.handle_error(&e.to_string());
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }

    pub async fn get_block_timestamp(&self, block_number: u64) -> Result<u64> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                let future = provider.get_block_by_number(BlockNumberOrTag::Number(block_number));

                match timeout(REQUEST_TIMEOUT, future).await {
                    Ok(Ok(Some(block))) => Ok(block.header.timestamp),
                    Ok(Ok(None)) => Err(anyhow::anyhow!("Block {} not found", block_number)),
                    Ok(Err(e)) => {
                        client.handle_error(&e.to_string());
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }

    pub async fn get_code_at_block(&self, address: Address, block_number: u64) -> Result<Bytes> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                let future = provider
                    .get_code_at(address)
                    .block_id(BlockNumberOrTag::Number(block_number).into());

                match timeout(REQUEST_TIMEOUT, future).await {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(e)) => {
                        client.handle_error(&e.to_string());
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }

    /// `eth_call` against `to` with pre-encoded calldata.
    pub async fn call(&self, to: Address, input: Bytes) -> Result<Bytes> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            let request = TransactionRequest::default()
                .with_to(to)
                .with_input(input.clone());
            async move {
                let provider = client.get_provider();
                match timeout(REQUEST_TIMEOUT, provider.call(request)).await {
                    Ok(Ok(output)) => Ok(Ok(output)),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();
                        if error_str.contains("execution reverted") {
                            // a revert is an answer, not a transport failure
                            Ok(Err(anyhow::anyhow!("{}", e)))
                        } else {
                            client.handle_error(&error_str);
                            Err(anyhow::anyhow!("{}", e))
                        }
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
        .and_then(|r| r)
    }

    /// Logs matching `filter`. Range-limit rejections are returned immediately
    /// as [`LogQueryError::RangeLimit`] so the caller can narrow the span.
    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, LogQueryError> {
        let client = self.clone();
        let filter = filter.clone();
        let outcome = Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            let filter = filter.clone();
            async move {
                let provider = client.get_provider();
                match timeout(REQUEST_TIMEOUT, provider.get_logs(&filter)).await {
                    Ok(Ok(logs)) => Ok(Ok(logs)),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();
                        if is_range_limit_error(&error_str) {
                            debug!("Range limit hit: {}", error_str);
                            // retrying the same span cannot succeed
                            Ok(Err(LogQueryError::RangeLimit(error_str)))
                        } else {
                            client.handle_error(&error_str);
                            Err(anyhow::anyhow!("{}", e))
                        }
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(e) => Err(LogQueryError::Other(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_provider_range_errors() {
        assert!(is_range_limit_error(
            "query exceeds max results 10000, retry with the range 100-200"
        ));
        assert!(is_range_limit_error(
            "eth_getLogs is limited to a 10,000 range: exceeds maximum RPC range limit"
        ));
        assert!(is_range_limit_error("Block range is too large"));
        assert!(is_range_limit_error("query returned more than 10000 results"));
        assert!(is_range_limit_error("Log response size exceeded."));
    }

    #[test]
    fn ignores_transient_errors() {
        assert!(!is_range_limit_error("HTTP error 429 Too Many Requests"));
        assert!(!is_range_limit_error("connection reset by peer"));
        assert!(!is_range_limit_error("execution reverted"));
    }

    #[test]
    fn rejects_empty_endpoint_list() {
        assert!(RpcClient::new(&[], 3).is_err());
        assert!(RpcClient::new(&["not a url".to_string()], 3).is_err());
    }

    #[test]
    fn rotates_round_robin() {
        let urls = vec![
            "http://localhost:8545".to_string(),
            "http://localhost:8546".to_string(),
        ];
        let client = RpcClient::new(&urls, 1).unwrap();
        assert_eq!(client.get_current_url(), "http://localhost:8545");
        client.rotate_provider();
        assert_eq!(client.get_current_url(), "http://localhost:8546");
        client.rotate_provider();
        assert_eq!(client.get_current_url(), "http://localhost:8545");
        assert_eq!(client.endpoint_count(), 2);
    }
}
