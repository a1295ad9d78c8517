use super::validation::{UploadPolicy, is_valid_cid, sanitize_filename};
use super::{MetadataError, PromptMetadata, RateLimiter};
use crate::config::Config;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const PINATA_API_URL: &str = "https://api.pinata.cloud/pinning";
pub const MAX_REQUESTS_PER_MINUTE: usize = 60;

#[derive(Debug, Clone)]
pub struct PinataCredentials {
    pub api_key: String,
    pub api_secret: String,
}

/// Maps `ipfs://CID[/path]` onto `gateway`, passes `http(s)://` through and
/// rejects everything else.
pub fn resolve_with_gateway(gateway: &str, uri: &str) -> Option<String> {
    let uri = uri.trim();
    if let Some(path) = uri.strip_prefix("ipfs://") {
        let path = path.strip_prefix("ipfs/").unwrap_or(path);
        if path.is_empty() {
            return None;
        }
        return Some(format!("{}{}", gateway, path));
    }
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return Some(uri.to_string());
    }
    None
}

/// `Pinata Error: …` from an error response body.
pub fn pinata_error_message(body: &Value) -> String {
    match body.get("error") {
        Some(error) => {
            let detail = error
                .get("reason")
                .and_then(Value::as_str)
                .or_else(|| error.get("details").and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            format!("Pinata Error: {}", detail)
        }
        None => body.to_string(),
    }
}

/// Request body for `pinJSONToIPFS`. The document must carry `name` and
/// `prompt_text`.
pub fn pin_json_body(metadata: &Value) -> Result<Value, MetadataError> {
    let non_empty = |key: &str| {
        metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };

    let Some(name) = non_empty("name") else {
        return Err(MetadataError::InvalidMetadata(
            "must include name and prompt_text".to_string(),
        ));
    };
    if non_empty("prompt_text").is_none() {
        return Err(MetadataError::InvalidMetadata(
            "must include name and prompt_text".to_string(),
        ));
    }
    let platform = non_empty("platform").unwrap_or("Unknown");

    Ok(json!({
        "pinataOptions": { "cidVersion": 1 },
        "pinataMetadata": {
            "name": name,
            "keyvalues": { "platform": platform },
        },
        "pinataContent": metadata,
    }))
}

pub struct MetadataStore {
    client: Client,
    gateway: String,
    api_url: String,
    credentials: Option<PinataCredentials>,
    limiter: RateLimiter,
    policy: UploadPolicy,
}

impl MetadataStore {
    pub fn new(
        gateway: impl Into<String>,
        credentials: Option<PinataCredentials>,
    ) -> Result<Self, MetadataError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            gateway: gateway.into(),
            api_url: PINATA_API_URL.to_string(),
            credentials,
            limiter: RateLimiter::new(MAX_REQUESTS_PER_MINUTE, Duration::from_secs(60)),
            policy: UploadPolicy::default(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, MetadataError> {
        let credentials = match (&config.pinata_api_key, &config.pinata_api_secret) {
            (Some(api_key), Some(api_secret)) => Some(PinataCredentials {
                api_key: api_key.clone(),
                api_secret: api_secret.clone(),
            }),
            _ => None,
        };
        Self::new(config.ipfs_gateway.clone(), credentials)
    }

    pub fn with_policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    pub fn rate_limiter_mut(&mut self) -> &mut RateLimiter {
        &mut self.limiter
    }

    pub fn resolve(&self, uri: &str) -> Option<String> {
        resolve_with_gateway(&self.gateway, uri)
    }

    /// The JSON document behind `uri`, or `None` if it cannot be resolved,
    /// fetched or parsed.
    pub async fn fetch_json(&self, uri: &str) -> Option<Value> {
        let Some(url) = self.resolve(uri) else {
            warn!("Cannot resolve metadata URI: {}", uri);
            return None;
        };

        debug!("Fetching metadata from {}", url);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Metadata request to {} failed: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Metadata request to {} returned {}", url, response.status());
            return None;
        }

        match response.json::<Value>().await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Metadata at {} is not valid JSON: {}", url, e);
                None
            }
        }
    }

    /// Fetches and types a prompt's metadata, resolving its media URIs and
    /// dropping any that cannot be resolved.
    pub async fn prompt_metadata(&self, token_uri: &str) -> Option<PromptMetadata> {
        let raw = self.fetch_json(token_uri).await?;
        let metadata: PromptMetadata = match serde_json::from_value(raw) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Metadata at {} has an unexpected shape: {}", token_uri, e);
                return None;
            }
        };
        Some(self.resolve_media(metadata))
    }

    pub fn resolve_media(&self, mut metadata: PromptMetadata) -> PromptMetadata {
        metadata.image = metadata.image.as_deref().and_then(|uri| self.resolve(uri));
        metadata.input_media_uris = metadata
            .input_media_uris
            .iter()
            .filter_map(|uri| self.resolve(uri))
            .collect();
        metadata.output_sample_uris = metadata
            .output_sample_uris
            .iter()
            .filter_map(|uri| self.resolve(uri))
            .collect();
        metadata
    }

    fn admit(&mut self) -> Result<PinataCredentials, MetadataError> {
        let credentials = self
            .credentials
            .clone()
            .ok_or(MetadataError::NotConfigured)?;
        if !self.limiter.try_acquire(&credentials.api_key) {
            return Err(MetadataError::RateLimited {
                identifier: credentials.api_key,
            });
        }
        Ok(credentials)
    }

    /// Pins a media file and returns its CID.
    pub async fn pin_file(
        &mut self,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, MetadataError> {
        self.policy.check(bytes.len() as u64, content_type)?;
        let credentials = self.admit()?;

        let filename = if filename.trim().is_empty() {
            "untitled-file".to_string()
        } else {
            sanitize_filename(filename)
        };
        info!(
            "Pinning file {} ({}, {} bytes)",
            filename,
            content_type,
            bytes.len()
        );

        let part = Part::bytes(bytes)
            .file_name(filename.clone())
            .mime_str(content_type)?;
        let form = Form::new()
            .part("file", part)
            .text("pinataMetadata", json!({ "name": filename }).to_string())
            .text("pinataOptions", json!({ "cidVersion": 1 }).to_string());

        let response = self
            .client
            .post(format!("{}/pinFileToIPFS", self.api_url))
            .header("pinata_api_key", &credentials.api_key)
            .header("pinata_secret_api_key", &credentials.api_secret)
            .multipart(form)
            .send()
            .await?;

        Self::read_cid(response).await
    }

    /// Pins a metadata document and returns its CID.
    pub async fn pin_json(&mut self, metadata: &Value) -> Result<String, MetadataError> {
        let body = pin_json_body(metadata)?;
        let credentials = self.admit()?;

        info!(
            "Pinning metadata {}",
            body["pinataMetadata"]["name"].as_str().unwrap_or_default()
        );

        let response = self
            .client
            .post(format!("{}/pinJSONToIPFS", self.api_url))
            .header("pinata_api_key", &credentials.api_key)
            .header("pinata_secret_api_key", &credentials.api_secret)
            .json(&body)
            .send()
            .await?;

        Self::read_cid(response).await
    }

    async fn read_cid(response: reqwest::Response) -> Result<String, MetadataError> {
        let status = response.status();
        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            let message = pinata_error_message(&body);
            warn!("Pinata request failed with {}: {}", status, message);
            return Err(MetadataError::Pinata(message));
        }

        let cid = body
            .get("IpfsHash")
            .and_then(Value::as_str)
            .ok_or(MetadataError::MissingCid)?;
        if !is_valid_cid(cid) {
            warn!("Pinata returned an unexpected CID shape: {}", cid);
        }
        Ok(cid.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GATEWAY: &str = "https://gateway.pinata.cloud/ipfs/";

    #[test]
    fn resolves_ipfs_and_http_uris() {
        assert_eq!(
            resolve_with_gateway(GATEWAY, "ipfs://bafyabc/meta.json").as_deref(),
            Some("https://gateway.pinata.cloud/ipfs/bafyabc/meta.json")
        );
        assert_eq!(
            resolve_with_gateway(GATEWAY, "https://example.com/a.json").as_deref(),
            Some("https://example.com/a.json")
        );
        assert_eq!(resolve_with_gateway(GATEWAY, "ar://xyz"), None);
        assert_eq!(resolve_with_gateway(GATEWAY, ""), None);
        assert_eq!(resolve_with_gateway(GATEWAY, "ipfs://"), None);
    }

    #[test]
    fn pinata_errors_prefer_reason_then_details() {
        let body = json!({ "error": { "reason": "INVALID_CREDENTIALS", "details": "bad key" } });
        assert_eq!(pinata_error_message(&body), "Pinata Error: INVALID_CREDENTIALS");

        let body = json!({ "error": { "details": "bad key" } });
        assert_eq!(pinata_error_message(&body), "Pinata Error: bad key");

        let body = json!({ "message": "nope" });
        assert_eq!(pinata_error_message(&body), r#"{"message":"nope"}"#);
    }

    #[test]
    fn pin_json_requires_name_and_prompt_text() {
        assert!(matches!(
            pin_json_body(&json!({ "name": "x" })),
            Err(MetadataError::InvalidMetadata(_))
        ));
        assert!(matches!(
            pin_json_body(&json!({ "prompt_text": "x" })),
            Err(MetadataError::InvalidMetadata(_))
        ));

        let body = pin_json_body(&json!({ "name": "Cat", "prompt_text": "draw a cat" })).unwrap();
        assert_eq!(body["pinataOptions"]["cidVersion"], 1);
        assert_eq!(body["pinataMetadata"]["name"], "Cat");
        assert_eq!(body["pinataMetadata"]["keyvalues"]["platform"], "Unknown");
        assert_eq!(body["pinataContent"]["prompt_text"], "draw a cat");
    }

    #[tokio::test]
    async fn pinning_without_keys_is_not_configured() {
        let mut store = MetadataStore::new(GATEWAY, None).unwrap();
        let result = store
            .pin_json(&json!({ "name": "Cat", "prompt_text": "draw a cat" }))
            .await;
        assert!(matches!(result, Err(MetadataError::NotConfigured)));
    }

    #[tokio::test]
    async fn pinning_is_rate_limited_per_key() {
        let credentials = PinataCredentials {
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
        };
        let mut store = MetadataStore::new(GATEWAY, Some(credentials))
            .unwrap()
            .with_rate_limiter(RateLimiter::new(0, Duration::from_secs(60)));
        let result = store
            .pin_json(&json!({ "name": "Cat", "prompt_text": "draw a cat" }))
            .await;
        assert!(matches!(result, Err(MetadataError::RateLimited { .. })));
    }

    #[test]
    fn media_uris_are_resolved_and_unresolvable_ones_dropped() {
        let store = MetadataStore::new(GATEWAY, None).unwrap();
        let metadata = PromptMetadata {
            name: "Cat".to_string(),
            image: Some("ipfs://bafyimg".to_string()),
            input_media_uris: vec!["ipfs://bafyin".to_string(), "ftp://x".to_string()],
            output_sample_uris: vec!["https://cdn/x.png".to_string()],
            ..Default::default()
        };
        let resolved = store.resolve_media(metadata);
        assert_eq!(
            resolved.image.as_deref(),
            Some("https://gateway.pinata.cloud/ipfs/bafyimg")
        );
        assert_eq!(
            resolved.input_media_uris,
            vec!["https://gateway.pinata.cloud/ipfs/bafyin".to_string()]
        );
        assert_eq!(resolved.output_sample_uris, vec!["https://cdn/x.png".to_string()]);
    }
}
