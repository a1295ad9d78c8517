use crate::catalog::{portfolio, token_details, tokens_for_sale};
use crate::chain::ChainLedger;
use crate::ledger::Ledger;
use crate::metadata::MetadataStore;
use crate::query::formatters::{
    OutputFormat, format_activity, format_for_sale, format_history, format_leaderboard,
    format_market_stats, format_metadata, format_pin, format_portfolio, format_token,
    format_warnings,
};
use crate::reconcile::{
    PartialDataWarning, ReconcileOptions, leaderboard, market_stats, reconcile_account_history,
    reconcile_activity,
};
use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;

/// Accepts `42` as well as the display form `#42`.
pub fn parse_token_id(raw: &str) -> Result<U256> {
    let digits = raw.trim().trim_start_matches('#');
    if digits.is_empty() {
        anyhow::bail!("Invalid token id: {}", raw);
    }
    U256::from_str_radix(digits, 10).map_err(|_| anyhow::anyhow!("Invalid token id: {}", raw))
}

pub fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).map_err(|_| anyhow::anyhow!("Invalid address format: {}", raw))
}

fn report_warnings(warnings: &[PartialDataWarning]) {
    if let Some(text) = format_warnings(warnings) {
        eprintln!("{text}");
    }
}

pub async fn cmd_activity<L: Ledger + ?Sized>(
    ledger: &L,
    options: &ReconcileOptions,
    token_id: &str,
    format: &OutputFormat,
) -> Result<()> {
    let token_id = parse_token_id(token_id)?;
    let log = reconcile_activity(ledger, token_id, options).await?;
    println!("{}", format_activity(&log, format));
    report_warnings(&log.warnings);

    Ok(())
}

pub async fn cmd_history<L: Ledger + ?Sized>(
    ledger: &L,
    options: &ReconcileOptions,
    address: &str,
    format: &OutputFormat,
) -> Result<()> {
    let account = parse_address(address)?;
    let history = reconcile_account_history(ledger, account, options).await?;
    println!("{}", format_history(&history, format));
    report_warnings(&history.warnings);

    Ok(())
}

pub async fn cmd_stats<L: Ledger + ?Sized>(
    ledger: &L,
    options: &ReconcileOptions,
    format: &OutputFormat,
) -> Result<()> {
    let stats = market_stats(ledger, options).await?;
    println!("{}", format_market_stats(&stats, format));
    report_warnings(&stats.warnings);

    Ok(())
}

pub async fn cmd_leaderboard<L: Ledger + ?Sized>(
    ledger: &L,
    options: &ReconcileOptions,
    limit: usize,
    recent: usize,
    format: &OutputFormat,
) -> Result<()> {
    let board = leaderboard(ledger, limit, recent, options).await?;
    println!("{}", format_leaderboard(&board, format));
    report_warnings(&board.warnings);

    Ok(())
}

pub async fn cmd_metadata(
    ledger: &ChainLedger,
    store: &MetadataStore,
    token_id: &str,
    format: &OutputFormat,
) -> Result<()> {
    let token_id = parse_token_id(token_id)?;
    let token_uri = ledger.token_uri(token_id).await?;
    let metadata = store.prompt_metadata(&token_uri).await;
    if metadata.is_none() {
        eprintln!("Could not load metadata from {token_uri}");
    }
    println!(
        "{}",
        format_metadata(token_id, &token_uri, metadata.as_ref(), format)
    );

    Ok(())
}

pub async fn cmd_token(ledger: &ChainLedger, token_id: &str, format: &OutputFormat) -> Result<()> {
    let token_id = parse_token_id(token_id)?;
    let details = token_details(ledger, token_id)
        .await
        .with_context(|| format!("Failed to read prompt #{token_id}"))?;
    println!("{}", format_token(&details, format));

    Ok(())
}

pub async fn cmd_for_sale(
    ledger: &ChainLedger,
    concurrency: usize,
    format: &OutputFormat,
) -> Result<()> {
    let for_sale = tokens_for_sale(ledger, concurrency).await?;
    println!("{}", format_for_sale(&for_sale, format));

    Ok(())
}

pub async fn cmd_owned(
    ledger: &ChainLedger,
    address: &str,
    concurrency: usize,
    format: &OutputFormat,
) -> Result<()> {
    let account = parse_address(address)?;
    let portfolio = portfolio(ledger, account, concurrency).await?;
    println!("{}", format_portfolio(&portfolio, format));

    Ok(())
}

/// Guesses a MIME type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogv" => "video/ogg",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

pub async fn cmd_pin_file(
    store: &mut MetadataStore,
    path: &Path,
    format: &OutputFormat,
) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let cid = store
        .pin_file(&filename, content_type_for(path), bytes)
        .await?;
    let gateway_url = store.resolve(&format!("ipfs://{cid}"));
    println!("{}", format_pin(&cid, gateway_url.as_deref(), format));

    Ok(())
}

pub async fn cmd_pin_json(
    store: &mut MetadataStore,
    path: &Path,
    format: &OutputFormat,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let metadata: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let cid = store.pin_json(&metadata).await?;
    let gateway_url = store.resolve(&format!("ipfs://{cid}"));
    println!("{}", format_pin(&cid, gateway_url.as_deref(), format));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_ids_accept_hash_prefix() {
        assert_eq!(parse_token_id("42").unwrap(), U256::from(42));
        assert_eq!(parse_token_id("#42").unwrap(), U256::from(42));
        assert_eq!(parse_token_id(" #7 ").unwrap(), U256::from(7));
        assert!(parse_token_id("abc").is_err());
        assert!(parse_token_id("#").is_err());
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(parse_address("0x000000000000000000000000000000000000dEaD").is_ok());
        assert!(parse_address("0x1234").is_err());
    }

    #[test]
    fn guesses_content_types() {
        assert_eq!(content_type_for(Path::new("cat.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("clip.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("notes")), "application/octet-stream");
    }
}
