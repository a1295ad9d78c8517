use crate::catalog::{ForSale, Portfolio, TokenCard, TokenDetails};
use crate::metadata::PromptMetadata;
use crate::reconcile::{
    AccountHistory, ActivityLog, Leaderboard, MarketStats, PartialDataWarning, format_ether,
};
use alloy_primitives::{Address, B256, U256};
use chrono::DateTime;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

/// Placeholder for an empty table cell.
pub const DASH: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS);
    table
}

fn finish_csv(wtr: Writer<Vec<u8>>) -> String {
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn short_address(address: Option<Address>) -> String {
    address.map_or(DASH.to_string(), |a| format!("{:#}", a))
}

fn full_address(address: Option<Address>) -> String {
    address.map_or(String::new(), |a| a.to_checksum(None))
}

fn format_tx_hash(hash: &B256) -> String {
    let hash = format!("{:?}", hash);
    if hash.len() <= 12 {
        return hash;
    }
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}

/// One line per warning, or `None` when the result is complete.
pub fn format_warnings(warnings: &[PartialDataWarning]) -> Option<String> {
    if warnings.is_empty() {
        return None;
    }
    let lines: Vec<String> = warnings
        .iter()
        .map(|w| format!("warning: {}", w))
        .collect();
    Some(format!(
        "Result is incomplete ({} issue(s)):\n{}",
        warnings.len(),
        lines.join("\n")
    ))
}

pub fn format_activity(log: &ActivityLog, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if log.entries.is_empty() {
                return format!("No activity found for prompt #{}.", log.token_id);
            }

            let mut table = new_table();
            table.set_header(vec!["Event", "From", "To", "Price", "Date", "Block", "Tx Hash"]);
            for entry in &log.entries {
                table.add_row(vec![
                    Cell::new(entry.kind.label()),
                    Cell::new(short_address(entry.from)),
                    Cell::new(short_address(entry.to)),
                    Cell::new(&entry.price_label),
                    Cell::new(format_timestamp(entry.timestamp)),
                    Cell::new(entry.block_height),
                    Cell::new(format_tx_hash(&entry.transaction_id)),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let entries: Vec<_> = log
                .entries
                .iter()
                .map(|e| {
                    json!({
                        "id": e.id,
                        "event": e.kind.label(),
                        "token_id": e.token_id.to_string(),
                        "from": e.from,
                        "to": e.to,
                        "price": e.price_label,
                        "price_wei": e.price.map(|p| p.to_string()),
                        "timestamp": e.timestamp,
                        "block_number": e.block_height,
                        "transaction_hash": format!("{:?}", e.transaction_id),
                        "log_index": e.log_position,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&json!({
                "token_id": log.token_id.to_string(),
                "from_block": log.from_height,
                "to_block": log.to_height,
                "complete": log.is_complete(),
                "warnings": log.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
                "activity": entries,
            }))
            .unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record([
                "id",
                "event",
                "from",
                "to",
                "price",
                "price_wei",
                "timestamp",
                "block_number",
                "transaction_hash",
                "log_index",
            ]);
            for e in &log.entries {
                let _ = wtr.write_record([
                    e.id.as_str(),
                    e.kind.label(),
                    &full_address(e.from),
                    &full_address(e.to),
                    &e.price_label,
                    &e.price.map(|p| p.to_string()).unwrap_or_default(),
                    &e.timestamp.to_string(),
                    &e.block_height.to_string(),
                    &format!("{:?}", e.transaction_id),
                    &e.log_position.to_string(),
                ]);
            }
            finish_csv(wtr)
        }
    }
}

pub fn format_history(history: &AccountHistory, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if history.entries.is_empty() {
                return format!("No transactions found for {:#}.", history.account);
            }

            let mut table = new_table();
            table.set_header(vec!["Type", "Prompt", "From", "To", "Price", "Date", "Tx Hash"]);
            for entry in &history.entries {
                table.add_row(vec![
                    Cell::new(entry.action.label()),
                    Cell::new(entry.title()),
                    Cell::new(short_address(entry.from)),
                    Cell::new(short_address(entry.to)),
                    Cell::new(&entry.price_label),
                    Cell::new(format_timestamp(entry.timestamp)),
                    Cell::new(format_tx_hash(&entry.transaction_id)),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let entries: Vec<_> = history
                .entries
                .iter()
                .map(|e| {
                    json!({
                        "type": e.action.label(),
                        "token_id": e.token_id.to_string(),
                        "title": e.title(),
                        "from": e.from,
                        "to": e.to,
                        "price": e.price_label,
                        "timestamp": e.timestamp,
                        "block_number": e.block_height,
                        "transaction_hash": format!("{:?}", e.transaction_id),
                        "log_index": e.log_position,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&json!({
                "account": history.account,
                "from_block": history.from_height,
                "to_block": history.to_height,
                "complete": history.is_complete(),
                "warnings": history.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
                "transactions": entries,
            }))
            .unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record([
                "type",
                "token_id",
                "from",
                "to",
                "price",
                "timestamp",
                "block_number",
                "transaction_hash",
                "log_index",
            ]);
            for e in &history.entries {
                let _ = wtr.write_record([
                    e.action.label(),
                    &e.token_id.to_string(),
                    &full_address(e.from),
                    &full_address(e.to),
                    &e.price_label,
                    &e.timestamp.to_string(),
                    &e.block_height.to_string(),
                    &format!("{:?}", e.transaction_id),
                    &e.log_position.to_string(),
                ]);
            }
            finish_csv(wtr)
        }
    }
}

pub fn format_market_stats(stats: &MarketStats, format: &OutputFormat) -> String {
    let volume = format!("{} ETH", format_ether(stats.volume_traded));

    match format {
        OutputFormat::Table => {
            let mut table = new_table();
            table.set_header(vec!["Metric", "Value"]);
            table.add_row(vec![Cell::new("Prompts Created"), Cell::new(stats.prompts_created)]);
            table.add_row(vec![Cell::new("Active Creators"), Cell::new(stats.active_creators)]);
            table.add_row(vec![Cell::new("Total Trades"), Cell::new(stats.total_trades)]);
            table.add_row(vec![Cell::new("Volume Traded"), Cell::new(&volume)]);
            table.add_row(vec![
                Cell::new("Blocks Scanned"),
                Cell::new(format!("{}-{}", stats.from_height, stats.to_height)),
            ]);
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "prompts_created": stats.prompts_created,
            "active_creators": stats.active_creators,
            "total_trades": stats.total_trades,
            "volume_traded": volume,
            "volume_traded_wei": stats.volume_traded.to_string(),
            "from_block": stats.from_height,
            "to_block": stats.to_height,
            "complete": stats.is_complete(),
            "warnings": stats.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            let _ = wtr.write_record(["prompts_created", &stats.prompts_created.to_string()]);
            let _ = wtr.write_record(["active_creators", &stats.active_creators.to_string()]);
            let _ = wtr.write_record(["total_trades", &stats.total_trades.to_string()]);
            let _ = wtr.write_record(["volume_traded_wei", &stats.volume_traded.to_string()]);
            finish_csv(wtr)
        }
    }
}

fn eth(value: U256) -> String {
    format!("{} ETH", format_ether(value))
}

pub fn format_leaderboard(board: &Leaderboard, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if board.top_sellers.is_empty() {
                return "No sales yet.".to_string();
            }

            let mut sellers = new_table();
            sellers.set_header(vec!["Rank", "Seller", "Volume", "Sales"]);
            for (i, standing) in board.top_sellers.iter().enumerate() {
                sellers.add_row(vec![
                    Cell::new(i + 1),
                    Cell::new(format!("{:#}", standing.seller)),
                    Cell::new(eth(standing.volume)),
                    Cell::new(standing.sales),
                ]);
            }

            let mut recent = new_table();
            recent.set_header(vec!["Prompt", "Seller", "Buyer", "Price", "Date"]);
            for sale in &board.recent_sales {
                recent.add_row(vec![
                    Cell::new(format!("#{}", sale.token_id)),
                    Cell::new(format!("{:#}", sale.seller)),
                    Cell::new(format!("{:#}", sale.buyer)),
                    Cell::new(eth(sale.price)),
                    Cell::new(sale.timestamp.map_or("N/A".to_string(), format_timestamp)),
                ]);
            }

            let mut summary = new_table();
            summary.set_header(vec!["Metric", "Value"]);
            summary.add_row(vec![
                Cell::new("Top Volume"),
                Cell::new(
                    board
                        .top_volume
                        .as_ref()
                        .map_or("N/A".to_string(), |s| eth(s.volume)),
                ),
            ]);
            summary.add_row(vec![
                Cell::new("Most Sales"),
                Cell::new(
                    board
                        .most_sales
                        .as_ref()
                        .map_or("N/A".to_string(), |s| s.sales.to_string()),
                ),
            ]);
            summary.add_row(vec![Cell::new("Active Sellers"), Cell::new(board.active_sellers)]);

            format!(
                "Top Sellers\n{}\n\nRecent Sales\n{}\n\n{}",
                sellers, recent, summary
            )
        }
        OutputFormat::Json => {
            let sellers: Vec<_> = board
                .top_sellers
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    json!({
                        "rank": i + 1,
                        "seller": s.seller,
                        "volume": format_ether(s.volume),
                        "volume_wei": s.volume.to_string(),
                        "sales": s.sales,
                    })
                })
                .collect();
            let recent: Vec<_> = board
                .recent_sales
                .iter()
                .map(|s| {
                    json!({
                        "token_id": s.token_id.to_string(),
                        "seller": s.seller,
                        "buyer": s.buyer,
                        "price": format_ether(s.price),
                        "price_wei": s.price.to_string(),
                        "timestamp": s.timestamp,
                        "block_number": s.block_height,
                        "transaction_hash": format!("{:?}", s.transaction_id),
                    })
                })
                .collect();
            serde_json::to_string_pretty(&json!({
                "top_sellers": sellers,
                "recent_sales": recent,
                "top_volume_wei": board.top_volume.as_ref().map(|s| s.volume.to_string()),
                "most_sales": board.most_sales.as_ref().map(|s| s.sales),
                "active_sellers": board.active_sellers,
                "complete": board.is_complete(),
                "warnings": board.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
            }))
            .unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["rank", "seller", "volume_wei", "sales"]);
            for (i, s) in board.top_sellers.iter().enumerate() {
                let _ = wtr.write_record([
                    &(i + 1).to_string(),
                    &s.seller.to_checksum(None),
                    &s.volume.to_string(),
                    &s.sales.to_string(),
                ]);
            }
            finish_csv(wtr)
        }
    }
}

pub fn format_metadata(
    token_id: U256,
    token_uri: &str,
    metadata: Option<&PromptMetadata>,
    format: &OutputFormat,
) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = new_table();
            table.set_header(vec!["Field", "Value"]);
            table.add_row(vec![Cell::new("Token"), Cell::new(format!("#{}", token_id))]);
            table.add_row(vec![Cell::new("Token URI"), Cell::new(token_uri)]);

            let Some(metadata) = metadata else {
                table.add_row(vec![Cell::new("Metadata"), Cell::new("unavailable")]);
                return table.to_string();
            };

            let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| DASH.to_string());
            table.add_row(vec![Cell::new("Name"), Cell::new(&metadata.name)]);
            table.add_row(vec![
                Cell::new("Description"),
                Cell::new(or_dash(&metadata.description)),
            ]);
            table.add_row(vec![Cell::new("Platform"), Cell::new(or_dash(&metadata.platform))]);
            table.add_row(vec![Cell::new("Prompt"), Cell::new(or_dash(&metadata.prompt_text))]);
            table.add_row(vec![Cell::new("Image"), Cell::new(or_dash(&metadata.image))]);
            for uri in &metadata.input_media_uris {
                table.add_row(vec![Cell::new("Input Media"), Cell::new(uri)]);
            }
            for uri in &metadata.output_sample_uris {
                table.add_row(vec![Cell::new("Output Sample"), Cell::new(uri)]);
            }
            for attr in &metadata.attributes {
                let value = match &attr.value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                table.add_row(vec![Cell::new(&attr.trait_type), Cell::new(value)]);
            }
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "token_id": token_id.to_string(),
            "token_uri": token_uri,
            "metadata": metadata,
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["token_id", "token_uri", "name", "platform", "prompt_text"]);
            let (name, platform, prompt) = metadata.map_or_else(Default::default, |m| {
                (
                    m.name.clone(),
                    m.platform.clone().unwrap_or_default(),
                    m.prompt_text.clone().unwrap_or_default(),
                )
            });
            let _ = wtr.write_record([
                token_id.to_string().as_str(),
                token_uri,
                &name,
                &platform,
                &prompt,
            ]);
            finish_csv(wtr)
        }
    }
}

pub fn format_pin(cid: &str, gateway_url: Option<&str>, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Json => json!({
            "success": true,
            "cid": cid,
            "uri": format!("ipfs://{}", cid),
            "gateway_url": gateway_url,
        })
        .to_string(),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["cid", "uri"]);
            let _ = wtr.write_record([cid, format!("ipfs://{}", cid).as_str()]);
            finish_csv(wtr)
        }
        OutputFormat::Table => {
            let mut table = new_table();
            table.set_header(vec!["CID", "URI", "Gateway"]);
            table.add_row(vec![
                Cell::new(cid),
                Cell::new(format!("ipfs://{}", cid)),
                Cell::new(gateway_url.unwrap_or(DASH)),
            ]);
            table.to_string()
        }
    }
}

pub fn format_token(details: &TokenDetails, format: &OutputFormat) -> String {
    let prompt = &details.prompt;
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "token_id": details.token_id.to_string(),
            "title": details.title(),
            "platform": prompt.platform,
            "description": prompt.description,
            "prompt_text": prompt.prompt_text,
            "creator": prompt.creator,
            "created_at": prompt.created_at,
            "include_media": prompt.include_media,
            "include_output_sample": prompt.include_output_sample,
            "prompt_hash": format!("{:?}", prompt.prompt_hash),
            "owner": details.owner,
            "for_sale": details.sale.is_listed(),
            "price": details.sale.price_label(),
            "price_wei": details.sale.price.to_string(),
            "seller": details.sale.seller,
            "token_uri": details.token_uri,
        }))
        .unwrap_or_default(),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record([
                "token_id",
                "title",
                "platform",
                "creator",
                "owner",
                "created_at",
                "price",
                "token_uri",
            ]);
            let _ = wtr.write_record([
                details.token_id.to_string(),
                details.title(),
                prompt.platform.clone(),
                full_address(Some(prompt.creator)),
                full_address(Some(details.owner)),
                prompt.created_at.to_string(),
                details.sale.price_label(),
                details.token_uri.clone(),
            ]);
            finish_csv(wtr)
        }
        OutputFormat::Table => {
            let mut table = new_table();
            table.set_header(vec!["Field", "Value"]);
            let rows = [
                ("Token", format!("#{}", details.token_id)),
                ("Title", details.title()),
                ("Platform", prompt.platform.clone()),
                ("Description", prompt.description.clone()),
                ("Prompt", prompt.prompt_text.clone()),
                ("Creator", full_address(Some(prompt.creator))),
                ("Created", format_timestamp(prompt.created_at)),
                ("Owner", full_address(Some(details.owner))),
                ("Price", details.sale.price_label()),
                ("Token URI", details.token_uri.clone()),
            ];
            for (field, value) in rows {
                let value = if value.is_empty() { DASH.to_string() } else { value };
                table.add_row(vec![Cell::new(field), Cell::new(value)]);
            }
            table.to_string()
        }
    }
}

fn unreadable_note(unreadable: &[U256]) -> Option<String> {
    if unreadable.is_empty() {
        return None;
    }
    let ids: Vec<String> = unreadable.iter().map(|id| format!("#{id}")).collect();
    Some(format!("Could not read token(s): {}", ids.join(", ")))
}

pub fn format_for_sale(for_sale: &ForSale, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            let listings: Vec<_> = for_sale
                .listings
                .iter()
                .map(|l| {
                    json!({
                        "token_id": l.token_id.to_string(),
                        "price": l.sale.price_label(),
                        "price_wei": l.sale.price.to_string(),
                        "seller": l.sale.seller,
                        "token_uri": l.token_uri,
                    })
                })
                .collect();
            let unreadable: Vec<String> =
                for_sale.unreadable.iter().map(|id| id.to_string()).collect();
            serde_json::to_string_pretty(&json!({
                "count": listings.len(),
                "listings": listings,
                "unreadable": unreadable,
            }))
            .unwrap_or_default()
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["token_id", "price", "price_wei", "seller", "token_uri"]);
            for l in &for_sale.listings {
                let _ = wtr.write_record([
                    l.token_id.to_string(),
                    l.sale.price_label(),
                    l.sale.price.to_string(),
                    full_address(Some(l.sale.seller)),
                    l.token_uri.clone(),
                ]);
            }
            finish_csv(wtr)
        }
        OutputFormat::Table => {
            let mut out = if for_sale.listings.is_empty() {
                "No prompts are listed for sale.".to_string()
            } else {
                let mut table = new_table();
                table.set_header(vec!["Token", "Price", "Seller", "Token URI"]);
                for l in &for_sale.listings {
                    table.add_row(vec![
                        Cell::new(format!("#{}", l.token_id)),
                        Cell::new(l.sale.price_label()),
                        Cell::new(short_address(Some(l.sale.seller))),
                        Cell::new(&l.token_uri),
                    ]);
                }
                table.to_string()
            };
            if let Some(note) = unreadable_note(&for_sale.unreadable) {
                out.push('\n');
                out.push_str(&note);
            }
            out
        }
    }
}

fn cards_json(cards: &[TokenCard]) -> Vec<serde_json::Value> {
    cards
        .iter()
        .map(|c| {
            json!({
                "token_id": c.token_id.to_string(),
                "title": c.title,
                "creator": c.creator,
                "for_sale": c.sale.is_listed(),
                "price": c.sale.price_label(),
            })
        })
        .collect()
}

fn cards_table(title: &str, cards: &[TokenCard]) -> String {
    if cards.is_empty() {
        return format!("{title}: none");
    }
    let mut table = new_table();
    table.set_header(vec!["Token", "Title", "Creator", "Price"]);
    for c in cards {
        table.add_row(vec![
            Cell::new(format!("#{}", c.token_id)),
            Cell::new(&c.title),
            Cell::new(short_address(Some(c.creator))),
            Cell::new(c.sale.price_label()),
        ]);
    }
    format!("{title}:\n{table}")
}

pub fn format_portfolio(portfolio: &Portfolio, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "account": portfolio.account,
            "created": cards_json(&portfolio.created),
            "owned": cards_json(&portfolio.owned),
            "unreadable": portfolio.unreadable.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        }))
        .unwrap_or_default(),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["relation", "token_id", "title", "creator", "price"]);
            let rows = portfolio
                .created
                .iter()
                .map(|c| ("created", c))
                .chain(portfolio.owned.iter().map(|c| ("owned", c)));
            for (relation, c) in rows {
                let _ = wtr.write_record([
                    relation.to_string(),
                    c.token_id.to_string(),
                    c.title.clone(),
                    full_address(Some(c.creator)),
                    c.sale.price_label(),
                ]);
            }
            finish_csv(wtr)
        }
        OutputFormat::Table => {
            let mut out = format!(
                "{}\n\n{}",
                cards_table("Created", &portfolio.created),
                cards_table("Owned", &portfolio.owned)
            );
            if let Some(note) = unreadable_note(&portfolio.unreadable) {
                out.push('\n');
                out.push_str(&note);
            }
            out
        }
    }
}
