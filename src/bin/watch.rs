use anyhow::Result;
use clap::Parser;
use prompt_ledger::chain::ChainLedger;
use prompt_ledger::config::Config;
use prompt_ledger::deployment::resolve_start_height;
use prompt_ledger::query::commands::parse_token_id;
use prompt_ledger::query::formatters::format_timestamp;
use prompt_ledger::reconcile::ReconcileOptions;
use prompt_ledger::rpc::RpcClient;
use prompt_ledger::watcher::ActivityWatcher;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "watch")]
#[command(about = "Follow a prompt token's activity as new blocks arrive", long_about = None)]
struct Cli {
    token_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let token_id = parse_token_id(&cli.token_id)?;

    info!("Starting prompt activity watcher");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("Contract address: {:?}", config.contract_address);
    info!(
        "RPC URLs: {} endpoint(s) configured",
        config.json_rpc_urls.len()
    );

    let client = RpcClient::new(&config.json_rpc_urls, config.rpc_max_retries)?;
    info!("RPC client connected");

    let start_height =
        resolve_start_height(&client, config.contract_address, config.deployment_block).await;
    let options = ReconcileOptions::from_config(&config, start_height);
    let ledger = ChainLedger::new(client, config.contract_address);

    let mut watcher =
        ActivityWatcher::new(ledger, token_id, options).with_poll_interval(config.poll_interval);

    let result = watcher
        .run(|entries| {
            for entry in entries {
                println!(
                    "{} | {:<20} | {} | block {} | {:?}",
                    format_timestamp(entry.timestamp),
                    entry.kind.label(),
                    entry.price_label,
                    entry.block_height,
                    entry.transaction_id
                );
            }
        })
        .await;

    if let Err(e) = result {
        error!("Watcher error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
