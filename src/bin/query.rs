use anyhow::Result;
use clap::{Parser, Subcommand};
use prompt_ledger::chain::ChainLedger;
use prompt_ledger::config::Config;
use prompt_ledger::deployment::resolve_start_height;
use prompt_ledger::metadata::MetadataStore;
use prompt_ledger::query::commands::{
    cmd_activity, cmd_for_sale, cmd_history, cmd_leaderboard, cmd_metadata, cmd_owned,
    cmd_pin_file, cmd_pin_json, cmd_stats, cmd_token,
};
use prompt_ledger::query::formatters::OutputFormat;
use prompt_ledger::reconcile::ReconcileOptions;
use prompt_ledger::reconcile::stats::{DEFAULT_LEADERBOARD_LIMIT, DEFAULT_RECENT_SALES};
use prompt_ledger::rpc::RpcClient;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Reconcile AI prompt marketplace activity from contract logs", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full history of one prompt token
    Activity { token_id: String },
    /// Mints, listings, sales and purchases of one account
    History { address: String },
    Stats,
    Leaderboard {
        #[arg(long, default_value_t = DEFAULT_LEADERBOARD_LIMIT)]
        limit: usize,
        #[arg(long, default_value_t = DEFAULT_RECENT_SALES)]
        recent: usize,
    },
    /// Resolve and display a token's metadata document
    Metadata { token_id: String },
    /// Current on-chain data, owner and sale state of one token
    Token { token_id: String },
    /// Every token currently listed for sale
    ForSale,
    /// Tokens an account created and tokens it owns
    Owned { address: String },
    PinFile { path: PathBuf },
    PinJson { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;

    match &cli.command {
        Commands::PinFile { path } => {
            let mut store = MetadataStore::from_config(&config)?;
            return cmd_pin_file(&mut store, path, &format).await;
        }
        Commands::PinJson { path } => {
            let mut store = MetadataStore::from_config(&config)?;
            return cmd_pin_json(&mut store, path, &format).await;
        }
        _ => {}
    }

    let client = RpcClient::new(&config.json_rpc_urls, config.rpc_max_retries)?;
    let ledger = ChainLedger::new(client, config.contract_address);

    let concurrency = config.block_lookup_concurrency;
    match &cli.command {
        Commands::Metadata { token_id } => {
            let store = MetadataStore::from_config(&config)?;
            return cmd_metadata(&ledger, &store, token_id, &format).await;
        }
        Commands::Token { token_id } => return cmd_token(&ledger, token_id, &format).await,
        Commands::ForSale => return cmd_for_sale(&ledger, concurrency, &format).await,
        Commands::Owned { address } => {
            return cmd_owned(&ledger, address, concurrency, &format).await;
        }
        _ => {}
    }

    let start_height = resolve_start_height(
        ledger.client(),
        config.contract_address,
        config.deployment_block,
    )
    .await;
    let options = ReconcileOptions::from_config(&config, start_height);

    match cli.command {
        Commands::Activity { token_id } => {
            cmd_activity(&ledger, &options, &token_id, &format).await?;
        }
        Commands::History { address } => {
            cmd_history(&ledger, &options, &address, &format).await?;
        }
        Commands::Stats => {
            cmd_stats(&ledger, &options, &format).await?;
        }
        Commands::Leaderboard { limit, recent } => {
            cmd_leaderboard(&ledger, &options, limit, recent, &format).await?;
        }
        Commands::Metadata { .. }
        | Commands::Token { .. }
        | Commands::ForSale
        | Commands::Owned { .. }
        | Commands::PinFile { .. }
        | Commands::PinJson { .. } => {}
    }

    Ok(())
}
