use crate::rpc::RpcClient;
use alloy_primitives::Address;
use anyhow::Result;
use tracing::{info, warn};

/// First block at which `address` has code, found by bisection over `eth_getCode`.
pub async fn find_deployment_block(
    client: &RpcClient,
    address: Address,
    latest_block: u64,
) -> Result<u64> {
    info!("Searching for deployment block of contract {:?}", address);

    let code = client.get_code_at_block(address, latest_block).await?;
    if code.is_empty() {
        anyhow::bail!("Address {:?} is not a deployed contract", address);
    }

    let mut left = 0u64;
    let mut right = latest_block;

    while left < right {
        let mid = left + (right - left) / 2;

        let code = client.get_code_at_block(address, mid).await?;

        if code.is_empty() {
            left = mid + 1;
        } else {
            right = mid;
        }
    }

    info!("Contract deployed at block {}", left);
    Ok(left)
}

/// Height reconciliation starts from: the configured deployment block if any,
/// otherwise the discovered one, otherwise genesis.
pub async fn resolve_start_height(
    client: &RpcClient,
    address: Address,
    configured: Option<u64>,
) -> u64 {
    if let Some(block) = configured {
        info!("Using configured deployment block: {}", block);
        return block;
    }

    let discovered = match client.get_latest_block().await {
        Ok(latest) => find_deployment_block(client, address, latest).await,
        Err(e) => Err(e),
    };

    match discovered {
        Ok(block) => block,
        Err(e) => {
            warn!("Could not locate deployment block, scanning from genesis: {}", e);
            0
        }
    }
}
