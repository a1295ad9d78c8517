use super::activity::{NO_PRICE, format_ether};
use super::timestamps::stamp_records;
use super::{PartialDataWarning, ReconcileError, ReconcileOptions, newest_first_key, scan_ledger};
use crate::ledger::{EventFilter, EventKind, EventPayload, EventRecord, Ledger};
use alloy_primitives::{Address, B256, U256};
use std::fmt;
use tracing::info;

const ACCOUNT_KINDS: [EventKind; 4] = [
    EventKind::Minted,
    EventKind::Listed,
    EventKind::Sold,
    EventKind::Delisted,
];

/// What an account did, from its own point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountAction {
    Mint,
    List,
    Purchase,
    Sale,
    Delist,
}

impl AccountAction {
    pub fn label(&self) -> &'static str {
        match self {
            AccountAction::Mint => "Mint",
            AccountAction::List => "Listed",
            AccountAction::Purchase => "Purchase",
            AccountAction::Sale => "Sale",
            AccountAction::Delist => "Delisted",
        }
    }
}

impl fmt::Display for AccountAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountEntry {
    pub action: AccountAction,
    pub token_id: U256,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub price_label: String,
    pub timestamp: u64,
    pub block_height: u64,
    pub transaction_id: B256,
    pub log_position: u64,
}

impl AccountEntry {
    pub fn title(&self) -> String {
        format!("Prompt #{}", self.token_id)
    }
}

#[derive(Debug, Clone)]
pub struct AccountHistory {
    pub account: Address,
    pub from_height: u64,
    pub to_height: u64,
    pub entries: Vec<AccountEntry>,
    pub warnings: Vec<PartialDataWarning>,
}

impl AccountHistory {
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// The account's view of `record`, if it took part in it. A self-sale
/// counts as a purchase.
pub fn account_entry(
    record: &EventRecord,
    account: Address,
    timestamp: u64,
) -> Option<AccountEntry> {
    let (action, from, to, price_label) = match record.payload {
        EventPayload::Minted { creator, .. } if creator == account => {
            (AccountAction::Mint, None, Some(account), NO_PRICE.to_string())
        }
        EventPayload::Listed { seller, price } if seller == account => (
            AccountAction::List,
            Some(account),
            None,
            format!("{} ETH", format_ether(price)),
        ),
        EventPayload::Sold {
            seller,
            buyer,
            price,
        } if buyer == account || seller == account => {
            let action = if buyer == account {
                AccountAction::Purchase
            } else {
                AccountAction::Sale
            };
            (
                action,
                Some(seller),
                Some(buyer),
                format!("{} ETH", format_ether(price)),
            )
        }
        EventPayload::Delisted { seller } if seller == account => {
            (AccountAction::Delist, Some(account), None, NO_PRICE.to_string())
        }
        _ => return None,
    };

    Some(AccountEntry {
        action,
        token_id: record.token_id,
        from,
        to,
        price_label,
        timestamp,
        block_height: record.block_height,
        transaction_id: record.transaction_id,
        log_position: record.log_position,
    })
}

/// Every mint, listing, sale, purchase and delisting `account` took part in,
/// across all tokens, newest first.
pub async fn reconcile_account_history<L: Ledger + ?Sized>(
    ledger: &L,
    account: Address,
    options: &ReconcileOptions,
) -> Result<AccountHistory, ReconcileError> {
    let scan = scan_ledger(ledger, &ACCOUNT_KINDS, EventFilter::any(), options).await?;

    let involved: Vec<EventRecord> = scan
        .records
        .into_iter()
        .filter(|r| account_entry(r, account, 0).is_some())
        .collect();

    let mut warnings = scan.warnings;
    let stamped = stamp_records(
        ledger,
        involved,
        options.block_lookup_concurrency,
        &mut warnings,
    )
    .await;

    let mut entries: Vec<AccountEntry> = stamped
        .iter()
        .filter_map(|(record, ts)| account_entry(record, account, *ts))
        .collect();
    entries.sort_by_key(|e| newest_first_key(e.timestamp, e.block_height, e.log_position));

    info!(
        "Account {}: {} transaction(s) from blocks {}-{}",
        account,
        entries.len(),
        scan.from_height,
        scan.to_height
    );

    Ok(AccountHistory {
        account,
        from_height: scan.from_height,
        to_height: scan.to_height,
        entries,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(payload: EventPayload) -> EventRecord {
        EventRecord {
            token_id: U256::from(3),
            block_height: 20,
            transaction_id: B256::repeat_byte(1),
            log_position: 0,
            payload,
        }
    }

    #[test]
    fn sale_reads_differently_for_each_party() {
        let seller = Address::repeat_byte(0xa);
        let buyer = Address::repeat_byte(0xb);
        let sold = record(EventPayload::Sold {
            seller,
            buyer,
            price: U256::from(10u64).pow(U256::from(18)),
        });

        let as_buyer = account_entry(&sold, buyer, 5).unwrap();
        assert_eq!(as_buyer.action, AccountAction::Purchase);
        assert_eq!(as_buyer.price_label, "1.0 ETH");

        let as_seller = account_entry(&sold, seller, 5).unwrap();
        assert_eq!(as_seller.action, AccountAction::Sale);
        assert_eq!(as_seller.from, Some(seller));
        assert_eq!(as_seller.to, Some(buyer));

        assert!(account_entry(&sold, Address::repeat_byte(0xc), 5).is_none());
    }

    #[test]
    fn mint_is_credited_to_creator_only() {
        let creator = Address::repeat_byte(0xa);
        let minted = record(EventPayload::Minted {
            creator,
            price: U256::from(7),
        });
        let entry = account_entry(&minted, creator, 5).unwrap();
        assert_eq!(entry.action, AccountAction::Mint);
        assert_eq!(entry.price_label, NO_PRICE);
        assert_eq!(entry.from, None);
        assert_eq!(entry.title(), "Prompt #3");
        assert!(account_entry(&minted, Address::repeat_byte(0xb), 5).is_none());
    }

    #[test]
    fn transfers_are_not_part_of_account_history() {
        let account = Address::repeat_byte(0xa);
        let transfer = record(EventPayload::Transferred {
            from: account,
            to: Address::repeat_byte(0xb),
        });
        assert!(account_entry(&transfer, account, 5).is_none());
    }
}
