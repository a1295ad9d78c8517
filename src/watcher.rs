use crate::ledger::Ledger;
use crate::reconcile::{ActivityEntry, ReconcileError, ReconcileOptions, reconcile_activity};
use alloy_primitives::U256;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(12);

/// Follows one token's activity, reporting each entry exactly once.
pub struct ActivityWatcher<L> {
    ledger: L,
    token_id: U256,
    options: ReconcileOptions,
    poll_interval: Duration,
    seen: HashSet<String>,
    last_height: Option<u64>,
}

impl<L: Ledger> ActivityWatcher<L> {
    pub fn new(ledger: L, token_id: U256, options: ReconcileOptions) -> Self {
        Self {
            ledger,
            token_id,
            options,
            poll_interval: DEFAULT_POLL_INTERVAL,
            seen: HashSet::new(),
            last_height: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn last_height(&self) -> Option<u64> {
        self.last_height
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Re-reconciles if the chain has advanced since the last poll and
    /// returns the entries not reported before, oldest first.
    pub async fn poll_once(&mut self) -> Result<Vec<ActivityEntry>, ReconcileError> {
        let height = self
            .ledger
            .current_height()
            .await
            .map_err(|e| ReconcileError::LedgerUnavailable(e.to_string()))?;

        if self.last_height.is_some_and(|last| height <= last) {
            debug!("No new blocks since {}", height);
            return Ok(Vec::new());
        }

        let log = reconcile_activity(&self.ledger, self.token_id, &self.options).await?;
        for warning in &log.warnings {
            warn!("Token #{}: {}", self.token_id, warning);
        }

        let mut fresh: Vec<ActivityEntry> = log
            .entries
            .into_iter()
            .filter(|entry| self.seen.insert(entry.id.clone()))
            .collect();
        fresh.reverse();

        // A degraded pass is retried at the same height on the next tick.
        if log.warnings.is_empty() {
            self.last_height = Some(log.to_height);
        }
        Ok(fresh)
    }

    /// Polls forever, handing every batch of new entries to `on_new`.
    pub async fn run<F>(&mut self, mut on_new: F) -> Result<(), ReconcileError>
    where
        F: FnMut(&[ActivityEntry]),
    {
        info!(
            "Watching token #{} every {}s",
            self.token_id,
            self.poll_interval.as_secs()
        );

        loop {
            let loop_start = Instant::now();

            match self.poll_once().await {
                Ok(fresh) if !fresh.is_empty() => {
                    info!("{} new entries for token #{}", fresh.len(), self.token_id);
                    on_new(&fresh);
                }
                Ok(_) => {}
                Err(e) => warn!("Poll failed, retrying next tick: {}", e),
            }

            let elapsed = loop_start.elapsed();
            if elapsed < self.poll_interval {
                sleep(self.poll_interval - elapsed).await;
            }
        }
    }
}
