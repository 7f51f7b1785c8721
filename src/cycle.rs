use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::evaluator::{evaluate, Threshold};
use crate::fetcher::PriceFetcher;
use crate::models::TrackedItem;
use crate::notifier::Notifier;
use crate::store::HistoryStore;
use crate::{AppError, Result};

/// Per-item pipeline states. `Recorded` and `Failed` are terminal; an item
/// left `Pending` was never started (shutdown requested before its turn).
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Pending,
    Fetching,
    Recorded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub item_id: String,
    pub name: String,
    pub state: ItemState,
    pub price: Option<Decimal>,
    pub notified: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items_total: usize,
    pub recorded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub notifications_sent: usize,
    pub outcomes: Vec<ItemOutcome>,
}

/// Runs one full pass over all tracked items: fetch, record, evaluate,
/// notify. Item pipelines are independent and fan out up to
/// `max_concurrent_checks`; one item failing never stops the others.
pub struct CycleRunner {
    store: HistoryStore,
    fetcher: Arc<PriceFetcher>,
    notifier: Arc<dyn Notifier>,
    recipient: String,
    max_concurrent: usize,
    shutdown: watch::Receiver<bool>,
}

impl CycleRunner {
    pub fn new(
        store: HistoryStore,
        fetcher: Arc<PriceFetcher>,
        notifier: Arc<dyn Notifier>,
        config: &AppConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            fetcher,
            notifier,
            recipient: config.notifications.recipient.clone(),
            max_concurrent: config.scraper.max_concurrent_checks.max(1),
            shutdown,
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let started_at = Utc::now();
        let items = self.store.list_items().await?;
        info!(items = items.len(), "starting scrape cycle");

        let results: Vec<Result<ItemOutcome>> = stream::iter(items.into_iter())
            .map(|item| self.process_guarded(item))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            // Only referential-integrity violations escalate past here.
            outcomes.push(result?);
        }

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            items_total: outcomes.len(),
            recorded: outcomes.iter().filter(|o| o.state == ItemState::Recorded).count(),
            failed: outcomes.iter().filter(|o| o.state == ItemState::Failed).count(),
            skipped: outcomes.iter().filter(|o| o.state == ItemState::Pending).count(),
            notifications_sent: outcomes.iter().filter(|o| o.notified).count(),
            outcomes,
        };

        info!(
            items = report.items_total,
            recorded = report.recorded,
            failed = report.failed,
            skipped = report.skipped,
            notified = report.notifications_sent,
            "scrape cycle complete"
        );
        Ok(report)
    }

    /// Checks the shutdown flag before an item starts; an in-flight item is
    /// allowed to finish rather than being hard-killed mid-append.
    async fn process_guarded(&self, item: TrackedItem) -> Result<ItemOutcome> {
        if *self.shutdown.borrow() {
            info!(item = %item.name, "shutdown requested, leaving item for the next cycle");
            return Ok(ItemOutcome {
                item_id: item.id,
                name: item.name,
                state: ItemState::Pending,
                price: None,
                notified: false,
                error: Some("shutdown requested".to_string()),
            });
        }
        self.process_item(item).await
    }

    async fn process_item(&self, item: TrackedItem) -> Result<ItemOutcome> {
        let mut outcome = ItemOutcome {
            item_id: item.id.clone(),
            name: item.name.clone(),
            state: ItemState::Fetching,
            price: None,
            notified: false,
            error: None,
        };

        let price = match self.fetcher.fetch_price(&item.url).await {
            Ok(price) => price,
            Err(err) => {
                warn!(item = %item.name, error = %err, "skipping item this cycle");
                outcome.state = ItemState::Failed;
                outcome.error = Some(err.to_string());
                return Ok(outcome);
            }
        };

        if let Err(err) = self.store.append(&item.id, price).await {
            if matches!(err, AppError::UnknownItem { .. }) {
                // The item came from the same store; this means the store's
                // referential integrity is broken.
                error!(item = %item.name, error = %err, "aborting cycle");
                return Err(err);
            }
            warn!(item = %item.name, error = %err, "failed to record observation");
            outcome.state = ItemState::Failed;
            outcome.error = Some(err.to_string());
            return Ok(outcome);
        }

        outcome.state = ItemState::Recorded;
        outcome.price = Some(price);
        info!(item = %item.name, %price, target = %item.target_price, "recorded observation");

        if evaluate(item.target_price, price) == Threshold::Trigger {
            let subject = format!("Price Alert: {} is now {}", item.name, price);
            let body = format!(
                "The price of '{}' has dropped to {}.\nCheck it out here: {}",
                item.name, price, item.url
            );
            match self.notifier.notify(&subject, &body, &self.recipient).await {
                Ok(()) => outcome.notified = true,
                Err(err) => {
                    // Best-effort delivery: a lost alert never fails the item.
                    warn!(item = %item.name, error = %err, "failed to send price alert");
                }
            }
        }

        Ok(outcome)
    }
}
