use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;

use crate::delivery::retry::DEFAULT_RETRY_DELAY;
use crate::delivery::{DeliveryClient, DeliveryError, RetryPolicy};
use crate::error::StoreError;
use crate::models::RecordUpdate;
use crate::state::SharedState;
use crate::store::{QueueStore, SettingsStore};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Records handed to the delivery client.
    pub attempted: usize,
    pub delivered: usize,
    /// HTTP requests issued across all records.
    pub requests: u32,
    /// Records that ended on a server or transport error.
    pub retryable: usize,
    /// Records still unsent once the pass finished, including ones queued meanwhile.
    pub still_pending: i64,
}

impl PassSummary {
    /// Another pass is worth scheduling only if a record hit a transient
    /// failure and work is still left. Rejected and unconfirmed records wait
    /// for the periodic tick.
    pub fn needs_follow_up(&self) -> bool {
        self.retryable > 0 && self.still_pending > 0
    }
}

/// Drains the queue: one delivery per pending record, one update per delivery.
pub struct Dispatcher {
    queue: Arc<dyn QueueStore>,
    settings: Arc<dyn SettingsStore>,
    retry_delay: Duration,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn QueueStore>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            queue,
            settings,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub async fn run_pass(&self) -> Result<PassSummary, DispatchError> {
        let records = self.queue.find_pending().await?;
        if records.is_empty() {
            return Ok(PassSummary::default());
        }

        let settings = self.settings.load().await?;
        let config = settings.delivery_config();
        let policy = RetryPolicy::new(config.max_retries, self.retry_delay);
        let client = DeliveryClient::with_policy(&config, policy)?;

        let mut summary = PassSummary::default();

        for record in records {
            let outcome = client.attempt_delivery(&record).await;
            summary.attempted += 1;
            summary.requests += outcome.attempts;
            if outcome.kind.is_retryable() {
                summary.retryable += 1;
            }

            let success = outcome.success();
            let update = RecordUpdate {
                time_sent: if success { chrono::Utc::now().timestamp() } else { 0 },
                status: outcome.status,
                attempts: record.attempts + 1,
            };

            if let Err(e) = self.queue.update(record.id, update).await {
                tracing::error!("Failed to update queue record {}: {e}", record.id);
                continue;
            }

            if success {
                summary.delivered += 1;
            }
        }

        summary.still_pending = self.queue.counts().await?.pending;
        Ok(summary)
    }
}

/// Level-triggered wake-up for the drain loop. Requests made while a pass is
/// running collapse into a single follow-up pass.
#[derive(Clone, Default)]
pub struct DispatchTrigger {
    notify: Arc<Notify>,
}

impl DispatchTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.notify.notify_one();
    }

    pub fn request_after(&self, delay: Duration) {
        let trigger = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trigger.request();
        });
    }

    pub async fn requested(&self) {
        self.notify.notified().await;
    }
}

pub fn spawn(state: SharedState, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(state, shutdown))
}

/// The single drain loop. Wakes on the periodic tick, on an on-demand
/// request, or on shutdown. Passes never overlap within one process.
pub async fn run(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(state.config.dispatch_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        "Dispatcher started (interval={:?}, retrigger_delay={:?})",
        state.config.dispatch_interval,
        state.config.retrigger_delay
    );

    loop {
        let reason = tokio::select! {
            _ = ticker.tick() => "periodic",
            _ = state.trigger.requested() => "on-demand",
            _ = shutdown.changed() => break,
        };

        if *shutdown.borrow() {
            break;
        }

        tracing::debug!("Starting {reason} dispatch pass");

        match state.dispatcher.run_pass().await {
            Ok(summary) => {
                if summary.attempted > 0 {
                    tracing::info!(
                        "Dispatch pass done: {} attempted, {} delivered, {} still pending",
                        summary.attempted,
                        summary.delivered,
                        summary.still_pending
                    );
                }
                if summary.needs_follow_up() {
                    state.trigger.request_after(state.config.retrigger_delay);
                }
            }
            Err(e) => {
                tracing::error!("Dispatch pass failed: {e}");
            }
        }
    }

    tracing::info!("Dispatcher stopped");
}
