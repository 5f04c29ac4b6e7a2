// Merge pipeline: drains delivery shards into idempotent store upserts

use crate::cab::CabUpdate;
use crate::config::MergeConfig;
use crate::ingest::DeliveryReceiver;
use crate::store::{with_timeout, SpatialStore};
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};


/// Counters shared by all merge workers
#[derive(Debug, Default)]
pub struct MergeStats {
    applied: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

/// Point-in-time copy of [`MergeStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeStatsSnapshot {
    pub applied: u64,
    pub failed: u64,
    pub retried: u64,
}

impl MergeStats {
    pub fn snapshot(&self) -> MergeStatsSnapshot {
        MergeStatsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

/// Bounded retry schedule for failed writes
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &MergeConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based): doubles each time,
    /// plus up to 50% random jitter
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << (attempt.saturating_sub(1)).min(16));
        let jitter_ms = base.as_millis() as u64 / 2;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Single consumer for one delivery shard.
///
/// Applies updates strictly in dequeue order; the next update is not
/// started until the current one is stored or dropped.
pub struct MergeWorker {
    receiver: DeliveryReceiver,
    store: Arc<dyn SpatialStore>,
    retry: RetryPolicy,
    write_timeout: Duration,
    stats: Arc<MergeStats>,
}

impl MergeWorker {
    pub fn new(
        receiver: DeliveryReceiver,
        store: Arc<dyn SpatialStore>,
        retry: RetryPolicy,
        write_timeout: Duration,
        stats: Arc<MergeStats>,
    ) -> Self {
        Self {
            receiver,
            store,
            retry,
            write_timeout,
            stats,
        }
    }

    /// Run until the shard is closed and drained
    pub async fn run(mut self) {
        let shard = self.receiver.shard();
        info!(shard = shard, "Merge worker started");

        while let Some(update) = self.receiver.recv().await {
            self.merge(update).await;
        }

        info!(shard = shard, "Merge worker drained, exiting");
    }

    /// Upsert one update, retrying transient failures before dropping it
    async fn merge(&self, update: CabUpdate) {
        // Receipt time is fixed at dequeue so retries write the same record
        let received_at = Utc::now();
        let mut attempt = 0;

        loop {
            let result = with_timeout(
                self.write_timeout,
                "upsert",
                self.store.upsert(&update, received_at),
            )
            .await;

            match result {
                Ok(_) => {
                    self.stats.applied.fetch_add(1, Ordering::Relaxed);
                    debug!(cab_id = %update.id, status = %update.status, "Cab update merged");
                    return;
                }
                Err(e) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    self.stats.retried.fetch_add(1, Ordering::Relaxed);
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        cab_id = %update.id,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Cab update write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        cab_id = %update.id,
                        attempts = attempt + 1,
                        error = %e,
                        "Cab update dropped after failed writes"
                    );
                    return;
                }
            }
        }
    }
}

/// Spawn one worker per receiver
pub fn spawn_merge_workers(
    receivers: Vec<DeliveryReceiver>,
    store: Arc<dyn SpatialStore>,
    retry: RetryPolicy,
    write_timeout: Duration,
    stats: Arc<MergeStats>,
) -> Vec<JoinHandle<()>> {
    receivers
        .into_iter()
        .map(|receiver| {
            let worker = MergeWorker::new(
                receiver,
                Arc::clone(&store),
                retry,
                write_timeout,
                Arc::clone(&stats),
            );
            tokio::spawn(worker.run())
        })
        .collect()
}
