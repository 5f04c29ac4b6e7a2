use crate::cab::CabUpdate;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// What a producer does when its shard queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Suspend the connection until the worker catches up
    #[default]
    Block,
    /// Discard the incoming message
    DropNewest,
    /// Evict the oldest queued message to make room
    DropOldest,
}

/// Result of handing one update to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    Dropped,
}

/// Every merge worker has stopped; nothing can be delivered any more
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineClosed;

impl fmt::Display for PipelineClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "merge pipeline is closed")
    }
}

impl std::error::Error for PipelineClosed {}

/// Counters shared by every shard of one router
#[derive(Debug, Default)]
pub struct DeliveryStats {
    dropped_overflow: AtomicU64,
}

impl DeliveryStats {
    pub fn dropped_overflow(&self) -> u64 {
        self.dropped_overflow.load(Ordering::Relaxed)
    }

    fn record_dropped(&self, count: u64) {
        self.dropped_overflow.fetch_add(count, Ordering::Relaxed);
    }
}

#[derive(Clone)]
enum ShardSender {
    Bounded {
        tx: mpsc::Sender<CabUpdate>,
        policy: OverflowPolicy,
    },
    Ring(broadcast::Sender<CabUpdate>),
}

enum ShardReceiver {
    Bounded(mpsc::Receiver<CabUpdate>),
    Ring(broadcast::Receiver<CabUpdate>),
}

/// Consumer end of one shard, owned by its merge worker
pub struct DeliveryReceiver {
    shard: usize,
    inner: ShardReceiver,
    stats: Arc<DeliveryStats>,
}

impl DeliveryReceiver {
    pub fn shard(&self) -> usize {
        self.shard
    }

    /// Next update in arrival order.
    ///
    /// Returns `None` once every sender is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<CabUpdate> {
        match &mut self.inner {
            ShardReceiver::Bounded(rx) => rx.recv().await,
            ShardReceiver::Ring(rx) => loop {
                match rx.recv().await {
                    Ok(update) => return Some(update),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        self.stats.record_dropped(skipped);
                        warn!(
                            shard = self.shard,
                            skipped = skipped,
                            "Shard queue full, oldest updates evicted"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }
}

/// Producer side of the merge pipeline: one bounded queue per identity shard.
///
/// Cloned into every connection task. The queues close once the last clone
/// is dropped.
#[derive(Clone)]
pub struct DeliveryRouter {
    shards: Vec<ShardSender>,
    capacity: usize,
    stats: Arc<DeliveryStats>,
}

impl DeliveryRouter {
    /// Build `shards` queues of `capacity` each.
    ///
    /// With `DropOldest` the queue is a ring buffer whose capacity is rounded
    /// up to the next power of two.
    pub fn new(
        shards: usize,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> (Self, Vec<DeliveryReceiver>) {
        let shards = shards.max(1);
        let capacity = effective_capacity(capacity, policy);
        let stats = Arc::new(DeliveryStats::default());

        let mut senders = Vec::with_capacity(shards);
        let mut receivers = Vec::with_capacity(shards);

        for shard in 0..shards {
            let (sender, receiver) = match policy {
                OverflowPolicy::Block | OverflowPolicy::DropNewest => {
                    let (tx, rx) = mpsc::channel(capacity);
                    (
                        ShardSender::Bounded { tx, policy },
                        ShardReceiver::Bounded(rx),
                    )
                }
                OverflowPolicy::DropOldest => {
                    let (tx, rx) = broadcast::channel(capacity);
                    (ShardSender::Ring(tx), ShardReceiver::Ring(rx))
                }
            };
            senders.push(sender);
            receivers.push(DeliveryReceiver {
                shard,
                inner: receiver,
                stats: Arc::clone(&stats),
            });
        }

        (
            Self {
                shards: senders,
                capacity,
                stats,
            },
            receivers,
        )
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Messages each shard queue actually holds before the overflow policy applies
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    /// Shard owning `id`; stable for the lifetime of the router
    pub fn shard_for(&self, id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Enqueue one update on its identity's shard according to the overflow policy
    pub async fn deliver(&self, update: CabUpdate) -> Result<Delivery, PipelineClosed> {
        let shard = self.shard_for(&update.id);

        match &self.shards[shard] {
            ShardSender::Bounded {
                tx,
                policy: OverflowPolicy::DropNewest,
            } => match tx.try_send(update) {
                Ok(()) => Ok(Delivery::Queued),
                Err(mpsc::error::TrySendError::Full(dropped)) => {
                    self.stats.record_dropped(1);
                    warn!(
                        shard = shard,
                        cab_id = %dropped.id,
                        "Shard queue full, update dropped"
                    );
                    Ok(Delivery::Dropped)
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(PipelineClosed),
            },
            ShardSender::Bounded { tx, .. } => tx
                .send(update)
                .await
                .map(|_| Delivery::Queued)
                .map_err(|_| PipelineClosed),
            ShardSender::Ring(tx) => tx
                .send(update)
                .map(|_| Delivery::Queued)
                .map_err(|_| PipelineClosed),
        }
    }
}

/// Per-shard queue size for a configured capacity.
///
/// The `DropOldest` ring is a broadcast buffer, which only comes in powers
/// of two.
pub fn effective_capacity(configured: usize, policy: OverflowPolicy) -> usize {
    let capacity = configured.max(1);
    match policy {
        OverflowPolicy::DropOldest => capacity.next_power_of_two(),
        OverflowPolicy::Block | OverflowPolicy::DropNewest => capacity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cab::{CabStatus, GeoPoint};
    use std::time::Duration;

    fn update(id: &str, seq: u32) -> CabUpdate {
        CabUpdate {
            id: id.to_string(),
            location: GeoPoint::new(seq as f64 / 1000.0, 0.0).unwrap(),
            status: CabStatus::Busy,
        }
    }

    fn seq_of(update: &CabUpdate) -> u32 {
        (update.location.longitude() * 1000.0).round() as u32
    }

    #[test]
    fn test_overflow_policy_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            overflow: OverflowPolicy,
        }
        let w: Wrapper = serde_json::from_str(r#"{"overflow":"drop_oldest"}"#).unwrap();
        assert_eq!(w.overflow, OverflowPolicy::DropOldest);
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::Block);
    }

    #[test]
    fn test_shard_routing_is_stable() {
        let (router, receivers) = DeliveryRouter::new(4, 8, OverflowPolicy::Block);
        assert_eq!(receivers.len(), 4);
        assert_eq!(router.shard_count(), 4);

        for id in ["cab-1", "cab-2", "cab-3", "KA-01-1234"] {
            let shard = router.shard_for(id);
            assert!(shard < 4);
            assert_eq!(router.shard_for(id), shard);
            assert_eq!(router.clone().shard_for(id), shard);
        }
    }

    #[test]
    fn test_effective_capacity() {
        assert_eq!(effective_capacity(10_000, OverflowPolicy::Block), 10_000);
        assert_eq!(effective_capacity(10_000, OverflowPolicy::DropNewest), 10_000);
        assert_eq!(effective_capacity(10_000, OverflowPolicy::DropOldest), 16_384);
        assert_eq!(effective_capacity(4, OverflowPolicy::DropOldest), 4);
        assert_eq!(effective_capacity(0, OverflowPolicy::Block), 1);

        let (router, _receivers) = DeliveryRouter::new(2, 10_000, OverflowPolicy::DropOldest);
        assert_eq!(router.capacity(), 16_384);
        let (router, _receivers) = DeliveryRouter::new(2, 10_000, OverflowPolicy::Block);
        assert_eq!(router.capacity(), 10_000);
    }

    #[test]
    fn test_zero_shards_clamped() {
        let (router, receivers) = DeliveryRouter::new(0, 0, OverflowPolicy::Block);
        assert_eq!(router.shard_count(), 1);
        assert_eq!(receivers.len(), 1);
        assert_eq!(router.shard_for("anything"), 0);
    }

    #[tokio::test]
    async fn test_per_identity_order_preserved() {
        let (router, receivers) = DeliveryRouter::new(3, 64, OverflowPolicy::Block);
        let owner = router.shard_for("cab-1");

        for seq in 0..10 {
            router.deliver(update("cab-1", seq)).await.unwrap();
        }
        drop(router);

        let mut rx = receivers
            .into_iter()
            .find(|rx| rx.shard() == owner)
            .unwrap();

        let mut seen = Vec::new();
        while let Some(u) = rx.recv().await {
            seen.push(seq_of(&u));
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_block_policy_waits_for_space() {
        let (router, mut receivers) = DeliveryRouter::new(1, 1, OverflowPolicy::Block);
        router.deliver(update("cab-1", 1)).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            router.deliver(update("cab-1", 2)),
        )
        .await;
        assert!(blocked.is_err(), "second send should wait while the queue is full");

        let producer = {
            let router = router.clone();
            tokio::spawn(async move { router.deliver(update("cab-1", 3)).await })
        };
        assert_eq!(seq_of(&receivers[0].recv().await.unwrap()), 1);
        assert_eq!(producer.await.unwrap(), Ok(Delivery::Queued));
        assert_eq!(seq_of(&receivers[0].recv().await.unwrap()), 3);
        assert_eq!(router.stats().dropped_overflow(), 0);
    }

    #[tokio::test]
    async fn test_drop_newest_policy() {
        let (router, mut receivers) = DeliveryRouter::new(1, 2, OverflowPolicy::DropNewest);

        assert_eq!(router.deliver(update("cab-1", 1)).await, Ok(Delivery::Queued));
        assert_eq!(router.deliver(update("cab-1", 2)).await, Ok(Delivery::Queued));
        assert_eq!(router.deliver(update("cab-1", 3)).await, Ok(Delivery::Dropped));
        assert_eq!(router.stats().dropped_overflow(), 1);
        drop(router);

        let mut seen = Vec::new();
        while let Some(u) = receivers[0].recv().await {
            seen.push(seq_of(&u));
        }
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_drop_oldest_policy() {
        let (router, mut receivers) = DeliveryRouter::new(1, 4, OverflowPolicy::DropOldest);

        for seq in 1..=6 {
            assert_eq!(router.deliver(update("cab-1", seq)).await, Ok(Delivery::Queued));
        }
        let stats = router.stats();
        drop(router);

        let mut seen = Vec::new();
        while let Some(u) = receivers[0].recv().await {
            seen.push(seq_of(&u));
        }
        assert_eq!(seen, vec![3, 4, 5, 6]);
        assert_eq!(stats.dropped_overflow(), 2);
    }

    #[tokio::test]
    async fn test_deliver_after_workers_gone() {
        let (router, receivers) = DeliveryRouter::new(1, 4, OverflowPolicy::Block);
        drop(receivers);
        assert_eq!(router.deliver(update("cab-1", 1)).await, Err(PipelineClosed));
    }
}
