// Service assembly: wires store, pipeline, queries and routers together

use crate::api::{
    create_admin_router, create_dispatch_router, create_health_router, create_ingest_router,
    create_proximity_router, AdminAppState, DispatchAppState, HealthAppState, IngestAppState,
    ProximityAppState,
};
use crate::auth::AuthGate;
use crate::config::CabConfig;
use crate::dispatch::ProximityClient;
use crate::ingest::{DeliveryRouter, IngestionMultiplexer};
use crate::merge::{spawn_merge_workers, MergeStats, RetryPolicy};
use crate::query::ProximityQueryService;
use crate::snapshot::{load_latest_snapshot, SnapshotManager};
use crate::store::{MemoryStore, SpatialStore};
use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// How long shutdown waits for merge workers to drain
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// A running cabtrack instance (everything except the listener)
pub struct CabTrackService {
    store: Arc<MemoryStore>,
    mux: Arc<IngestionMultiplexer>,
    merge_stats: Arc<MergeStats>,
    workers: Vec<JoinHandle<()>>,
    snapshots: Arc<SnapshotManager>,
    snapshot_task: JoinHandle<()>,
    router: Router,
}

impl CabTrackService {
    /// Restore state, create the index, start workers and build the routers.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn start(config: CabConfig) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(MemoryStore::from_config(&config.store)?);

        if config.snapshot.enabled {
            if let Some(snapshot) = load_latest_snapshot(&config.snapshot.directory)? {
                store
                    .load_records(snapshot.into_records())
                    .context("Failed to restore cab records from snapshot")?;
            }
        }

        store
            .ensure_index()
            .await
            .context("Failed to create spherical index")?;

        let store_timeout = Duration::from_millis(config.store.timeout_ms);
        let dyn_store: Arc<dyn SpatialStore> = store.clone();

        // Pipeline
        let (delivery, receivers) = DeliveryRouter::new(
            config.merge.workers,
            config.ingest.channel_capacity,
            config.ingest.overflow,
        );
        let merge_stats = Arc::new(MergeStats::default());
        let workers = spawn_merge_workers(
            receivers,
            Arc::clone(&dyn_store),
            RetryPolicy::from_config(&config.merge),
            store_timeout,
            Arc::clone(&merge_stats),
        );
        let queue_capacity = delivery.capacity();
        let mux = Arc::new(IngestionMultiplexer::new(delivery));

        if queue_capacity != config.ingest.channel_capacity {
            warn!(
                configured = config.ingest.channel_capacity,
                effective = queue_capacity,
                "Shard queue capacity rounded up for drop_oldest"
            );
        }
        info!(
            workers = config.merge.workers,
            channel_capacity = queue_capacity,
            overflow = ?config.ingest.overflow,
            "Merge pipeline started"
        );

        // Snapshots
        let snapshots = Arc::new(SnapshotManager::new(
            Arc::clone(&store),
            config.snapshot.clone(),
        ));
        let snapshot_task = {
            let snapshots = Arc::clone(&snapshots);
            tokio::spawn(async move {
                if let Err(e) = snapshots.run_snapshot_loop().await {
                    error!(error = %e, "Snapshot manager stopped");
                }
            })
        };

        // Routers
        let auth = AuthGate::from_config(&config.auth);
        let query = Arc::new(ProximityQueryService::new(
            Arc::clone(&dyn_store),
            store_timeout,
        ));
        let client = ProximityClient::new(
            config.proximity_base_url(),
            Duration::from_millis(config.dispatch.timeout_ms),
        )?;

        info!(
            auth_enabled = auth.is_enabled(),
            proximity_base_url = %client.base_url(),
            "Routers configured"
        );

        let router = Router::new()
            .merge(create_ingest_router(IngestAppState {
                mux: Arc::clone(&mux),
                auth: auth.clone(),
            }))
            .merge(create_proximity_router(ProximityAppState {
                service: query,
                auth: auth.clone(),
            }))
            .merge(create_admin_router(AdminAppState {
                store: Arc::clone(&dyn_store),
                timeout: store_timeout,
                auth: auth.clone(),
            }))
            .merge(create_dispatch_router(DispatchAppState { client, auth }))
            .merge(create_health_router(HealthAppState {
                store: dyn_store,
                mux: Arc::clone(&mux),
                merge_stats: Arc::clone(&merge_stats),
            }))
            .layer(TraceLayer::new_for_http());

        Ok(Self {
            store,
            mux,
            merge_stats,
            workers,
            snapshots,
            snapshot_task,
            router,
        })
    }

    /// Router serving every endpoint
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }

    pub fn multiplexer(&self) -> Arc<IngestionMultiplexer> {
        Arc::clone(&self.mux)
    }

    pub fn merge_stats(&self) -> Arc<MergeStats> {
        Arc::clone(&self.merge_stats)
    }

    /// Close ingestion, drain the merge workers and write a final snapshot.
    ///
    /// Call after the HTTP server has stopped so no router clone keeps the
    /// pipeline open.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            store: _,
            mux,
            merge_stats,
            workers,
            snapshots,
            snapshot_task,
            router,
        } = self;

        mux.shutdown();
        drop(router);
        drop(mux);

        let drain = futures::future::join_all(workers);
        match tokio::time::timeout(DRAIN_TIMEOUT, drain).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(error = %e, "Merge worker panicked");
                    }
                }
                let stats = merge_stats.snapshot();
                info!(
                    applied = stats.applied,
                    failed = stats.failed,
                    retried = stats.retried,
                    "Merge pipeline drained"
                );
            }
            Err(_) => warn!(
                timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "Merge workers still busy, continuing shutdown"
            ),
        }

        snapshot_task.abort();
        if let Some(path) = snapshots.save_now()? {
            info!(path = %path.display(), "Final snapshot written");
        }

        Ok(())
    }
}
