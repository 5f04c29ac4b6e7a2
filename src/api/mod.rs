// HTTP APIs: cab registration, proximity queries, trip dispatch, health

pub mod admin;
pub mod dispatch;
pub mod health;
pub mod proximity;

pub use admin::{create_admin_router, AdminAppState, RegisterCabResponse};
pub use crate::ingest::{create_ingest_router, IngestAppState};
pub use dispatch::{create_dispatch_router, DispatchAppState};
pub use health::{create_health_router, HealthAppState, HealthResponse};
pub use proximity::{create_proximity_router, ProximityAppState};
