// Cab domain model and validation
pub mod cab;

// Configuration
pub mod config;

// Great-circle distance and the H3 spherical index
pub mod geo;

// Spatial store
pub mod store;

// Snapshot persistence
pub mod snapshot;

// WebSocket ingestion multiplexer
pub mod ingest;

// Merge pipeline
pub mod merge;

// Proximity queries
pub mod query;

// Dispatch facade client
pub mod dispatch;

// Bearer-token gate
pub mod auth;

// HTTP APIs
pub mod api;

// Service assembly
pub mod service;

pub use service::CabTrackService;
