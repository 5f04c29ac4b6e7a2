use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

/// One live ingestion stream
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub live: bool,
    pub peer: String,
    pub opened_at: DateTime<Utc>,
}

/// Live ingestion connections, keyed by connection id.
///
/// Owned by one multiplexer; entries exist only between open and close.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, ConnectionInfo>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly opened connection and return its id
    pub fn register(&self, peer: impl Into<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            ConnectionInfo {
                live: true,
                peer: peer.into(),
                opened_at: Utc::now(),
            },
        );
        id
    }

    /// Remove a connection; returns its entry if it was registered
    pub fn deregister(&self, id: &Uuid) -> Option<ConnectionInfo> {
        self.connections.remove(id).map(|(_, info)| info)
    }

    pub fn is_live(&self, id: &Uuid) -> bool {
        self.connections.get(id).map(|c| c.live).unwrap_or(false)
    }

    pub fn get(&self, id: &Uuid) -> Option<ConnectionInfo> {
        self.connections.get(id).map(|c| c.clone())
    }

    pub fn live_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_deregister() {
        let registry = ConnectionRegistry::new();
        let id = registry.register("10.0.0.7:53122");

        assert!(registry.is_live(&id));
        assert_eq!(registry.live_count(), 1);
        assert_eq!(registry.get(&id).unwrap().peer, "10.0.0.7:53122");

        let info = registry.deregister(&id).unwrap();
        assert!(info.live);
        assert!(!registry.is_live(&id));
        assert_eq!(registry.live_count(), 0);
        assert!(registry.deregister(&id).is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = ConnectionRegistry::new();
        let a = registry.register("peer");
        let b = registry.register("peer");

        assert_ne!(a, b);
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn test_unknown_id_not_live() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.is_live(&Uuid::new_v4()));
    }
}
