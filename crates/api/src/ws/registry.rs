use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

/// Tracks live sessions by connection ID. Sessions themselves stay owned by
/// their connection task; the registry only exists for the connection gauge
/// and disconnect accounting.
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Instant>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn register(&self, connection_id: Uuid) {
        self.sessions.insert(connection_id, Instant::now());
    }

    /// Removes the session and returns how long it was connected.
    pub fn unregister(&self, connection_id: &Uuid) -> Option<Duration> {
        self.sessions
            .remove(connection_id)
            .map(|(_, connected_at)| connected_at.elapsed())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
