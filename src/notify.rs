use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use ulid::Ulid;

const CHANNEL_CAPACITY: usize = 256;

/// Read surfaces built from appointment and schedule data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum View {
    Agenda,
    Daycare,
    Grooming,
}

impl View {
    /// Logical resource name handed to cache invalidation.
    pub fn path(&self) -> &'static str {
        match self {
            View::Agenda => "/agenda",
            View::Daycare => "/daycare",
            View::Grooming => "/grooming",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub organization_id: Ulid,
    pub view: View,
}

/// Broadcast hub for view invalidation, one channel per organization.
pub struct InvalidationHub {
    channels: DashMap<Ulid, broadcast::Sender<Invalidation>>,
}

impl Default for InvalidationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to invalidations for an organization. Creates the channel if needed.
    pub fn subscribe(&self, organization_id: Ulid) -> broadcast::Receiver<Invalidation> {
        let sender = self
            .channels
            .entry(organization_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Mark views stale. No-op if nobody is listening.
    pub fn invalidate(&self, organization_id: Ulid, views: &[View]) {
        if let Some(sender) = self.channels.get(&organization_id) {
            for &view in views {
                let _ = sender.send(Invalidation { organization_id, view });
            }
        }
        for view in views {
            tracing::trace!(%organization_id, path = view.path(), "view invalidated");
        }
    }
}
