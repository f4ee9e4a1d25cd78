//! Notification of data changes to UI-facing consumers.
//!
//! The sync engine does not know what the UI binds to; it only
//! distinguishes "data changed" from "data cleared" and names the domain
//! the event belongs to.

use tokio::sync::broadcast;
use tracing::debug;

/// Buffer size for the event channel.
/// 32 covers a full refresh of every domain with headroom.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Event kinds emitted by domain managers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A refresh produced new data for the domain.
    DataChanged { domain: String },
    /// The domain's published state and cache were reset.
    DataCleared { domain: String },
}

/// Shared broadcast handle for sync events.
///
/// Cloning is cheap; every manager holds one. Send failures mean no one
/// is listening, which is normal for headless runs and never a fault.
#[derive(Clone)]
pub struct SyncEvents {
    tx: broadcast::Sender<SyncEvent>,
}

impl Default for SyncEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_BUFFER_SIZE);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    pub fn data_changed(&self, domain: &str) {
        self.emit(SyncEvent::DataChanged {
            domain: domain.to_string(),
        });
    }

    pub fn data_cleared(&self, domain: &str) {
        self.emit(SyncEvent::DataCleared {
            domain: domain.to_string(),
        });
    }

    fn emit(&self, event: SyncEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!(?event, "No sync event subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let events = SyncEvents::new();
        let mut rx = events.subscribe();

        events.data_changed("activities");
        events.data_cleared("profile");

        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::DataChanged {
                domain: "activities".to_string()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::DataCleared {
                domain: "profile".to_string()
            }
        );
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let events = SyncEvents::new();
        events.data_changed("activities");
    }
}
