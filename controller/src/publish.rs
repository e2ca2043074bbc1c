use chrono::Utc;
use greenhouse_common::StatusSnapshot;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::store::DeviceStateStore;

/// Hands one [`StatusSnapshot`] per measurement pass to whatever transport
/// drains the receiving side.
#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    tx: mpsc::Sender<StatusSnapshot>,
}

impl SnapshotPublisher {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StatusSnapshot>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Never waits on the consumer; a lagging consumer loses this snapshot.
    pub async fn publish(&self, store: &DeviceStateStore) -> Option<StatusSnapshot> {
        let snapshot = store.read().await.snapshot(Utc::now().timestamp());
        match self.tx.try_send(snapshot.clone()) {
            Ok(()) => Some(snapshot),
            Err(TrySendError::Full(_)) => {
                debug!("snapshot consumer is lagging, dropping snapshot");
                None
            }
            Err(TrySendError::Closed(_)) => {
                warn!("snapshot consumer has gone away");
                None
            }
        }
    }
}
