use thiserror::Error;

use crate::models::RecordError;
use crate::registry::RegistryError;
use crate::remote::RemoteError;
use crate::store::StoreError;

/// Errors surfaced by the sync engine and the status-tracking write layer.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("table {0} is read-only: it is refreshed from the remote store")]
    ReadOnlyTable(String),

    #[error("sync queue for {0} is full; the queued push will cover pending records")]
    QueueFull(String),

    #[error("sync worker for {0} stopped before reporting")]
    QueueClosed(String),

    #[error("no async runtime available to schedule a sync of {0}")]
    NoRuntime(String),
}
