//! Per-table push queues behind `trigger_sync`.
//!
//! Each table gets a bounded queue drained by one worker task, spawned on
//! first use. Workers hold only a weak reference to the engine and stop
//! once it is dropped.

use std::collections::HashMap;
use std::sync::{Arc, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use super::{EngineInner, PushReport, SyncEngine};
use crate::error::SyncError;
use crate::registry::EntityKind;

type PushResult = Result<PushReport, SyncError>;

pub(crate) struct PushJob {
    reply: oneshot::Sender<PushResult>,
}

enum TicketState {
    Queued(oneshot::Receiver<PushResult>),
    Done(PushResult),
}

/// Handle to a scheduled push.
///
/// Dropping the ticket does not cancel the push; its outcome is then only
/// logged.
#[must_use = "drop the ticket explicitly to fire and forget"]
pub struct SyncTicket {
    table: &'static str,
    state: TicketState,
}

impl SyncTicket {
    fn done(table: &'static str, result: PushResult) -> Self {
        Self {
            table,
            state: TicketState::Done(result),
        }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Whether the ticket was resolved without queueing a push.
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, TicketState::Done(_))
    }

    /// Waits for the push and returns its report.
    pub async fn wait(self) -> PushResult {
        match self.state {
            TicketState::Done(result) => result,
            TicketState::Queued(receiver) => receiver
                .await
                .unwrap_or_else(|_| Err(SyncError::QueueClosed(self.table.to_string()))),
        }
    }
}

fn lock_queues(
    inner: &EngineInner,
) -> MutexGuard<'_, HashMap<EntityKind, mpsc::Sender<PushJob>>> {
    inner.queues.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncEngine {
    /// Schedules a push of the table without waiting for it.
    ///
    /// When the table's queue is full the ticket resolves immediately with
    /// `QueueFull`: a push already waiting in the queue will pick up the
    /// same pending records.
    pub fn trigger_sync(&self, kind: EntityKind) -> SyncTicket {
        let table = self.spec(kind).name;
        let sender = match self.queue_sender(kind) {
            Ok(sender) => sender,
            Err(e) => {
                tracing::warn!(table, error = %e, "Cannot schedule sync");
                return SyncTicket::done(table, Err(e));
            }
        };

        let (reply, receiver) = oneshot::channel();
        match sender.try_send(PushJob { reply }) {
            Ok(()) => {
                tracing::debug!(table, "Sync scheduled");
                SyncTicket {
                    table,
                    state: TicketState::Queued(receiver),
                }
            }
            Err(TrySendError::Full(_)) => {
                tracing::debug!(table, "Sync queue full; already covered");
                SyncTicket::done(table, Err(SyncError::QueueFull(table.to_string())))
            }
            Err(TrySendError::Closed(_)) => {
                lock_queues(&self.inner).remove(&kind);
                SyncTicket::done(table, Err(SyncError::QueueClosed(table.to_string())))
            }
        }
    }

    fn queue_sender(&self, kind: EntityKind) -> Result<mpsc::Sender<PushJob>, SyncError> {
        let mut queues = lock_queues(&self.inner);
        if let Some(sender) = queues.get(&kind) {
            if !sender.is_closed() {
                return Ok(sender.clone());
            }
        }

        let table = self.spec(kind).name;
        let handle = Handle::try_current().map_err(|_| SyncError::NoRuntime(table.to_string()))?;
        let (sender, receiver) = mpsc::channel(self.inner.options.queue_capacity.max(1));
        handle.spawn(run_worker(Arc::downgrade(&self.inner), kind, receiver));
        queues.insert(kind, sender.clone());

        tracing::debug!(table, "Started sync worker");
        Ok(sender)
    }
}

async fn run_worker(
    engine: Weak<EngineInner>,
    kind: EntityKind,
    mut receiver: mpsc::Receiver<PushJob>,
) {
    while let Some(job) = receiver.recv().await {
        let Some(inner) = engine.upgrade() else {
            break;
        };
        let result = SyncEngine { inner }.push(kind).await;

        match &result {
            Ok(report) if report.has_failures() => {
                tracing::warn!(table = %report.table, failed = report.failed.len(), "Triggered sync left records pending");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(table = %kind, error = %e, "Triggered sync failed"),
        }

        // The caller may have dropped its ticket.
        let _ = job.reply.send(result);
    }
}
