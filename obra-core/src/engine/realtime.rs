//! Long-lived change-feed subscription.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::SyncEngine;
use crate::registry::{EntityKind, PullPolicy};
use crate::remote::{ChangeMatcher, ChangeStream};

type OnChange = Arc<dyn Fn(EntityKind) + Send + Sync>;

/// Running change-feed subscription.
///
/// The subscription keeps running until [`RealtimeHandle::unsubscribe`] is
/// called, even if the handle itself is dropped.
pub struct RealtimeHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RealtimeHandle {
    /// Stops the subscription and waits until no further callback can run.
    pub async fn unsubscribe(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Change feed task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Resolves once shutdown is requested. A dropped sender never resolves it.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl SyncEngine {
    /// Subscribes to the change feed of every registered table, applies each
    /// event and then calls `on_change` with the event's entity kind.
    ///
    /// When the feed ends or fails the subscription reconnects after the
    /// configured delay and runs a merge pull of every merge-policy table to
    /// catch up on what it missed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn init_realtime<F>(&self, on_change: F) -> RealtimeHandle
    where
        F: Fn(EntityKind) + Send + Sync + 'static,
    {
        let (shutdown, receiver) = watch::channel(false);
        let task = tokio::spawn(run_feed(self.clone(), Arc::new(on_change), receiver));
        RealtimeHandle { shutdown, task }
    }

    async fn catch_up(&self, on_change: &OnChange) {
        let merge_tables: Vec<EntityKind> = self
            .registry()
            .iter()
            .filter(|spec| spec.pull_policy == PullPolicy::Merge)
            .map(|spec| spec.kind)
            .collect();

        for kind in merge_tables {
            match self.pull(kind).await {
                Ok(report) if report.changed() => on_change(kind),
                Ok(_) => {}
                Err(e) => tracing::warn!(table = %kind, error = %e, "Catch-up pull failed"),
            }
        }
    }

    async fn drain(
        &self,
        mut stream: ChangeStream,
        on_change: &OnChange,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        loop {
            let next = tokio::select! {
                _ = shutdown_requested(shutdown) => return true,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    let kind = match self.registry().resolve(&event.table) {
                        Ok(spec) => spec.kind,
                        Err(_) => {
                            tracing::warn!(table = %event.table, "Ignoring change for unknown table");
                            continue;
                        }
                    };
                    match self.apply_event(&event).await {
                        Ok(_) => on_change(kind),
                        Err(e) => {
                            tracing::warn!(table = %event.table, error = %e, "Could not apply change")
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Change feed failed");
                    return false;
                }
                None => {
                    tracing::info!("Change feed closed");
                    return false;
                }
            }
        }
    }
}

async fn run_feed(engine: SyncEngine, on_change: OnChange, mut shutdown: watch::Receiver<bool>) {
    let matcher = ChangeMatcher::tables(engine.registry().names());
    let delay = engine.options().reconnect_delay;
    let mut reconnecting = false;

    loop {
        let connected = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            result = engine.inner.remote.subscribe_changes(&matcher) => result,
        };

        match connected {
            Ok(stream) => {
                tracing::info!(reconnect = reconnecting, "Change feed connected");
                if reconnecting {
                    engine.catch_up(&on_change).await;
                }
                if engine.drain(stream, &on_change, &mut shutdown).await {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not connect to change feed"),
        }

        reconnecting = true;
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!("Change feed subscription stopped");
}
