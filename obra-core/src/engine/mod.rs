//! Sync engine.
//!
//! Keeps the local store and the remote store eventually consistent:
//!
//! - push cycles upsert `pending` records and propagate tombstones,
//! - pull cycles fold remote snapshots into local tables (merge or replace),
//! - change-feed events are reconciled one by one as they arrive.
//!
//! Push, pull and event application for one table are serialized by that
//! table's lock; different tables proceed independently.

mod queue;
mod realtime;
mod reconcile;
mod report;

pub use queue::SyncTicket;
pub use realtime::RealtimeHandle;
pub use report::{
    ApplyOutcome, BatchReport, PendingCount, PullReport, PushFailure, PushReport, ResetReport,
    TableFailure,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, MutexGuard};

use crate::error::SyncError;
use crate::models::{
    Conflict, Entity, Fields, Record, RecordId, ID_FIELD, SYNC_STATUS_FIELD, VERSION_FIELD,
};
use crate::records::Records;
use crate::registry::{EntityKind, PullPolicy, TableRegistry, TableSpec};
use crate::remote::{ChangeEvent, ChangeType, Predicate, RemoteStore};
use crate::store::{pending_value, LocalStore, WriteOp};
use reconcile::{reconcile_delete, reconcile_row, reconcile_snapshot_row};

/// What reconciliation does when a remote row diverges from a pending
/// local edit. The conflict is recorded either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// The local edit stays `pending` and wins on the next push.
    #[default]
    KeepLocal,
    /// The remote row is applied as `synced`.
    PreferRemote,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::KeepLocal => write!(f, "keep-local"),
            ConflictPolicy::PreferRemote => write!(f, "prefer-remote"),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep-local" => Ok(ConflictPolicy::KeepLocal),
            "prefer-remote" => Ok(ConflictPolicy::PreferRemote),
            _ => Err(format!(
                "Invalid conflict policy '{}'. Valid options: keep-local, prefer-remote",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub conflict_policy: ConflictPolicy,
    /// Pushes that may wait per table behind the running one.
    pub queue_capacity: usize,
    /// Pause before reconnecting a dropped change feed.
    pub reconnect_delay: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::KeepLocal,
            queue_capacity: 8,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

pub(crate) struct EngineInner {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    registry: Arc<TableRegistry>,
    records: Records,
    options: EngineOptions,
    locks: HashMap<EntityKind, Mutex<()>>,
    queues: StdMutex<HashMap<EntityKind, mpsc::Sender<queue::PushJob>>>,
}

/// Handle to the sync engine. Cheap to clone; clones share queues and locks.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        registry: Arc<TableRegistry>,
        options: EngineOptions,
    ) -> Self {
        let locks = registry
            .iter()
            .map(|spec| (spec.kind, Mutex::new(())))
            .collect();
        let records = Records::new(local.clone(), registry.clone());

        Self {
            inner: Arc::new(EngineInner {
                local,
                remote,
                registry,
                records,
                options,
                locks,
                queues: StdMutex::new(HashMap::new()),
            }),
        }
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.inner.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    /// The status-tracking write layer over the same local store.
    pub fn records(&self) -> &Records {
        &self.inner.records
    }

    fn spec(&self, kind: EntityKind) -> TableSpec {
        *self.inner.registry.spec(kind)
    }

    async fn lock(&self, kind: EntityKind) -> MutexGuard<'_, ()> {
        // Every registered kind has a lock.
        self.inner.locks[&kind].lock().await
    }

    /// Pushes every `pending` record of the table and propagates its
    /// tombstones. Records that fail stay `pending` for the next trigger.
    pub async fn push(&self, kind: EntityKind) -> Result<PushReport, SyncError> {
        let spec = self.spec(kind);
        let table = spec.name;
        let mut report = PushReport::new(table);
        if !spec.tracks_status {
            return Ok(report);
        }

        let _guard = self.lock(kind).await;
        let local = &self.inner.local;
        let pending = local
            .query_by_field(table, SYNC_STATUS_FIELD, &pending_value())
            .await?;
        let tombstones = local.tombstones(table).await?;

        if pending.is_empty() && tombstones.is_empty() {
            tracing::debug!(table, "Nothing to push");
            return Ok(report);
        }

        for record in pending {
            let row = match record.to_row(spec.key_kind, record.version + 1) {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(table, id = %record.id, error = %e, "Cannot encode record for push");
                    report.failed.push(PushFailure {
                        id: record.id.clone(),
                        error: e.to_string(),
                        rejected: true,
                    });
                    continue;
                }
            };

            match self.inner.remote.upsert(table, vec![row]).await {
                Ok(committed) => {
                    let version = committed
                        .first()
                        .and_then(|row| row.get(VERSION_FIELD))
                        .and_then(Value::as_i64)
                        .unwrap_or(record.version + 1);

                    if local.mark_synced(table, &record, version).await? {
                        local
                            .transaction(
                                &[table],
                                vec![WriteOp::ResolveConflict {
                                    table: table.to_string(),
                                    id: record.id.clone(),
                                }],
                            )
                            .await?;
                        report.pushed.push(record.id);
                    } else {
                        // The remote now holds `version`; the newer local edit
                        // builds on it.
                        local
                            .transaction(
                                &[table],
                                vec![WriteOp::RaiseVersion {
                                    table: table.to_string(),
                                    id: record.id.clone(),
                                    version,
                                }],
                            )
                            .await?;
                        tracing::debug!(table, id = %record.id, version, "Record changed during push; left pending");
                        report.modified_in_flight.push(record.id);
                    }
                }
                Err(e) => {
                    tracing::warn!(table, id = %record.id, error = %e, "Push failed; record stays pending");
                    report.failed.push(PushFailure {
                        id: record.id,
                        rejected: e.is_rejection(),
                        error: e.to_string(),
                    });
                }
            }
        }

        for id in tombstones {
            match self
                .inner
                .remote
                .delete_where(table, &Predicate::IdEq(id.clone()))
                .await
            {
                Ok(()) => {
                    local
                        .transaction(
                            &[table],
                            vec![WriteOp::ClearTombstone {
                                table: table.to_string(),
                                id: id.clone(),
                            }],
                        )
                        .await?;
                    report.deleted.push(id);
                }
                Err(e) => {
                    tracing::warn!(table, id = %id, error = %e, "Remote delete failed; tombstone kept");
                    report.failed.push(PushFailure {
                        id,
                        rejected: e.is_rejection(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            table,
            pushed = report.pushed.len(),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Push finished"
        );
        Ok(report)
    }

    /// Pulls the table with its registered policy.
    pub async fn pull(&self, kind: EntityKind) -> Result<PullReport, SyncError> {
        let policy = self.spec(kind).pull_policy;
        self.pull_with(kind, policy).await
    }

    /// Pulls the table with an explicit policy. A remote failure leaves the
    /// local table untouched; all local writes land in one transaction.
    pub async fn pull_with(
        &self,
        kind: EntityKind,
        policy: PullPolicy,
    ) -> Result<PullReport, SyncError> {
        let table = self.spec(kind).name;
        let mut report = PullReport::new(table, policy);

        let _guard = self.lock(kind).await;
        let rows = self.inner.remote.select_all(table).await?;
        report.fetched = rows.len();

        let mut remote_records = Vec::with_capacity(rows.len());
        for row in rows {
            match Record::from_row(row) {
                Ok(record) => remote_records.push(record),
                Err(e) => {
                    tracing::warn!(table, error = %e, "Skipping unreadable remote row");
                    report.invalid += 1;
                }
            }
        }

        let local = &self.inner.local;
        let mut local_rows: HashMap<RecordId, Record> = local
            .scan(table)
            .await?
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        let tombstones: HashSet<RecordId> = local.tombstones(table).await?.into_iter().collect();
        let conflict_policy = self.inner.options.conflict_policy;

        let mut ops = Vec::new();
        match policy {
            PullPolicy::Merge => {
                for remote in remote_records {
                    let tombstoned = tombstones.contains(&remote.id);
                    let decision = reconcile_row(
                        table,
                        policy,
                        conflict_policy,
                        local_rows.get(&remote.id),
                        tombstoned,
                        remote,
                    );
                    report.count(decision.outcome);
                    if let Some(conflict) = &decision.conflict {
                        report.conflicts.push(conflict.clone());
                    }
                    ops.extend(decision.into_ops(table));
                }
            }
            PullPolicy::Replace => {
                // Build the final contents aside, then swap them in at once.
                let mut staged = Vec::with_capacity(remote_records.len());
                let mut conflicts = Vec::new();

                for remote in remote_records {
                    let tombstoned = tombstones.contains(&remote.id);
                    let existing = local_rows.remove(&remote.id);
                    let decision = reconcile_snapshot_row(
                        table,
                        conflict_policy,
                        existing.as_ref(),
                        tombstoned,
                        remote,
                    );
                    report.count(decision.outcome);
                    if let Some(conflict) = decision.conflict {
                        report.conflicts.push(conflict.clone());
                        conflicts.push(WriteOp::RecordConflict(conflict));
                    }
                    if let Some(record) = decision.write.or(existing) {
                        staged.push(record);
                    }
                }

                // Local rows the remote store no longer has; unpushed edits survive.
                for (_, record) in local_rows.drain() {
                    if record.is_pending() {
                        report.kept_local += 1;
                        staged.push(record);
                    } else {
                        report.removed += 1;
                    }
                }

                ops.push(WriteOp::Clear {
                    table: table.to_string(),
                });
                ops.extend(staged.into_iter().map(|record| WriteOp::put(table, record)));
                ops.extend(conflicts);
            }
        }

        if !ops.is_empty() {
            local.transaction(&[table], ops).await?;
        }

        for conflict in &report.conflicts {
            tracing::warn!(table, id = %conflict.id, "Remote row diverged from a pending local edit");
        }
        tracing::info!(
            table,
            policy = %policy,
            fetched = report.fetched,
            inserted = report.inserted,
            updated = report.updated,
            removed = report.removed,
            "Pull finished"
        );
        Ok(report)
    }

    /// Applies one change-feed event. Events for unknown tables are ignored.
    pub async fn apply_event(&self, event: &ChangeEvent) -> Result<ApplyOutcome, SyncError> {
        let spec = match self.inner.registry.resolve(&event.table) {
            Ok(spec) => *spec,
            Err(_) => {
                tracing::warn!(table = %event.table, "Ignoring change for unknown table");
                return Ok(ApplyOutcome::Ignored);
            }
        };
        let table = spec.name;

        let _guard = self.lock(spec.kind).await;
        let local = &self.inner.local;

        let (outcome, ops) = match event.event_type {
            ChangeType::Insert | ChangeType::Update => {
                let Some(row) = event.new.clone() else {
                    tracing::warn!(table, event = %event.event_type, "Change event without a row");
                    return Ok(ApplyOutcome::Ignored);
                };
                let remote = Record::from_row(row)?;
                let existing = local.get(table, &remote.id).await?;
                let tombstoned = local.tombstones(table).await?.contains(&remote.id);

                let decision = reconcile_row(
                    table,
                    spec.pull_policy,
                    self.inner.options.conflict_policy,
                    existing.as_ref(),
                    tombstoned,
                    remote,
                );
                (decision.outcome, decision.into_ops(table))
            }
            ChangeType::Delete => {
                let Some(id_value) = event
                    .old
                    .as_ref()
                    .or(event.new.as_ref())
                    .and_then(|row| row.get(ID_FIELD))
                else {
                    tracing::warn!(table, "Delete event without an id");
                    return Ok(ApplyOutcome::Ignored);
                };
                let id = RecordId::from_value(id_value)?;
                let existing = local.get(table, &id).await?;
                let tombstoned = local.tombstones(table).await?.contains(&id);

                reconcile_delete(table, &id, existing.as_ref(), tombstoned)
            }
        };

        if !ops.is_empty() {
            local.transaction(&[table], ops).await?;
        }
        tracing::debug!(table, event = %event.event_type, outcome = %outcome, "Applied change");
        Ok(outcome)
    }

    /// Pushes tasks, finance entries, payables, receivables, folder items
    /// and creative artifacts. Failures are logged and the rest continue.
    pub async fn push_execution_data(&self) -> BatchReport {
        let mut batch = BatchReport::default();
        for kind in EntityKind::EXECUTION {
            self.push_into(kind, &mut batch).await;
        }
        batch
    }

    /// Replace-policy pull of the inventory and tool tables.
    pub async fn pull_reference_data(&self) -> BatchReport {
        let mut batch = BatchReport::default();
        for kind in EntityKind::REFERENCE {
            self.pull_into(kind, Some(PullPolicy::Replace), &mut batch)
                .await;
        }
        batch
    }

    /// Pushes then merge-pulls the project table.
    pub async fn sync_projects(&self) -> BatchReport {
        let mut batch = BatchReport::default();
        self.push_into(EntityKind::Project, &mut batch).await;
        self.pull_into(EntityKind::Project, Some(PullPolicy::Merge), &mut batch)
            .await;
        batch
    }

    /// Pushes every status table, then pulls every table.
    pub async fn sync_all(&self) -> BatchReport {
        let mut batch = BatchReport::default();
        let registry = self.inner.registry.clone();

        for spec in registry.status_tables() {
            self.push_into(spec.kind, &mut batch).await;
        }
        for spec in registry.iter() {
            self.pull_into(spec.kind, None, &mut batch).await;
        }
        batch
    }

    async fn push_into(&self, kind: EntityKind, batch: &mut BatchReport) {
        match self.push(kind).await {
            Ok(report) => batch.pushes.push(report),
            Err(e) => {
                let table = self.spec(kind).name;
                tracing::warn!(table, error = %e, "Push failed");
                batch.fail(table, e);
            }
        }
    }

    async fn pull_into(
        &self,
        kind: EntityKind,
        policy: Option<PullPolicy>,
        batch: &mut BatchReport,
    ) {
        let policy = policy.unwrap_or(self.spec(kind).pull_policy);
        match self.pull_with(kind, policy).await {
            Ok(report) => batch.pulls.push(report),
            Err(e) => {
                let table = self.spec(kind).name;
                tracing::warn!(table, error = %e, "Pull failed");
                batch.fail(table, e);
            }
        }
    }

    /// Deletes every row of every registered remote table, then wipes the
    /// local store. Remote tables that fail are reported and skipped.
    pub async fn reset_all(&self) -> Result<ResetReport, SyncError> {
        let registry = self.inner.registry.clone();
        let mut guards = Vec::with_capacity(self.inner.locks.len());
        for spec in registry.iter() {
            guards.push(self.lock(spec.kind).await);
        }

        let mut report = ResetReport::default();
        for spec in registry.iter() {
            match self
                .inner
                .remote
                .delete_where(spec.name, &Predicate::AllRows(spec.key_kind))
                .await
            {
                Ok(()) => report.cleared.push(spec.name.to_string()),
                Err(e) => {
                    tracing::warn!(table = spec.name, error = %e, "Remote reset failed; skipping table");
                    report.failed.push(TableFailure {
                        table: spec.name.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.inner.local.wipe().await?;
        tracing::info!(
            cleared = report.cleared.len(),
            failed = report.failed.len(),
            "Reset finished"
        );
        Ok(report)
    }

    pub async fn conflicts(&self) -> Result<Vec<Conflict>, SyncError> {
        Ok(self.inner.local.conflicts().await?)
    }

    /// Forgets a recorded conflict without touching the record.
    pub async fn dismiss_conflict(&self, kind: EntityKind, id: &RecordId) -> Result<(), SyncError> {
        let table = self.spec(kind).name;
        self.inner
            .local
            .transaction(
                &[table],
                vec![WriteOp::ResolveConflict {
                    table: table.to_string(),
                    id: id.clone(),
                }],
            )
            .await?;
        Ok(())
    }

    /// Pending records and tombstones per status table.
    pub async fn pending_counts(&self) -> Result<Vec<PendingCount>, SyncError> {
        let mut counts = Vec::new();
        for spec in self.inner.registry.status_tables() {
            let pending = self
                .inner
                .local
                .query_by_field(spec.name, SYNC_STATUS_FIELD, &pending_value())
                .await?
                .len();
            let tombstones = self.inner.local.tombstones(spec.name).await?.len();
            counts.push(PendingCount {
                kind: spec.kind,
                table: spec.name,
                pending,
                tombstones,
            });
        }
        Ok(counts)
    }

    /// Saves an entity as `pending` and schedules a push of its table.
    pub async fn save<E: Entity>(&self, entity: &E) -> Result<(Record, SyncTicket), SyncError> {
        let record = self.inner.records.save_entity(entity).await?;
        Ok((record, self.trigger_sync(E::KIND)))
    }

    /// Edits a record as `pending` and schedules a push of its table.
    pub async fn edit(
        &self,
        kind: EntityKind,
        id: &RecordId,
        fields: Fields,
    ) -> Result<(Record, SyncTicket), SyncError> {
        let record = self.inner.records.edit(kind, id, fields).await?;
        Ok((record, self.trigger_sync(kind)))
    }

    /// Deletes a record and schedules a push of the tombstone. Returns
    /// `None` when there was nothing to delete.
    pub async fn remove(
        &self,
        kind: EntityKind,
        id: &RecordId,
    ) -> Result<Option<SyncTicket>, SyncError> {
        if self.inner.records.remove(kind, id).await? {
            Ok(Some(self.trigger_sync(kind)))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests;
