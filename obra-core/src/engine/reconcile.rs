//! Folding one remote row into the local table.
//!
//! Pure decisions shared by pull cycles and change-feed events. A decision
//! never reads or writes the store; callers turn it into write ops.

use super::report::ApplyOutcome;
use super::ConflictPolicy;
use crate::models::{Conflict, ConflictKind, Fields, Record, RecordId, SyncStatus};
use crate::registry::PullPolicy;
use crate::store::WriteOp;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Decision {
    pub outcome: ApplyOutcome,
    /// Replacement for the local row, if it changes.
    pub write: Option<Record>,
    pub conflict: Option<Conflict>,
}

impl Decision {
    fn keep(outcome: ApplyOutcome) -> Self {
        Self {
            outcome,
            write: None,
            conflict: None,
        }
    }

    fn write(outcome: ApplyOutcome, record: Record) -> Self {
        Self {
            outcome,
            write: Some(record),
            conflict: None,
        }
    }

    pub fn into_ops(self, table: &str) -> Vec<WriteOp> {
        let mut ops = Vec::with_capacity(2);
        if let Some(record) = self.write {
            ops.push(WriteOp::put(table, record));
        }
        if let Some(conflict) = self.conflict {
            ops.push(WriteOp::RecordConflict(conflict));
        }
        ops
    }
}

fn candidate_fields(policy: PullPolicy, local: &Record, remote: &Record) -> Fields {
    match policy {
        PullPolicy::Merge => {
            let mut merged = local.clone();
            merged.merge_fields(&remote.fields);
            merged.fields
        }
        PullPolicy::Replace => remote.fields.clone(),
    }
}

fn synced(id: RecordId, fields: Fields, version: i64) -> Record {
    Record::new(id, fields)
        .with_status(SyncStatus::Synced)
        .with_version(version)
}

/// Reconciles one row of a replace snapshot.
///
/// The snapshot is the authoritative row set, so it overwrites a synced
/// local row even when that row carries a higher version (the remote table
/// was reset). Pending rows and tombstones go through [`reconcile_row`].
pub(crate) fn reconcile_snapshot_row(
    table: &str,
    conflict_policy: ConflictPolicy,
    local: Option<&Record>,
    tombstoned: bool,
    remote: Record,
) -> Decision {
    if let Some(local) = local {
        if !tombstoned && !local.is_pending() && remote.version < local.version {
            let version = remote.version;
            return Decision::write(
                ApplyOutcome::Updated,
                synced(remote.id, remote.fields, version),
            );
        }
    }
    reconcile_row(
        table,
        PullPolicy::Replace,
        conflict_policy,
        local,
        tombstoned,
        remote,
    )
}

/// Decides how remote row `remote` lands on top of `local`.
///
/// `remote` comes from [`Record::from_row`], so it carries the remote
/// version and no status.
pub(crate) fn reconcile_row(
    table: &str,
    policy: PullPolicy,
    conflict_policy: ConflictPolicy,
    local: Option<&Record>,
    tombstoned: bool,
    remote: Record,
) -> Decision {
    if tombstoned {
        return Decision::keep(ApplyOutcome::Tombstoned);
    }

    let Some(local) = local else {
        let version = remote.version;
        return Decision::write(
            ApplyOutcome::Inserted,
            synced(remote.id, remote.fields, version),
        );
    };

    let candidate = candidate_fields(policy, local, &remote);

    if !local.is_pending() {
        if remote.version < local.version {
            return Decision::keep(ApplyOutcome::Stale);
        }
        if candidate == local.fields
            && remote.version == local.version
            && local.sync_status == Some(SyncStatus::Synced)
        {
            return Decision::keep(ApplyOutcome::Unchanged);
        }
        return Decision::write(
            ApplyOutcome::Updated,
            synced(remote.id, candidate, remote.version),
        );
    }

    if candidate == local.fields {
        return Decision::write(
            ApplyOutcome::Converged,
            synced(remote.id, candidate, remote.version.max(local.version)),
        );
    }

    if local.version > 0 && remote.version <= local.version {
        return Decision::keep(ApplyOutcome::KeptLocal);
    }

    let conflict = Conflict::diverged(
        table,
        remote.id.clone(),
        local.fields.clone(),
        remote.fields.clone(),
        remote.version,
    );

    match conflict_policy {
        ConflictPolicy::KeepLocal => Decision {
            outcome: ApplyOutcome::Conflicted {
                kind: ConflictKind::Diverged,
                remote_applied: false,
            },
            // Rebase the pending edit on the remote version so the next push
            // advances past it and the same row is not reported twice.
            write: Some(local.clone().with_version(remote.version)),
            conflict: Some(conflict),
        },
        ConflictPolicy::PreferRemote => Decision {
            outcome: ApplyOutcome::Conflicted {
                kind: ConflictKind::Diverged,
                remote_applied: true,
            },
            write: Some(synced(remote.id, candidate, remote.version)),
            conflict: Some(conflict),
        },
    }
}

/// Decides how a remote delete of `id` lands locally. The local row is
/// removed even when it has a pending edit.
pub(crate) fn reconcile_delete(
    table: &str,
    id: &RecordId,
    local: Option<&Record>,
    tombstoned: bool,
) -> (ApplyOutcome, Vec<WriteOp>) {
    let mut ops = Vec::with_capacity(3);
    if tombstoned {
        ops.push(WriteOp::ClearTombstone {
            table: table.to_string(),
            id: id.clone(),
        });
    }

    let outcome = match local {
        None if tombstoned => ApplyOutcome::Deleted,
        None => ApplyOutcome::Unchanged,
        Some(local) => {
            ops.push(WriteOp::delete(table, id.clone()));
            if local.is_pending() {
                ops.push(WriteOp::RecordConflict(Conflict::deleted_while_pending(
                    table,
                    id.clone(),
                    local.fields.clone(),
                )));
                ApplyOutcome::Conflicted {
                    kind: ConflictKind::DeletedWhilePending,
                    remote_applied: true,
                }
            } else {
                ApplyOutcome::Deleted
            }
        }
    };

    (outcome, ops)
}
