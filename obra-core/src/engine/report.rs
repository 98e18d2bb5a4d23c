use std::fmt;

use crate::models::{Conflict, ConflictKind, RecordId};
use crate::registry::{EntityKind, PullPolicy};

/// What applying one remote row or change event did to the local table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted,
    Updated,
    /// A pending local edit already matched the remote row.
    Converged,
    Unchanged,
    /// The remote row is older than what the local store has seen.
    Stale,
    /// The remote row predates a pending local edit.
    KeptLocal,
    /// The id has an unpushed local deletion.
    Tombstoned,
    Deleted,
    Conflicted {
        kind: ConflictKind,
        remote_applied: bool,
    },
    /// The event did not concern a registered table or carried no row.
    Ignored,
}

impl ApplyOutcome {
    /// Whether the local table changed.
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            ApplyOutcome::Inserted
                | ApplyOutcome::Updated
                | ApplyOutcome::Converged
                | ApplyOutcome::Deleted
                | ApplyOutcome::Conflicted { .. }
        )
    }
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyOutcome::Inserted => write!(f, "inserted"),
            ApplyOutcome::Updated => write!(f, "updated"),
            ApplyOutcome::Converged => write!(f, "converged"),
            ApplyOutcome::Unchanged => write!(f, "unchanged"),
            ApplyOutcome::Stale => write!(f, "stale"),
            ApplyOutcome::KeptLocal => write!(f, "kept local"),
            ApplyOutcome::Tombstoned => write!(f, "tombstoned"),
            ApplyOutcome::Deleted => write!(f, "deleted"),
            ApplyOutcome::Conflicted {
                kind,
                remote_applied,
            } => {
                let winner = if *remote_applied { "remote" } else { "local" };
                write!(f, "conflict ({}, {} kept)", kind, winner)
            }
            ApplyOutcome::Ignored => write!(f, "ignored"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFailure {
    pub id: RecordId,
    pub error: String,
    /// The remote store refused the row; retrying unchanged will not help.
    pub rejected: bool,
}

/// Outcome of one push cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub table: String,
    pub pushed: Vec<RecordId>,
    /// Tombstones propagated as remote deletes.
    pub deleted: Vec<RecordId>,
    /// Upserted, but edited again locally while in flight; still pending.
    pub modified_in_flight: Vec<RecordId>,
    pub failed: Vec<PushFailure>,
}

impl PushReport {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.pushed.is_empty()
            && self.deleted.is_empty()
            && self.modified_in_flight.is_empty()
            && self.failed.is_empty()
    }
}

impl fmt::Display for PushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} pushed, {} deleted",
            self.table,
            self.pushed.len(),
            self.deleted.len()
        )?;
        if !self.modified_in_flight.is_empty() {
            write!(f, ", {} edited during push", self.modified_in_flight.len())?;
        }
        if !self.failed.is_empty() {
            write!(f, ", {} failed", self.failed.len())?;
        }
        Ok(())
    }
}

/// Outcome of one pull cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PullReport {
    pub table: String,
    pub policy: PullPolicy,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub converged: usize,
    pub unchanged: usize,
    pub stale: usize,
    pub kept_local: usize,
    pub tombstoned: usize,
    /// Local rows dropped by a replace pull.
    pub removed: usize,
    /// Remote rows that could not be read as records.
    pub invalid: usize,
    pub conflicts: Vec<Conflict>,
}

impl PullReport {
    pub fn new(table: impl Into<String>, policy: PullPolicy) -> Self {
        Self {
            table: table.into(),
            policy,
            fetched: 0,
            inserted: 0,
            updated: 0,
            converged: 0,
            unchanged: 0,
            stale: 0,
            kept_local: 0,
            tombstoned: 0,
            removed: 0,
            invalid: 0,
            conflicts: Vec::new(),
        }
    }

    pub(crate) fn count(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Inserted => self.inserted += 1,
            ApplyOutcome::Updated => self.updated += 1,
            ApplyOutcome::Converged => self.converged += 1,
            ApplyOutcome::Unchanged => self.unchanged += 1,
            ApplyOutcome::Stale => self.stale += 1,
            ApplyOutcome::KeptLocal => self.kept_local += 1,
            ApplyOutcome::Tombstoned => self.tombstoned += 1,
            ApplyOutcome::Deleted => self.removed += 1,
            // Conflicts are collected with their payloads.
            ApplyOutcome::Conflicted { .. } | ApplyOutcome::Ignored => {}
        }
    }

    /// Whether the pull changed the local table.
    pub fn changed(&self) -> bool {
        self.inserted + self.updated + self.converged + self.removed > 0
            || !self.conflicts.is_empty()
    }
}

impl fmt::Display for PullReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} fetched, {} inserted, {} updated, {} unchanged",
            self.table, self.policy, self.fetched, self.inserted, self.updated, self.unchanged
        )?;
        if self.removed > 0 {
            write!(f, ", {} removed", self.removed)?;
        }
        if self.kept_local > 0 {
            write!(f, ", {} local edits kept", self.kept_local)?;
        }
        if !self.conflicts.is_empty() {
            write!(f, ", {} conflicts", self.conflicts.len())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

/// Combined outcome of a multi-table operation that logs and continues.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub pushes: Vec<PushReport>,
    pub pulls: Vec<PullReport>,
    pub failures: Vec<TableFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.pushes.iter().all(|p| !p.has_failures())
    }

    pub(crate) fn fail(&mut self, table: &str, error: impl fmt::Display) {
        self.failures.push(TableFailure {
            table: table.to_string(),
            error: error.to_string(),
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    /// Remote tables emptied, in registry order.
    pub cleared: Vec<String>,
    pub failed: Vec<TableFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCount {
    pub kind: EntityKind,
    pub table: &'static str,
    pub pending: usize,
    pub tombstones: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_report_changed() {
        let mut report = PullReport::new("tareas", PullPolicy::Merge);
        report.count(ApplyOutcome::Unchanged);
        report.count(ApplyOutcome::Stale);
        assert!(!report.changed());

        report.count(ApplyOutcome::Inserted);
        assert!(report.changed());
        assert_eq!(report.inserted, 1);
    }

    #[test]
    fn test_push_report_display() {
        let mut report = PushReport::new("proyectos");
        report.pushed.push(RecordId::from("p1"));
        report.failed.push(PushFailure {
            id: RecordId::from("p2"),
            error: "boom".to_string(),
            rejected: false,
        });

        assert_eq!(report.to_string(), "proyectos: 1 pushed, 0 deleted, 1 failed");
    }
}
