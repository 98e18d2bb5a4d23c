//! Local store: durable per-table storage keyed by record id.
//!
//! The [`LocalStore`] trait is the seam between the sync engine and the
//! embedded database. [`SqliteStore`] is the on-disk implementation and
//! [`MemoryStore`] an in-process double with the same semantics.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Conflict, Fields, Record, RecordId, SyncStatus, ID_FIELD, SYNC_STATUS_FIELD};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("table {0} is registered but missing from the local schema")]
    MissingTable(String),

    #[error("record not found: {table}/{id}")]
    NotFound { table: String, id: RecordId },

    #[error("table {0} is not part of this transaction")]
    OutOfScope(String),

    #[error("invalid field name: {0}")]
    InvalidField(String),

    #[error("corrupt row {table}/{id}: {reason}")]
    Corrupt {
        table: String,
        id: String,
        reason: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One write inside a [`LocalStore::transaction`] batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or replace the whole record.
    Put { table: String, record: Record },
    /// Write a local edit: replace the payload and mark it pending, keeping
    /// the stored version (0 for a new id).
    PutPending {
        table: String,
        id: RecordId,
        fields: Fields,
    },
    /// Shallow-merge fields into an existing record; fails if absent.
    Update {
        table: String,
        id: RecordId,
        fields: Fields,
    },
    SetStatus {
        table: String,
        id: RecordId,
        status: SyncStatus,
    },
    /// Raise the stored version to at least `version`; no-op if absent.
    RaiseVersion {
        table: String,
        id: RecordId,
        version: i64,
    },
    /// Idempotent delete.
    Delete { table: String, id: RecordId },
    /// Remove every row of the table.
    Clear { table: String },
    Tombstone { table: String, id: RecordId },
    ClearTombstone { table: String, id: RecordId },
    RecordConflict(Conflict),
    ResolveConflict { table: String, id: RecordId },
}

impl WriteOp {
    pub fn put(table: &str, record: Record) -> Self {
        WriteOp::Put {
            table: table.to_string(),
            record,
        }
    }

    pub fn delete(table: &str, id: RecordId) -> Self {
        WriteOp::Delete {
            table: table.to_string(),
            id,
        }
    }

    /// The entity table this write touches.
    pub fn table(&self) -> &str {
        match self {
            WriteOp::Put { table, .. }
            | WriteOp::PutPending { table, .. }
            | WriteOp::Update { table, .. }
            | WriteOp::SetStatus { table, .. }
            | WriteOp::RaiseVersion { table, .. }
            | WriteOp::Delete { table, .. }
            | WriteOp::Clear { table }
            | WriteOp::Tombstone { table, .. }
            | WriteOp::ClearTombstone { table, .. }
            | WriteOp::ResolveConflict { table, .. } => table,
            WriteOp::RecordConflict(conflict) => &conflict.table,
        }
    }
}

/// Checks every op against the declared table scope of a transaction.
pub(crate) fn check_scope(tables: &[&str], ops: &[WriteOp]) -> Result<(), StoreError> {
    match ops.iter().find(|op| !tables.contains(&op.table())) {
        Some(op) => Err(StoreError::OutOfScope(op.table().to_string())),
        None => Ok(()),
    }
}

/// Durable keyed table storage.
///
/// Store operations never trigger synchronization themselves.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, table: &str, id: &RecordId) -> Result<Option<Record>, StoreError>;

    /// Insert-or-replace of the whole record.
    async fn put(&self, table: &str, record: &Record) -> Result<(), StoreError> {
        self.transaction(&[table], vec![WriteOp::put(table, record.clone())])
            .await
    }

    /// Shallow field update; `NotFound` if the id is absent.
    async fn update(
        &self,
        table: &str,
        id: &RecordId,
        fields: &Fields,
    ) -> Result<Record, StoreError> {
        self.transaction(
            &[table],
            vec![WriteOp::Update {
                table: table.to_string(),
                id: id.clone(),
                fields: fields.clone(),
            }],
        )
        .await?;

        self.get(table, id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                table: table.to_string(),
                id: id.clone(),
            })
    }

    /// Idempotent delete; an absent id is not an error.
    async fn delete(&self, table: &str, id: &RecordId) -> Result<(), StoreError> {
        self.transaction(&[table], vec![WriteOp::delete(table, id.clone())])
            .await
    }

    async fn scan(&self, table: &str) -> Result<Vec<Record>, StoreError>;

    /// Records whose `field` equals `value`. `sync_status` and `id` match
    /// the bookkeeping columns; any other name matches a payload field.
    async fn query_by_field(
        &self,
        table: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError>;

    /// Applies all ops atomically while holding the write lock for `tables`.
    ///
    /// An op naming a table outside `tables` fails the whole batch.
    async fn transaction(&self, tables: &[&str], ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Flips a pushed record to `synced` with the committed remote version,
    /// but only if the stored row is still the pending payload that was
    /// pushed. Returns whether the flip happened.
    async fn mark_synced(
        &self,
        table: &str,
        pushed: &Record,
        version: i64,
    ) -> Result<bool, StoreError>;

    /// Ids deleted locally whose deletion has not reached the remote store.
    async fn tombstones(&self, table: &str) -> Result<Vec<RecordId>, StoreError>;

    async fn conflicts(&self) -> Result<Vec<Conflict>, StoreError>;

    /// Removes every row of every table, leaving an empty store.
    async fn wipe(&self) -> Result<(), StoreError>;
}

pub(crate) fn pending_value() -> Value {
    Value::String(SyncStatus::Pending.to_string())
}

/// Equality test behind [`LocalStore::query_by_field`].
pub(crate) fn record_matches(record: &Record, field: &str, value: &Value) -> bool {
    match field {
        SYNC_STATUS_FIELD => match (record.sync_status, value) {
            (Some(status), Value::String(s)) => status.as_str() == s,
            (None, Value::Null) => true,
            _ => false,
        },
        ID_FIELD => match value {
            Value::String(s) => record.id.as_str() == s,
            other => record.id.as_str() == other.to_string(),
        },
        _ => match (record.fields.get(field), value) {
            (None, Value::Null) => true,
            (Some(stored), expected) => stored == expected,
            (None, _) => false,
        },
    }
}

pub(crate) fn is_valid_field_name(field: &str) -> bool {
    !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_scope() {
        let ops = vec![
            WriteOp::Clear {
                table: "a".to_string(),
            },
            WriteOp::delete("b", RecordId::from("1")),
        ];

        assert!(check_scope(&["a", "b"], &ops).is_ok());
        assert!(matches!(
            check_scope(&["a"], &ops),
            Err(StoreError::OutOfScope(table)) if table == "b"
        ));
    }

    #[test]
    fn test_field_name_validation() {
        assert!(is_valid_field_name("nombre_proyecto"));
        assert!(!is_valid_field_name("x') OR 1=1 --"));
        assert!(!is_valid_field_name(""));
    }
}
