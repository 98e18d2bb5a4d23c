//! In-process local store for tests and ephemeral sessions.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

use super::{check_scope, is_valid_field_name, record_matches, LocalStore, StoreError, WriteOp};
use crate::models::{Conflict, Record, RecordId, SyncStatus};
use crate::registry::TableRegistry;

#[derive(Debug, Clone, Default)]
struct State {
    tables: HashMap<String, BTreeMap<RecordId, Record>>,
    tombstones: BTreeSet<(String, RecordId)>,
    conflicts: BTreeMap<(String, RecordId), Conflict>,
}

/// Local store kept entirely in memory.
///
/// Transactions run against a copy of the state that replaces the live
/// state only when every op succeeded.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Creates an empty store with one table per registry entry.
    pub fn new(registry: &TableRegistry) -> Self {
        let tables = registry
            .iter()
            .map(|spec| (spec.name.to_string(), BTreeMap::new()))
            .collect();

        Self {
            state: RwLock::new(State {
                tables,
                ..State::default()
            }),
        }
    }
}

impl State {
    fn table(&self, table: &str) -> Result<&BTreeMap<RecordId, Record>, StoreError> {
        self.tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut BTreeMap<RecordId, Record>, StoreError> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    fn apply(&mut self, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::Put { table, record } => {
                self.table_mut(&table)?.insert(record.id.clone(), record);
            }
            WriteOp::PutPending { table, id, fields } => {
                let rows = self.table_mut(&table)?;
                let version = rows.get(&id).map_or(0, |r| r.version);
                let record = Record::pending(id.clone(), fields).with_version(version);
                rows.insert(id, record);
            }
            WriteOp::Update { table, id, fields } => {
                let record = self
                    .table_mut(&table)?
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::NotFound {
                        table: table.clone(),
                        id: id.clone(),
                    })?;
                record.merge_fields(&fields);
            }
            WriteOp::SetStatus { table, id, status } => {
                let record = self
                    .table_mut(&table)?
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::NotFound {
                        table: table.clone(),
                        id: id.clone(),
                    })?;
                record.sync_status = Some(status);
            }
            WriteOp::RaiseVersion { table, id, version } => {
                if let Some(record) = self.table_mut(&table)?.get_mut(&id) {
                    record.version = record.version.max(version);
                }
            }
            WriteOp::Delete { table, id } => {
                self.table_mut(&table)?.remove(&id);
            }
            WriteOp::Clear { table } => {
                self.table_mut(&table)?.clear();
            }
            WriteOp::Tombstone { table, id } => {
                self.table(&table)?;
                self.tombstones.insert((table, id));
            }
            WriteOp::ClearTombstone { table, id } => {
                self.tombstones.remove(&(table, id));
            }
            WriteOp::RecordConflict(conflict) => {
                self.table(&conflict.table)?;
                self.conflicts
                    .insert((conflict.table.clone(), conflict.id.clone()), conflict);
            }
            WriteOp::ResolveConflict { table, id } => {
                self.conflicts.remove(&(table, id));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, table: &str, id: &RecordId) -> Result<Option<Record>, StoreError> {
        let state = self.state.read().await;
        Ok(state.table(table)?.get(id).cloned())
    }

    async fn scan(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let state = self.state.read().await;
        Ok(state.table(table)?.values().cloned().collect())
    }

    async fn query_by_field(
        &self,
        table: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError> {
        if !is_valid_field_name(field) {
            return Err(StoreError::InvalidField(field.to_string()));
        }
        let state = self.state.read().await;
        Ok(state
            .table(table)?
            .values()
            .filter(|record| record_matches(record, field, value))
            .cloned()
            .collect())
    }

    async fn transaction(&self, tables: &[&str], ops: Vec<WriteOp>) -> Result<(), StoreError> {
        check_scope(tables, &ops)?;

        let mut state = self.state.write().await;
        for table in tables {
            state.table(table)?;
        }

        let mut staged = state.clone();
        for op in ops {
            staged.apply(op)?;
        }
        *state = staged;
        Ok(())
    }

    async fn mark_synced(
        &self,
        table: &str,
        pushed: &Record,
        version: i64,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(stored) = state.table_mut(table)?.get_mut(&pushed.id) else {
            return Ok(false);
        };

        if !stored.is_pending() || stored.fields != pushed.fields {
            return Ok(false);
        }

        stored.sync_status = Some(SyncStatus::Synced);
        stored.version = version;
        Ok(true)
    }

    async fn tombstones(&self, table: &str) -> Result<Vec<RecordId>, StoreError> {
        let state = self.state.read().await;
        state.table(table)?;
        Ok(state
            .tombstones
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, id)| id.clone())
            .collect())
    }

    async fn conflicts(&self) -> Result<Vec<Conflict>, StoreError> {
        let state = self.state.read().await;
        Ok(state.conflicts.values().cloned().collect())
    }

    async fn wipe(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for rows in state.tables.values_mut() {
            rows.clear();
        }
        state.tombstones.clear();
        state.conflicts.clear();
        Ok(())
    }
}
