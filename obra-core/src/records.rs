//! Status-tracking write layer.
//!
//! Every local mutation made on behalf of the user goes through [`Records`],
//! which stamps the written row `pending` and records tombstones for
//! deletions. It never talks to the remote store; the sync engine pushes
//! what it leaves behind.

use serde_json::Value;
use std::sync::Arc;

use crate::error::SyncError;
use crate::models::{Entity, Fields, Record, RecordId, SyncStatus, SYNC_STATUS_FIELD};
use crate::registry::{EntityKind, TableRegistry, TableSpec};
use crate::store::{pending_value, LocalStore, StoreError, WriteOp};

#[derive(Clone)]
pub struct Records {
    store: Arc<dyn LocalStore>,
    registry: Arc<TableRegistry>,
}

impl Records {
    pub fn new(store: Arc<dyn LocalStore>, registry: Arc<TableRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    fn writable(&self, kind: EntityKind) -> Result<&TableSpec, SyncError> {
        let spec = self.registry.spec(kind);
        if spec.tracks_status {
            Ok(spec)
        } else {
            Err(SyncError::ReadOnlyTable(spec.name.to_string()))
        }
    }

    /// Inserts or replaces a record and stamps it `pending`.
    ///
    /// The last remote version seen for the id is kept so the next push
    /// advances it.
    pub async fn save(
        &self,
        kind: EntityKind,
        id: RecordId,
        fields: Fields,
    ) -> Result<Record, SyncError> {
        let table = self.writable(kind)?.name;
        self.store
            .transaction(
                &[table],
                vec![
                    WriteOp::PutPending {
                        table: table.to_string(),
                        id: id.clone(),
                        fields,
                    },
                    WriteOp::ClearTombstone {
                        table: table.to_string(),
                        id: id.clone(),
                    },
                ],
            )
            .await?;

        tracing::debug!(table, id = %id, "Saved record as pending");
        self.store.get(table, &id).await?.ok_or_else(|| {
            SyncError::from(StoreError::NotFound {
                table: table.to_string(),
                id,
            })
        })
    }

    pub async fn save_entity<E: Entity>(&self, entity: &E) -> Result<Record, SyncError> {
        self.save(E::KIND, entity.record_id(), entity.to_fields()?)
            .await
    }

    /// Shallow-merges `fields` into an existing record and stamps it
    /// `pending`. Fails with `NotFound` if the record does not exist.
    pub async fn edit(
        &self,
        kind: EntityKind,
        id: &RecordId,
        mut fields: Fields,
    ) -> Result<Record, SyncError> {
        let table = self.writable(kind)?.name;
        fields.remove(SYNC_STATUS_FIELD);

        self.store
            .transaction(
                &[table],
                vec![
                    WriteOp::Update {
                        table: table.to_string(),
                        id: id.clone(),
                        fields,
                    },
                    WriteOp::SetStatus {
                        table: table.to_string(),
                        id: id.clone(),
                        status: SyncStatus::Pending,
                    },
                ],
            )
            .await?;

        tracing::debug!(table, id = %id, "Edited record");
        self.store
            .get(table, id)
            .await?
            .ok_or_else(|| {
                SyncError::from(StoreError::NotFound {
                    table: table.to_string(),
                    id: id.clone(),
                })
            })
    }

    /// Deletes a record and leaves a tombstone for the next push.
    /// Returns whether a record was deleted.
    pub async fn remove(&self, kind: EntityKind, id: &RecordId) -> Result<bool, SyncError> {
        let table = self.writable(kind)?.name;
        if self.store.get(table, id).await?.is_none() {
            return Ok(false);
        }

        self.store
            .transaction(
                &[table],
                vec![
                    WriteOp::delete(table, id.clone()),
                    WriteOp::Tombstone {
                        table: table.to_string(),
                        id: id.clone(),
                    },
                    WriteOp::ResolveConflict {
                        table: table.to_string(),
                        id: id.clone(),
                    },
                ],
            )
            .await?;

        tracing::debug!(table, id = %id, "Removed record");
        Ok(true)
    }

    pub async fn get(&self, kind: EntityKind, id: &RecordId) -> Result<Option<Record>, SyncError> {
        Ok(self.store.get(self.registry.spec(kind).name, id).await?)
    }

    pub async fn list(&self, kind: EntityKind) -> Result<Vec<Record>, SyncError> {
        Ok(self.store.scan(self.registry.spec(kind).name).await?)
    }

    pub async fn load<E: Entity>(&self, id: &RecordId) -> Result<Option<E>, SyncError> {
        match self.get(E::KIND, id).await? {
            Some(record) => Ok(Some(E::from_record(&record)?)),
            None => Ok(None),
        }
    }

    pub async fn list_entities<E: Entity>(&self) -> Result<Vec<E>, SyncError> {
        self.list(E::KIND)
            .await?
            .iter()
            .map(|record| E::from_record(record).map_err(SyncError::from))
            .collect()
    }

    /// Records still waiting for a successful push.
    pub async fn pending(&self, kind: EntityKind) -> Result<Vec<Record>, SyncError> {
        let table = self.registry.spec(kind).name;
        Ok(self
            .store
            .query_by_field(table, SYNC_STATUS_FIELD, &pending_value())
            .await?)
    }

    pub async fn find(
        &self,
        kind: EntityKind,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Record>, SyncError> {
        let table = self.registry.spec(kind).name;
        Ok(self.store.query_by_field(table, field, value).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{fields_from_value, InventoryItem, Project, Task};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn records() -> Records {
        let registry = Arc::new(TableRegistry::standard());
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new(&registry));
        Records::new(store, registry)
    }

    #[tokio::test]
    async fn test_save_entity_is_pending() {
        let records = records();
        let project = Project::new("Casa Lomas").with_presupuesto(0.0);

        let saved = records.save_entity(&project).await.unwrap();
        assert!(saved.is_pending());
        assert_eq!(saved.version, 0);

        let loaded: Project = records
            .load(&RecordId::from(project.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, project);
        assert_eq!(records.pending(EntityKind::Project).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_keeps_known_version() {
        let records = records();
        let id = RecordId::from("t1");
        let synced = Record::new(id.clone(), fields_from_value(json!({"titulo": "a"})).unwrap())
            .with_status(SyncStatus::Synced)
            .with_version(4);
        records.store().put("tareas", &synced).await.unwrap();

        let saved = records
            .save(
                EntityKind::Task,
                id,
                fields_from_value(json!({"titulo": "b"})).unwrap(),
            )
            .await
            .unwrap();

        assert!(saved.is_pending());
        assert_eq!(saved.version, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_save_never_lowers_concurrent_version() {
        let records = Arc::new(records());
        let id = RecordId::from("t1");
        records
            .save(
                EntityKind::Task,
                id.clone(),
                fields_from_value(json!({"n": 0})).unwrap(),
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 1..=40i64 {
            let records = records.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                records
                    .store()
                    .transaction(
                        &["tareas"],
                        vec![WriteOp::RaiseVersion {
                            table: "tareas".to_string(),
                            id: id.clone(),
                            version: i,
                        }],
                    )
                    .await
                    .unwrap();
                records
                    .save(
                        EntityKind::Task,
                        id,
                        fields_from_value(json!({"n": i})).unwrap(),
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = records.store().get("tareas", &id).await.unwrap().unwrap();
        assert_eq!(stored.version, 40);
        assert!(stored.is_pending());
    }

    #[tokio::test]
    async fn test_edit_marks_pending() {
        let records = records();
        let id = RecordId::from("t1");
        let synced = Record::new(
            id.clone(),
            fields_from_value(json!({"titulo": "a", "completada": false})).unwrap(),
        )
        .with_status(SyncStatus::Synced);
        records.store().put("tareas", &synced).await.unwrap();

        let edited = records
            .edit(
                EntityKind::Task,
                &id,
                fields_from_value(json!({"completada": true})).unwrap(),
            )
            .await
            .unwrap();

        assert!(edited.is_pending());
        assert_eq!(edited.fields["titulo"], json!("a"));
        assert_eq!(edited.fields["completada"], json!(true));
    }

    #[tokio::test]
    async fn test_edit_missing_is_not_found() {
        let records = records();
        let err = records
            .edit(EntityKind::Task, &RecordId::from("nope"), Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Store(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_leaves_tombstone() {
        let records = records();
        let task = Task::new(uuid::Uuid::new_v4(), "Comprar cemento");
        records.save_entity(&task).await.unwrap();
        let id = RecordId::from(task.id);

        assert!(records.remove(EntityKind::Task, &id).await.unwrap());
        assert!(!records.remove(EntityKind::Task, &id).await.unwrap());

        assert!(records.get(EntityKind::Task, &id).await.unwrap().is_none());
        assert_eq!(records.store().tombstones("tareas").await.unwrap(), vec![id.clone()]);

        // Saving the id again cancels the pending deletion.
        records.save_entity(&task).await.unwrap();
        assert!(records.store().tombstones("tareas").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reference_tables_are_read_only() {
        let records = records();
        let item = InventoryItem::new(1, "Cemento", 10.0, "saco");

        assert!(matches!(
            records.save_entity(&item).await,
            Err(SyncError::ReadOnlyTable(table)) if table == "inventario"
        ));
        assert!(matches!(
            records.remove(EntityKind::Inventory, &RecordId::from(1)).await,
            Err(SyncError::ReadOnlyTable(_))
        ));
    }

    #[tokio::test]
    async fn test_find_by_payload_field() {
        let records = records();
        let project_id = uuid::Uuid::new_v4();
        records
            .save_entity(&Task::new(project_id, "a"))
            .await
            .unwrap();
        records
            .save_entity(&Task::new(uuid::Uuid::new_v4(), "b"))
            .await
            .unwrap();

        let found = records
            .find(
                EntityKind::Task,
                "proyecto_id",
                &json!(project_id.to_string()),
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
