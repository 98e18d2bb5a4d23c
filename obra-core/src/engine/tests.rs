use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tempfile::tempdir;
use uuid::Uuid;

use super::*;
use crate::models::{
    fields_from_value, ConflictKind, InventoryItem, Project, Row, SyncStatus, Task,
};
use crate::remote::{ChangeMatcher, ChangeStream, MemoryRemote, RemoteError};
use crate::store::{MemoryStore, SqliteStore};

struct Harness {
    engine: SyncEngine,
    local: Arc<MemoryStore>,
    remote: Arc<MemoryRemote>,
}

fn harness_with(options: EngineOptions) -> Harness {
    let registry = Arc::new(TableRegistry::standard());
    let local = Arc::new(MemoryStore::new(&registry));
    let remote = Arc::new(MemoryRemote::new(registry.names()));
    let engine = SyncEngine::new(local.clone(), remote.clone(), registry, options);
    Harness {
        engine,
        local,
        remote,
    }
}

fn harness() -> Harness {
    harness_with(EngineOptions::default())
}

fn row(value: Value) -> Row {
    fields_from_value(value).unwrap()
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_created_entity_is_pending_until_push() {
    let h = harness();
    let project = Project::new("Casa Lomas");
    let record = h.engine.records().save_entity(&project).await.unwrap();
    assert!(record.is_pending());

    h.remote.fail_table("proyectos");
    let report = h.engine.push(EntityKind::Project).await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert!(!report.failed[0].rejected);

    let stored = h.local.get("proyectos", &record.id).await.unwrap().unwrap();
    assert!(stored.is_pending());

    h.remote.heal();
    let report = h.engine.push(EntityKind::Project).await.unwrap();
    assert_eq!(report.pushed, vec![record.id.clone()]);

    let stored = h.local.get("proyectos", &record.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, Some(SyncStatus::Synced));
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn test_push_with_nothing_pending_makes_no_remote_call() {
    let h = harness();

    let report = h.engine.push(EntityKind::Task).await.unwrap();
    assert!(report.is_empty());

    let report = h.engine.push(EntityKind::Inventory).await.unwrap();
    assert!(report.is_empty());

    assert_eq!(h.remote.total_calls(), 0);
}

#[tokio::test]
async fn test_push_then_pull_round_trip() {
    let h = harness();
    let task = Task::new(Uuid::new_v4(), "Cotizar ventanas");
    h.engine.records().save_entity(&task).await.unwrap();

    h.engine.push(EntityKind::Task).await.unwrap();
    let report = h.engine.pull(EntityKind::Task).await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.unchanged, 1);

    let loaded: Task = h
        .engine
        .records()
        .load(&RecordId::from(task.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, task);

    let remote_row = h.remote.row("tareas", &task.id.to_string()).unwrap();
    assert_eq!(remote_row["titulo"], json!("Cotizar ventanas"));
    assert!(h.engine.records().pending(EntityKind::Task).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_end_to_end_project_push_strips_status() {
    let h = harness();
    let project = Project::new("P1").with_presupuesto(0.0);

    let (record, ticket) = h.engine.save(&project).await.unwrap();
    let report = ticket.wait().await.unwrap();
    assert_eq!(report.pushed, vec![record.id.clone()]);

    let remote_row = h.remote.row("proyectos", record.id.as_str()).unwrap();
    assert!(!remote_row.contains_key("sync_status"));
    assert_eq!(remote_row["presupuesto"], json!(0.0));
    assert_eq!(remote_row["nombre_proyecto"], json!("P1"));

    let stored = h.local.get("proyectos", &record.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, Some(SyncStatus::Synced));
}

#[tokio::test]
async fn test_end_to_end_external_edit_reaches_local_on_sync_projects() {
    let h = harness();
    let project = Project::new("P1");
    let (record, ticket) = h.engine.save(&project).await.unwrap();
    ticket.wait().await.unwrap();

    h.remote
        .external_upsert(
            "proyectos",
            row(json!({"id": record.id.as_str(), "nombre_proyecto": "P1 renombrado"})),
        )
        .unwrap();

    let batch = h.engine.sync_projects().await;
    assert!(batch.is_success());
    assert_eq!(batch.pulls[0].updated, 1);

    let loaded: Project = h.engine.records().load(&record.id).await.unwrap().unwrap();
    assert_eq!(loaded.nombre_proyecto, "P1 renombrado");

    let stored = h.local.get("proyectos", &record.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, Some(SyncStatus::Synced));
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn test_replace_pull_matches_remote_row_set() {
    let h = harness();
    for (id, nombre) in [(1, "Cemento"), (2, "Arena")] {
        h.remote
            .external_upsert(
                "inventario",
                row(json!({"id": id, "nombre": nombre, "cantidad": 10.0, "unidad": "saco"})),
            )
            .unwrap();
    }
    let leftover =
        Record::new("3", row(json!({"nombre": "Grava"}))).with_status(SyncStatus::Synced);
    h.local.put("inventario", &leftover).await.unwrap();

    let batch = h.engine.pull_reference_data().await;
    assert!(batch.is_success());
    let report = batch
        .pulls
        .iter()
        .find(|p| p.table == "inventario")
        .unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.removed, 1);

    let items: Vec<InventoryItem> = h.engine.records().list_entities().await.unwrap();
    let ids: Vec<i64> = items.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![1, 2]);

    for record in h.local.scan("inventario").await.unwrap() {
        assert_eq!(record.sync_status, Some(SyncStatus::Synced));
    }
}

#[tokio::test]
async fn test_replace_pull_keeps_unpushed_local_rows() {
    let h = harness();
    h.remote
        .external_upsert("tareas", row(json!({"id": "remote", "titulo": "r"})))
        .unwrap();
    h.local
        .put(
            "tareas",
            &Record::new("gone", row(json!({"titulo": "g"}))).with_status(SyncStatus::Synced),
        )
        .await
        .unwrap();
    h.local
        .put("tareas", &Record::pending("draft", row(json!({"titulo": "d"}))))
        .await
        .unwrap();

    let report = h
        .engine
        .pull_with(EntityKind::Task, PullPolicy::Replace)
        .await
        .unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.kept_local, 1);

    let ids: Vec<String> = h
        .local
        .scan("tareas")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id.to_string())
        .collect();
    assert_eq!(ids, vec!["draft", "remote"]);
}

#[tokio::test]
async fn test_failed_pull_leaves_local_table_untouched() {
    let h = harness();
    let kept = Record::new("7", row(json!({"nombre": "Martillo"}))).with_status(SyncStatus::Synced);
    h.local.put("herramientas", &kept).await.unwrap();

    h.remote.fail_table("herramientas");
    let err = h.engine.pull(EntityKind::Tool).await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(RemoteError::Unavailable(_))));

    let batch = h.engine.pull_reference_data().await;
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].table, "herramientas");
    assert_eq!(batch.pulls.len(), 1);

    assert_eq!(h.local.scan("herramientas").await.unwrap(), vec![kept]);
}

#[tokio::test]
async fn test_replace_pull_converges_after_remote_reset() {
    let h = harness();
    h.local
        .put(
            "herramientas",
            &Record::new(RecordId::from(7), row(json!({"nombre": "Martillo"})))
                .with_status(SyncStatus::Synced)
                .with_version(6),
        )
        .await
        .unwrap();
    h.remote
        .external_upsert("herramientas", row(json!({"id": 7, "nombre": "Sierra"})))
        .unwrap();

    let report = h.engine.pull(EntityKind::Tool).await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.stale, 0);

    let stored = h
        .local
        .get("herramientas", &RecordId::from(7))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.fields["nombre"], json!("Sierra"));
    assert_eq!(stored.version, 1);

    let again = h.engine.pull(EntityKind::Tool).await.unwrap();
    assert_eq!(again.unchanged, 1);
    assert_eq!(again.updated, 0);
}

#[tokio::test]
async fn test_reader_never_sees_empty_table_during_replace() {
    let h = harness();
    for id in 1..=20 {
        h.remote
            .external_upsert("herramientas", row(json!({"id": id, "nombre": "x"})))
            .unwrap();
        h.local
            .put(
                "herramientas",
                &Record::new(RecordId::from(id), row(json!({"nombre": "old"})))
                    .with_status(SyncStatus::Synced),
            )
            .await
            .unwrap();
    }

    let reader = async {
        for _ in 0..50 {
            assert!(!h.local.scan("herramientas").await.unwrap().is_empty());
            tokio::task::yield_now().await;
        }
    };
    let (pulled, ()) = tokio::join!(h.engine.pull(EntityKind::Tool), reader);
    assert_eq!(pulled.unwrap().updated, 20);
}

#[tokio::test]
async fn test_delete_event_removes_pending_record() {
    let h = harness();
    let task = Task::new(Uuid::new_v4(), "Pintar");
    let record = h.engine.records().save_entity(&task).await.unwrap();

    let outcome = h
        .engine
        .apply_event(&ChangeEvent::delete(
            "tareas",
            row(json!({"id": record.id.as_str()})),
        ))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ApplyOutcome::Conflicted {
            kind: ConflictKind::DeletedWhilePending,
            remote_applied: true
        }
    );
    assert!(h.local.get("tareas", &record.id).await.unwrap().is_none());

    let conflicts = h.engine.conflicts().await.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind, ConflictKind::DeletedWhilePending);
}

#[tokio::test]
async fn test_conflict_is_reported_and_local_edit_survives() {
    let h = harness();
    let project = Project::new("Casa");
    let (record, ticket) = h.engine.save(&project).await.unwrap();
    ticket.wait().await.unwrap();

    h.engine
        .records()
        .edit(
            EntityKind::Project,
            &record.id,
            row(json!({"nombre_proyecto": "Casa Azul"})),
        )
        .await
        .unwrap();
    h.remote
        .external_upsert(
            "proyectos",
            row(json!({"id": record.id.as_str(), "nombre_proyecto": "Casa Roja"})),
        )
        .unwrap();

    let report = h.engine.pull(EntityKind::Project).await.unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].differing_fields(), vec!["nombre_proyecto"]);

    let stored = h.local.get("proyectos", &record.id).await.unwrap().unwrap();
    assert!(stored.is_pending());
    assert_eq!(stored.fields["nombre_proyecto"], json!("Casa Azul"));
    assert_eq!(h.engine.conflicts().await.unwrap().len(), 1);

    // Pulling the same remote row again does not report it twice.
    let again = h.engine.pull(EntityKind::Project).await.unwrap();
    assert!(again.conflicts.is_empty());
    assert_eq!(again.kept_local, 1);

    let pushed = h.engine.push(EntityKind::Project).await.unwrap();
    assert_eq!(pushed.pushed.len(), 1);

    let remote_row = h.remote.row("proyectos", record.id.as_str()).unwrap();
    assert_eq!(remote_row["nombre_proyecto"], json!("Casa Azul"));
    assert_eq!(remote_row["version"], json!(3));
    assert!(h.engine.conflicts().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_prefer_remote_policy_applies_remote_row() {
    let h = harness_with(EngineOptions {
        conflict_policy: ConflictPolicy::PreferRemote,
        ..EngineOptions::default()
    });
    let id = RecordId::from("p1");
    h.local
        .put(
            "proyectos",
            &Record::pending(id.clone(), row(json!({"nombre_proyecto": "local"}))),
        )
        .await
        .unwrap();
    h.remote
        .external_upsert("proyectos", row(json!({"id": "p1", "nombre_proyecto": "remote"})))
        .unwrap();

    let report = h.engine.pull(EntityKind::Project).await.unwrap();
    assert_eq!(report.conflicts.len(), 1);

    let stored = h.local.get("proyectos", &id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, Some(SyncStatus::Synced));
    assert_eq!(stored.fields["nombre_proyecto"], json!("remote"));
}

#[tokio::test]
async fn test_stale_and_duplicate_events_are_absorbed() {
    let h = harness();
    let insert = ChangeEvent::insert(
        "tareas",
        row(json!({"id": "t1", "titulo": "b", "version": 5})),
    );

    assert_eq!(
        h.engine.apply_event(&insert).await.unwrap(),
        ApplyOutcome::Inserted
    );
    assert_eq!(
        h.engine.apply_event(&insert).await.unwrap(),
        ApplyOutcome::Unchanged
    );

    let stale = ChangeEvent::update(
        "tareas",
        row(json!({"id": "t1", "titulo": "a", "version": 4})),
    );
    assert_eq!(
        h.engine.apply_event(&stale).await.unwrap(),
        ApplyOutcome::Stale
    );

    let stored = h.local.get("tareas", &RecordId::from("t1")).await.unwrap().unwrap();
    assert_eq!(stored.fields["titulo"], json!("b"));
    assert_eq!(stored.version, 5);
}

#[tokio::test]
async fn test_event_for_unknown_table_is_ignored() {
    let h = harness();
    let event = ChangeEvent::insert("usuarios", row(json!({"id": "u1"})));
    assert_eq!(
        h.engine.apply_event(&event).await.unwrap(),
        ApplyOutcome::Ignored
    );
}

#[tokio::test]
async fn test_tombstoned_delete_reaches_remote() {
    let h = harness();
    let task = Task::new(Uuid::new_v4(), "Demoler muro");
    let (record, ticket) = h.engine.save(&task).await.unwrap();
    ticket.wait().await.unwrap();
    assert!(h.remote.row("tareas", record.id.as_str()).is_some());

    // A pull before the delete is pushed must not resurrect the row.
    assert!(h
        .engine
        .records()
        .remove(EntityKind::Task, &record.id)
        .await
        .unwrap());
    let pulled = h.engine.pull(EntityKind::Task).await.unwrap();
    assert_eq!(pulled.tombstoned, 1);
    assert!(h.local.get("tareas", &record.id).await.unwrap().is_none());

    let report = h.engine.push(EntityKind::Task).await.unwrap();
    assert_eq!(report.deleted, vec![record.id.clone()]);
    assert!(h.remote.row("tareas", record.id.as_str()).is_none());
    assert!(h.local.tombstones("tareas").await.unwrap().is_empty());

    assert!(h
        .engine
        .remove(EntityKind::Task, &record.id)
        .await
        .unwrap()
        .is_none());
}

/// Remote double that edits the local row while the upsert is in flight.
struct EditDuringUpsert {
    remote: MemoryRemote,
    local: Arc<MemoryStore>,
}

#[async_trait]
impl RemoteStore for EditDuringUpsert {
    async fn upsert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, RemoteError> {
        let committed = self.remote.upsert(table, rows).await?;
        let id = RecordId::from_value(&committed[0]["id"]).unwrap();
        self.local
            .update(table, &id, &row(json!({"titulo": "edited meanwhile"})))
            .await
            .unwrap();
        Ok(committed)
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Row>, RemoteError> {
        self.remote.select_all(table).await
    }

    async fn delete_where(&self, table: &str, predicate: &Predicate) -> Result<(), RemoteError> {
        self.remote.delete_where(table, predicate).await
    }

    async fn subscribe_changes(
        &self,
        matcher: &ChangeMatcher,
    ) -> Result<ChangeStream, RemoteError> {
        self.remote.subscribe_changes(matcher).await
    }
}

#[tokio::test]
async fn test_edit_during_push_stays_pending() {
    let registry = Arc::new(TableRegistry::standard());
    let local = Arc::new(MemoryStore::new(&registry));
    let remote = Arc::new(EditDuringUpsert {
        remote: MemoryRemote::new(registry.names()),
        local: local.clone(),
    });
    let engine = SyncEngine::new(local.clone(), remote, registry, EngineOptions::default());

    let record = engine
        .records()
        .save_entity(&Task::new(Uuid::new_v4(), "original"))
        .await
        .unwrap();

    let report = engine.push(EntityKind::Task).await.unwrap();
    assert_eq!(report.modified_in_flight, vec![record.id.clone()]);
    assert!(report.pushed.is_empty());

    let stored = local.get("tareas", &record.id).await.unwrap().unwrap();
    assert!(stored.is_pending());
    assert_eq!(stored.fields["titulo"], json!("edited meanwhile"));
    assert_eq!(stored.version, 1);

    // The remote row is the version the pending edit builds on, not a rival.
    let pulled = engine.pull(EntityKind::Task).await.unwrap();
    assert!(pulled.conflicts.is_empty());
    assert_eq!(pulled.kept_local, 1);
    assert!(engine.conflicts().await.unwrap().is_empty());

    let stored = local.get("tareas", &record.id).await.unwrap().unwrap();
    assert!(stored.is_pending());
    assert_eq!(stored.fields["titulo"], json!("edited meanwhile"));
}

#[tokio::test]
async fn test_trigger_sync_full_queue_resolves_immediately() {
    let h = harness_with(EngineOptions {
        queue_capacity: 1,
        ..EngineOptions::default()
    });
    h.engine
        .records()
        .save_entity(&Task::new(Uuid::new_v4(), "a"))
        .await
        .unwrap();

    // The worker has not run yet, so the single slot stays occupied.
    let first = h.engine.trigger_sync(EntityKind::Task);
    let second = h.engine.trigger_sync(EntityKind::Task);
    assert!(!first.is_resolved());
    assert!(second.is_resolved());
    assert!(matches!(second.wait().await, Err(SyncError::QueueFull(_))));

    let report = first.wait().await.unwrap();
    assert_eq!(report.pushed.len(), 1);
    assert_eq!(h.remote.upsert_calls(), 1);
}

#[test]
fn test_trigger_sync_without_runtime() {
    let h = harness();
    let ticket = h.engine.trigger_sync(EntityKind::Task);
    assert!(ticket.is_resolved());
    assert!(matches!(
        futures::executor::block_on(ticket.wait()),
        Err(SyncError::NoRuntime(_))
    ));
}

#[tokio::test]
async fn test_push_execution_data_covers_execution_tables() {
    let h = harness();
    h.engine
        .records()
        .save_entity(&Task::new(Uuid::new_v4(), "a"))
        .await
        .unwrap();
    h.engine
        .records()
        .save_entity(&Project::new("not execution"))
        .await
        .unwrap();

    let batch = h.engine.push_execution_data().await;
    assert_eq!(batch.pushes.len(), EntityKind::EXECUTION.len());
    assert!(batch.is_success());
    assert_eq!(h.remote.rows("tareas").len(), 1);
    assert!(h.remote.rows("proyectos").is_empty());
}

#[tokio::test]
async fn test_sync_all_continues_past_failing_table() {
    let h = harness();
    h.engine
        .records()
        .save_entity(&Task::new(Uuid::new_v4(), "a"))
        .await
        .unwrap();
    h.engine
        .records()
        .save_entity(&Project::new("b"))
        .await
        .unwrap();
    h.remote.fail_table("tareas");

    let batch = h.engine.sync_all().await;
    assert!(!batch.is_success());
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].table, "tareas");
    assert_eq!(h.remote.rows("proyectos").len(), 1);

    let counts = h.engine.pending_counts().await.unwrap();
    let tasks = counts.iter().find(|c| c.kind == EntityKind::Task).unwrap();
    assert_eq!(tasks.pending, 1);
    let projects = counts.iter().find(|c| c.kind == EntityKind::Project).unwrap();
    assert_eq!(projects.pending, 0);
}

#[tokio::test]
async fn test_reset_all_tolerates_partial_failure() {
    let h = harness();
    h.remote
        .external_upsert("herramientas", row(json!({"id": 1, "nombre": "Taladro"})))
        .unwrap();
    h.remote
        .external_upsert("proyectos", row(json!({"id": "p1", "nombre_proyecto": "x"})))
        .unwrap();
    h.remote
        .external_upsert("finanzas", row(json!({"id": "f1", "concepto": "x"})))
        .unwrap();
    h.engine.sync_all().await;
    assert_eq!(h.local.scan("proyectos").await.unwrap().len(), 1);

    h.remote.fail_table("finanzas");
    let report = h.engine.reset_all().await.unwrap();

    assert_eq!(report.cleared.len(), 8);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].table, "finanzas");
    assert!(h.remote.rows("herramientas").is_empty());
    assert!(h.remote.rows("proyectos").is_empty());

    for table in h.engine.registry().names() {
        assert!(h.local.scan(table).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_realtime_applies_events_and_notifies() {
    let h = harness();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = h.engine.init_realtime(move |kind| {
        let _ = tx.send(kind);
    });
    wait_until(|| async { h.remote.subscribe_calls() == 1 }).await;

    h.remote
        .external_upsert("tareas", row(json!({"id": "t1", "titulo": "remota"})))
        .unwrap();

    let kind = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kind, EntityKind::Task);

    let stored = h.local.get("tareas", &RecordId::from("t1")).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, Some(SyncStatus::Synced));

    assert!(handle.is_running());
    handle.unsubscribe().await;
}

#[tokio::test]
async fn test_realtime_reconnects_and_catches_up() {
    let h = harness_with(EngineOptions {
        reconnect_delay: Duration::from_millis(20),
        ..EngineOptions::default()
    });
    let handle = h.engine.init_realtime(|_| {});
    wait_until(|| async { h.remote.subscribe_calls() == 1 }).await;

    h.remote.drop_subscribers();
    h.remote
        .external_upsert("proyectos", row(json!({"id": "p9", "nombre_proyecto": "missed"})))
        .unwrap();

    wait_until(|| async { h.remote.subscribe_calls() >= 2 }).await;
    wait_until(|| async {
        h.local
            .get("proyectos", &RecordId::from("p9"))
            .await
            .unwrap()
            .is_some()
    })
    .await;

    handle.unsubscribe().await;
}

#[tokio::test]
async fn test_engine_over_sqlite_store() {
    let dir = tempdir().unwrap();
    let registry = Arc::new(TableRegistry::standard());
    let local = Arc::new(
        SqliteStore::open(dir.path().join("obra.db"), &registry)
            .await
            .unwrap(),
    );
    let remote = Arc::new(MemoryRemote::new(registry.names()));
    let engine = SyncEngine::new(local.clone(), remote.clone(), registry, EngineOptions::default());

    let project = Project::new("Bodega").with_presupuesto(1200.0);
    let (record, ticket) = engine.save(&project).await.unwrap();
    ticket.wait().await.unwrap();

    remote
        .external_upsert(
            "proyectos",
            row(json!({"id": record.id.as_str(), "presupuesto": 1500.0})),
        )
        .unwrap();
    engine.sync_projects().await;

    let loaded: Project = engine.records().load(&record.id).await.unwrap().unwrap();
    assert_eq!(loaded.presupuesto, 1500.0);
    assert_eq!(loaded.nombre_proyecto, "Bodega");

    let stored = local.get("proyectos", &record.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, Some(SyncStatus::Synced));
    assert_eq!(stored.version, 2);
}
