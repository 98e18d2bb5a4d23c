//! In-process remote store.
//!
//! [`MemoryTables`] holds the table contents and the versioning rules of the
//! hosted store; the development server persists it as JSON. [`MemoryRemote`]
//! wraps it behind [`RemoteStore`] with a broadcast change feed, call
//! counters and failure injection for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use super::{ChangeEvent, ChangeMatcher, ChangeStream, Predicate, RemoteError, RemoteStore};
use crate::models::{RecordId, Row, ID_FIELD, VERSION_FIELD};

const FEED_CAPACITY: usize = 256;

/// Remote table contents keyed by table name, then by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryTables {
    tables: BTreeMap<String, BTreeMap<String, Row>>,
}

fn row_version(row: &Row) -> i64 {
    row.get(VERSION_FIELD).and_then(Value::as_i64).unwrap_or(0)
}

impl MemoryTables {
    /// Creates empty tables with the given names.
    pub fn with_tables<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: names
                .into_iter()
                .map(|name| (name.into(), BTreeMap::new()))
                .collect(),
        }
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Makes sure every named table exists, keeping existing contents.
    pub fn ensure_tables<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.tables.entry(name.into()).or_default();
        }
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut BTreeMap<String, Row>, RemoteError> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| RemoteError::TableMissing(table.to_string()))
    }

    /// Upserts rows by id and returns the committed rows plus the change
    /// events they produced.
    ///
    /// Provided columns overwrite stored ones. The stored version becomes
    /// `max(previous + 1, provided)`, so every upsert moves it forward.
    pub fn upsert(
        &mut self,
        table: &str,
        rows: Vec<Row>,
    ) -> Result<(Vec<Row>, Vec<ChangeEvent>), RemoteError> {
        let rows_by_id = self.table_mut(table)?;
        let mut committed = Vec::with_capacity(rows.len());
        let mut events = Vec::with_capacity(rows.len());

        for row in rows {
            let id = row
                .get(ID_FIELD)
                .map(RecordId::from_value)
                .transpose()
                .ok()
                .flatten()
                .ok_or_else(|| RemoteError::Status {
                    status: 400,
                    body: "row without a valid id".to_string(),
                })?;

            let provided = row_version(&row);
            let (mut stored, previous, existed) = match rows_by_id.get(id.as_str()) {
                Some(existing) => (existing.clone(), row_version(existing), true),
                None => (Row::new(), 0, false),
            };

            stored.extend(row);
            stored.insert(
                VERSION_FIELD.to_string(),
                Value::from((previous + 1).max(provided)),
            );
            rows_by_id.insert(id.to_string(), stored.clone());

            events.push(if existed {
                ChangeEvent::update(table, stored.clone())
            } else {
                ChangeEvent::insert(table, stored.clone())
            });
            committed.push(stored);
        }

        Ok((committed, events))
    }

    pub fn select_all(&self, table: &str) -> Result<Vec<Row>, RemoteError> {
        self.tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .ok_or_else(|| RemoteError::TableMissing(table.to_string()))
    }

    /// Deletes matching rows and returns one delete event per removed row.
    pub fn delete_where(
        &mut self,
        table: &str,
        predicate: &Predicate,
    ) -> Result<Vec<ChangeEvent>, RemoteError> {
        let rows_by_id = self.table_mut(table)?;
        let doomed: Vec<String> = rows_by_id
            .iter()
            .filter(|(_, row)| predicate.matches(row))
            .map(|(id, _)| id.clone())
            .collect();

        Ok(doomed
            .into_iter()
            .filter_map(|id| rows_by_id.remove(&id))
            .map(|old| ChangeEvent::delete(table, old))
            .collect())
    }
}

/// In-process [`RemoteStore`] for tests.
#[derive(Debug)]
pub struct MemoryRemote {
    tables: Mutex<MemoryTables>,
    feed: Mutex<broadcast::Sender<ChangeEvent>>,
    failing_tables: Mutex<HashSet<String>>,
    fail_next: AtomicUsize,
    upsert_calls: AtomicUsize,
    select_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryRemote {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            tables: Mutex::new(MemoryTables::with_tables(tables)),
            feed: Mutex::new(feed),
            failing_tables: Mutex::new(HashSet::new()),
            fail_next: AtomicUsize::new(0),
            upsert_calls: AtomicUsize::new(0),
            select_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
        }
    }

    /// Every call touching `table` fails until [`MemoryRemote::heal`].
    pub fn fail_table(&self, table: &str) {
        lock(&self.failing_tables).insert(table.to_string());
    }

    /// The next `calls` calls fail regardless of table.
    pub fn fail_next(&self, calls: usize) {
        self.fail_next.store(calls, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        lock(&self.failing_tables).clear();
        self.fail_next.store(0, Ordering::SeqCst);
    }

    /// Writes as another client would: versions advance and the change is
    /// broadcast, but no call is counted.
    pub fn external_upsert(&self, table: &str, row: Row) -> Result<Row, RemoteError> {
        let (mut committed, events) = lock(&self.tables).upsert(table, vec![row])?;
        self.broadcast(events);
        committed
            .pop()
            .ok_or_else(|| RemoteError::Decode("upsert committed no row".to_string()))
    }

    pub fn external_delete(&self, table: &str, id: &RecordId) -> Result<(), RemoteError> {
        let events = lock(&self.tables).delete_where(table, &Predicate::IdEq(id.clone()))?;
        self.broadcast(events);
        Ok(())
    }

    /// Sends an event on the feed without touching the tables.
    pub fn emit(&self, event: ChangeEvent) {
        let _ = lock(&self.feed).send(event);
    }

    /// Ends every open change-feed subscription.
    pub fn drop_subscribers(&self) {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        *lock(&self.feed) = feed;
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.tables).select_all(table).unwrap_or_default()
    }

    pub fn row(&self, table: &str, id: &str) -> Option<Row> {
        let predicate = Predicate::IdEq(RecordId::from(id));
        self.rows(table).into_iter().find(|row| predicate.matches(row))
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn select_calls(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.upsert_calls() + self.select_calls() + self.delete_calls()
    }

    fn check(&self, table: &str) -> Result<(), RemoteError> {
        let consumed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed || lock(&self.failing_tables).contains(table) {
            return Err(RemoteError::Unavailable(format!("injected failure on {}", table)));
        }
        Ok(())
    }

    fn broadcast(&self, events: Vec<ChangeEvent>) {
        let feed = lock(&self.feed);
        for event in events {
            // No subscribers is fine.
            let _ = feed.send(event);
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn upsert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, RemoteError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.check(table)?;

        let (committed, events) = lock(&self.tables).upsert(table, rows)?;
        self.broadcast(events);
        Ok(committed)
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Row>, RemoteError> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        self.check(table)?;

        lock(&self.tables).select_all(table)
    }

    async fn delete_where(&self, table: &str, predicate: &Predicate) -> Result<(), RemoteError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check(table)?;

        let events = lock(&self.tables).delete_where(table, predicate)?;
        self.broadcast(events);
        Ok(())
    }

    async fn subscribe_changes(
        &self,
        matcher: &ChangeMatcher,
    ) -> Result<ChangeStream, RemoteError> {
        let mut receiver = lock(&self.feed).subscribe();
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let matcher = matcher.clone();

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(event) if matcher.matches(&event.table) => yield Ok(event),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Change feed subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::KeyKind;
    use futures::StreamExt;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_upsert_advances_version() {
        let mut tables = MemoryTables::with_tables(["proyectos"]);

        let (first, _) = tables
            .upsert("proyectos", vec![row(json!({"id": "p1", "presupuesto": 0}))])
            .unwrap();
        assert_eq!(first[0]["version"], json!(1));

        let (second, events) = tables
            .upsert("proyectos", vec![row(json!({"id": "p1", "version": 1}))])
            .unwrap();
        assert_eq!(second[0]["version"], json!(2));
        assert_eq!(second[0]["presupuesto"], json!(0));
        assert_eq!(events[0].event_type, crate::remote::ChangeType::Update);

        let (third, _) = tables
            .upsert("proyectos", vec![row(json!({"id": "p1", "version": 9}))])
            .unwrap();
        assert_eq!(third[0]["version"], json!(9));
    }

    #[test]
    fn test_missing_table() {
        let mut tables = MemoryTables::with_tables(["proyectos"]);
        assert_eq!(
            tables.select_all("usuarios"),
            Err(RemoteError::TableMissing("usuarios".to_string()))
        );
        assert!(tables.upsert("usuarios", vec![]).is_err());
    }

    #[test]
    fn test_delete_where_all_numeric_rows() {
        let mut tables = MemoryTables::with_tables(["herramientas"]);
        tables
            .upsert(
                "herramientas",
                vec![row(json!({"id": 1})), row(json!({"id": 2}))],
            )
            .unwrap();

        let events = tables
            .delete_where("herramientas", &Predicate::AllRows(KeyKind::Numeric))
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(tables.select_all("herramientas").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let remote = MemoryRemote::new(["tareas", "finanzas"]);

        remote.fail_next(1);
        assert!(remote.select_all("tareas").await.is_err());
        assert!(remote.select_all("tareas").await.is_ok());

        remote.fail_table("finanzas");
        assert!(remote.select_all("finanzas").await.is_err());
        assert!(remote.select_all("tareas").await.is_ok());

        remote.heal();
        assert!(remote.select_all("finanzas").await.is_ok());
        assert_eq!(remote.select_calls(), 5);
    }

    #[tokio::test]
    async fn test_feed_delivers_matching_changes() {
        let remote = MemoryRemote::new(["tareas", "finanzas"]);
        let mut feed = remote
            .subscribe_changes(&ChangeMatcher::tables(["tareas"]))
            .await
            .unwrap();

        remote
            .external_upsert("finanzas", row(json!({"id": "f1"})))
            .unwrap();
        remote
            .external_upsert("tareas", row(json!({"id": "t1"})))
            .unwrap();

        let event = feed.next().await.unwrap().unwrap();
        assert_eq!(event.table, "tareas");
        assert_eq!(event.new.unwrap()["version"], json!(1));

        remote.drop_subscribers();
        assert!(feed.next().await.is_none());
    }
}
