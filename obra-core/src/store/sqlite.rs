use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{check_scope, is_valid_field_name, record_matches, LocalStore, StoreError, WriteOp};
use crate::models::{
    Conflict, ConflictKind, Fields, Record, RecordId, SyncStatus, ID_FIELD, SYNC_STATUS_FIELD,
};
use crate::registry::TableRegistry;

const TOMBSTONES_TABLE: &str = "sync_tombstones";
const CONFLICTS_TABLE: &str = "sync_conflicts";

/// Local store backed by an embedded SQLite database.
///
/// Every entity table holds `(id, data, sync_status, version)` with the
/// payload serialized as JSON text in `data`.
///
/// Write transactions are serialized through `write_lock`: a deferred
/// transaction that reads before it writes cannot upgrade its WAL snapshot
/// once another connection has committed, and SQLite reports `SQLITE_BUSY`
/// without waiting on the busy timeout.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    tables: HashSet<&'static str>,
    write_lock: Arc<Mutex<()>>,
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    data: String,
    sync_status: Option<String>,
    version: i64,
}

#[derive(sqlx::FromRow)]
struct ConflictRow {
    tbl: String,
    id: String,
    kind: String,
    local_data: String,
    remote_data: Option<String>,
    remote_version: i64,
    detected_at: String,
}

impl RecordRow {
    fn into_record(self, table: &str) -> Result<Record, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            table: table.to_string(),
            id: self.id.clone(),
            reason,
        };

        let fields: Fields = serde_json::from_str(&self.data).map_err(|e| corrupt(e.to_string()))?;
        let sync_status = self
            .sync_status
            .as_deref()
            .map(SyncStatus::from_str)
            .transpose()
            .map_err(corrupt)?;

        Ok(Record {
            id: RecordId::new(self.id),
            fields,
            sync_status,
            version: self.version,
        })
    }
}

impl ConflictRow {
    fn into_conflict(self) -> Result<Conflict, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            table: self.tbl.clone(),
            id: self.id.clone(),
            reason,
        };

        let kind = ConflictKind::from_str(&self.kind).map_err(corrupt)?;
        let local: Fields =
            serde_json::from_str(&self.local_data).map_err(|e| corrupt(e.to_string()))?;
        let remote: Option<Fields> = self
            .remote_data
            .as_deref()
            .map(|data| serde_json::from_str(data))
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let detected_at = DateTime::parse_from_rfc3339(&self.detected_at)
            .map_err(|e| corrupt(e.to_string()))?
            .with_timezone(&Utc);

        Ok(Conflict {
            table: self.tbl,
            id: RecordId::new(self.id),
            kind,
            local,
            remote,
            remote_version: self.remote_version,
            detected_at,
        })
    }
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`, runs migrations
    /// and checks that every registered table exists.
    pub async fn open(
        path: impl AsRef<Path>,
        registry: &TableRegistry,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let existing: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(&pool)
                .await?;
        let existing: HashSet<String> = existing.into_iter().map(|(name,)| name).collect();

        if let Some(missing) = registry.names().into_iter().find(|n| !existing.contains(*n)) {
            return Err(StoreError::MissingTable(missing.to_string()));
        }

        tracing::debug!(path = %path.display(), "Opened local store");

        Ok(Self {
            pool,
            tables: registry.names().into_iter().collect(),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the registered table name, which is safe to splice into SQL.
    fn table<'a>(&self, table: &'a str) -> Result<&'a str, StoreError> {
        if self.tables.contains(table) {
            Ok(table)
        } else {
            Err(StoreError::UnknownTable(table.to_string()))
        }
    }

    async fn fetch(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
        id: &RecordId,
    ) -> Result<Option<Record>, StoreError> {
        let sql = format!(
            "SELECT id, data, sync_status, version FROM {} WHERE id = ?",
            table
        );
        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await?;

        row.map(|r| r.into_record(table)).transpose()
    }

    async fn apply(&self, conn: &mut SqliteConnection, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::Put { table, record } => {
                let table = self.table(&table)?;
                let sql = format!(
                    "INSERT OR REPLACE INTO {} (id, data, sync_status, version) VALUES (?, ?, ?, ?)",
                    table
                );
                sqlx::query(&sql)
                    .bind(record.id.as_str())
                    .bind(encode_fields(&record.fields))
                    .bind(record.sync_status.map(|s| s.as_str()))
                    .bind(record.version)
                    .execute(&mut *conn)
                    .await?;
            }
            WriteOp::PutPending { table, id, fields } => {
                let table = self.table(&table)?;
                let sql = format!(
                    r#"
                    INSERT INTO {} (id, data, sync_status, version) VALUES (?, ?, ?, 0)
                    ON CONFLICT(id) DO UPDATE SET
                        data = excluded.data,
                        sync_status = excluded.sync_status
                    "#,
                    table
                );
                sqlx::query(&sql)
                    .bind(id.as_str())
                    .bind(encode_fields(&fields))
                    .bind(SyncStatus::Pending.as_str())
                    .execute(&mut *conn)
                    .await?;
            }
            WriteOp::Update { table, id, fields } => {
                let table = self.table(&table)?;
                let mut record = self
                    .fetch(conn, table, &id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound {
                        table: table.to_string(),
                        id: id.clone(),
                    })?;
                record.merge_fields(&fields);

                let sql = format!("UPDATE {} SET data = ? WHERE id = ?", table);
                sqlx::query(&sql)
                    .bind(encode_fields(&record.fields))
                    .bind(id.as_str())
                    .execute(&mut *conn)
                    .await?;
            }
            WriteOp::SetStatus { table, id, status } => {
                let table = self.table(&table)?;
                let sql = format!("UPDATE {} SET sync_status = ? WHERE id = ?", table);
                let result = sqlx::query(&sql)
                    .bind(status.as_str())
                    .bind(id.as_str())
                    .execute(&mut *conn)
                    .await?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::NotFound {
                        table: table.to_string(),
                        id,
                    });
                }
            }
            WriteOp::RaiseVersion { table, id, version } => {
                let table = self.table(&table)?;
                let sql = format!(
                    "UPDATE {} SET version = MAX(version, ?) WHERE id = ?",
                    table
                );
                sqlx::query(&sql)
                    .bind(version)
                    .bind(id.as_str())
                    .execute(&mut *conn)
                    .await?;
            }
            WriteOp::Delete { table, id } => {
                let table = self.table(&table)?;
                let sql = format!("DELETE FROM {} WHERE id = ?", table);
                sqlx::query(&sql)
                    .bind(id.as_str())
                    .execute(&mut *conn)
                    .await?;
            }
            WriteOp::Clear { table } => {
                let table = self.table(&table)?;
                sqlx::query(&format!("DELETE FROM {}", table))
                    .execute(&mut *conn)
                    .await?;
            }
            WriteOp::Tombstone { table, id } => {
                let table = self.table(&table)?;
                sqlx::query(
                    "INSERT OR REPLACE INTO sync_tombstones (tbl, id, deleted_at) VALUES (?, ?, ?)",
                )
                .bind(table)
                .bind(id.as_str())
                .bind(Utc::now().to_rfc3339())
                .execute(&mut *conn)
                .await?;
            }
            WriteOp::ClearTombstone { table, id } => {
                sqlx::query("DELETE FROM sync_tombstones WHERE tbl = ? AND id = ?")
                    .bind(&table)
                    .bind(id.as_str())
                    .execute(&mut *conn)
                    .await?;
            }
            WriteOp::RecordConflict(conflict) => {
                let table = self.table(&conflict.table)?;
                sqlx::query(
                    r#"
                    INSERT OR REPLACE INTO sync_conflicts
                        (tbl, id, kind, local_data, remote_data, remote_version, detected_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(table)
                .bind(conflict.id.as_str())
                .bind(conflict.kind.to_string())
                .bind(encode_fields(&conflict.local))
                .bind(conflict.remote.as_ref().map(encode_fields))
                .bind(conflict.remote_version)
                .bind(conflict.detected_at.to_rfc3339())
                .execute(&mut *conn)
                .await?;
            }
            WriteOp::ResolveConflict { table, id } => {
                sqlx::query("DELETE FROM sync_conflicts WHERE tbl = ? AND id = ?")
                    .bind(&table)
                    .bind(id.as_str())
                    .execute(&mut *conn)
                    .await?;
            }
        }
        Ok(())
    }
}

fn encode_fields(fields: &Fields) -> String {
    Value::Object(fields.clone()).to_string()
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn get(&self, table: &str, id: &RecordId) -> Result<Option<Record>, StoreError> {
        let table = self.table(table)?;
        let mut conn = self.pool.acquire().await?;
        self.fetch(&mut conn, table, id).await
    }

    async fn scan(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let table = self.table(table)?;
        let sql = format!(
            "SELECT id, data, sync_status, version FROM {} ORDER BY id",
            table
        );
        let rows: Vec<RecordRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(|r| r.into_record(table)).collect()
    }

    async fn query_by_field(
        &self,
        table: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError> {
        let table = self.table(table)?;
        if !is_valid_field_name(field) {
            return Err(StoreError::InvalidField(field.to_string()));
        }

        let column = match field {
            SYNC_STATUS_FIELD | ID_FIELD => field.to_string(),
            _ => format!("json_extract(data, '$.\"{}\"')", field),
        };
        let select = format!("SELECT id, data, sync_status, version FROM {}", table);

        let rows: Vec<RecordRow> = match value {
            Value::Null => {
                sqlx::query_as(&format!("{} WHERE {} IS NULL", select, column))
                    .fetch_all(&self.pool)
                    .await?
            }
            Value::String(s) => {
                sqlx::query_as(&format!("{} WHERE {} = ?", select, column))
                    .bind(s.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            Value::Bool(b) => {
                sqlx::query_as(&format!("{} WHERE {} = ?", select, column))
                    .bind(i64::from(*b))
                    .fetch_all(&self.pool)
                    .await?
            }
            Value::Number(n) => match n.as_i64() {
                Some(i) => {
                    sqlx::query_as(&format!("{} WHERE {} = ?", select, column))
                        .bind(i)
                        .fetch_all(&self.pool)
                        .await?
                }
                None => {
                    sqlx::query_as(&format!("{} WHERE {} = ?", select, column))
                        .bind(n.as_f64())
                        .fetch_all(&self.pool)
                        .await?
                }
            },
            // Composite values compare structurally below.
            Value::Array(_) | Value::Object(_) => {
                sqlx::query_as(&select).fetch_all(&self.pool).await?
            }
        };

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record = row.into_record(table)?;
            if record_matches(&record, field, value) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn transaction(&self, tables: &[&str], ops: Vec<WriteOp>) -> Result<(), StoreError> {
        check_scope(tables, &ops)?;
        for table in tables {
            self.table(table)?;
        }

        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        for op in ops {
            self.apply(&mut tx, op).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn mark_synced(
        &self,
        table: &str,
        pushed: &Record,
        version: i64,
    ) -> Result<bool, StoreError> {
        let table = self.table(table)?;
        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let Some(stored) = self.fetch(&mut tx, table, &pushed.id).await? else {
            return Ok(false);
        };
        if !stored.is_pending() || stored.fields != pushed.fields {
            return Ok(false);
        }

        let sql = format!(
            "UPDATE {} SET sync_status = ?, version = ? WHERE id = ?",
            table
        );
        sqlx::query(&sql)
            .bind(SyncStatus::Synced.as_str())
            .bind(version)
            .bind(pushed.id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn tombstones(&self, table: &str) -> Result<Vec<RecordId>, StoreError> {
        let table = self.table(table)?;
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM sync_tombstones WHERE tbl = ? ORDER BY deleted_at")
                .bind(table)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| RecordId::new(id)).collect())
    }

    async fn conflicts(&self) -> Result<Vec<Conflict>, StoreError> {
        let rows: Vec<ConflictRow> =
            sqlx::query_as("SELECT * FROM sync_conflicts ORDER BY detected_at")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(ConflictRow::into_conflict).collect()
    }

    async fn wipe(&self) -> Result<(), StoreError> {
        let mut tables: Vec<&str> = self.tables.iter().copied().collect();
        tables.push(TOMBSTONES_TABLE);
        tables.push(CONFLICTS_TABLE);

        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        for table in tables {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}
