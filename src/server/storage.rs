//! Table storage for the development remote store.
//!
//! All tables live in memory and are persisted after every mutation to a
//! single JSON file:
//! ```text
//! <DATA_DIR>/
//!   tables.json
//! ```

use obra_core::{ChangeEvent, MemoryTables, Predicate, RemoteError, Row};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

const TABLES_FILE: &str = "tables.json";

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum ServerStorageError {
    /// I/O error reading or writing a file.
    IoError(PathBuf, io::Error),
    /// The tables file exists but is not valid JSON.
    ParseError(PathBuf, serde_json::Error),
    /// The table does not exist.
    UnknownTable(String),
    /// The request cannot be applied as given.
    BadRequest(String),
}

impl std::fmt::Display for ServerStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStorageError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            ServerStorageError::ParseError(path, e) => {
                write!(f, "Failed to load tables from {}: {}", path.display(), e)
            }
            ServerStorageError::UnknownTable(table) => write!(f, "Unknown table: {}", table),
            ServerStorageError::BadRequest(message) => write!(f, "Bad request: {}", message),
        }
    }
}

impl std::error::Error for ServerStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerStorageError::IoError(_, e) => Some(e),
            ServerStorageError::ParseError(_, e) => Some(e),
            _ => None,
        }
    }
}

impl From<RemoteError> for ServerStorageError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::TableMissing(table) => ServerStorageError::UnknownTable(table),
            RemoteError::Status { body, .. } => ServerStorageError::BadRequest(body),
            other => ServerStorageError::BadRequest(other.to_string()),
        }
    }
}

/// Server-side table storage.
///
/// Writers hold the lock while persisting, so the file always reflects a
/// prefix of the applied mutations.
#[derive(Debug)]
pub struct ServerStorage {
    path: Option<PathBuf>,
    tables: RwLock<MemoryTables>,
}

impl ServerStorage {
    /// Opens the storage in `data_dir`, creating any of `table_names` that
    /// the tables file does not have yet.
    pub fn open<I, S>(data_dir: &Path, table_names: I) -> Result<Self, ServerStorageError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        fs::create_dir_all(data_dir)
            .map_err(|e| ServerStorageError::IoError(data_dir.to_path_buf(), e))?;
        let path = data_dir.join(TABLES_FILE);

        let mut tables = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<MemoryTables>(&contents)
                .map_err(|e| ServerStorageError::ParseError(path.clone(), e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => MemoryTables::default(),
            Err(e) => return Err(ServerStorageError::IoError(path, e)),
        };
        tables.ensure_tables(table_names);

        tracing::info!(path = %path.display(), tables = tables.table_names().len(), "Loaded tables");
        Ok(Self {
            path: Some(path),
            tables: RwLock::new(tables),
        })
    }

    /// Storage that is never written to disk.
    pub fn in_memory<I, S>(table_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: None,
            tables: RwLock::new(MemoryTables::with_tables(table_names)),
        }
    }

    pub async fn table_names(&self) -> Vec<String> {
        self.tables.read().await.table_names()
    }

    pub async fn select_all(&self, table: &str) -> Result<Vec<Row>, ServerStorageError> {
        Ok(self.tables.read().await.select_all(table)?)
    }

    /// Upserts rows and returns the committed rows plus their change events.
    pub async fn upsert(
        &self,
        table: &str,
        rows: Vec<Row>,
    ) -> Result<(Vec<Row>, Vec<ChangeEvent>), ServerStorageError> {
        let mut tables = self.tables.write().await;
        // Apply to a copy so a failed write leaves memory and file in step.
        let mut updated = tables.clone();
        let result = updated.upsert(table, rows)?;
        self.persist(&updated)?;
        *tables = updated;
        Ok(result)
    }

    pub async fn delete_where(
        &self,
        table: &str,
        predicate: &Predicate,
    ) -> Result<Vec<ChangeEvent>, ServerStorageError> {
        let mut tables = self.tables.write().await;
        let mut updated = tables.clone();
        let events = updated.delete_where(table, predicate)?;
        if !events.is_empty() {
            self.persist(&updated)?;
        }
        *tables = updated;
        Ok(events)
    }

    fn persist(&self, tables: &MemoryTables) -> Result<(), ServerStorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec(tables)
            .map_err(|e| ServerStorageError::ParseError(path.clone(), e))?;

        // Write atomically using temp file + rename
        let temp_path = path.with_extension("json.tmp");
        let mut file = File::create(&temp_path)
            .map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;
        file.write_all(&bytes)
            .map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;
        file.sync_all()
            .map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;
        fs::rename(&temp_path, path).map_err(|e| ServerStorageError::IoError(path.clone(), e))?;

        Ok(())
    }
}
