//! Generic record representation shared by every table.
//!
//! A [`Record`] is what the local store persists and what the sync engine
//! moves between stores: an id, a flat JSON payload, the local-only
//! `sync_status` and the last remote `version` seen for the id.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::registry::KeyKind;

/// Flat payload of a record (everything except id, status and version).
pub type Fields = Map<String, Value>;

/// A remote row as exchanged with the remote store.
pub type Row = Map<String, Value>;

pub const ID_FIELD: &str = "id";
pub const SYNC_STATUS_FIELD: &str = "sync_status";
pub const VERSION_FIELD: &str = "version";

/// Errors converting between records, remote rows and typed entities.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("row has no id")]
    MissingId,

    #[error("unsupported id value: {0}")]
    InvalidId(String),

    #[error("id '{0}' is not numeric but the table uses numeric keys")]
    NotNumeric(String),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("entity conversion failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Opaque record identifier, stable across the local and remote stores.
///
/// Numeric keys are kept in their decimal string form locally and turned
/// back into JSON numbers when talking to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh opaque id (UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads an id from a JSON value (string or integer).
    pub fn from_value(value: &Value) -> Result<Self, RecordError> {
        match value {
            Value::String(s) if !s.is_empty() => Ok(Self(s.clone())),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Self(n.to_string())),
            Value::Null => Err(RecordError::MissingId),
            other => Err(RecordError::InvalidId(other.to_string())),
        }
    }

    /// Renders the id as the JSON value the remote store expects.
    pub fn to_value(&self, key_kind: KeyKind) -> Result<Value, RecordError> {
        match key_kind {
            KeyKind::Opaque => Ok(Value::String(self.0.clone())),
            KeyKind::Numeric => self
                .0
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| RecordError::NotNumeric(self.0.clone())),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<Uuid> for RecordId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// Local sync state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            _ => Err(format!(
                "Invalid sync status '{}'. Valid options: pending, synced",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub fields: Fields,
    pub sync_status: Option<SyncStatus>,
    /// Last remote version observed for this id; 0 means never seen remotely.
    pub version: i64,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
            sync_status: None,
            version: 0,
        }
    }

    pub fn pending(id: impl Into<RecordId>, fields: Fields) -> Self {
        Self::new(id, fields).with_status(SyncStatus::Pending)
    }

    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = Some(status);
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.sync_status == Some(SyncStatus::Pending)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Shallow merge: every field in `other` overwrites the local value.
    pub fn merge_fields(&mut self, other: &Fields) {
        for (key, value) in other {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    /// Builds a record from a remote row.
    ///
    /// `sync_status` is local bookkeeping and is dropped if a row carries it.
    /// The returned record has no status; callers stamp it.
    pub fn from_row(mut row: Row) -> Result<Self, RecordError> {
        let id = row
            .remove(ID_FIELD)
            .ok_or(RecordError::MissingId)
            .and_then(|v| RecordId::from_value(&v))?;
        row.remove(SYNC_STATUS_FIELD);
        let version = row
            .remove(VERSION_FIELD)
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        Ok(Self {
            id,
            fields: row,
            sync_status: None,
            version,
        })
    }

    /// Renders the record as a remote row: payload, typed id and version,
    /// without `sync_status`.
    pub fn to_row(&self, key_kind: KeyKind, version: i64) -> Result<Row, RecordError> {
        let mut row = self.fields.clone();
        row.remove(SYNC_STATUS_FIELD);
        row.insert(ID_FIELD.to_string(), self.id.to_value(key_kind)?);
        row.insert(VERSION_FIELD.to_string(), Value::from(version));
        Ok(row)
    }

    /// Flattened view for display: payload plus id, status and version.
    pub fn to_display_row(&self) -> Row {
        let mut row = Row::new();
        row.insert(ID_FIELD.to_string(), Value::String(self.id.to_string()));
        row.extend(self.fields.clone());
        if let Some(status) = self.sync_status {
            row.insert(
                SYNC_STATUS_FIELD.to_string(),
                Value::String(status.to_string()),
            );
        }
        row.insert(VERSION_FIELD.to_string(), Value::from(self.version));
        row
    }
}

/// Turns a JSON value into a field map, rejecting non-objects.
pub fn fields_from_value(value: Value) -> Result<Fields, RecordError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(RecordError::NotAnObject),
    }
}
