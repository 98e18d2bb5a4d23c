//! Remote store: the hosted relational database the local store syncs with.
//!
//! [`RemoteStore`] is the logical contract (table-scoped upsert, select-all,
//! delete-by-predicate and a row-level change feed). [`RestClient`] talks to
//! a hosted instance over HTTP and WebSocket; [`MemoryRemote`] is an
//! in-process double.

mod memory;
mod predicate;
mod protocol;
mod realtime;
mod rest;

pub use memory::{MemoryRemote, MemoryTables};
pub use predicate::Predicate;
pub use protocol::FeedMessage;
pub use rest::RestClient;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use thiserror::Error;

use crate::models::Row;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("connection error: {0}")]
    Transport(String),

    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("remote table does not exist: {0}")]
    TableMissing(String),

    #[error("could not decode remote response: {0}")]
    Decode(String),

    #[error("invalid remote url: {0}")]
    InvalidUrl(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("change feed handshake failed: {0}")]
    Handshake(String),

    #[error("change feed handshake timed out")]
    HandshakeTimeout,

    #[error("change feed error: {0}")]
    Feed(String),

    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    /// Whether the remote store refused the request itself (4xx other than
    /// 408 and 429), as opposed to a failure worth retrying.
    pub fn is_rejection(&self) -> bool {
        match self {
            RemoteError::TableMissing(_) => true,
            RemoteError::Status { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Insert => write!(f, "INSERT"),
            ChangeType::Update => write!(f, "UPDATE"),
            ChangeType::Delete => write!(f, "DELETE"),
        }
    }
}

/// One row-level change delivered by the change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub event_type: ChangeType,
    /// Row after the change; absent for deletes.
    #[serde(default)]
    pub new: Option<Row>,
    /// Row before the change; for deletes it carries at least the id.
    #[serde(default)]
    pub old: Option<Row>,
}

impl ChangeEvent {
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Self {
            table: table.into(),
            event_type: ChangeType::Insert,
            new: Some(row),
            old: None,
        }
    }

    pub fn update(table: impl Into<String>, row: Row) -> Self {
        Self {
            table: table.into(),
            event_type: ChangeType::Update,
            new: Some(row),
            old: None,
        }
    }

    pub fn delete(table: impl Into<String>, old: Row) -> Self {
        Self {
            table: table.into(),
            event_type: ChangeType::Delete,
            new: None,
            old: Some(old),
        }
    }
}

/// Which tables a change-feed subscription wants. Empty means all tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMatcher {
    pub tables: Vec<String>,
}

impl ChangeMatcher {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, table: &str) -> bool {
        self.tables.is_empty() || self.tables.iter().any(|t| t == table)
    }
}

/// Live change feed. Ends when the connection closes; errors are terminal.
pub type ChangeStream = Pin<Box<dyn Stream<Item = Result<ChangeEvent, RemoteError>> + Send>>;

/// Table-scoped access to the remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Inserts or updates rows by primary key and returns the committed rows.
    async fn upsert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, RemoteError>;

    async fn select_all(&self, table: &str) -> Result<Vec<Row>, RemoteError>;

    async fn delete_where(&self, table: &str, predicate: &Predicate) -> Result<(), RemoteError>;

    /// Opens a change-feed subscription. Nothing missed while disconnected
    /// is replayed.
    async fn subscribe_changes(&self, matcher: &ChangeMatcher) -> Result<ChangeStream, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        let status = |status| RemoteError::Status {
            status,
            body: String::new(),
        };

        assert!(status(400).is_rejection());
        assert!(status(409).is_rejection());
        assert!(!status(408).is_rejection());
        assert!(!status(429).is_rejection());
        assert!(!status(503).is_rejection());
        assert!(RemoteError::TableMissing("x".to_string()).is_rejection());
        assert!(!RemoteError::Transport("refused".to_string()).is_rejection());
    }

    #[test]
    fn test_change_matcher() {
        assert!(ChangeMatcher::all().matches("proyectos"));

        let matcher = ChangeMatcher::tables(["tareas"]);
        assert!(matcher.matches("tareas"));
        assert!(!matcher.matches("proyectos"));
    }

    #[test]
    fn test_change_event_wire_shape() {
        let json = r#"{"table":"tareas","event_type":"DELETE","old":{"id":"t1"}}"#;
        let event: ChangeEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.event_type, ChangeType::Delete);
        assert!(event.new.is_none());
        assert_eq!(event.old.unwrap()["id"], "t1");
    }
}
