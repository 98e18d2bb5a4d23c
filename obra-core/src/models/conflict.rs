use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::record::{Fields, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    /// A remote row diverged from an unpushed local edit.
    Diverged,
    /// The remote store deleted a row that still had an unpushed local edit.
    DeletedWhilePending,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::Diverged => write!(f, "diverged"),
            ConflictKind::DeletedWhilePending => write!(f, "deleted-while-pending"),
        }
    }
}

impl FromStr for ConflictKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "diverged" => Ok(ConflictKind::Diverged),
            "deleted-while-pending" => Ok(ConflictKind::DeletedWhilePending),
            _ => Err(format!("Invalid conflict kind '{}'", s)),
        }
    }
}

/// A detected divergence between a pending local record and the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub table: String,
    pub id: RecordId,
    pub kind: ConflictKind,
    pub local: Fields,
    /// Remote payload, absent for remote deletions.
    pub remote: Option<Fields>,
    pub remote_version: i64,
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    pub fn diverged(
        table: impl Into<String>,
        id: RecordId,
        local: Fields,
        remote: Fields,
        remote_version: i64,
    ) -> Self {
        Self {
            table: table.into(),
            id,
            kind: ConflictKind::Diverged,
            local,
            remote: Some(remote),
            remote_version,
            detected_at: Utc::now(),
        }
    }

    pub fn deleted_while_pending(table: impl Into<String>, id: RecordId, local: Fields) -> Self {
        Self {
            table: table.into(),
            id,
            kind: ConflictKind::DeletedWhilePending,
            local,
            remote: None,
            remote_version: 0,
            detected_at: Utc::now(),
        }
    }

    /// Names of the payload fields whose values differ between both sides.
    pub fn differing_fields(&self) -> Vec<String> {
        let Some(remote) = &self.remote else {
            return self.local.keys().cloned().collect();
        };

        let mut keys: Vec<String> = self
            .local
            .keys()
            .chain(remote.keys())
            .filter(|k| self.local.get(*k) != remote.get(*k))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}
