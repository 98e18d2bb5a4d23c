//! Static table registry.
//!
//! Maps every [`EntityKind`] to its table metadata: physical table name,
//! primary-key kind, pull policy and whether the table tracks
//! `sync_status`. The registry is validated once at construction so a bad
//! table name fails before any sync cycle runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("table name registered twice: {0}")]
    DuplicateTable(String),

    #[error("entity kind registered twice: {0}")]
    DuplicateKind(EntityKind),

    #[error("entity kind has no table: {0}")]
    MissingKind(EntityKind),

    #[error("invalid table name '{0}': use lowercase letters, digits and underscores")]
    InvalidName(String),
}

/// Every entity type the application stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    Task,
    Finance,
    Inventory,
    Tool,
    Payable,
    Receivable,
    Folder,
    Creative,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Project,
        EntityKind::Task,
        EntityKind::Finance,
        EntityKind::Inventory,
        EntityKind::Tool,
        EntityKind::Payable,
        EntityKind::Receivable,
        EntityKind::Folder,
        EntityKind::Creative,
    ];

    /// High-churn tables pushed together by `push_execution_data`.
    pub const EXECUTION: [EntityKind; 6] = [
        EntityKind::Task,
        EntityKind::Finance,
        EntityKind::Payable,
        EntityKind::Receivable,
        EntityKind::Folder,
        EntityKind::Creative,
    ];

    /// Read-mostly tables refreshed by `pull_reference_data`.
    pub const REFERENCE: [EntityKind; 2] = [EntityKind::Inventory, EntityKind::Tool];

    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Task => "task",
            EntityKind::Finance => "finance",
            EntityKind::Inventory => "inventory",
            EntityKind::Tool => "tool",
            EntityKind::Payable => "payable",
            EntityKind::Receivable => "receivable",
            EntityKind::Folder => "folder",
            EntityKind::Creative => "creative",
        }
    }

    /// Key kind declared for the standard schema.
    pub fn key_kind(&self) -> KeyKind {
        match self {
            EntityKind::Inventory | EntityKind::Tool => KeyKind::Numeric,
            _ => KeyKind::Opaque,
        }
    }

    /// Table metadata of the standard hosted schema.
    pub fn default_spec(self) -> TableSpec {
        let (name, pull_policy, tracks_status) = match self {
            EntityKind::Project => ("proyectos", PullPolicy::Merge, true),
            EntityKind::Task => ("tareas", PullPolicy::Merge, true),
            EntityKind::Finance => ("finanzas", PullPolicy::Merge, true),
            EntityKind::Inventory => ("inventario", PullPolicy::Replace, false),
            EntityKind::Tool => ("herramientas", PullPolicy::Replace, false),
            EntityKind::Payable => ("cuentas_por_pagar", PullPolicy::Merge, true),
            EntityKind::Receivable => ("cuentas_por_cobrar", PullPolicy::Merge, true),
            EntityKind::Folder => ("carpetas", PullPolicy::Merge, true),
            EntityKind::Creative => ("creativos", PullPolicy::Merge, true),
        };

        TableSpec {
            kind: self,
            name,
            key_kind: self.key_kind(),
            pull_policy,
            tracks_status,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.label() == lower)
            .ok_or_else(|| format!("Invalid entity kind '{}'", s))
    }
}

/// Primary-key type of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Numeric,
    Opaque,
}

/// How a pull cycle folds remote rows into the local table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullPolicy {
    /// Shallow-merge remote fields over existing local rows.
    Merge,
    /// Local table becomes exactly the remote row set.
    Replace,
}

impl fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullPolicy::Merge => write!(f, "merge"),
            PullPolicy::Replace => write!(f, "replace"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub kind: EntityKind,
    pub name: &'static str,
    pub key_kind: KeyKind,
    pub pull_policy: PullPolicy,
    /// Whether rows carry `sync_status` and participate in push.
    pub tracks_status: bool,
}

#[derive(Debug, Clone)]
pub struct TableRegistry {
    specs: Vec<TableSpec>,
    by_name: HashMap<&'static str, usize>,
    by_kind: HashMap<EntityKind, usize>,
}

impl TableRegistry {
    /// Builds a registry, checking that every entity kind maps to exactly
    /// one uniquely named table.
    pub fn new(specs: Vec<TableSpec>) -> Result<Self, RegistryError> {
        let mut by_name = HashMap::new();
        let mut by_kind = HashMap::new();

        for (index, spec) in specs.iter().enumerate() {
            if !is_valid_table_name(spec.name) {
                return Err(RegistryError::InvalidName(spec.name.to_string()));
            }
            if by_name.insert(spec.name, index).is_some() {
                return Err(RegistryError::DuplicateTable(spec.name.to_string()));
            }
            if by_kind.insert(spec.kind, index).is_some() {
                return Err(RegistryError::DuplicateKind(spec.kind));
            }
        }

        if let Some(missing) = EntityKind::ALL
            .into_iter()
            .find(|kind| !by_kind.contains_key(kind))
        {
            return Err(RegistryError::MissingKind(missing));
        }

        Ok(Self {
            specs,
            by_name,
            by_kind,
        })
    }

    /// The registry of the standard hosted schema.
    pub fn standard() -> Self {
        let specs: Vec<TableSpec> = EntityKind::ALL
            .into_iter()
            .map(EntityKind::default_spec)
            .collect();
        let by_name = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name, i))
            .collect();
        let by_kind = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.kind, i))
            .collect();

        Self {
            specs,
            by_name,
            by_kind,
        }
    }

    pub fn spec(&self, kind: EntityKind) -> &TableSpec {
        // Construction guarantees every kind is present.
        &self.specs[self.by_kind[&kind]]
    }

    /// Resolves a table name, or an entity label such as `project`.
    pub fn resolve(&self, name: &str) -> Result<&TableSpec, RegistryError> {
        if let Some(index) = self.by_name.get(name) {
            return Ok(&self.specs[*index]);
        }
        EntityKind::from_str(name)
            .map(|kind| self.spec(kind))
            .map_err(|_| RegistryError::UnknownTable(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableSpec> {
        self.specs.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.specs.iter().map(|spec| spec.name).collect()
    }

    /// Tables that track `sync_status` and therefore participate in push.
    pub fn status_tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.specs.iter().filter(|spec| spec.tracks_status)
    }
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_specs() -> Vec<TableSpec> {
        EntityKind::ALL
            .into_iter()
            .map(EntityKind::default_spec)
            .collect()
    }

    #[test]
    fn test_standard_registry_validates() {
        let validated = TableRegistry::new(default_specs()).unwrap();
        let standard = TableRegistry::standard();
        assert_eq!(validated.names(), standard.names());
    }

    #[test]
    fn test_resolve_by_table_name_and_label() {
        let registry = TableRegistry::standard();

        assert_eq!(
            registry.resolve("proyectos").unwrap().kind,
            EntityKind::Project
        );
        assert_eq!(registry.resolve("tool").unwrap().name, "herramientas");
        assert_eq!(
            registry.resolve("usuarios"),
            Err(RegistryError::UnknownTable("usuarios".to_string()))
        );
    }

    #[test]
    fn test_duplicate_table_name_rejected() {
        let mut specs = default_specs();
        specs[1].name = "proyectos";

        assert_eq!(
            TableRegistry::new(specs).unwrap_err(),
            RegistryError::DuplicateTable("proyectos".to_string())
        );
    }

    #[test]
    fn test_missing_kind_rejected() {
        let mut specs = default_specs();
        specs.retain(|spec| spec.kind != EntityKind::Folder);

        assert_eq!(
            TableRegistry::new(specs).unwrap_err(),
            RegistryError::MissingKind(EntityKind::Folder)
        );
    }

    #[test]
    fn test_invalid_name_rejected() {
        let mut specs = default_specs();
        specs[0].name = "proyectos; DROP TABLE x";

        assert!(matches!(
            TableRegistry::new(specs),
            Err(RegistryError::InvalidName(_))
        ));
    }

    #[test]
    fn test_reference_tables_are_numeric_and_untracked() {
        let registry = TableRegistry::standard();
        for kind in EntityKind::REFERENCE {
            let spec = registry.spec(kind);
            assert_eq!(spec.key_kind, KeyKind::Numeric);
            assert_eq!(spec.pull_policy, PullPolicy::Replace);
            assert!(!spec.tracks_status);
        }
        assert_eq!(registry.status_tables().count(), 7);
    }
}
