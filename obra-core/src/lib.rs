//! Obra Core Library
//!
//! Offline-first records for construction project management and the engine
//! that keeps them in sync with a remote store.

pub mod engine;
pub mod error;
pub mod models;
pub mod records;
pub mod registry;
pub mod remote;
pub mod store;

pub use engine::{
    ApplyOutcome, BatchReport, ConflictPolicy, EngineOptions, PendingCount, PullReport,
    PushFailure, PushReport, RealtimeHandle, ResetReport, SyncEngine, SyncTicket, TableFailure,
};
pub use error::SyncError;
pub use models::{
    fields_from_value, Conflict, ConflictKind, CreativeArtifact, Entity, Fields, FinanceEntry,
    FinanceKind, FolderItem, InventoryItem, Payable, Project, ProjectStatus, Receivable, Record,
    RecordError, RecordId, Row, SyncStatus, Task, ToolRef,
};
pub use records::Records;
pub use registry::{EntityKind, KeyKind, PullPolicy, RegistryError, TableRegistry, TableSpec};
pub use remote::{
    ChangeEvent, ChangeMatcher, ChangeType, FeedMessage, MemoryRemote, MemoryTables, Predicate,
    RemoteError, RemoteStore, RestClient,
};
pub use store::{LocalStore, MemoryStore, SqliteStore, StoreError, WriteOp};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
