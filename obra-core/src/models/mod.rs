mod accounts;
mod conflict;
mod entity;
mod finance;
mod project;
mod record;
mod reference;
mod task;
mod workspace;

pub use accounts::{Payable, Receivable};
pub use conflict::{Conflict, ConflictKind};
pub use entity::Entity;
pub use finance::{FinanceEntry, FinanceKind};
pub use project::{Project, ProjectStatus};
pub use record::{
    fields_from_value, Fields, Record, RecordError, RecordId, Row, SyncStatus, ID_FIELD,
    SYNC_STATUS_FIELD, VERSION_FIELD,
};
pub use reference::{InventoryItem, ToolRef};
pub use task::Task;
pub use workspace::{CreativeArtifact, FolderItem};
