mod config_cmd;
mod project;
mod record;
mod sync_cmd;
mod task;
mod watch;

pub use config_cmd::ConfigCommand;
pub use project::ProjectCommand;
pub use record::RecordCommand;
pub use sync_cmd::SyncCommand;
pub use task::TaskCommand;
pub use watch::WatchCommand;

use async_trait::async_trait;
use clap::ValueEnum;
use obra::config::Config;
use obra_core::remote::ChangeStream;
use obra_core::{
    ChangeMatcher, EntityKind, Predicate, RecordError, Records, RemoteError, RemoteStore,
    RestClient, Row, SqliteStore, SyncEngine, SyncError, TableRegistry,
};
use std::io::{self, Write};
use std::sync::Arc;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Remote used when no remote store is configured; every call fails, so
/// local writes simply stay pending.
struct Disconnected;

fn disconnected() -> RemoteError {
    RemoteError::Unavailable("no remote store configured".to_string())
}

#[async_trait]
impl RemoteStore for Disconnected {
    async fn upsert(&self, _table: &str, _rows: Vec<Row>) -> Result<Vec<Row>, RemoteError> {
        Err(disconnected())
    }

    async fn select_all(&self, _table: &str) -> Result<Vec<Row>, RemoteError> {
        Err(disconnected())
    }

    async fn delete_where(&self, _table: &str, _predicate: &Predicate) -> Result<(), RemoteError> {
        Err(disconnected())
    }

    async fn subscribe_changes(
        &self,
        _matcher: &ChangeMatcher,
    ) -> Result<ChangeStream, RemoteError> {
        Err(disconnected())
    }
}

/// Everything a command needs: the engine over the local database and
/// whether a remote store is reachable by configuration.
pub struct App {
    pub engine: SyncEngine,
    pub online: bool,
    pub auto_sync: bool,
}

impl App {
    pub async fn open(config: &Config) -> Result<Self, CommandError> {
        let registry = Arc::new(TableRegistry::standard());
        let store = SqliteStore::open(&config.database_path.value, &registry)
            .await
            .map_err(SyncError::from)?;

        let (remote, online): (Arc<dyn RemoteStore>, bool) =
            match (&config.remote.url, &config.remote.api_key) {
                (Some(url), Some(key)) => (Arc::new(RestClient::new(url, key)?), true),
                _ => (Arc::new(Disconnected), false),
            };

        Ok(Self {
            engine: SyncEngine::new(Arc::new(store), remote, registry, config.engine_options()),
            online,
            auto_sync: config.remote.auto_sync,
        })
    }

    pub fn records(&self) -> &Records {
        self.engine.records()
    }

    pub fn require_online(&self) -> Result<&SyncEngine, CommandError> {
        if self.online {
            Ok(&self.engine)
        } else {
            Err(CommandError::NotConfigured)
        }
    }

    /// Pushes the table after a local write when auto-sync is on. Failures
    /// only warn; the write itself already succeeded and stays pending.
    pub async fn after_write(&self, kind: EntityKind) {
        if !(self.online && self.auto_sync) {
            tracing::debug!(table = %kind, "Auto-sync off; change left pending");
            return;
        }

        match self.engine.trigger_sync(kind).wait().await {
            Ok(report) if report.has_failures() => {
                eprintln!(
                    "Warning: {} change(s) not synced yet; they stay pending",
                    report.failed.len()
                );
            }
            Ok(_) => {}
            Err(e) => eprintln!("Warning: sync failed: {}", e),
        }
    }
}

/// Asks for confirmation on stdin.
pub fn confirm(prompt: &str) -> Result<bool, CommandError> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush().map_err(CommandError::Io)?;

    let mut input = String::new();
    io::stdin().read_line(&mut input).map_err(CommandError::Io)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Errors from CLI commands
#[derive(Debug)]
pub enum CommandError {
    NotConfigured,
    NotFound(&'static str, String),
    Ambiguous(&'static str, String, usize),
    InvalidInput(String),
    Sync(SyncError),
    Json(serde_json::Error),
    Io(io::Error),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::NotConfigured => write!(
                f,
                "No remote store configured. Set remote.url and remote.api_key in the config file or OBRA_REMOTE_URL and OBRA_API_KEY"
            ),
            CommandError::NotFound(what, identifier) => {
                write!(f, "{} not found: {}", what, identifier)
            }
            CommandError::Ambiguous(what, identifier, count) => write!(
                f,
                "{} matches {} {}s; use the id instead",
                identifier, count, what
            ),
            CommandError::InvalidInput(message) => write!(f, "{}", message),
            CommandError::Sync(e) => write!(f, "{}", e),
            CommandError::Json(e) => write!(f, "Invalid JSON: {}", e),
            CommandError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Sync(e) => Some(e),
            CommandError::Json(e) => Some(e),
            CommandError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SyncError> for CommandError {
    fn from(e: SyncError) -> Self {
        CommandError::Sync(e)
    }
}

impl From<RemoteError> for CommandError {
    fn from(e: RemoteError) -> Self {
        CommandError::Sync(e.into())
    }
}

impl From<RecordError> for CommandError {
    fn from(e: RecordError) -> Self {
        CommandError::Sync(e.into())
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(e: serde_json::Error) -> Self {
        CommandError::Json(e)
    }
}
