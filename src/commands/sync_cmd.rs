//! Sync CLI commands for exchanging records with the remote store.

use clap::{Args, Subcommand};
use obra::config::Config;
use obra_core::{
    BatchReport, EntityKind, PullPolicy, PullReport, PushReport, RecordId, RemoteError,
    RestClient, SyncError, TableFailure, TableSpec,
};

use super::{confirm, App, CommandError};

/// Sync with the remote store
#[derive(Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Subcommand)]
enum SyncSubcommand {
    /// Push pending records (one table, or every table)
    Push { table: Option<String> },

    /// Pull remote rows (one table, or every table)
    Pull {
        table: Option<String>,

        /// Make the local table exactly the remote row set
        #[arg(long)]
        replace: bool,
    },

    /// Push then pull the projects table
    Projects,

    /// Push every execution table (tasks, finance, accounts, folders, creative)
    Execution,

    /// Refresh the reference tables (inventory, tools)
    Reference,

    /// Show sync configuration, server status and pending changes
    Status,

    /// List recorded conflicts
    Conflicts,

    /// Forget a recorded conflict
    Dismiss { table: String, id: String },

    /// Delete every remote row and wipe the local database
    Reset {
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl SyncCommand {
    pub async fn run(&self, app: &App, config: &Config) -> Result<(), CommandError> {
        match &self.command {
            None => {
                let engine = app.require_online()?;
                println!("Syncing with remote store...\n");
                finish_batch(engine.sync_all().await)
            }
            Some(SyncSubcommand::Push { table }) => {
                let engine = app.require_online()?;
                match table {
                    Some(table) => {
                        let spec = resolve(app, table)?;
                        let report = engine.push(spec.kind).await?;
                        print_push(&report);
                        if report.has_failures() {
                            return Err(CommandError::InvalidInput(format!(
                                "{} record(s) failed to push",
                                report.failed.len()
                            )));
                        }
                        Ok(())
                    }
                    None => {
                        let mut batch = BatchReport::default();
                        for spec in engine.registry().status_tables() {
                            match engine.push(spec.kind).await {
                                Ok(report) => batch.pushes.push(report),
                                Err(e) => batch.failures.push(TableFailure {
                                    table: spec.name.to_string(),
                                    error: e.to_string(),
                                }),
                            }
                        }
                        finish_batch(batch)
                    }
                }
            }
            Some(SyncSubcommand::Pull { table, replace }) => {
                let engine = app.require_online()?;
                let kinds: Vec<EntityKind> = match table {
                    Some(table) => vec![resolve(app, table)?.kind],
                    None => EntityKind::ALL.to_vec(),
                };

                let mut batch = BatchReport::default();
                for kind in kinds {
                    let result = if *replace {
                        engine.pull_with(kind, PullPolicy::Replace).await
                    } else {
                        engine.pull(kind).await
                    };
                    match result {
                        Ok(report) => batch.pulls.push(report),
                        Err(e) => batch.failures.push(TableFailure {
                            table: engine.registry().spec(kind).name.to_string(),
                            error: e.to_string(),
                        }),
                    }
                }
                finish_batch(batch)
            }
            Some(SyncSubcommand::Projects) => {
                finish_batch(app.require_online()?.sync_projects().await)
            }
            Some(SyncSubcommand::Execution) => {
                finish_batch(app.require_online()?.push_execution_data().await)
            }
            Some(SyncSubcommand::Reference) => {
                finish_batch(app.require_online()?.pull_reference_data().await)
            }
            Some(SyncSubcommand::Status) => self.status(app, config).await,
            Some(SyncSubcommand::Conflicts) => {
                let conflicts = app.engine.conflicts().await?;
                if conflicts.is_empty() {
                    println!("No conflicts");
                    return Ok(());
                }
                for conflict in &conflicts {
                    println!(
                        "{} {} ({}, remote v{}, {})",
                        conflict.table,
                        conflict.id,
                        conflict.kind,
                        conflict.remote_version,
                        conflict.detected_at.format("%Y-%m-%d %H:%M")
                    );
                    let fields = conflict.differing_fields();
                    if !fields.is_empty() {
                        println!("  differs: {}", fields.join(", "));
                    }
                }
                println!("\nTotal: {} conflict(s)", conflicts.len());
                Ok(())
            }
            Some(SyncSubcommand::Dismiss { table, id }) => {
                let spec = resolve(app, table)?;
                app.engine
                    .dismiss_conflict(spec.kind, &RecordId::new(id.as_str()))
                    .await?;
                println!("Dismissed conflict on {} {}", spec.name, id);
                Ok(())
            }
            Some(SyncSubcommand::Reset { force }) => {
                let engine = app.require_online()?;
                if !force && !confirm("Delete ALL remote rows and wipe the local database?")? {
                    println!("Cancelled");
                    return Ok(());
                }

                let report = engine.reset_all().await?;
                println!("Cleared {} remote table(s)", report.cleared.len());
                for failure in &report.failed {
                    println!("  ✗ {}: {}", failure.table, failure.error);
                }
                println!("Local database wiped");
                Ok(())
            }
        }
    }

    async fn status(&self, app: &App, config: &Config) -> Result<(), CommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        match (&config.remote.url, &config.remote.api_key) {
            (Some(url), Some(key)) => {
                println!("Remote:    {}", url);
                println!(
                    "Auto-sync: {}",
                    if config.remote.auto_sync {
                        "enabled"
                    } else {
                        "disabled"
                    }
                );
                print!("Status:    ");
                match RestClient::new(url, key)?.health().await {
                    Ok(()) => println!("✓ reachable"),
                    Err(RemoteError::Transport(_)) => println!("✗ unreachable"),
                    Err(e) => println!("✗ error: {}", e),
                }
            }
            _ => {
                println!("Remote: Not configured");
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  remote:");
                println!("    url: \"http://localhost:8787\"");
                println!("    api_key: \"your-api-key\"");
                println!();
                println!("Or set OBRA_REMOTE_URL and OBRA_API_KEY");
            }
        }
        println!();

        println!("Pending changes");
        println!("---------------");
        let mut total = 0;
        for count in app.engine.pending_counts().await? {
            total += count.pending + count.tombstones;
            if count.pending + count.tombstones > 0 {
                println!(
                    "  {:<20} {} pending, {} deleted",
                    count.table, count.pending, count.tombstones
                );
            }
        }
        if total == 0 {
            println!("  Everything is synced");
        }

        let conflicts = app.engine.conflicts().await?.len();
        if conflicts > 0 {
            println!();
            println!("{} conflict(s); run `obra sync conflicts`", conflicts);
        }
        Ok(())
    }
}

fn resolve<'a>(app: &'a App, table: &str) -> Result<&'a TableSpec, CommandError> {
    app.engine
        .registry()
        .resolve(table)
        .map_err(|e| CommandError::Sync(SyncError::from(e)))
}

fn print_push(report: &PushReport) {
    let mark = if report.has_failures() { "✗" } else { "✓" };
    println!("  {} push {}", mark, report);
    for failure in &report.failed {
        let reason = if failure.rejected { "rejected" } else { "failed" };
        println!("      {} {}: {}", failure.id, reason, failure.error);
    }
}

fn print_pull(report: &PullReport) {
    println!("  ✓ pull {}", report);
    for conflict in &report.conflicts {
        println!("      conflict on {} ({})", conflict.id, conflict.kind);
    }
}

/// Prints a batch report and turns table failures into an error exit.
fn finish_batch(batch: BatchReport) -> Result<(), CommandError> {
    for push in &batch.pushes {
        print_push(push);
    }
    for pull in &batch.pulls {
        print_pull(pull);
    }
    for failure in &batch.failures {
        println!("  ✗ {}: {}", failure.table, failure.error);
    }

    println!();
    if batch.is_success() {
        println!("Sync complete.");
        Ok(())
    } else {
        Err(CommandError::InvalidInput(
            "Sync finished with failures; pending changes will be retried".to_string(),
        ))
    }
}
