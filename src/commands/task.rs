use chrono::NaiveDate;
use clap::{Args, Subcommand};
use obra_core::{EntityKind, Fields, Record, RecordId, Task};
use serde_json::{json, Value};
use uuid::Uuid;

use super::project::resolve_project;
use super::{App, CommandError, OutputFormat};

#[derive(Args)]
pub struct TaskCommand {
    #[command(subcommand)]
    pub command: TaskSubcommand,
}

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// Add a task to a project
    Add {
        /// Project ID (UUID) or name
        project: String,

        /// Task title
        title: String,

        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<NaiveDate>,
    },

    /// List tasks
    List {
        /// Only tasks of this project (ID or name)
        #[arg(long, short)]
        project: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Mark a task as done
    Done {
        /// Task ID
        id: Uuid,
    },

    /// Delete a task
    Delete {
        /// Task ID
        id: Uuid,
    },
}

impl TaskCommand {
    pub async fn run(&self, app: &App) -> Result<(), CommandError> {
        let records = app.records();

        match &self.command {
            TaskSubcommand::Add {
                project,
                title,
                due,
            } => {
                if title.trim().is_empty() {
                    return Err(CommandError::InvalidInput(
                        "Task title cannot be empty".to_string(),
                    ));
                }

                let project = resolve_project(records, project).await?;
                let project_id = Uuid::parse_str(project.id.as_str()).map_err(|_| {
                    CommandError::InvalidInput(format!(
                        "Project id is not a UUID: {}",
                        project.id
                    ))
                })?;

                let mut task = Task::new(project_id, title.trim());
                if let Some(due) = due {
                    task = task.with_fecha_limite(*due);
                }

                let record = records.save_entity(&task).await?;
                println!("Created task {}: {}", record.id, task.titulo);
                app.after_write(EntityKind::Task).await;
                Ok(())
            }

            TaskSubcommand::List { project, format } => {
                let mut tasks = match project {
                    Some(identifier) => {
                        let project = resolve_project(records, identifier).await?;
                        records
                            .find(EntityKind::Task, "proyecto_id", &json!(project.id.as_str()))
                            .await?
                    }
                    None => records.list(EntityKind::Task).await?,
                };
                tasks.sort_by(|a, b| due_date(a).cmp(&due_date(b)));

                if tasks.is_empty() {
                    println!("No tasks found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        let rows: Vec<_> = tasks.iter().map(Record::to_display_row).collect();
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    }
                    OutputFormat::Text => {
                        println!("{:<36}  {:<4}  {:<10}  TITLE", "ID", "DONE", "DUE");
                        println!("{}", "-".repeat(80));
                        for record in &tasks {
                            let done = record
                                .field("completada")
                                .and_then(Value::as_bool)
                                .unwrap_or(false);
                            println!(
                                "{:<36}  {:<4}  {:<10}  {}",
                                record.id,
                                if done { "x" } else { "" },
                                due_date(record).unwrap_or(""),
                                record.field("titulo").and_then(Value::as_str).unwrap_or("")
                            );
                        }
                        println!("\nTotal: {} task(s)", tasks.len());
                    }
                }
                Ok(())
            }

            TaskSubcommand::Done { id } => {
                let mut fields = Fields::new();
                fields.insert("completada".to_string(), json!(true));
                let record = records
                    .edit(EntityKind::Task, &RecordId::from(*id), fields)
                    .await
                    .map_err(|e| not_found_or(e, id))?;
                println!("Completed task: {}", record.id);
                app.after_write(EntityKind::Task).await;
                Ok(())
            }

            TaskSubcommand::Delete { id } => {
                if !records.remove(EntityKind::Task, &RecordId::from(*id)).await? {
                    return Err(CommandError::NotFound("Task", id.to_string()));
                }
                println!("Deleted task: {}", id);
                app.after_write(EntityKind::Task).await;
                Ok(())
            }
        }
    }
}

fn due_date(record: &Record) -> Option<&str> {
    record.field("fecha_limite").and_then(Value::as_str)
}

fn not_found_or(error: obra_core::SyncError, id: &Uuid) -> CommandError {
    match error {
        obra_core::SyncError::Store(obra_core::StoreError::NotFound { .. }) => {
            CommandError::NotFound("Task", id.to_string())
        }
        other => other.into(),
    }
}
