use chrono::NaiveDate;
use clap::{Args, Subcommand};
use obra_core::{EntityKind, Fields, Project, ProjectStatus, Record, RecordId, Records};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{confirm, App, CommandError, OutputFormat};

#[derive(Args)]
pub struct ProjectCommand {
    #[command(subcommand)]
    pub command: ProjectSubcommand,
}

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// Create a new project
    Add {
        /// Project name
        name: String,

        /// Client name
        #[arg(long)]
        client: Option<String>,

        /// Budget
        #[arg(long)]
        budget: Option<f64>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
    },

    /// List all projects
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a project's details
    Show {
        /// Project ID (UUID) or name
        identifier: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Rename a project
    Rename {
        /// Project ID (UUID) or name
        identifier: String,

        /// New name
        name: String,
    },

    /// Set a project's budget
    Budget {
        /// Project ID (UUID) or name
        identifier: String,

        /// New budget
        amount: f64,
    },

    /// Change a project's status
    Status {
        /// Project ID (UUID) or name
        identifier: String,

        /// activo, pausado or terminado
        status: ProjectStatus,
    },

    /// Delete a project
    Delete {
        /// Project ID (UUID) or name
        identifier: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

/// Finds a project by UUID, falling back to an exact name match.
pub(crate) async fn resolve_project(
    records: &Records,
    identifier: &str,
) -> Result<Record, CommandError> {
    if let Ok(uuid) = Uuid::parse_str(identifier) {
        if let Some(record) = records.get(EntityKind::Project, &RecordId::from(uuid)).await? {
            return Ok(record);
        }
    }

    let mut matches = records
        .find(EntityKind::Project, "nombre_proyecto", &json!(identifier))
        .await?;
    match matches.len() {
        0 => Err(CommandError::NotFound("Project", identifier.to_string())),
        1 => Ok(matches.remove(0)),
        n => Err(CommandError::Ambiguous("project", identifier.to_string(), n)),
    }
}

fn field_str<'a>(record: &'a Record, name: &str) -> &'a str {
    record.field(name).and_then(Value::as_str).unwrap_or("")
}

fn print_project(record: &Record) {
    println!("ID:      {}", record.id);
    println!("Name:    {}", field_str(record, "nombre_proyecto"));
    if let Some(client) = record.field("cliente").and_then(Value::as_str) {
        println!("Client:  {}", client);
    }
    if let Some(budget) = record.field("presupuesto").and_then(Value::as_f64) {
        println!("Budget:  {:.2}", budget);
    }
    println!("Status:  {}", field_str(record, "estado"));
    if let Some(start) = record.field("fecha_inicio").and_then(Value::as_str) {
        println!("Start:   {}", start);
    }
    if let Some(status) = record.sync_status {
        println!("Sync:    {}", status);
    }
}

impl ProjectCommand {
    pub async fn run(&self, app: &App) -> Result<(), CommandError> {
        let records = app.records();

        match &self.command {
            ProjectSubcommand::Add {
                name,
                client,
                budget,
                start,
            } => {
                if name.trim().is_empty() {
                    return Err(CommandError::InvalidInput(
                        "Project name cannot be empty".to_string(),
                    ));
                }

                let mut project = Project::new(name.trim());
                if let Some(client) = client {
                    project = project.with_cliente(client);
                }
                if let Some(budget) = budget {
                    project = project.with_presupuesto(*budget);
                }
                if let Some(start) = start {
                    project = project.with_fecha_inicio(*start);
                }

                let record = records.save_entity(&project).await?;
                println!("Created project:");
                print_project(&record);
                app.after_write(EntityKind::Project).await;
                Ok(())
            }

            ProjectSubcommand::List { format } => {
                let projects = records.list(EntityKind::Project).await?;
                if projects.is_empty() {
                    println!("No projects found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        let rows: Vec<_> = projects.iter().map(Record::to_display_row).collect();
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    }
                    OutputFormat::Text => {
                        println!("{:<36}  {:<30}  {:<10}  SYNC", "ID", "NAME", "STATUS");
                        println!("{}", "-".repeat(90));
                        for record in &projects {
                            let name = field_str(record, "nombre_proyecto");
                            let name = if name.chars().count() > 30 {
                                format!("{}...", name.chars().take(27).collect::<String>())
                            } else {
                                name.to_string()
                            };
                            let sync = record
                                .sync_status
                                .map(|s| s.to_string())
                                .unwrap_or_default();
                            println!(
                                "{:<36}  {:<30}  {:<10}  {}",
                                record.id,
                                name,
                                field_str(record, "estado"),
                                sync
                            );
                        }
                        println!("\nTotal: {} project(s)", projects.len());
                    }
                }
                Ok(())
            }

            ProjectSubcommand::Show { identifier, format } => {
                let record = resolve_project(records, identifier).await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&record.to_display_row())?)
                    }
                    OutputFormat::Text => print_project(&record),
                }
                Ok(())
            }

            ProjectSubcommand::Rename { identifier, name } => {
                if name.trim().is_empty() {
                    return Err(CommandError::InvalidInput(
                        "Project name cannot be empty".to_string(),
                    ));
                }
                self.edit(app, identifier, "nombre_proyecto", json!(name.trim()))
                    .await
            }

            ProjectSubcommand::Budget { identifier, amount } => {
                if !amount.is_finite() || *amount < 0.0 {
                    return Err(CommandError::InvalidInput(
                        "Budget must be a non-negative number".to_string(),
                    ));
                }
                self.edit(app, identifier, "presupuesto", json!(amount)).await
            }

            ProjectSubcommand::Status { identifier, status } => {
                self.edit(app, identifier, "estado", json!(status.to_string()))
                    .await
            }

            ProjectSubcommand::Delete { identifier, force } => {
                let record = resolve_project(records, identifier).await?;
                let name = field_str(&record, "nombre_proyecto").to_string();

                if !force && !confirm(&format!("Delete project '{}'?", name))? {
                    println!("Cancelled");
                    return Ok(());
                }

                records.remove(EntityKind::Project, &record.id).await?;
                println!("Deleted project: {}", name);
                app.after_write(EntityKind::Project).await;
                Ok(())
            }
        }
    }

    async fn edit(
        &self,
        app: &App,
        identifier: &str,
        field: &str,
        value: Value,
    ) -> Result<(), CommandError> {
        let record = resolve_project(app.records(), identifier).await?;
        let mut fields = Fields::new();
        fields.insert(field.to_string(), value);

        let updated = app
            .records()
            .edit(EntityKind::Project, &record.id, fields)
            .await?;
        println!("Updated project:");
        print_project(&updated);
        app.after_write(EntityKind::Project).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obra_core::{MemoryStore, TableRegistry};
    use std::sync::Arc;

    fn records() -> Records {
        let registry = Arc::new(TableRegistry::standard());
        Records::new(Arc::new(MemoryStore::new(&registry)), registry)
    }

    #[tokio::test]
    async fn test_resolve_project_by_id_and_name() {
        let records = records();
        let project = Project::new("Casa Lago");
        let saved = records.save_entity(&project).await.unwrap();

        let by_id = resolve_project(&records, &project.id.to_string())
            .await
            .unwrap();
        assert_eq!(by_id.id, saved.id);

        let by_name = resolve_project(&records, "Casa Lago").await.unwrap();
        assert_eq!(by_name.id, saved.id);

        assert!(matches!(
            resolve_project(&records, "Casa Rio").await,
            Err(CommandError::NotFound(_, _))
        ));
    }

    #[tokio::test]
    async fn test_resolve_project_ambiguous_name() {
        let records = records();
        records.save_entity(&Project::new("Bodega")).await.unwrap();
        records.save_entity(&Project::new("Bodega")).await.unwrap();

        assert!(matches!(
            resolve_project(&records, "Bodega").await,
            Err(CommandError::Ambiguous(_, _, 2))
        ));
    }
}
