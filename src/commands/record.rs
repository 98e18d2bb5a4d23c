use clap::{Args, Subcommand};
use obra_core::{fields_from_value, KeyKind, Record, RecordId, SyncError, TableSpec};
use serde_json::Value;

use super::{confirm, App, CommandError, OutputFormat};

/// Raw access to any registered table, addressed by table name or entity
/// label (`proyectos` or `project`).
#[derive(Args)]
pub struct RecordCommand {
    #[command(subcommand)]
    pub command: RecordSubcommand,
}

#[derive(Subcommand)]
pub enum RecordSubcommand {
    /// List the records of a table
    List {
        table: String,

        /// Only records waiting to be pushed
        #[arg(long)]
        pending: bool,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show one record as JSON
    Get { table: String, id: String },

    /// Insert or replace a record from a JSON object
    Put {
        table: String,

        /// JSON object with the record fields
        json: String,

        /// Record id; generated for tables with opaque keys
        #[arg(long)]
        id: Option<String>,
    },

    /// Delete a record
    Delete {
        table: String,
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

fn resolve<'a>(app: &'a App, table: &str) -> Result<&'a TableSpec, CommandError> {
    app.engine
        .registry()
        .resolve(table)
        .map_err(|e| CommandError::Sync(SyncError::from(e)))
}

/// Parses `json` into record fields, taking the id from `--id`, the
/// payload's own `id`, or a fresh UUID, in that order.
fn parse_put(
    spec: &TableSpec,
    json: &str,
    id: Option<&str>,
) -> Result<(RecordId, obra_core::Fields), CommandError> {
    let value: Value = serde_json::from_str(json)?;
    let mut fields = fields_from_value(value)?;

    let embedded = match fields.remove("id") {
        Some(value) => Some(RecordId::from_value(&value)?),
        None => None,
    };
    let id = match (id, embedded) {
        (Some(id), _) => RecordId::new(id),
        (None, Some(id)) => id,
        (None, None) if spec.key_kind == KeyKind::Numeric => {
            return Err(CommandError::InvalidInput(format!(
                "Table {} has numeric ids; pass --id",
                spec.name
            )))
        }
        (None, None) => RecordId::generate(),
    };

    // Validates numeric ids before anything is stored.
    id.to_value(spec.key_kind)?;
    Ok((id, fields))
}

impl RecordCommand {
    pub async fn run(&self, app: &App) -> Result<(), CommandError> {
        let records = app.records();

        match &self.command {
            RecordSubcommand::List {
                table,
                pending,
                format,
            } => {
                let spec = resolve(app, table)?;
                let rows = if *pending {
                    records.pending(spec.kind).await?
                } else {
                    records.list(spec.kind).await?
                };

                match format {
                    OutputFormat::Json => {
                        let rows: Vec<_> = rows.iter().map(Record::to_display_row).collect();
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    }
                    OutputFormat::Text => {
                        if rows.is_empty() {
                            println!("No records in {}", spec.name);
                            return Ok(());
                        }
                        for record in &rows {
                            let status = record
                                .sync_status
                                .map(|s| format!(" [{}]", s))
                                .unwrap_or_default();
                            println!(
                                "{}{}  {}",
                                record.id,
                                status,
                                Value::Object(record.fields.clone())
                            );
                        }
                        println!("\nTotal: {} record(s) in {}", rows.len(), spec.name);
                    }
                }
                Ok(())
            }

            RecordSubcommand::Get { table, id } => {
                let spec = resolve(app, table)?;
                let record = records
                    .get(spec.kind, &RecordId::new(id.as_str()))
                    .await?
                    .ok_or_else(|| CommandError::NotFound("Record", id.clone()))?;
                println!("{}", serde_json::to_string_pretty(&record.to_display_row())?);
                Ok(())
            }

            RecordSubcommand::Put { table, json, id } => {
                let spec = resolve(app, table)?;
                let (id, fields) = parse_put(spec, json, id.as_deref())?;

                let record = records.save(spec.kind, id, fields).await?;
                println!("Saved {} in {}", record.id, spec.name);
                app.after_write(spec.kind).await;
                Ok(())
            }

            RecordSubcommand::Delete { table, id, force } => {
                let spec = resolve(app, table)?;
                let id = RecordId::new(id.as_str());

                if !force && !confirm(&format!("Delete {} from {}?", id, spec.name))? {
                    println!("Cancelled");
                    return Ok(());
                }

                if !records.remove(spec.kind, &id).await? {
                    return Err(CommandError::NotFound("Record", id.to_string()));
                }
                println!("Deleted {} from {}", id, spec.name);
                app.after_write(spec.kind).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obra_core::{EntityKind, TableRegistry};

    #[test]
    fn test_parse_put_generates_opaque_id() {
        let registry = TableRegistry::standard();
        let spec = registry.spec(EntityKind::Finance);
        let (id, fields) = parse_put(spec, r#"{"monto": 120.5}"#, None).unwrap();

        assert!(!id.as_str().is_empty());
        assert_eq!(fields["monto"], serde_json::json!(120.5));
    }

    #[test]
    fn test_parse_put_takes_embedded_id() {
        let registry = TableRegistry::standard();
        let spec = registry.spec(EntityKind::Folder);
        let (id, fields) = parse_put(spec, r#"{"id": "c-1", "nombre": "Planos"}"#, None).unwrap();

        assert_eq!(id.as_str(), "c-1");
        assert!(!fields.contains_key("id"));
    }

    #[test]
    fn test_parse_put_numeric_table_needs_id() {
        let registry = TableRegistry::standard();
        let spec = registry.spec(EntityKind::Tool);

        assert!(matches!(
            parse_put(spec, r#"{"nombre": "Taladro"}"#, None),
            Err(CommandError::InvalidInput(_))
        ));
        assert!(parse_put(spec, "{}", Some("abc")).is_err());
        assert!(parse_put(spec, "{}", Some("12")).is_ok());
    }

    #[test]
    fn test_parse_put_rejects_non_object() {
        let registry = TableRegistry::standard();
        let spec = registry.spec(EntityKind::Task);
        assert!(parse_put(spec, "[1, 2]", None).is_err());
        assert!(matches!(
            parse_put(spec, "{not json", None),
            Err(CommandError::Json(_))
        ));
    }
}
