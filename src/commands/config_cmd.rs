use clap::{Args, Subcommand};
use obra::config::Config;

use super::{CommandError, OutputFormat};

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

fn set_or_not(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "set"
    } else {
        "not set"
    }
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!(
                            "remote.url: {}",
                            config.remote.url.as_deref().unwrap_or("(not set)")
                        );
                        println!("remote.api_key: {}", set_or_not(&config.remote.api_key));
                        println!("remote.auto_sync: {}", config.remote.auto_sync);
                        println!();

                        println!("sync.conflict_policy: {}", config.sync.conflict_policy);
                        println!("sync.queue_capacity: {}", config.sync.queue_capacity);
                        println!(
                            "realtime.reconnect_delay_secs: {}",
                            config.realtime.reconnect_delay_secs
                        );
                    }
                }
                Ok(())
            }
        }
    }
}
