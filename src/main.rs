use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use commands::{
    App, ConfigCommand, ProjectCommand, RecordCommand, SyncCommand, TaskCommand, WatchCommand,
};
use obra::config::Config;

#[derive(Parser)]
#[command(name = "obra")]
#[command(version)]
#[command(about = "Offline-first construction project records", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects
    Project(ProjectCommand),

    /// Manage project tasks
    Task(TaskCommand),

    /// Read and write records of any table
    Record(RecordCommand),

    /// Sync with the remote store
    Sync(SyncCommand),

    /// Follow remote changes live
    Watch(WatchCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("OBRA_LOG")
                .unwrap_or_else(|_| EnvFilter::new("obra=warn,obra_core=warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Project(cmd)) => {
            let app = App::open(&config).await?;
            cmd.run(&app).await?;
        }
        Some(Commands::Task(cmd)) => {
            let app = App::open(&config).await?;
            cmd.run(&app).await?;
        }
        Some(Commands::Record(cmd)) => {
            let app = App::open(&config).await?;
            cmd.run(&app).await?;
        }
        Some(Commands::Sync(cmd)) => {
            let app = App::open(&config).await?;
            cmd.run(&app, &config).await?;
        }
        Some(Commands::Watch(cmd)) => {
            let app = App::open(&config).await?;
            cmd.run(&app).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
