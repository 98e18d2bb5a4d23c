use chrono::Local;
use clap::Args;
use obra_core::EntityKind;
use tokio::sync::mpsc;

use super::{App, CommandError};

/// Follow the remote change feed and apply changes as they arrive
#[derive(Args)]
pub struct WatchCommand {
    /// Run a full sync before following the feed
    #[arg(long)]
    sync_first: bool,
}

impl WatchCommand {
    pub async fn run(&self, app: &App) -> Result<(), CommandError> {
        let engine = app.require_online()?;

        if self.sync_first {
            let batch = engine.sync_all().await;
            for failure in &batch.failures {
                eprintln!("Warning: {}: {}", failure.table, failure.error);
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<EntityKind>();
        let handle = engine.init_realtime(move |kind| {
            let _ = tx.send(kind);
        });

        println!("Watching for remote changes (Ctrl-C to stop)...");
        loop {
            tokio::select! {
                Some(kind) = rx.recv() => {
                    let table = engine.registry().spec(kind).name;
                    println!("[{}] {} changed", Local::now().format("%H:%M:%S"), table);
                }
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        eprintln!("Warning: cannot listen for Ctrl-C: {}", e);
                    }
                    break;
                }
            }
        }

        handle.unsubscribe().await;
        println!("Stopped watching");
        Ok(())
    }
}
