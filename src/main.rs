mod app;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use issuesheet_core::Config;
use issuesheet_sync::SyncOutcome;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::app::App;
use crate::server::ServerState;

#[derive(Parser)]
#[command(name = "issuesheet", version, about = "Keep a spreadsheet of GitHub issues in sync")]
struct Cli {
    /// Path to the config file (defaults to the user config directory)
    #[arg(long, global = true, env = "ISSUESHEET_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive webhook deliveries and sheet-edit triggers over HTTP
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Reload every open issue into the issues sheet
    Refresh,
    /// Send a row's staged comment and labels to GitHub
    Push {
        #[arg(long)]
        row: u32,
    },
    /// Load the repository's labels into the label input dropdown
    Labels,
    /// Validate the configuration and column bindings
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    issuesheet_core::init()?;
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::CheckConfig => check_config(config_path),
        Commands::Serve { host, port } => {
            let app = App::build(config_path)?;
            let host = host.unwrap_or_else(|| app.config.server.host.clone());
            let port = port.unwrap_or(app.config.server.port);
            let state = ServerState::new(app.dispatcher, app.config.server.webhook_secret.clone());
            server::serve(Arc::new(state), &host, port).await
        }
        Commands::Refresh => {
            let app = App::build(config_path)?;
            let outcome = app.dispatcher.engine().full_refresh().await;
            print_json(&outcome)?;
            if let SyncOutcome::RefreshFailed { error } = outcome {
                anyhow::bail!("Full refresh failed: {}", error);
            }
            Ok(())
        }
        Commands::Push { row } => {
            let app = App::build(config_path)?;
            let engine = app.dispatcher.engine();
            let comment = engine.push_comment(row).await?;
            let labels = engine.push_label_edit(row).await?;
            print_json(&[comment, labels])
        }
        Commands::Labels => {
            let app = App::build(config_path)?;
            let outcome = app.dispatcher.engine().load_label_vocabulary().await?;
            print_json(&outcome)
        }
    }
}

fn check_config(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = Config::load(config_path)?;
    let validation = config.validate();

    for warning in &validation.warnings {
        println!("warning: {}", warning);
    }
    if !validation.is_valid() {
        anyhow::bail!("{}", validation.error_summary());
    }

    let app = App::build(config_path)?;
    println!(
        "Configuration OK: {}/{} -> {} ({})",
        app.config.github.owner,
        app.config.github.repository,
        app.config.spreadsheet.id,
        app.config.spreadsheet.issues_sheet
    );
    for (name, column) in app.columns.to_bindings() {
        println!("  {:<14} column {}", name, column);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
