//! CLI module
//!
//! Command-line interface for the tally tracker: run the server, talk to the
//! assistant from the terminal, and inspect projects.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use futures::StreamExt;
use serde::Deserialize;
use std::io::{self, Write};
use std::sync::Arc;

use crate::api::{serve, AppState, ServerConfig};
use crate::assistant::{Assistant, HttpModel, ModelConfig};
use crate::models::{NewCategory, NewProject, NewTask, Project};
use crate::store::{MemoryStore, Store};
use crate::tracker::Tracker;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API server URL
    #[arg(short, long, default_value = "http://localhost:3210")]
    server: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the tally API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3210)]
        port: u16,

        /// Populate with example data for UI testing
        #[arg(long)]
        seed: bool,
    },

    /// Send a message to the assistant and print the streamed reply
    Chat {
        /// The message to send
        message: String,

        /// Continue an existing conversation by id
        #[arg(short, long)]
        conversation: Option<String>,
    },

    /// List projects with their completion percentages
    Projects,

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Envelope the API wraps every JSON payload in.
#[derive(Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

/// Run the CLI application
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { port, seed } => {
            println!("Starting tally API server on port {}...", port);

            let tracker = Tracker::new(Arc::new(MemoryStore::new()));

            if *seed {
                println!("Populating with example data...");
                seed_example_data(&tracker).await?;
            }

            let model = HttpModel::new(ModelConfig::from_env());
            let assistant = Arc::new(Assistant::new(tracker.clone(), Arc::new(model)));

            let config = ServerConfig {
                address: ([127, 0, 0, 1], *port).into(),
            };
            serve(AppState { tracker, assistant }, config).await?;
            Ok(())
        }

        Commands::Chat {
            message,
            conversation,
        } => {
            let url = format!("{}/api/chat", cli.server);
            let response = reqwest::Client::new()
                .post(&url)
                .json(&serde_json::json!({
                    "conversation_id": conversation,
                    "message": message,
                }))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(format!("chat request failed: {}", response.status()).into());
            }

            // The body is a frame stream; print each data payload as it
            // lands so the reply appears word by word.
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = stream.next().await {
                buffer.push_str(&String::from_utf8_lossy(&chunk?));
                while let Some(pos) = buffer.find("\n\n") {
                    let frame = buffer[..pos].to_string();
                    buffer.drain(..pos + 2);
                    print_chat_frame(&frame);
                }
            }
            println!();
            Ok(())
        }

        Commands::Projects => {
            let url = format!("{}/api/projects", cli.server);
            let envelope: ApiEnvelope<Vec<Project>> =
                reqwest::get(&url).await?.json().await?;
            if !envelope.success {
                return Err(envelope
                    .error
                    .unwrap_or_else(|| "unknown API error".to_string())
                    .into());
            }

            let projects = envelope.data.unwrap_or_default();
            if projects.is_empty() {
                println!("No projects yet. Try: tally chat \"set up a project for ...\"");
                return Ok(());
            }
            for project in projects {
                let pct = match project.percent_complete {
                    100 => format!("{:>3}%", 100).green(),
                    p if p > 0 => format!("{:>3}%", p).yellow(),
                    p => format!("{:>3}%", p).normal(),
                };
                println!("{}  {}  ({})", pct, project.name.bold(), project.id.dimmed());
                if let Some(roadblocks) = &project.roadblocks {
                    println!("      {} {}", "roadblocks:".red(), roadblocks);
                }
            }
            Ok(())
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn print_chat_frame(frame: &str) {
    // The terminating frame carries metadata, not prose.
    if frame.starts_with("event: done") {
        return;
    }
    for line in frame.lines() {
        if let Some(payload) = line.strip_prefix("data: ") {
            print!("{} ", payload.blue());
            let _ = io::stdout().flush();
        }
    }
}

/// Seeds a category, a project, and a small task tree so the UI has
/// something to show.
async fn seed_example_data(tracker: &Tracker) -> Result<(), Box<dyn std::error::Error>> {
    let store = tracker.store();
    store
        .create_category(NewCategory {
            name: "General".to_string(),
            color: "#3498db".to_string(),
        })
        .await?;
    let project = tracker
        .create_project(NewProject {
            name: "Getting started".to_string(),
            description: Some("A seeded example project".to_string()),
            category_id: None,
        })
        .await?;
    let parent = tracker
        .create_task(NewTask {
            project_id: project.id.clone(),
            parent_task_id: None,
            name: "Explore tally".to_string(),
            description: None,
            sort_order: 0,
        })
        .await?;
    for (i, name) in ["Open the UI", "Try the chat command"].iter().enumerate() {
        tracker
            .create_task(NewTask {
                project_id: project.id.clone(),
                parent_task_id: Some(parent.id.clone()),
                name: name.to_string(),
                description: None,
                sort_order: i as i32,
            })
            .await?;
    }
    Ok(())
}
