//! Patchwright - LLM-driven repository patch generation
//!
//! Command-line entry point: run one task in the foreground, serve the HTTP
//! API, or inspect the effective configuration.

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use patchwright::{
    create_client, serve, AppConfig, AppState, EditOrchestrator, EmptySelectionPolicy,
    PatchwrightError, RunOutcome, Task, TaskStatus,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "patchwright")]
#[command(author = "Patchwright Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Turn a repository and a change request into a patch with an LLM", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON settings file
    #[arg(short, long, global = true, env = "PATCHWRIGHT_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Flags layered on top of the settings file.
#[derive(Args)]
struct Overrides {
    /// Directory holding per-task workspaces
    #[arg(long, global = true, env = "PATCHWRIGHT_WORKSPACE_ROOT")]
    workspace_root: Option<PathBuf>,

    /// Model identifier
    #[arg(long, global = true, env = "PATCHWRIGHT_MODEL")]
    model: Option<String>,

    /// Base URL of the chat-completions API
    #[arg(long, global = true, env = "PATCHWRIGHT_API_BASE")]
    api_base: Option<String>,

    /// Sampling temperature
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Maximum attempts per task
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Maximum tool-call turns per attempt
    #[arg(long, global = true)]
    max_tool_turns: Option<u32>,

    /// What to do when no relevant files are selected
    #[arg(long, global = true, value_enum)]
    empty_selection: Option<EmptySelectionPolicy>,

    /// Do not pass rejection feedback to the next attempt
    #[arg(long, global = true)]
    discard_feedback: bool,
}

impl Overrides {
    fn apply(self, config: &mut AppConfig) {
        if let Some(root) = self.workspace_root {
            config.workspace_root = root;
        }
        if let Some(model) = self.model {
            config.llm.model = model;
        }
        if let Some(api_base) = self.api_base {
            config.llm.api_base = api_base;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(max_tool_turns) = self.max_tool_turns {
            config.max_tool_turns = max_tool_turns;
        }
        if let Some(policy) = self.empty_selection {
            config.empty_selection = policy;
        }
        if self.discard_feedback {
            config.feedback_to_next_attempt = false;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task in the foreground and print the resulting diff
    Run {
        /// Repository URL or local path to clone
        #[arg(long)]
        repo: String,

        /// Change request in natural language
        #[arg(long)]
        prompt: String,

        /// Write the diff to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the task log when the run ends
        #[arg(long)]
        show_log: bool,
    },

    /// Start the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8000", env = "PATCHWRIGHT_BIND")]
        bind: SocketAddr,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the effective configuration
    Validate,
}

fn exit_with(err: &PatchwrightError) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), err);
    std::process::exit(err.exit_code());
}

fn print_config(config: &AppConfig) {
    println!("\n{} Effective Configuration", "Config:".cyan().bold());
    println!("{}", "─".repeat(40));
    println!("   Workspace root: {}", config.workspace_root.display());
    println!("   Provider: {}", config.llm.provider);
    println!("   Model: {}", config.llm.model);
    println!("   API base: {}", config.llm.api_base);
    println!("   API key env: {}", config.llm.api_key_env);
    println!("   Temperature: {}", config.llm.temperature);
    println!("   Request timeout: {}s", config.llm.timeout_secs);
    println!("   Max retries: {}", config.max_retries);
    println!("   Max tool turns: {}", config.max_tool_turns);
    println!("   Empty selection: {}", config.empty_selection);
    println!("   Verify selected files: {}", config.verify_selected_files);
    println!("   Feedback to next attempt: {}", config.feedback_to_next_attempt);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so a diff on stdout stays clean
    let default_filter = if cli.verbose {
        "patchwright=debug,info"
    } else {
        "patchwright=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match AppConfig::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };
    cli.overrides.apply(&mut config);

    match cli.command {
        Commands::Run {
            repo,
            prompt,
            output,
            show_log,
        } => {
            if let Err(e) = config.validate() {
                exit_with(&e);
            }
            let client = match create_client(&config.llm) {
                Ok(client) => client,
                Err(e) => exit_with(&e),
            };

            let orchestrator = EditOrchestrator::new(config, client);
            let task = Task::new(repo, prompt);
            eprintln!(
                "{} Task {} against {}",
                "Running:".cyan().bold(),
                task.id(),
                task.repo_url()
            );

            let outcome = orchestrator.run(&task).await;

            if show_log {
                eprintln!("\n{} Task Log", "Log:".cyan().bold());
                eprintln!("{}", "─".repeat(40));
                for line in task.log() {
                    eprintln!("   {}", line.dimmed());
                }
                eprintln!();
            }

            match task.status() {
                TaskStatus::Done => {
                    let diff = task.result().unwrap_or_default();
                    if let RunOutcome::Completed {
                        attempts,
                        satisfied,
                    } = outcome
                    {
                        let verdict = if satisfied {
                            "accepted".green()
                        } else {
                            "not accepted".yellow()
                        };
                        eprintln!(
                            "{} {} attempt(s), final change {}",
                            "Done:".green().bold(),
                            attempts,
                            verdict
                        );
                    }

                    if diff.is_empty() {
                        eprintln!("{} No changes were made", "Info:".blue());
                    }

                    match output {
                        Some(path) => {
                            std::fs::write(&path, &diff)?;
                            eprintln!("{} Wrote patch to {}", "OK".green(), path.display());
                        }
                        None => print!("{}", diff),
                    }
                }
                status => {
                    let reason = task
                        .result()
                        .unwrap_or_else(|| format!("task ended with status {}", status));
                    eprintln!("{} {}", "Error:".red().bold(), reason);
                    std::process::exit(1);
                }
            }
        }

        Commands::Serve { bind } => {
            if let Err(e) = config.validate() {
                exit_with(&e);
            }
            let client = match create_client(&config.llm) {
                Ok(client) => client,
                Err(e) => exit_with(&e),
            };

            let state = AppState::new(EditOrchestrator::new(config, client));
            serve(bind, state).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show { json } => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                } else {
                    print_config(&config);
                }
            }

            ConfigAction::Validate => match config.validate() {
                Ok(()) => {
                    match &cli.config {
                        Some(path) => {
                            println!("{} {} is valid", "OK".green(), path.display())
                        }
                        None => println!("{} defaults are valid", "OK".green()),
                    }
                    if std::env::var_os(&config.llm.api_key_env).is_none() {
                        println!(
                            "{} {} is not set",
                            "Warning:".yellow(),
                            config.llm.api_key_env
                        );
                    }
                }
                Err(e) => exit_with(&e),
            },
        },
    }

    Ok(())
}
