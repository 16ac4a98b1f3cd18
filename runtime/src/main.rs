// Copyright 2026 Tagger Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tagger_runtime::cli::{self, output, toggle_cmd::Switch};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tagger",
    about = "tagger: fills itinerary day destinations through the page's autocomplete",
    version,
    after_help = "Run 'tagger <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an itinerary page in Chromium and start tagging
    Start {
        /// Itinerary editor URL
        url: String,
        /// Also start HTTP REST API on this port
        #[arg(long)]
        http_port: Option<u16>,
    },
    /// Stop the running tagger
    Stop,
    /// Show whether auto-tag is on and how many days the page has
    Status,
    /// Switch automatic tagging on or off
    Toggle {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Re-tag every day on the page now
    Tag,
    /// Show recently tagged maps
    History,
    /// Dry run: list days and destinations in a saved HTML page
    Extract {
        /// Saved itinerary page
        file: PathBuf,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "tagger_runtime=debug"
    } else {
        "tagger_runtime=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var(output::JSON_ENV, "1");
    }
    if cli.quiet {
        std::env::set_var(output::QUIET_ENV, "1");
    }
    if cli.verbose {
        std::env::set_var(output::VERBOSE_ENV, "1");
    }
    if cli.no_color {
        std::env::set_var(output::NO_COLOR_ENV, "1");
    }
    init_tracing(cli.verbose, cli.json);

    let result = match cli.command {
        Commands::Start { url, http_port } => cli::start::run(&url, http_port).await,
        Commands::Stop => cli::stop::run().await,
        Commands::Status => cli::status::run().await,
        Commands::Toggle { state } => cli::toggle_cmd::run(state).await,
        Commands::Tag => cli::tag_cmd::run().await,
        Commands::History => cli::history_cmd::run().await,
        Commands::Extract { file } => cli::extract_cmd::run(&file).await,
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "tagger", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !output::is_quiet() && !output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if output::is_json() {
            output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
