use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use promptgreen::surface::Surface;
use promptgreen::{cli, config, logging};

#[derive(Debug, Parser)]
#[command(name = "promptgreen")]
#[command(about = "Shorten prompts and track the tokens and CO\u{2082} they save")]
struct App {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Optimize a prompt and show the result the way a surface would
    Optimize {
        /// Prompt text. Read from stdin when omitted.
        text: Option<String>,
        /// Surface to render as: landing, content, popup
        #[arg(long, default_value = "landing")]
        surface: Surface,
        /// Model name sent for emission estimation
        #[arg(long)]
        model: Option<String>,
        /// Output format: table (default), json
        #[arg(long, default_value = "table", value_parser = ["table", "json"])]
        format: String,
    },
    /// Show cumulative savings
    Stats {
        /// Output format: table (default), json, csv
        #[arg(long, default_value = "table")]
        format: String,
        /// Reset the running totals before showing them
        #[arg(long)]
        reset: bool,
    },
    /// Check system health: optimizer API, config, storage
    Health,
    /// Serve the landing-page demo
    Serve {
        /// Listen address (default from config)
        #[arg(long)]
        addr: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Show the effective merged configuration
    Show,
    /// Write a default config file to ~/.promptgreen/config.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Set one value, e.g. `api.timeout_ms 10000`
    Set { key: String, value: String },
    /// Reset the global config file to defaults
    Reset,
}

fn main() -> ExitCode {
    let app = App::parse();
    logging::init(&config::load().logging.level);

    match dispatch(app.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Commands) -> Result<bool> {
    match command {
        Commands::Optimize {
            text,
            surface,
            model,
            format,
        } => {
            let fmt = cli::OutputFormat::from_str_opt(Some(&format));
            cli::run_optimize(text, surface, model, fmt)
        }
        Commands::Stats { format, reset } => {
            let fmt = cli::OutputFormat::from_str_opt(Some(&format));
            cli::run_stats(fmt, reset).map(|()| true)
        }
        Commands::Health => cli::run_health().map(|()| true),
        Commands::Serve { addr } => cli::run_serve(addr).map(|()| true),
        Commands::Config { action } => {
            let outcome = match action {
                ConfigAction::Show => cli::run_config_show(),
                ConfigAction::Init { force } => cli::run_config_init(force),
                ConfigAction::Set { key, value } => cli::run_config_set(&key, &value),
                ConfigAction::Reset => cli::run_config_reset(),
            };
            outcome.map(|()| true)
        }
    }
}
