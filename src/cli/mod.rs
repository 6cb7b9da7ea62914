//! CLI command implementations for promptgreen.
//!
//! Provides subcommand handlers for:
//! - `promptgreen optimize` — run one surface against a prompt
//! - `promptgreen stats` — persisted running totals
//! - `promptgreen health` — optimizer reachability, config, storage
//! - `promptgreen serve` — landing-page demo server
//! - `promptgreen config show|init|set|reset` — configuration management

use std::io::{IsTerminal, Read};

use anyhow::{Context, Result};
use colored::Colorize;

use crate::client::OptimizationClient;
use crate::config::{self, PromptGreenConfig};
use crate::stats::{Stats, StatsStore};
use crate::surface::{Submission, Surface, SurfaceController, UiState};
use crate::web::{self, DemoState};

/// Output format for commands with machine-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn from_str_opt(s: Option<&str>) -> Self {
        match s {
            Some("json") => Self::Json,
            Some("csv") => Self::Csv,
            _ => Self::Table,
        }
    }
}

/// Build a controller for `surface` from the resolved config.
pub fn build_controller(cfg: &PromptGreenConfig, surface: Surface) -> Result<SurfaceController> {
    let client = OptimizationClient::from_config(&cfg.api, &cfg.policy);
    let store = StatsStore::from_config(&cfg.storage).context("failed to open stats storage")?;
    Ok(SurfaceController::new(
        surface,
        client,
        store,
        cfg.settings.clone(),
    ))
}

// ---------------------------------------------------------------------------
// promptgreen optimize
// ---------------------------------------------------------------------------

/// Optimize one prompt through the given surface.
///
/// Reads the prompt from stdin when `text` is `None`. Returns `Ok(false)`
/// when the optimization settled in an error state so the caller can set a
/// failing exit code.
pub fn run_optimize(
    text: Option<String>,
    surface: Surface,
    model: Option<String>,
    format: OutputFormat,
) -> Result<bool> {
    let cfg = config::load();
    let mut controller = build_controller(&cfg, surface)?;
    if let Some(model) = model {
        controller = controller.with_model(model);
    }

    let prompt = match text {
        Some(text) => text,
        None => read_stdin()?,
    };

    let state = settled(controller.optimize(&prompt))?;

    match format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "surface": surface,
                "ui": state,
                "totals": controller.totals(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize result")?
            );
        }
        // `optimize` only offers table and json; csv falls back to the table.
        OutputFormat::Table | OutputFormat::Csv => {
            let rendered = controller.render();
            match &state {
                UiState::Success(_) => println!("{rendered}"),
                _ => eprintln!("{}", rendered.yellow()),
            }
        }
    }

    Ok(matches!(state, UiState::Success(_)))
}

/// The settled state of a submission, or an error if it was turned away.
fn settled(submission: Submission) -> Result<UiState> {
    match submission {
        Submission::Settled(state) => Ok(state),
        Submission::Busy => anyhow::bail!("another optimization is already running"),
    }
}

fn read_stdin() -> Result<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprintln!("{}", "Enter a prompt, then press Ctrl+D:".dimmed());
    }
    let mut buf = String::new();
    stdin
        .read_to_string(&mut buf)
        .context("failed to read prompt from stdin")?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// promptgreen stats
// ---------------------------------------------------------------------------

/// Show (or reset) the persisted running totals.
pub fn run_stats(format: OutputFormat, reset: bool) -> Result<()> {
    let cfg = config::load();
    let store = StatsStore::from_config(&cfg.storage).context("failed to open stats storage")?;

    let stats = if reset {
        let stats = store.reset().context("failed to reset stats")?;
        eprintln!("{} Stats reset", "✓".green().bold());
        stats
    } else {
        store.load().context("failed to load stats")?
    };

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("failed to serialize stats")?
        ),
        OutputFormat::Csv => print_stats_csv(&stats),
        OutputFormat::Table => print_stats_table(&stats),
    }

    Ok(())
}

fn print_stats_table(stats: &Stats) {
    println!("{}", "PromptGreen Savings Report".bold().cyan());
    println!("{}", "=".repeat(50));
    println!();

    if stats.optimizations_count == 0 {
        println!(
            "{}",
            "No optimizations yet. Run `promptgreen optimize` to get started.".yellow()
        );
        println!();
    }

    println!(
        "  {} {}",
        "Optimizations: ".bold(),
        format_number(stats.optimizations_count)
    );
    println!(
        "  {} {}",
        "Tokens saved:  ".bold(),
        format_number(stats.cumulative_tokens_saved)
    );
    println!(
        "  {} {:.2} g",
        "CO\u{2082} reduced:  ".bold(),
        stats.cumulative_co2_reduced
    );
    println!(
        "  {} {}",
        "Installed:     ".bold(),
        stats.install_date.format("%Y-%m-%d %H:%M UTC")
    );
    let last = stats
        .last_optimization_at
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!("  {} {}", "Last run:      ".bold(), last.dimmed());
}

fn print_stats_csv(stats: &Stats) {
    println!("optimizations,tokens_saved,co2_reduced,install_date,last_optimization");
    println!(
        "{},{},{:.4},{},{}",
        stats.optimizations_count,
        stats.cumulative_tokens_saved,
        stats.cumulative_co2_reduced,
        stats.install_date.to_rfc3339(),
        stats
            .last_optimization_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_default(),
    );
}

// ---------------------------------------------------------------------------
// promptgreen health
// ---------------------------------------------------------------------------

/// Check config sources, optimizer reachability, and storage.
pub fn run_health() -> Result<()> {
    println!("{}", "PromptGreen Health Check".bold().cyan());
    println!("{}", "=".repeat(50));
    println!();

    let global_exists = config::global_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    let project_exists = config::project_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);

    let cfg = config::load();
    print_health_item(
        "Global config",
        global_exists,
        if global_exists {
            "~/.promptgreen/config.toml found"
        } else {
            "not found (run `promptgreen config init` to create)"
        },
    );
    print_health_item(
        "Project config",
        project_exists,
        if project_exists {
            ".promptgreen.toml found"
        } else {
            "none (optional)"
        },
    );
    print_health_item(
        "Optimization",
        cfg.settings.enabled,
        if cfg.settings.enabled {
            "enabled"
        } else {
            "disabled (set settings.enabled = true)"
        },
    );

    let client = OptimizationClient::from_config(&cfg.api, &cfg.policy);
    let online = client.check_health();
    let detail = if online {
        format!("reachable at {}", client.base_url())
    } else {
        format!("not reachable at {}", client.base_url())
    };
    print_health_item("Optimizer API", online, &detail);
    print_health_item(
        "Timeout",
        true,
        &format!("{} ms", client.timeout().as_millis()),
    );

    match StatsStore::from_config(&cfg.storage).and_then(|store| store.load()) {
        Ok(stats) => print_health_item(
            "Stats storage",
            true,
            &format!(
                "{} optimizations recorded",
                format_number(stats.optimizations_count)
            ),
        ),
        Err(err) => print_health_item("Stats storage", false, &err.to_string()),
    }

    Ok(())
}

fn print_health_item(name: &str, ok: bool, detail: &str) {
    let status = if ok {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!("  {} {:<20} {}", status, name, detail.dimmed());
}

// ---------------------------------------------------------------------------
// promptgreen serve
// ---------------------------------------------------------------------------

/// Run the landing-page demo server.
pub fn run_serve(addr: Option<String>) -> Result<()> {
    let cfg = config::load();
    let addr = addr.unwrap_or_else(|| cfg.web.addr.clone());
    let controller = build_controller(&cfg, Surface::LandingDemo)?;
    let client = OptimizationClient::from_config(&cfg.api, &cfg.policy);
    web::serve(&addr, DemoState { controller, client })
}

// ---------------------------------------------------------------------------
// promptgreen config show | init | set | reset
// ---------------------------------------------------------------------------

/// Show the effective (merged) configuration as TOML.
pub fn run_config_show() -> Result<()> {
    let toml_str = config::show_effective_config()?;
    println!("{}", "Effective PromptGreen Configuration".bold().cyan());
    println!("{}", "=".repeat(50));
    println!();
    println!("{toml_str}");

    let global_exists = config::global_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    let project_exists = config::project_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    println!("{}", "Sources (highest priority last):".dimmed());
    println!("  {} built-in defaults", "·".dimmed());
    print_source("~/.promptgreen/config.toml", global_exists);
    print_source(".promptgreen.toml", project_exists);
    println!(
        "  {} {}",
        "·".dimmed(),
        "PROMPTGREEN_* environment variables".dimmed()
    );

    Ok(())
}

fn print_source(label: &str, exists: bool) {
    if exists {
        println!("  {} {}", "✓".green(), label.dimmed());
    } else {
        println!("  {} {}", "·".dimmed(), format!("{label} (not found)").dimmed());
    }
}

/// Initialize a default config file at `~/.promptgreen/config.toml`.
pub fn run_config_init(force: bool) -> Result<()> {
    let path = config::init_config(force)?;
    println!(
        "{} Config written to {}",
        "✓".green().bold(),
        path.display()
    );
    Ok(())
}

/// Set a single configuration value in the global config file.
pub fn run_config_set(key: &str, value: &str) -> Result<()> {
    config::set_config_value(key, value)?;
    println!("{} Set {} = {}", "✓".green().bold(), key.bold(), value);
    Ok(())
}

/// Reset configuration to defaults.
pub fn run_config_reset() -> Result<()> {
    let path = config::reset_config()?;
    println!(
        "{} Config reset to defaults at {}",
        "✓".green().bold(),
        path.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_groups_thousands() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn busy_submission_is_an_error() {
        let err = settled(Submission::Busy).unwrap_err();
        assert!(err.to_string().contains("already running"));
        assert_eq!(
            settled(Submission::Settled(UiState::Idle)).unwrap(),
            UiState::Idle
        );
    }

    #[test]
    fn output_format_defaults_to_table() {
        assert_eq!(OutputFormat::from_str_opt(None), OutputFormat::Table);
        assert_eq!(OutputFormat::from_str_opt(Some("json")), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str_opt(Some("yaml")), OutputFormat::Table);
    }
}
