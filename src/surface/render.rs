//! Per-surface text rendering of a [`UiState`].
//!
//! Rendering is plain text so the same output serves the terminal, the demo
//! server's JSON, and tests. Styling is left to whoever displays it.

use crate::client::{OptimizationResult, OptimizeError};
use crate::config::schema::SettingsConfig;
use crate::stats::Stats;

use super::{Surface, UiState};

const RETRY_HINT: &str = "Press retry to try again.";

/// Render `state` the way `surface` shows it, followed by the running
/// totals line when totals are available.
pub fn render(
    surface: Surface,
    state: &UiState,
    totals: Option<&Stats>,
    settings: &SettingsConfig,
) -> String {
    let body = match surface {
        Surface::LandingDemo => render_landing(state),
        Surface::ContentScript => render_toast(state, settings),
        Surface::Popup => render_popup(state),
    };

    let footer = totals.map(|stats| totals_line(surface, stats));
    match (body.is_empty(), footer) {
        (_, None) => body,
        (true, Some(footer)) => footer,
        (false, Some(footer)) => format!("{body}\n\n{footer}"),
    }
}

/// Landing demo: optimized text and both percentages, `N/A` when undefined.
fn render_landing(state: &UiState) -> String {
    match state {
        UiState::Idle => String::new(),
        UiState::Loading => "Analyzing your prompt...".to_string(),
        UiState::Success(result) => format!(
            "Optimized prompt:\n{}\n\nCO\u{2082} saved: {}\nToken reduction: {}",
            result.optimized_text,
            percent(result.co2_saved_percent),
            percent(result.token_reduction_percent),
        ),
        UiState::Error(OptimizeError::DivisionHazard(Some(partial))) => format!(
            "Optimized prompt:\n{}\n\nCO\u{2082} saved: N/A\nToken reduction: {}",
            partial.optimized_text,
            percent(partial.token_reduction_percent),
        ),
        UiState::Error(OptimizeError::DivisionHazard(None)) => {
            "CO\u{2082} saved: N/A\nToken reduction: N/A".to_string()
        }
        UiState::Error(err) => error_line(err),
    }
}

/// Content script: a one-line toast. Turning notifications off hides only
/// the success toast; errors always show.
fn render_toast(state: &UiState, settings: &SettingsConfig) -> String {
    match state {
        UiState::Idle => String::new(),
        UiState::Loading => "\u{23f3} Optimizing...".to_string(),
        UiState::Error(OptimizeError::EmptyInput) => "\u{26a0}\u{fe0f} Please enter some text".to_string(),
        UiState::Success(_) if !settings.show_notifications => String::new(),
        UiState::Success(result) => format!(
            "\u{2705} Saved {} tokens, {} CO\u{2082}",
            result.tokens_saved(),
            grams(result.co2_reduced_grams()),
        ),
        UiState::Error(err) => format!("\u{274c} {}", error_line(err)),
    }
}

/// Popup: metric tiles then the optimized text.
fn render_popup(state: &UiState) -> String {
    match state {
        UiState::Idle => "Enter text to optimize".to_string(),
        UiState::Loading => "Optimizing...".to_string(),
        UiState::Success(result) => popup_result(result),
        UiState::Error(OptimizeError::DivisionHazard(Some(partial))) => format!(
            "Tokens saved: {}\nCO\u{2082} reduced: N/A\n\n{}",
            percent(partial.token_reduction_percent),
            partial.optimized_text,
        ),
        UiState::Error(OptimizeError::DivisionHazard(None)) => {
            "Tokens saved: N/A\nCO\u{2082} reduced: N/A".to_string()
        }
        UiState::Error(err) => error_line(err),
    }
}

fn popup_result(result: &OptimizationResult) -> String {
    format!(
        "Tokens saved: {}\nCO\u{2082} reduced: {}\n\n{}",
        percent(result.token_reduction_percent),
        percent(result.co2_saved_percent),
        result.optimized_text,
    )
}

fn totals_line(surface: Surface, stats: &Stats) -> String {
    match surface {
        Surface::Popup => format!("Total optimizations: {}", stats.optimizations_count),
        Surface::LandingDemo | Surface::ContentScript => format!(
            "Totals: {} optimizations, {} tokens saved, {} CO\u{2082} reduced",
            stats.optimizations_count,
            stats.cumulative_tokens_saved,
            grams(stats.cumulative_co2_reduced),
        ),
    }
}

fn error_line(err: &OptimizeError) -> String {
    if err.is_retryable() {
        format!("{} {RETRY_HINT}", err.user_message())
    } else {
        err.user_message()
    }
}

/// Two decimals with a percent sign; non-finite values show as `N/A`.
pub fn percent(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.2}%")
    } else {
        "N/A".to_string()
    }
}

fn grams(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.2}g")
    } else {
        "N/A".to_string()
    }
}
