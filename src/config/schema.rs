/// Configuration schema and defaults for promptgreen.
///
/// Defines the TOML-serializable configuration structure with all sections:
/// `[api]`, `[policy]`, `[storage]`, `[web]`, `[logging]`, and `[settings]`.
///
/// Every field has a sensible built-in default. Users only need to set the
/// values they want to override.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level promptgreen configuration.
///
/// Maps directly to the `~/.promptgreen/config.toml` and `.promptgreen.toml`
/// file schemas. All sections and fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptGreenConfig {
    pub api: ApiConfig,
    pub policy: PolicyConfig,
    pub storage: StorageConfig,
    pub web: WebConfig,
    pub logging: LoggingConfig,
    pub settings: SettingsConfig,
}

// ---------------------------------------------------------------------------
// [api]
// ---------------------------------------------------------------------------

/// Remote optimizer endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the optimizer service, without a trailing slash.
    pub base_url: String,
    /// Path of the balanced-optimize operation used for short prompts.
    pub short_form_path: String,
    /// Path of the summarize operation used for long prompts.
    pub long_form_path: String,
    /// Path probed by `promptgreen health`.
    pub health_path: String,
    /// Upper bound on a single optimize call (milliseconds).
    pub timeout_ms: u64,
    /// Model name sent with short-form requests for emission estimation.
    pub model_name: String,
    /// Send `ngrok-skip-browser-warning: true` with every request.
    pub skip_browser_warning: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            short_form_path: "/optimize".to_string(),
            long_form_path: "/ai_prompt-optimizer/optimize".to_string(),
            health_path: "/health".to_string(),
            timeout_ms: 30_000,
            model_name: "gpt-4".to_string(),
            skip_browser_warning: true,
        }
    }
}

// ---------------------------------------------------------------------------
// [policy]
// ---------------------------------------------------------------------------

/// Mode-selection policy and the fixed summarize parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Trimmed prompts with at least this many characters use the long form.
    pub long_form_threshold_chars: usize,
    /// `max_length` sent with long-form requests.
    pub summary_max_length: u32,
    /// `min_length` sent with long-form requests.
    pub summary_min_length: u32,
    /// `top_keywords` sent with long-form requests.
    pub top_keywords: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            long_form_threshold_chars: 350,
            summary_max_length: 50,
            summary_min_length: 20,
            top_keywords: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// [storage]
// ---------------------------------------------------------------------------

/// Where the persisted stats document lives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Explicit path to the storage document. Defaults to
    /// `~/.promptgreen/storage.json` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the storage document path.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(|| {
            dirs::home_dir().map(|home| home.join(".promptgreen").join("storage.json"))
        })
    }
}

// ---------------------------------------------------------------------------
// [web]
// ---------------------------------------------------------------------------

/// Landing-page demo server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub addr: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9747".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// [logging]
// ---------------------------------------------------------------------------

/// Diagnostic log settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter when neither `PROMPTGREEN_LOG` nor `RUST_LOG`
    /// is set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// [settings]
// ---------------------------------------------------------------------------

/// User-facing toggles shared by every surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Master switch. When `false` every surface refuses to optimize.
    pub enabled: bool,
    /// Render success/error toasts on the content-script surface.
    pub show_notifications: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            show_notifications: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Annotated default file
// ---------------------------------------------------------------------------

impl PromptGreenConfig {
    /// The annotated TOML written by `promptgreen config init`.
    pub fn default_toml() -> &'static str {
        DEFAULT_CONFIG_TOML
    }
}

const DEFAULT_CONFIG_TOML: &str = r#"# promptgreen configuration
#
# Precedence: built-in defaults < ~/.promptgreen/config.toml < .promptgreen.toml
# < PROMPTGREEN_* environment variables.

[api]
base_url = "http://127.0.0.1:8000"
short_form_path = "/optimize"
long_form_path = "/ai_prompt-optimizer/optimize"
health_path = "/health"
timeout_ms = 30000
model_name = "gpt-4"
skip_browser_warning = true

[policy]
# Trimmed prompts this long (characters) or longer are summarized instead of
# balanced-optimized.
long_form_threshold_chars = 350
summary_max_length = 50
summary_min_length = 20
top_keywords = 5

[storage]
# path = "/home/me/.promptgreen/storage.json"

[web]
addr = "127.0.0.1:9747"

[logging]
level = "warn"

[settings]
enabled = true
show_notifications = true
"#;
