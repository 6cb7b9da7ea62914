/// Configuration system for promptgreen.
///
/// Provides a layered configuration hierarchy:
///
/// 1. **Built-in defaults** — hardcoded in [`schema::PromptGreenConfig::default()`]
/// 2. **User global config** — `~/.promptgreen/config.toml`
/// 3. **Project local config** — `.promptgreen.toml` in the current working directory
/// 4. **Environment variables** — `PROMPTGREEN_*` overrides (highest precedence)
///
/// File layers are merged at the key level: a project file that only sets
/// `api.timeout_ms` keeps every other value from the global file.
///
/// # Usage
///
/// ```rust,ignore
/// use promptgreen::config;
///
/// let cfg = config::load();
/// if cfg.settings.enabled {
///     // ...
/// }
/// ```
pub mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub use schema::PromptGreenConfig;

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the fully resolved promptgreen configuration.
///
/// Merges all layers in order: defaults → global TOML → project TOML → env
/// vars. This is the primary entry point for all modules that need
/// configuration.
pub fn load() -> PromptGreenConfig {
    let layers = [global_config_path(), project_config_path()];
    let mut config = load_layers(layers.iter().flatten().map(PathBuf::as_path));
    apply_env_overrides(&mut config);
    config
}

/// Merge the given TOML files over the built-in defaults, in order.
///
/// Missing or malformed files are skipped so a broken config never stops an
/// optimization from running.
pub fn load_layers<'a>(paths: impl IntoIterator<Item = &'a Path>) -> PromptGreenConfig {
    let mut merged = match toml::Value::try_from(PromptGreenConfig::default()) {
        Ok(value) => value,
        Err(_) => return PromptGreenConfig::default(),
    };

    for path in paths {
        if let Some(layer) = load_toml_value(path) {
            merge_values(&mut merged, layer);
        } else if path.exists() {
            tracing::warn!(path = %path.display(), "ignoring malformed config file");
        }
    }

    merged.try_into().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "merged config is invalid; using defaults");
        PromptGreenConfig::default()
    })
}

/// Read a TOML file into an untyped value.
fn load_toml_value(path: &Path) -> Option<toml::Value> {
    let content = fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Deep-merge `overlay` into `base`. Tables merge key by key; any other
/// value in the overlay replaces the base value.
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

// ---------------------------------------------------------------------------
// File paths
// ---------------------------------------------------------------------------

/// Path to the user global config: `~/.promptgreen/config.toml`.
fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".promptgreen").join("config.toml"))
}

/// Path to the project local config: `.promptgreen.toml` in the current directory.
fn project_config_path() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .map(|cwd| cwd.join(".promptgreen.toml"))
}

/// Return the path to the global config file for display/init purposes.
pub fn global_config_file() -> Option<PathBuf> {
    global_config_path()
}

/// Return the path to the project config file for display purposes.
pub fn project_config_file() -> Option<PathBuf> {
    project_config_path()
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides (highest precedence layer).
///
/// Supported variables:
/// - `PROMPTGREEN_API_URL` — optimizer base URL
/// - `PROMPTGREEN_MODEL` — model name sent with short-form requests
/// - `PROMPTGREEN_TIMEOUT_MS` — optimize call timeout
/// - `PROMPTGREEN_LONG_FORM_THRESHOLD` — long-form threshold in characters
/// - `PROMPTGREEN_STATS_PATH` — storage document path
/// - `PROMPTGREEN_ENABLED` — master switch (`1`/`true`/`yes`/`on`)
pub fn apply_env_overrides(config: &mut PromptGreenConfig) {
    if let Ok(val) = std::env::var("PROMPTGREEN_API_URL")
        && !val.is_empty()
    {
        config.api.base_url = val;
    }
    if let Ok(val) = std::env::var("PROMPTGREEN_MODEL")
        && !val.is_empty()
    {
        config.api.model_name = val;
    }
    if let Ok(val) = std::env::var("PROMPTGREEN_TIMEOUT_MS")
        && let Ok(ms) = val.parse::<u64>()
    {
        config.api.timeout_ms = ms;
    }
    if let Ok(val) = std::env::var("PROMPTGREEN_LONG_FORM_THRESHOLD")
        && let Ok(chars) = val.parse::<usize>()
    {
        config.policy.long_form_threshold_chars = chars;
    }
    if let Ok(val) = std::env::var("PROMPTGREEN_STATS_PATH")
        && !val.is_empty()
    {
        config.storage.path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("PROMPTGREEN_ENABLED") {
        config.settings.enabled = is_truthy(&val);
    }
}

/// Check if a string value represents a truthy boolean.
fn is_truthy(val: &str) -> bool {
    matches!(
        val.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ---------------------------------------------------------------------------
// Config init / set / reset
// ---------------------------------------------------------------------------

/// Write the default annotated config to `~/.promptgreen/config.toml`.
///
/// Returns an error if the file already exists (use `force = true` to
/// overwrite).
pub fn init_config(force: bool) -> Result<PathBuf> {
    let path = global_config_path().context("could not determine home directory")?;

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create ~/.promptgreen/ directory")?;
    }

    fs::write(&path, PromptGreenConfig::default_toml()).context("failed to write config file")?;

    Ok(path)
}

/// Set a single config key to a value in the global config file.
///
/// Supports dotted keys like `api.timeout_ms`. When no file exists yet the
/// defaults are written first and then updated.
pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    let path = global_config_path().context("could not determine home directory")?;

    let content = if path.exists() {
        fs::read_to_string(&path).context("failed to read config file")?
    } else {
        toml::to_string_pretty(&PromptGreenConfig::default())
            .context("failed to serialize default config")?
    };

    let mut root: toml::Value =
        toml::from_str(&content).context("failed to parse config as TOML value")?;
    set_toml_value(&mut root, key, value)?;

    // Reject values that would make the whole file unreadable.
    let _: PromptGreenConfig = root
        .clone()
        .try_into()
        .with_context(|| format!("invalid value '{value}' for '{key}'"))?;

    let output = toml::to_string_pretty(&root).context("failed to serialize updated config")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    fs::write(&path, output).context("failed to write config file")?;

    Ok(())
}

/// Set a value in a TOML value tree using a dotted key path.
fn set_toml_value(root: &mut toml::Value, key: &str, raw_value: &str) -> Result<()> {
    let Some((section_path, leaf)) = key.rsplit_once('.') else {
        anyhow::bail!("config key must be dotted, e.g. 'api.timeout_ms'");
    };

    let mut current = root;
    for part in section_path.split('.') {
        current = current
            .get_mut(part)
            .with_context(|| format!("config key not found: section '{part}' in '{key}'"))?;
    }

    let table = current
        .as_table_mut()
        .with_context(|| format!("expected table at '{section_path}'"))?;

    let new_value = match table.get(leaf) {
        Some(toml::Value::Boolean(_)) => toml::Value::Boolean(is_truthy(raw_value)),
        Some(toml::Value::Integer(_)) => {
            let n: i64 = raw_value
                .parse()
                .with_context(|| format!("expected integer for '{key}', got '{raw_value}'"))?;
            toml::Value::Integer(n)
        }
        Some(toml::Value::Float(_)) => {
            let f: f64 = raw_value
                .parse()
                .with_context(|| format!("expected float for '{key}', got '{raw_value}'"))?;
            toml::Value::Float(f)
        }
        _ => toml::Value::String(raw_value.to_string()),
    };

    table.insert(leaf.to_string(), new_value);
    Ok(())
}

/// Reset the global config to defaults (overwrite the file).
pub fn reset_config() -> Result<PathBuf> {
    init_config(true)
}

/// Show the effective (fully resolved) config as TOML.
pub fn show_effective_config() -> Result<String> {
    let config = load();
    toml::to_string_pretty(&config).context("failed to serialize effective config")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn no_layers_yields_defaults() {
        let config = load_layers(std::iter::empty());
        assert_eq!(config, PromptGreenConfig::default());
    }

    #[test]
    fn project_layer_overrides_only_the_keys_it_sets() {
        let dir = tempfile::tempdir().unwrap();
        let global = write_file(
            dir.path(),
            "global.toml",
            "[api]\nbase_url = \"https://optimizer.example\"\ntimeout_ms = 10000\n",
        );
        let project = write_file(dir.path(), "project.toml", "[api]\ntimeout_ms = 2500\n");

        let config = load_layers([global.as_path(), project.as_path()]);

        assert_eq!(config.api.base_url, "https://optimizer.example");
        assert_eq!(config.api.timeout_ms, 2500);
        assert_eq!(config.api.model_name, "gpt-4");
    }

    #[test]
    fn malformed_layer_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let broken = write_file(dir.path(), "broken.toml", "[api\ntimeout_ms = ");
        let config = load_layers([broken.as_path()]);
        assert_eq!(config, PromptGreenConfig::default());
    }

    #[test]
    fn ill_typed_layer_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_file(dir.path(), "bad.toml", "[api]\ntimeout_ms = \"soon\"\n");
        let config = load_layers([bad.as_path()]);
        assert_eq!(config.api.timeout_ms, 30_000);
    }

    #[test]
    fn is_truthy_accepts_variants() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("yes"));
        assert!(is_truthy("on"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("off"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn set_toml_value_updates_integer() {
        let mut root: toml::Value = toml::from_str("[api]\ntimeout_ms = 30000\n").unwrap();
        set_toml_value(&mut root, "api.timeout_ms", "5000").unwrap();
        assert_eq!(root["api"]["timeout_ms"].as_integer(), Some(5000));
    }

    #[test]
    fn set_toml_value_updates_bool() {
        let mut root: toml::Value = toml::from_str("[settings]\nenabled = true\n").unwrap();
        set_toml_value(&mut root, "settings.enabled", "off").unwrap();
        assert_eq!(root["settings"]["enabled"].as_bool(), Some(false));
    }

    #[test]
    fn set_toml_value_rejects_unknown_section() {
        let mut root: toml::Value = toml::from_str("[api]\nmodel_name = \"gpt-4\"\n").unwrap();
        assert!(set_toml_value(&mut root, "nonexistent.key", "value").is_err());
        assert!(set_toml_value(&mut root, "undotted", "value").is_err());
    }

    #[test]
    fn set_toml_value_rejects_non_numeric_integer() {
        let mut root: toml::Value = toml::from_str("[api]\ntimeout_ms = 1\n").unwrap();
        assert!(set_toml_value(&mut root, "api.timeout_ms", "fast").is_err());
    }
}
