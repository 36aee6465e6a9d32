//! Application configuration for besengine.
//!
//! User config lives at `~/.besengine/besengine.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BesEngineError, Result};
use crate::types::Recipe;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "besengine.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".besengine";

// ---------------------------------------------------------------------------
// Config structs (matching besengine.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Build defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Console connection settings.
    #[serde(default)]
    pub console: ConsoleConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory the generated `.bes` files are written to.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Task category when a recipe does not set one.
    #[serde(default = "default_category")]
    pub category: String,

    /// Path to the QnA relevance evaluator.
    #[serde(default = "default_qna_path")]
    pub qna_path: String,

    /// User-Agent presented when resolving download redirects.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            category: default_category(),
            qna_path: default_qna_path(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_cache_dir() -> String {
    "~/.besengine/cache".into()
}
fn default_category() -> String {
    "Software Deployment".into()
}
fn default_qna_path() -> String {
    "/usr/local/bin/QnA".into()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
     (KHTML, like Gecko) Version/17.0 Safari/605.1.15"
        .into()
}

/// `[console]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Root server URL, e.g. `https://bes.example.com:52311`.
    #[serde(default)]
    pub root_server: String,

    /// Console operator name.
    #[serde(default)]
    pub username: String,

    /// Name of the env var holding the operator password (never store the password itself).
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Accept the root server's self-signed certificate.
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            root_server: String::new(),
            username: String::new(),
            password_env: default_password_env(),
            accept_invalid_certs: true,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_password_env() -> String {
    "BES_PASSWORD".into()
}
fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.besengine/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BesEngineError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.besengine/besengine.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BesEngineError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BesEngineError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BesEngineError::write(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BesEngineError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BesEngineError::write(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Load a task recipe from a TOML file.
pub fn load_recipe(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path).map_err(|e| BesEngineError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BesEngineError::parse(format!("invalid recipe {}: {e}", path.display())))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Check that the console section is usable and return the operator password.
pub fn console_password(config: &ConsoleConfig) -> Result<String> {
    if config.root_server.is_empty() {
        return Err(BesEngineError::config(
            "console.root_server is not set. Add it to besengine.toml",
        ));
    }
    if config.username.is_empty() {
        return Err(BesEngineError::config(
            "console.username is not set. Add it to besengine.toml",
        ));
    }

    let var_name = &config.password_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(BesEngineError::config(format!(
            "console password not found. Set the {var_name} environment variable."
        ))),
    }
}
