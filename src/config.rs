//! Bridge configuration loading and validation.
//!
//! Reads a YAML file declaring providers, index bindings, timeouts, the
//! optional SQLite store and logging. String values may reference the
//! environment as `${VAR_NAME}` or `${VAR_NAME:-default}`; a default that
//! starts with `~` is expanded to the home directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::registry::store::{validate_binding, validate_provider};
use crate::registry::{
    IndexBinding, MemoryStore, ProviderStore, SqliteStore, StoreError, ToolProvider,
};
use crate::router::{RouterSettings, ToolRouter};
use crate::transport::TransportSettings;

/// Env var naming the config file, checked before the default locations.
pub const CONFIG_ENV_VAR: &str = "TOOLBRIDGE_CONFIG";

const CONFIG_FILE_NAME: &str = "toolbridge.yaml";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Timeouts and limits, all in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    pub connect_timeout_ms: u64,
    /// Process spawn plus `initialize` handshake.
    pub init_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    /// Per-page `tools/list` window.
    pub discovery_timeout_ms: u64,
    pub max_list_pages: usize,
    /// Whole-catalog budget per provider during turn fan-out.
    pub catalog_timeout_ms: u64,
    pub call_timeout_ms: u64,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        let transport = TransportSettings::default();
        let router = RouterSettings::default();
        Self {
            connect_timeout_ms: transport.connect_timeout.as_millis() as u64,
            init_timeout_ms: transport.init_timeout.as_millis() as u64,
            shutdown_timeout_ms: transport.shutdown_timeout.as_millis() as u64,
            discovery_timeout_ms: transport.discovery_timeout.as_millis() as u64,
            max_list_pages: transport.max_list_pages,
            catalog_timeout_ms: router.catalog_timeout.as_millis() as u64,
            call_timeout_ms: router.call_timeout.as_millis() as u64,
        }
    }
}

impl SettingsConfig {
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            init_timeout: Duration::from_millis(self.init_timeout_ms),
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            discovery_timeout: Duration::from_millis(self.discovery_timeout_ms),
            max_list_pages: self.max_list_pages,
        }
    }

    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            catalog_timeout: Duration::from_millis(self.catalog_timeout_ms),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }
}

/// Where providers and bindings live at runtime.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path. When set, configured providers and bindings
    /// are imported into it and the database becomes the source of truth.
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

fn default_log_file() -> String {
    "toolbridge.log".to_string()
}

fn default_keep_rotated() -> u32 {
    3
}

/// Logging destination and verbosity.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default)]
    pub level: Option<String>,
    /// Directory for the log file. Logs go to stderr when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default = "default_log_file")]
    pub file_name: String,
    /// Previous log files kept on rotation (`name.1` … `name.N`).
    #[serde(default = "default_keep_rotated")]
    pub keep_rotated: u32,
    /// Emit JSON lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            log_dir: None,
            file_name: default_log_file(),
            keep_rotated: default_keep_rotated(),
            json: false,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub providers: Vec<ToolProvider>,
    #[serde(default)]
    pub bindings: Vec<IndexBinding>,
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `TOOLBRIDGE_CONFIG`, then `toolbridge.yaml` in `start` and its
/// ancestors, then the user config directory.
pub fn find_config_path(start: &Path) -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    if let Some(candidate) = dirs::config_dir().map(|d| d.join("toolbridge").join(CONFIG_FILE_NAME)) {
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(ConfigError::Invalid {
        reason: format!("could not find {CONFIG_FILE_NAME}"),
    })
}

/// Load, interpolate, parse and validate a config file.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let config = BridgeConfig::from_yaml_str(&raw)?;
    tracing::info!(
        path = %path.display(),
        providers = config.providers.len(),
        bindings = config.bindings.len(),
        "loaded bridge config"
    );
    Ok(config)
}

impl BridgeConfig {
    /// Parse YAML text (after env interpolation) and validate it.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(raw);
        let config: BridgeConfig =
            serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Unique provider ids, well-formed bindings, usable timeouts.
    ///
    /// A binding naming an unconfigured provider is allowed; it is skipped
    /// at resolution time like a deleted provider.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            validate_provider(provider)?;
            if !seen.insert(provider.id.as_str()) {
                return Err(ConfigError::Invalid {
                    reason: format!("duplicate provider id '{}'", provider.id),
                });
            }
        }
        for binding in &self.bindings {
            validate_binding(binding)?;
            if !seen.contains(binding.provider_id.as_str()) {
                tracing::warn!(
                    provider = %binding.provider_id,
                    pattern = %binding.index_pattern,
                    "binding references a provider not in this config"
                );
            }
        }

        let s = &self.settings;
        if s.catalog_timeout_ms == 0 || s.call_timeout_ms == 0 || s.init_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "timeouts must be greater than zero".into(),
            });
        }
        if s.max_list_pages == 0 {
            return Err(ConfigError::Invalid {
                reason: "max_list_pages must be at least 1".into(),
            });
        }

        let file_name = &self.logging.file_name;
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return Err(ConfigError::Invalid {
                reason: format!("logging.file_name '{file_name}' must be a bare file name"),
            });
        }
        Ok(())
    }

    /// Build the provider/binding store this config describes.
    pub fn build_store(&self) -> Result<Arc<dyn ProviderStore>, ConfigError> {
        match &self.store.sqlite_path {
            Some(path) => {
                let path = expand_tilde(path);
                if let Some(parent) = Path::new(&path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Read {
                            path: parent.display().to_string(),
                            reason: e.to_string(),
                        })?;
                    }
                }
                let store = SqliteStore::open(&path)?;
                store.import(&self.providers, &self.bindings)?;
                Ok(Arc::new(store))
            }
            None => Ok(Arc::new(MemoryStore::new(
                self.providers.clone(),
                self.bindings.clone(),
            )?)),
        }
    }

    /// Build a router over real wire transports.
    pub fn build_router(&self) -> Result<ToolRouter, ConfigError> {
        Ok(ToolRouter::with_wire_clients(
            self.build_store()?,
            self.settings.transport_settings(),
            self.settings.router_settings(),
        ))
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
///
/// Unset variables without a default expand to the empty string. An
/// unterminated `${` is kept literally.
fn interpolate_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&lookup_var(&after[..end]));
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Value of `NAME` or `NAME:-fallback`; the fallback gets `~` expansion.
fn lookup_var(expr: &str) -> String {
    let (name, fallback) = match expr.split_once(":-") {
        Some((name, fallback)) => (name, Some(fallback)),
        None => (expr, None),
    };
    match (std::env::var(name.trim()), fallback) {
        (Ok(value), _) => value,
        (Err(_), Some(fallback)) => expand_tilde(fallback),
        (Err(_), None) => String::new(),
    }
}

/// Expand a leading `~` to the user's home directory.
pub(crate) fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
