//! Instrumentation configuration
//!
//! An [`InstrumentationConfig`] describes which listener to attach to a run
//! and how the binary logs. It is read from TOML or JSON, chosen by file
//! extension, and validated before a run starts so that malformed
//! expressions and ports are reported up front.
//!
//! ```toml
//! [logging]
//! level = "info,flowhook=debug"
//!
//! [listener]
//! kind = "multi"
//!
//! [[listener.listeners]]
//! kind = "counter"
//!
//! [[listener.listeners]]
//! kind = "debug"
//!
//! [[listener.listeners.breakpoints]]
//! kind = "path"
//! path = "/Flow/Display"
//! stages = ["preExecute"]
//! ```
//!
//! # Default Location
//!
//! - **Linux**: `~/.local/share/flowhook/instrumentation.toml`
//! - **macOS**: `~/Library/Application Support/flowhook/instrumentation.toml`
//! - **Windows**: `%APPDATA%\flowhook\instrumentation.toml`

mod listeners;

pub use listeners::{
    BreakpointSpec, BreakpointTarget, DebugSpec, ListenerSpec, ScopeSpec, DEFAULT_REFRESH_INTERVAL,
};

use crate::error::{FlowHookError, Result, ResultExt};
use crate::scripting::ExpressionEngine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Application identifier for data directories
pub const APP_ID: &str = "flowhook";

/// Configuration filename inside the app data directory
pub const CONFIG_FILE: &str = "instrumentation.toml";

/// Filter used when neither the configuration nor `RUST_LOG` sets one
pub const DEFAULT_LOG_FILTER: &str = "info,flowhook=debug";

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Default location of the instrumentation configuration
pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

/// On-disk format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(ConfigFormat::Toml),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(ConfigFormat::Json),
            _ => Err(FlowHookError::Config(format!(
                "Unsupported configuration format {:?}: expected .toml or .json",
                path
            ))),
        }
    }
}

/// Logging settings for the binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directives; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write diagnostics to this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Complete instrumentation configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstrumentationConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub listener: ListenerSpec,
}

impl InstrumentationConfig {
    pub fn new(listener: ListenerSpec) -> Self {
        Self {
            logging: LoggingConfig::default(),
            listener,
        }
    }

    /// Load a configuration file, format chosen by extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration {:?}", path))?;
        Self::parse(&content, format)
            .with_context(|| format!("Failed to parse configuration {:?}", path))
    }

    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Toml => {
                toml::from_str(content).map_err(|e| FlowHookError::Serialization(e.to_string()))
            }
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| FlowHookError::Serialization(e.to_string())),
        }
    }

    /// Pretty-printed text in the given format
    pub fn render(&self, format: ConfigFormat) -> Result<String> {
        match format {
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| FlowHookError::Serialization(e.to_string())),
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| FlowHookError::Serialization(e.to_string())),
        }
    }

    /// Save to disk, format chosen by extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = self.render(ConfigFormat::from_path(path)?)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration {:?}", path))
    }

    /// Report configuration errors before a run starts.
    pub fn validate(&self) -> Result<()> {
        self.validate_with(&Arc::new(ExpressionEngine::new()))
    }

    pub fn validate_with(&self, engine: &Arc<ExpressionEngine>) -> Result<()> {
        tracing_subscriber::EnvFilter::try_new(&self.logging.level).map_err(|e| {
            FlowHookError::Config(format!(
                "Invalid log filter '{}': {}",
                self.logging.level, e
            ))
        })?;
        self.listener.validate(engine).context("listener")
    }
}
