//! Configuration system for DeepGynScan.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/deepgyn/config.toml` and/or `.deepgyn/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Top-level configuration for the DeepGynScan service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub store: StoreConfig,
    pub report: ReportConfig,
    pub auth: AuthConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Maximum accepted upload size for `/predict`, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Classifier model location and input geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the ONNX export of the trained CNN.
    pub path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("model/cnn_model.onnx"),
            input_width: 224,
            input_height: 224,
        }
    }
}

/// Scan history database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. `:memory:` keeps records for the process lifetime only.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("deepgyn_records.db"),
        }
    }
}

/// Report letterhead and font settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory holding `<family>-Regular.ttf`, `-Bold.ttf`, `-Italic.ttf`, `-BoldItalic.ttf`.
    /// When unset, a few well-known system locations are searched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_dir: Option<PathBuf>,
    pub font_family: String,
    pub lab_name: String,
    pub lab_address: String,
    pub licence: String,
    pub phone: String,
    /// Download filename of generated reports.
    pub filename: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            font_dir: None,
            font_family: "LiberationSans".to_string(),
            lab_name: "DEEPGYNSCAN DIAGNOSTICS LAB".to_string(),
            lab_address: "KPRIET, Coimbatore".to_string(),
            licence: "2764".to_string(),
            phone: "+91 8072568527".to_string(),
            filename: "DeepGynScan_Report.pdf".to_string(),
        }
    }
}

/// Identity oracle configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token -> verified owner email. Empty means open mode.
    pub tokens: HashMap<String, String>,
}

impl ServiceConfig {
    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(ConfigError::Invalid {
                message: "model input dimensions must be non-zero".to_string(),
            });
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_upload_bytes must be non-zero".to_string(),
            });
        }
        if self.report.filename.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "report.filename must not be empty".to_string(),
            });
        }
        if let Some((token, _)) = self
            .auth
            .tokens
            .iter()
            .find(|(t, email)| t.is_empty() || email.is_empty())
        {
            return Err(ConfigError::Invalid {
                message: format!("auth token entry '{token}' has an empty token or owner"),
            });
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "deepgynscan", "deepgyn")
}

/// Load configuration with layered merging.
///
/// Order (later wins): defaults, user config, workspace config, explicit
/// config file, `DEEPGYN_*` environment variables, overrides.
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&ServiceConfig>,
) -> Result<ServiceConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ServiceConfig::default()));

    // User-level config
    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".deepgyn").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (DEEPGYN_SERVER__PORT, DEEPGYN_MODEL__PATH, etc.)
    figment = figment.merge(Env::prefixed("DEEPGYN_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: ServiceConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Directory for rolling log files.
pub fn log_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}
