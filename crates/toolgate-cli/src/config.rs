//! Configuration file loading.
//!
//! Sources, lowest to highest priority: built-in defaults, the TOML file
//! (`--config` or the per-user default), then `TOOLGATE_` environment
//! variables with nested keys split on `__`
//! (`TOOLGATE_GATEWAY__INVOCATION_TIMEOUT_MS=5000`).

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use toolgate_core::{ConfirmationRule, GatewaySettings, ServerConfig};

use crate::error::CliError;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TOOLGATE_";

/// Complete file configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub gateway: GatewaySettings,
    pub servers: Vec<ServerConfig>,
    pub policy: PolicyConfig,
}

/// Extra confirmation rules layered over the built-in table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub rules: Vec<ConfirmationRule>,
}

/// Configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources.
    ///
    /// An explicit path must exist; the default path is optional.
    pub fn load(config_path: Option<&Path>) -> Result<FileConfig, CliError> {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(path) = Self::default_config_path().filter(|p| p.exists()) {
                    tracing::debug!(path = %path.display(), "Using default config file");
                    figment = figment.merge(Toml::file(path));
                }
            }
        }

        let config: FileConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.gateway.validate()?;
        Ok(config)
    }

    /// `$CONFIG_DIR/toolgate/toolgate.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("toolgate").join("toolgate.toml"))
    }

    /// Render a configuration as TOML.
    pub fn render(config: &FileConfig) -> Result<String, CliError> {
        toml::to_string_pretty(config).map_err(|e| CliError::Config(e.to_string()))
    }
}
