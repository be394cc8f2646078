//! Loading the viewlink configuration from disk.
//!
//! The file is optional at every call site (callers fall back to the
//! built-in defaults), so a missing path is reported rather than
//! invented.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::ViewlinkConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => {
                write!(f, "cannot read config file {}: {}", path.display(), e)
            }
            ConfigError::Parse(e) => write!(f, "config file is not valid TOML: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "config rejected: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate a TOML configuration file.
pub fn load_config(path: &Path) -> Result<ViewlinkConfig, ConfigError> {
    let content =
        fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    let config: ViewlinkConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}
