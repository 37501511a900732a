use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::schema::ClientConfig;
use crate::error::ConfigError;

const CONFIG_DIR_NAME: &str = "factorlab";
const CONFIG_FILE_NAME: &str = "config.yaml";

pub const ENV_BASE_URL: &str = "FACTORLAB_BASE_URL";
pub const ENV_MODEL_ID: &str = "FACTORLAB_MODEL_ID";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ClientConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Parses YAML (or JSON, which is a YAML subset) into a validated config.
pub fn load_config_from_str(content: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = if content.trim().is_empty() {
        ClientConfig::default()
    } else {
        serde_yaml::from_str(content)?
    };

    validate_config(&config)?;

    Ok(config)
}

/// Platform config location, e.g. `~/.config/factorlab/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Loads the explicit path if given, else the platform default when it
/// exists, else defaults. Environment overrides are applied last.
pub fn resolve_config(explicit: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let mut config = match explicit {
        Some(path) => {
            info!("Loading config from {}", path.display());
            load_config(path)?
        }
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(path) => {
                info!("Loading config from {}", path.display());
                load_config(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                ClientConfig::default()
            }
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config)?;

    Ok(config)
}

/// Applies `FACTORLAB_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut ClientConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
        debug!("{} overrides base_url", ENV_BASE_URL);
        config.base_url = url.trim().to_string();
    }
    if let Some(model) = lookup(ENV_MODEL_ID).filter(|v| !v.trim().is_empty()) {
        debug!("{} overrides model_id", ENV_MODEL_ID);
        config.model_id = Some(model.trim().to_string());
    }
}

pub fn validate_config(config: &ClientConfig) -> Result<(), ConfigError> {
    if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
        return Err(ConfigError::Validation {
            message: format!(
                "base_url must start with http:// or https://, got '{}'",
                config.base_url
            ),
        });
    }

    if config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "connect_timeout_secs must be positive".to_string(),
        });
    }

    if config.request_timeout_secs == Some(0) {
        return Err(ConfigError::Validation {
            message: "request_timeout_secs must be positive when set".to_string(),
        });
    }

    Ok(())
}
