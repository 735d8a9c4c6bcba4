/// `load_config` module: loads the optional YAML settings file and merges it
/// with command-line overrides into the core's `SessionOptions`.
///
/// # Precedence
/// command-line flag > YAML file > built-in default.
///
/// # Accepted YAML
/// ```yaml
/// url: https://alice.mycozy.cloud
/// token: ./alice-token.json
/// callback_port: 3333
/// consent_timeout_secs: 300
/// ```
/// Every key is optional. Unknown keys are rejected so typos surface early.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use ach_core::config::{SessionOptions, DEFAULT_CALLBACK_PORT, DEFAULT_TOKEN_PATH, DEFAULT_URL};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<PathBuf>,
    #[serde(default)]
    pub callback_port: Option<u16>,
    #[serde(default)]
    pub consent_timeout_secs: Option<u64>,
}

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub url: Option<String>,
    pub token: Option<PathBuf>,
    pub callback_port: Option<u16>,
    pub consent_timeout_secs: Option<u64>,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid "all defaults" config.
    if config_content.trim().is_empty() {
        return Ok(FileConfig::default());
    }

    match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

pub fn session_options(file: Option<FileConfig>, overrides: Overrides) -> SessionOptions {
    let file = file.unwrap_or_default();
    let options = SessionOptions {
        endpoint: overrides
            .url
            .or(file.url)
            .unwrap_or_else(|| DEFAULT_URL.to_string()),
        token_path: overrides
            .token
            .or(file.token)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_PATH)),
        callback_port: overrides
            .callback_port
            .or(file.callback_port)
            .unwrap_or(DEFAULT_CALLBACK_PORT),
        consent_timeout: overrides
            .consent_timeout_secs
            .or(file.consent_timeout_secs)
            .map(Duration::from_secs),
    };
    options.trace_loaded();
    options
}
