use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

pub const DEFAULT_URL: &str = "http://cozy.tools:8080";
pub const DEFAULT_TOKEN_PATH: &str = "token.json";
pub const DEFAULT_CALLBACK_PORT: u16 = 3333;

/// Name every client registered by this tool carries; revocation matches on it.
pub const CLIENT_NAME: &str = "ACH";

pub const ENV_KEEP_ID: &str = "ACH_KEEP_ID";
pub const ENV_NO_KEEP_ID: &str = "ACH_NO_KEEP_ID";
pub const ENV_KEEP_REV: &str = "ACH_KEEP_REV";

pub fn software_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn software_id() -> String {
    format!("{}-{}", CLIENT_NAME, software_version())
}

/// Which transport fields survive export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StripOptions {
    pub keep_id: bool,
    pub keep_rev: bool,
}

impl StripOptions {
    /// Reads the `ACH_*` toggles from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `ACH_NO_KEEP_ID` wins over `ACH_KEEP_ID`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map(|v| is_truthy(&v)).unwrap_or(false);
        let options = StripOptions {
            keep_id: flag(ENV_KEEP_ID) && !flag(ENV_NO_KEEP_ID),
            keep_rev: flag(ENV_KEEP_REV),
        };
        debug!(?options, "Resolved metadata stripping options");
        options
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no"
    )
}

/// Everything the session factory needs besides the doctypes.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub endpoint: String,
    pub token_path: PathBuf,
    pub callback_port: u16,
    /// `None` waits for the consent redirect forever.
    pub consent_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            endpoint: DEFAULT_URL.to_string(),
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            callback_port: DEFAULT_CALLBACK_PORT,
            consent_timeout: None,
        }
    }
}

impl SessionOptions {
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{}", self.callback_port, crate::callback::REDIRECT_PATH)
    }

    pub fn trace_loaded(&self) {
        info!(
            endpoint = %self.endpoint,
            token_path = %self.token_path.display(),
            callback_port = self.callback_port,
            consent_timeout = ?self.consent_timeout,
            "Loaded session options"
        );
    }
}
