use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::contract::PlatformError;

/// Every failure the core reports to its caller.
///
/// Missing collections and revocation problems are absorbed where they happen;
/// everything else here is fatal for the current run.
#[derive(Debug, Error)]
pub enum AchError {
    #[error("credential file {path} is corrupt: {reason}")]
    CorruptCredential { path: PathBuf, reason: String },

    #[error("cannot access credential file {path}: {source}")]
    CredentialIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot listen for the authorization callback on port {port}: {source}")]
    PortUnavailable {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("client registration rejected by {endpoint}: {source}")]
    RegistrationFailed {
        endpoint: String,
        #[source]
        source: PlatformError,
    },

    #[error("no authorization callback received within {0:?}")]
    ConsentTimeout(Duration),

    #[error("callback listener stopped before the authorization redirect arrived")]
    CallbackAborted,

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(#[source] PlatformError),

    #[error("fetching documents of {doctype} failed: {source}")]
    FetchFailed {
        doctype: String,
        #[source]
        source: PlatformError,
    },

    #[error("writing documents of {doctype} failed: {source}")]
    WriteFailed {
        doctype: String,
        #[source]
        source: PlatformError,
    },

    #[error("revoking {failed} of {attempted} stale client(s) failed")]
    RevocationFailed {
        attempted: usize,
        failed: usize,
        #[source]
        source: PlatformError,
    },

    #[error("{name} does not exist in {location}")]
    ScriptNotFound { name: String, location: String },

    #[error("script {name} failed: {source}")]
    ScriptFailed {
        name: String,
        #[source]
        source: PlatformError,
    },

    #[error("invalid export artifact: {0}")]
    InvalidArtifact(#[from] serde_json::Error),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AchError::Io {
            path: path.into(),
            source,
        }
    }
}
