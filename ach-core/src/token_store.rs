//! Persisted access token.
//!
//! The file holds `{"token": "<access token>"}`. Its presence is the only thing
//! that lets a run skip interactive authorization, so a file that exists but
//! does not parse is reported as [`AchError::CorruptCredential`] rather than
//! being treated as absent.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::AchError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(alias = "accessToken")]
    pub token: String,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Credential {
            token: token.into(),
        }
    }
}

/// Returns `Ok(None)` when no file exists at `path`.
pub fn read(path: &Path) -> Result<Option<Credential>, AchError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No stored credential");
            return Ok(None);
        }
        Err(e) => {
            error!(error = ?e, path = %path.display(), "Failed to read credential file");
            return Err(AchError::CredentialIo {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let credential: Credential = serde_json::from_str(&raw).map_err(|e| {
        error!(error = %e, path = %path.display(), "Credential file does not parse");
        AchError::CorruptCredential {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    if credential.token.trim().is_empty() {
        error!(path = %path.display(), "Credential file holds an empty token");
        return Err(AchError::CorruptCredential {
            path: path.to_path_buf(),
            reason: "token is empty".to_string(),
        });
    }

    info!(path = %path.display(), "Using stored credential");
    Ok(Some(credential))
}

/// Atomically replaces the file at `path`; the temp file is created with owner-only access.
pub fn write(path: &Path, credential: &Credential) -> Result<(), AchError> {
    let to_io_error = |e: std::io::Error| AchError::CredentialIo {
        path: path.to_path_buf(),
        source: e,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(to_io_error)?;

    let json = serde_json::to_string(credential).map_err(|e| AchError::CorruptCredential {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(to_io_error)?;
    tmp.write_all(json.as_bytes()).map_err(to_io_error)?;
    tmp.as_file().sync_all().map_err(to_io_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))
            .map_err(to_io_error)?;
    }

    tmp.persist(path).map_err(|e| {
        error!(error = ?e.error, path = %path.display(), "Failed to persist credential file");
        to_io_error(e.error)
    })?;

    info!(path = %path.display(), "Wrote credential file");
    Ok(())
}
