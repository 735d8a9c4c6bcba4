//! Session bootstrap.
//!
//! [`create_session`] is the only policy: a stored credential is reused as-is,
//! otherwise the interactive flow runs and stale clients of this tool are
//! revoked afterwards. There is no refresh and no expiry check; an expired
//! stored token shows up as an authorization error on first use.

use std::fmt;

use tracing::{info, warn};

use crate::authorize::{authorize, ConsentOpener};
use crate::config::{SessionOptions, CLIENT_NAME};
use crate::contract::Connector;
use crate::error::AchError;
use crate::revoke::revoke_stale_clients;
use crate::token_store;

/// Doctype holding the OAuth clients; always granted so a session can revoke its peers.
pub const CLIENTS_DOCTYPE: &str = "io.cozy.oauth.clients";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    All,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::All => f.write_str("ALL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionScope {
    pub doctype: String,
    pub capability: Capability,
}

impl PermissionScope {
    pub fn all(doctype: impl Into<String>) -> Self {
        PermissionScope {
            doctype: doctype.into(),
            capability: Capability::All,
        }
    }
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.doctype, self.capability)
    }
}

/// Scopes for `doctypes` in request order, deduplicated, plus the clients scope.
pub fn scopes_for(doctypes: &[String]) -> Vec<PermissionScope> {
    let mut scopes: Vec<PermissionScope> = Vec::with_capacity(doctypes.len() + 1);
    let wanted = doctypes
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(CLIENTS_DOCTYPE));
    for doctype in wanted {
        let scope = PermissionScope::all(doctype);
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }
    scopes
}

/// Authenticated handle data for one run.
#[derive(Clone, PartialEq)]
pub struct Session {
    pub endpoint: String,
    pub access_token: String,
    /// Unknown for sessions rebuilt from a stored token.
    pub client_id: Option<String>,
    /// `None` when the token came from disk: its scope is trusted, not known.
    pub granted_scopes: Option<Vec<PermissionScope>>,
}

impl Session {
    pub fn from_stored(endpoint: impl Into<String>, access_token: impl Into<String>) -> Self {
        Session {
            endpoint: endpoint.into(),
            access_token: access_token.into(),
            client_id: None,
            granted_scopes: None,
        }
    }

    /// Host part of the endpoint, used to prefix script output.
    pub fn instance(&self) -> &str {
        let without_scheme = self
            .endpoint
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.endpoint);
        without_scheme.trim_end_matches('/')
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("access_token", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("granted_scopes", &self.granted_scopes)
            .finish()
    }
}

/// Reuses the credential at `options.token_path`, or authorizes interactively
/// and then revokes older clients of this tool.
pub async fn create_session<C>(
    connector: &C,
    opener: &dyn ConsentOpener,
    options: &SessionOptions,
    doctypes: &[String],
) -> Result<Session, AchError>
where
    C: Connector + ?Sized,
{
    if let Some(credential) = token_store::read(&options.token_path)? {
        info!(endpoint = %options.endpoint, "Session built from stored token");
        return Ok(Session::from_stored(&options.endpoint, credential.token));
    }

    info!(
        token_path = %options.token_path.display(),
        "No stored token, starting authorization"
    );
    let session = authorize(connector, opener, options, doctypes).await?;

    if let Some(client_id) = session.client_id.as_deref() {
        let platform = connector.connect(&session);
        match revoke_stale_clients(platform.as_ref(), CLIENT_NAME, client_id).await {
            Ok(report) => info!(revoked = report.revoked.len(), "Stale client revocation done"),
            Err(e) => warn!(error = %e, "Cannot revoke stale clients"),
        }
    }

    Ok(session)
}
