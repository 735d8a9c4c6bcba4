//! Interactive authorization: register a client, collect consent through the
//! local redirect listener, exchange the redirect for an access token and
//! persist it.

use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

use tracing::{error, info, warn};

use crate::callback::CallbackListener;
use crate::config::{self, SessionOptions};
use crate::contract::{ClientRegistration, Connector};
use crate::error::AchError;
use crate::session::{scopes_for, PermissionScope, Session};
use crate::token_store::{self, Credential};

/// Shows the consent URL to the user.
pub trait ConsentOpener: Send + Sync {
    /// Must not block until the user finishes; errors are reported but not fatal.
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Opens URLs with the desktop's default handler.
pub struct SystemBrowser;

impl ConsentOpener for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        let mut command = if cfg!(target_os = "macos") {
            let mut c = Command::new("open");
            c.arg(url);
            c
        } else if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", "", url]);
            c
        } else {
            let mut c = Command::new("xdg-open");
            c.arg(url);
            c
        };
        spawn_reaped(&mut command).map(|_| ())
    }
}

/// Starts `command` with null stdio and returns at once. A helper thread waits
/// on the child so it never lingers as a zombie; join the handle to get its status.
pub fn spawn_reaped(
    command: &mut Command,
) -> std::io::Result<JoinHandle<std::io::Result<ExitStatus>>> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(std::thread::spawn(move || child.wait()))
}

/// Runs the full consent flow. The listener is shut down before this returns,
/// on success and on every error after it was bound.
pub async fn authorize<C>(
    connector: &C,
    opener: &dyn ConsentOpener,
    options: &SessionOptions,
    doctypes: &[String],
) -> Result<Session, AchError>
where
    C: Connector + ?Sized,
{
    let scopes: Vec<PermissionScope> = scopes_for(doctypes);
    info!(
        endpoint = %options.endpoint,
        scopes = ?scopes.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "Starting interactive authorization"
    );

    let listener = CallbackListener::bind(options.callback_port).await?;

    let registration = ClientRegistration {
        redirect_uri: listener.redirect_uri(),
        client_name: config::CLIENT_NAME.to_string(),
        software_id: config::software_id(),
        software_version: config::software_version().to_string(),
        scopes: scopes.iter().map(ToString::to_string).collect(),
    };

    let client = match connector
        .register_client(&options.endpoint, &registration)
        .await
    {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, endpoint = %options.endpoint, "Client registration rejected");
            listener.close().await;
            return Err(AchError::RegistrationFailed {
                endpoint: options.endpoint.clone(),
                source: e,
            });
        }
    };
    info!(client_id = %client.client_id, "Registered client, waiting for consent");

    if let Err(e) = opener.open(&client.consent_url) {
        warn!(error = ?e, "Could not open the consent page automatically");
    }
    eprintln!(
        "Grant access in your browser. If it did not open, visit:\n  {}",
        client.consent_url
    );

    let callback_url = listener.wait(options.consent_timeout).await?;

    let token = connector
        .exchange_code(&options.endpoint, &client, &callback_url)
        .await
        .map_err(|e| {
            error!(error = %e, client_id = %client.client_id, "Token exchange failed");
            AchError::TokenExchangeFailed(e)
        })?;

    token_store::write(&options.token_path, &Credential::new(token.clone()))?;

    Ok(Session {
        endpoint: options.endpoint.clone(),
        access_token: token,
        client_id: Some(client.client_id),
        granted_scopes: Some(scopes),
    })
}
