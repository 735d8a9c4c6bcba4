use tracing::{debug, info, warn};

use crate::contract::{Platform, PlatformError};
use crate::error::AchError;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RevocationReport {
    pub revoked: Vec<String>,
}

/// Deletes every client named `client_name` except `keep_client_id`.
///
/// All candidates are attempted; if any deletion fails the first error is
/// returned after the others were tried. With no candidates this is a no-op.
pub async fn revoke_stale_clients<P>(
    platform: &P,
    client_name: &str,
    keep_client_id: &str,
) -> Result<RevocationReport, AchError>
where
    P: Platform + ?Sized,
{
    let clients = platform
        .list_clients()
        .await
        .map_err(|source| AchError::RevocationFailed {
            attempted: 0,
            failed: 0,
            source,
        })?;

    let stale: Vec<_> = clients
        .into_iter()
        .filter(|c| c.client_name == client_name && c.id != keep_client_id)
        .collect();
    debug!(count = stale.len(), client_name, "Stale clients selected for revocation");

    let mut report = RevocationReport::default();
    let mut first_error: Option<PlatformError> = None;
    let mut failed = 0;

    for client in &stale {
        debug!(client_id = %client.id, "Revoking client");
        match platform.delete_client(&client.id).await {
            Ok(()) => report.revoked.push(client.id.clone()),
            Err(e) => {
                warn!(error = %e, client_id = %client.id, "Failed to revoke client");
                failed += 1;
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(source) = first_error {
        return Err(AchError::RevocationFailed {
            attempted: stale.len(),
            failed,
            source,
        });
    }

    info!(revoked = report.revoked.len(), "Revoked stale clients");
    Ok(report)
}
