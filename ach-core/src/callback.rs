//! One-shot HTTP listener receiving the OAuth redirect.
//!
//! [`CallbackListener::bind`] holds the port for as long as the value lives.
//! [`CallbackListener::wait`] consumes it and always shuts the server down
//! before returning, whether a callback arrived, the timeout fired or the
//! server died. Dropping an unused listener aborts the server task.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AchError;

pub const REDIRECT_PATH: &str = "/do_access";

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const CONSENT_DONE_PAGE: &str =
    "<html><body><p>Authorization received, you can close this window.</p></body></html>";

#[derive(Clone)]
struct CallbackState {
    base_url: String,
    sender: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

async fn receive_callback(State(state): State<CallbackState>, uri: Uri) -> impl IntoResponse {
    let sender = match state.sender.lock() {
        Ok(mut slot) => slot.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    match sender {
        Some(sender) => {
            let callback_url = format!("{}{}", state.base_url, uri);
            debug!(path = %uri.path(), "Received authorization callback");
            let _ = sender.send(callback_url);
            (StatusCode::OK, Html(CONSENT_DONE_PAGE))
        }
        None => {
            warn!(path = %uri.path(), "Ignoring repeated authorization callback");
            (StatusCode::GONE, Html("<html><body><p>Already authorized.</p></body></html>"))
        }
    }
}

pub struct CallbackListener {
    port: u16,
    callback_rx: oneshot::Receiver<String>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<std::io::Result<()>>>,
}

impl CallbackListener {
    /// Binds `127.0.0.1:port` and starts serving [`REDIRECT_PATH`].
    pub async fn bind(port: u16) -> Result<Self, AchError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| AchError::PortUnavailable { port, source })?;

        let (callback_tx, callback_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = CallbackState {
            base_url: format!("http://localhost:{port}"),
            sender: Arc::new(Mutex::new(Some(callback_tx))),
        };
        let app = Router::new()
            .route(REDIRECT_PATH, get(receive_callback))
            .with_state(state);

        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(address = %addr, path = REDIRECT_PATH, "Listening for authorization callback");
        Ok(CallbackListener {
            port,
            callback_rx,
            shutdown_tx: Some(shutdown_tx),
            server: Some(server),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{}", self.port, REDIRECT_PATH)
    }

    /// Waits for the first redirect and returns its full URL, query included.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<String, AchError> {
        let outcome = self.receive(timeout).await;
        self.shutdown().await;
        outcome
    }

    /// Stops serving without waiting for a callback.
    pub async fn close(mut self) {
        self.shutdown().await;
    }

    async fn receive(&mut self, timeout: Option<Duration>) -> Result<String, AchError> {
        let rx = &mut self.callback_rx;
        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| AchError::ConsentTimeout(limit))?,
            None => rx.await,
        };
        received.map_err(|_| AchError::CallbackAborted)
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut server) = self.server.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!(error = ?e, "Callback listener ended with an error"),
                Ok(Err(e)) => warn!(error = ?e, "Callback listener task failed"),
                Err(_) => {
                    warn!(port = self.port, "Callback listener did not drain in time, aborting");
                    server.abort();
                    let _ = server.await;
                }
            }
        }
        debug!(port = self.port, "Callback listener shut down");
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}
