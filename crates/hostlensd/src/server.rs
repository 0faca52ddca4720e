//! Daemon server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::error::{DaemonError, DaemonResult};
use crate::routes::create_router;
use crate::state::AppState;

/// HTTP front end over the shared daemon state.
///
/// Serving runs the startup gate first, so the schema, demo history and the
/// background loops are in place before the first request is accepted.
#[derive(Debug, Clone)]
pub struct DaemonServer {
    state: Arc<AppState>,
}

impl DaemonServer {
    /// Wraps existing state.
    #[must_use]
    pub const fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Get the daemon state for external access.
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Start the server and listen for connections.
    ///
    /// This method runs until the server encounters a fatal error.
    ///
    /// # Errors
    ///
    /// Returns an error if startup fails or binding to the address fails.
    pub async fn serve(&self, addr: SocketAddr) -> DaemonResult<()> {
        self.serve_with_shutdown(addr, std::future::pending()).await
    }

    /// Start the server with graceful shutdown support.
    ///
    /// The server will shut down when the provided future completes.
    ///
    /// # Errors
    ///
    /// Returns an error if startup fails or binding to the address fails.
    pub async fn serve_with_shutdown<F>(&self, addr: SocketAddr, shutdown: F) -> DaemonResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.state.ensure_started().await?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DaemonError::BindFailed(addr, e))?;
        let local = listener.local_addr().unwrap_or(addr);

        info!(addr = %local, "hostlensd listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| DaemonError::Internal(e.to_string()))?;

        info!("hostlensd shut down");
        Ok(())
    }

    /// Create the router without starting the server.
    ///
    /// Useful for testing or embedding in another server.
    pub fn router(&self) -> axum::Router {
        create_router(Arc::clone(&self.state))
    }
}
