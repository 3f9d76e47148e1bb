//! Target Node Library
//!
//! In-memory resource-API server speaking the create/list/watch/
//! delete-collection wire contract the bench node drives. Used by the
//! integration tests and runnable standalone as a local benchmark target.

pub mod api;
pub mod store;

// Re-export commonly used types
pub use api::{router, AppState};
pub use store::{CollectionKey, ResourceStore, StoreSettings};

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

/// Serve the resource API on an already-bound listener until the task is
/// dropped or the server errors
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let listen_addr = listener
        .local_addr()
        .context("listener has no local address")?;
    info!(listen_addr = %listen_addr, "Resource API server started");

    axum::serve(listener, router(state))
        .await
        .context("resource API server error")
}
