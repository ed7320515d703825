//! # weighnode-server
//!
//! HTTP surface of the weight node for Linux / desktop hosts.
//!
//! ## Architecture
//!
//! The route behaviour lives in `weighnode-core` ([`NodeService`]); this crate
//! only maps it onto Axum:
//!
//! - `GET /` - fixed status banner
//! - `GET /data` - one fresh sensor reading as JSON
//!
//! ## Usage
//!
//! ```rust,ignore
//! use weighnode_server::serve;
//!
//! let listener = TcpListener::bind("0.0.0.0:8080").await?;
//! serve(listener, Arc::new(endpoints)).await?;
//! ```

pub mod routes;

// Re-exports
pub use routes::create_router;

use std::sync::Arc;
use tokio::net::TcpListener;
use weighnode_core::NodeService;

/// Type alias for shared state in Axum handlers.
pub type AppState = Arc<dyn NodeService>;

/// Serve the node routes on an already bound listener until the server stops.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, create_router(state)).await
}
