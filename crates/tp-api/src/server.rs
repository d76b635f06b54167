//! Server startup.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

/// Binds the listener and serves the API until the process exits.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "taskpay api listening");
    axum::serve(listener, build_router(state)).await
}
