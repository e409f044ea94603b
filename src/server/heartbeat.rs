//! Registers a running server with a registry and keeps its entry alive.
//! Supplements the core dispatcher: a server that never calls
//! [`heartbeat`] simply never shows up in registry-backed discovery.

use std::time::Duration;

use log::{info, warn};

/// Sends a heartbeat POST to `registry_url` announcing `addr`, then keeps
/// resending every `period` until the task is aborted. Meant to be driven
/// by `tokio::spawn` alongside [`crate::server::Server::accept`].
pub async fn heartbeat(registry_url: String, addr: String, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        match crate::httpclient::post_header(&registry_url, "X-rpc-servers", &addr).await {
            Ok(()) => info!("heartbeat to {} ok ({})", registry_url, addr),
            Err(err) => warn!("heartbeat to {} failed: {}", registry_url, err),
        }
    }
}
