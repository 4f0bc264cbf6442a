// nostr-proxy: Library entry point.
// Exposes modules for integration testing.

pub mod broadcast;
pub mod client;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod media;
pub mod router;
pub mod upstream;
pub mod validator;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing::info;

use crate::client::Listener;
use crate::config::ProxyConfig;
use crate::engine::ProxyEngine;
use crate::media::MediaFilter;

/// A bound, not-yet-running proxy.
///
/// Binding and running are split so callers (and tests, via port 0) can
/// learn the listen address before any client connects.
pub struct Proxy {
    engine: Arc<ProxyEngine>,
    listener: Listener,
    config: ProxyConfig,
}

impl Proxy {
    /// Bind the client listener and set up shared state.
    pub async fn bind(config: ProxyConfig) -> std::io::Result<Self> {
        let engine = Arc::new(ProxyEngine::new(config.note_cache_time));
        let listener = Listener::bind(config.listen_ip, config.listen_port).await?;
        Ok(Proxy {
            engine,
            listener,
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared state handle, for observing counters and membership.
    pub fn engine(&self) -> Arc<ProxyEngine> {
        Arc::clone(&self.engine)
    }

    /// Run the proxy: sweep task, one supervisor per upstream, and the
    /// client accept loop.  Never returns.
    pub async fn run(self) {
        let filter = self
            .config
            .filter_large_media
            .then(|| Arc::new(MediaFilter::new()));

        dedup::spawn_sweeper(Arc::clone(&self.engine), self.config.sweep_period);

        for endpoint in self
            .config
            .public_servers
            .iter()
            .chain(self.config.private_servers.iter())
        {
            info!(upstream = %endpoint, "starting upstream supervisor");
            tokio::spawn(upstream::supervise(
                Arc::clone(&self.engine),
                filter.clone(),
                endpoint.clone(),
                self.config.clone(),
            ));
        }

        self.listener.run(self.engine).await;
    }
}

/// Wait for SIGINT.
pub async fn signal_handler() {
    let _ = signal::ctrl_c().await;
}
