//! Collector → dispatcher → {cache, relay} wiring

use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use rmonitor_collector::Collector;
use rmonitor_hub::{Cache, Dispatcher, Subscription};
use rmonitor_relay::Relay;

use crate::config::DaemonConfig;

/// One collector feeding one relay through a shared cache
pub struct Pipeline {
    cache: Arc<Cache>,
    dispatcher: Dispatcher,
    collector: Collector,
    relay: Relay,
    _cache_subscription: Subscription,
}

impl Pipeline {
    pub fn new(config: &DaemonConfig) -> Self {
        let dispatcher = Dispatcher::new();
        let cache = Arc::new(Cache::new());
        let cache_subscription = cache.attach(&dispatcher);

        let collector = Collector::new(config.collector_config(), dispatcher.clone());
        let relay = Relay::new(config.relay_config(), Arc::clone(&cache), dispatcher.clone());

        Self {
            cache,
            dispatcher,
            collector,
            relay,
            _cache_subscription: cache_subscription,
        }
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Start the relay listener; returns its bound address
    pub async fn start_relay(&self) -> Result<SocketAddr> {
        self.relay.start().await.context("Failed to start relay")
    }

    /// Run until `shutdown` resolves or the collector fails
    ///
    /// The relay must already be started; it is stopped on the way out.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let cancel = CancellationToken::new();
        let collector = self.collector.clone();
        let mut collector_task = tokio::spawn({
            let cancel = cancel.clone();
            async move { collector.run(cancel).await }
        });

        let collector_result = tokio::select! {
            _ = shutdown => {
                tracing::info!("shutdown requested");
                cancel.cancel();
                (&mut collector_task).await
            }
            result = &mut collector_task => result,
        };

        if let Err(e) = self.relay.stop().await {
            tracing::warn!(error = %e, "relay was not running");
        }

        collector_result
            .context("Collector task failed")?
            .context("Collector stopped")?;
        Ok(())
    }
}
