//! Top-level client facade
//!
//! Ties the pieces together: the rate-limited REST client fetches the
//! gateway URL and shard count, the shard pool dials and maintains the
//! WebSocket sessions, and a background task fans incoming events out to
//! the registry.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use filament_gateway::pool::{GatewayInfo, ShardPool};
use filament_gateway::SessionState;
use filament_rest::RateLimitedClient;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::registry::EventRegistry;

pub struct Client {
    config: ClientConfig,
    rest: Arc<RateLimitedClient>,
    registry: Arc<EventRegistry>,
    pool: Option<ShardPool>,
    dispatch_task: Option<JoinHandle<()>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let rest = Arc::new(RateLimitedClient::new(
            config.rest_base_url.clone(),
            Some(config.token.clone()),
        ));
        Self {
            config,
            rest,
            registry: Arc::new(EventRegistry::new()),
            pool: None,
            dispatch_task: None,
        }
    }

    pub fn rest(&self) -> &Arc<RateLimitedClient> {
        &self.rest
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Fetch gateway info, bring up every shard, and start dispatching
    ///
    /// Returns once all shards have completed their first connection
    /// attempt; events flow to the registry from then on.
    pub async fn start(&mut self) -> Result<()> {
        let response = self.rest.get("/gateway/bot").await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::GatewayInfo {
                status: status.as_u16(),
            });
        }
        let info: GatewayInfo = response
            .json()
            .await
            .map_err(filament_rest::RestError::from)?;
        info!(
            url = %info.url,
            shards = info.shards,
            max_concurrency = info.session_start_limit.max_concurrency,
            "fetched gateway info"
        );

        let (mut pool, mut events) = ShardPool::new(Arc::new(self.config.gateway_config()));
        pool.set_gateway(&info)?;
        pool.init_shards().await?;

        let registry = Arc::clone(&self.registry);
        self.dispatch_task = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                registry.dispatch(&event).await;
            }
            debug!("event channel closed, dispatch loop exiting");
        }));
        self.pool = Some(pool);
        Ok(())
    }

    /// Per-shard connection states, in shard order
    pub fn shard_states(&self) -> Vec<SessionState> {
        self.pool
            .as_ref()
            .map(|pool| pool.shards().iter().map(|shard| shard.state()).collect())
            .unwrap_or_default()
    }

    /// Stop all shards (highest index first) and the dispatch loop
    pub async fn shutdown(&mut self) {
        if let Some(mut pool) = self.pool.take() {
            pool.shutdown().await;
        }
        // Dropping the pool closed the event channel, so the dispatch task
        // drains what is left and exits on its own.
        if let Some(task) = self.dispatch_task.take() {
            let _ = task.await;
        }
        info!("client shut down");
    }
}
