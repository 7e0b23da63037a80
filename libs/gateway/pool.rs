//! Shard pool: creates, supervises and tears down shard sessions
//!
//! The pool owns the shared identify gate and the resolved gateway
//! connection parameters. Shards start strictly sequentially (identify
//! admission is fairness-sensitive and shard-to-guild routing depends on
//! stable indices) and stop in reverse order. All shard lifecycle events
//! funnel into one channel the owner consumes.

use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{build_gateway_url, GatewayConfig};
use crate::error::{GatewayError, Result};
use crate::event::ShardEvent;
use crate::identify_gate::IdentifyGate;
use crate::session::{ShardHandle, ShardSession};

/// Capacity of the pool's lifecycle event channel. Each shard is a single
/// producer, so per-shard ordering holds regardless of this bound.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Session-start quota reported by the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStartLimit {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub remaining: u32,
    #[serde(default)]
    pub reset_after: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
}

fn default_max_concurrency() -> u32 {
    1
}

/// `/gateway/bot` response: where to connect and with how many shards
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayInfo {
    pub url: String,
    pub shards: u32,
    pub session_start_limit: SessionStartLimit,
}

/// Supervisor for all shards of one client
pub struct ShardPool {
    config: Arc<GatewayConfig>,
    gate: Arc<IdentifyGate>,
    shards: Vec<ShardHandle>,
    events_tx: mpsc::Sender<ShardEvent>,
    gateway_url: Option<String>,
    total_shards: u32,
}

impl ShardPool {
    /// Create a pool and the receiving end of its lifecycle channel
    pub fn new(config: Arc<GatewayConfig>) -> (Self, mpsc::Receiver<ShardEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let pool = Self {
            config,
            gate: Arc::new(IdentifyGate::new(1)),
            shards: Vec::new(),
            events_tx,
            gateway_url: None,
            total_shards: 0,
        };
        (pool, events_rx)
    }

    /// Apply the gateway's connection parameters
    ///
    /// Shard count is the explicit override when configured, otherwise the
    /// server's suggestion, never less than one. The identify gate adopts
    /// the server's concurrency quota.
    pub fn set_gateway(&mut self, info: &GatewayInfo) -> Result<()> {
        self.total_shards = self
            .config
            .shard_override
            .unwrap_or(info.shards)
            .max(1);
        self.gate
            .set_max_concurrency(info.session_start_limit.max_concurrency.max(1))?;
        self.gateway_url = Some(build_gateway_url(
            &info.url,
            self.config.gateway_version,
            self.config.transport_mode,
        ));

        info!(
            shards = self.total_shards,
            max_concurrency = info.session_start_limit.max_concurrency,
            "gateway configured"
        );
        Ok(())
    }

    /// Start all shards, one fully after another
    pub async fn init_shards(&mut self) -> Result<()> {
        let url = self
            .gateway_url
            .clone()
            .ok_or_else(|| GatewayError::Configuration("gateway URL not set".to_string()))?;

        self.clear_shards().await;

        for shard_id in 0..self.total_shards {
            let session = ShardSession::new(
                shard_id,
                self.total_shards,
                url.clone(),
                Arc::clone(&self.config),
                Arc::clone(&self.gate),
                self.events_tx.clone(),
            );
            debug!(shard = shard_id, "starting shard");
            let handle = session.start().await;
            self.shards.push(handle);
        }
        Ok(())
    }

    /// Stop all shards, newest first, awaiting each before the next
    pub async fn clear_shards(&mut self) {
        while let Some(handle) = self.shards.pop() {
            debug!(shard = handle.shard_id(), "stopping shard");
            handle.stop().await;
        }
    }

    /// Tear the whole pool down: stop every shard, then dispose the gate
    ///
    /// Queued identify waits resolve as disposed rather than hanging.
    pub async fn shutdown(&mut self) {
        self.clear_shards().await;
        self.gate.dispose();
        info!("shard pool shut down");
    }

    pub fn total_shards(&self) -> u32 {
        self.total_shards
    }

    pub fn shards(&self) -> &[ShardHandle] {
        &self.shards
    }

    /// The shared identify gate (mainly useful for tests and diagnostics)
    pub fn gate(&self) -> &Arc<IdentifyGate> {
        &self.gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportMode;

    fn info(shards: u32, max_concurrency: u32) -> GatewayInfo {
        GatewayInfo {
            url: "wss://gateway.example".to_string(),
            shards,
            session_start_limit: SessionStartLimit {
                total: 1000,
                remaining: 1000,
                reset_after: 0,
                max_concurrency,
            },
        }
    }

    #[tokio::test]
    async fn test_set_gateway_uses_server_suggestion() {
        let config = Arc::new(GatewayConfig::new("token", 0));
        let (mut pool, _rx) = ShardPool::new(config);
        pool.set_gateway(&info(4, 2)).unwrap();

        assert_eq!(pool.total_shards(), 4);
        assert_eq!(pool.gate().max_concurrency(), 2);
    }

    #[tokio::test]
    async fn test_set_gateway_honors_override_and_floor() {
        let mut config = GatewayConfig::new("token", 0);
        config.shard_override = Some(8);
        let (mut pool, _rx) = ShardPool::new(Arc::new(config));
        pool.set_gateway(&info(2, 1)).unwrap();
        assert_eq!(pool.total_shards(), 8);

        let config = Arc::new(GatewayConfig::new("token", 0));
        let (mut pool, _rx) = ShardPool::new(config);
        pool.set_gateway(&info(0, 1)).unwrap();
        assert_eq!(pool.total_shards(), 1);
    }

    #[tokio::test]
    async fn test_init_without_gateway_fails() {
        let config = Arc::new(GatewayConfig::new("token", 0));
        let (mut pool, _rx) = ShardPool::new(config);
        assert!(matches!(
            pool.init_shards().await,
            Err(GatewayError::Configuration(_))
        ));
    }

    #[test]
    fn test_session_start_limit_defaults() {
        let limit: SessionStartLimit = serde_json::from_str("{}").unwrap();
        assert_eq!(limit.max_concurrency, 1);
    }

    #[tokio::test]
    async fn test_gateway_url_includes_compression_flag() {
        let mut config = GatewayConfig::new("token", 0);
        config.transport_mode = TransportMode::ZlibStream;
        let (mut pool, _rx) = ShardPool::new(Arc::new(config));
        pool.set_gateway(&info(1, 1)).unwrap();
        assert!(pool
            .gateway_url
            .as_deref()
            .unwrap()
            .ends_with("&compress=zlib-stream"));
    }
}
