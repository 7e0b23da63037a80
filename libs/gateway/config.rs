//! Gateway connection configuration

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::reconnect::{FixedDelay, ReconnectPolicy};

/// Gateway protocol version this crate speaks
pub const GATEWAY_VERSION: u8 = 10;

/// How the server delivers the event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Uncompressed JSON text frames
    Plain,
    /// Whole-connection zlib compression with sync-flush message boundaries
    ZlibStream,
}

/// Client metadata sent inside the Identify payload
#[derive(Debug, Clone, Serialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "filament".to_string(),
            device: "filament".to_string(),
        }
    }
}

/// Configuration shared by every shard of one connection
pub struct GatewayConfig {
    /// Bot token used for Identify/Resume
    pub token: String,
    /// Requested intents bitmask
    pub intents: u64,
    /// Explicit shard count; `None` uses the server-suggested count
    pub shard_override: Option<u32>,
    pub gateway_version: u8,
    pub transport_mode: TransportMode,
    /// Delay policy for reconnects after transport failures
    pub reconnect_policy: Arc<dyn ReconnectPolicy>,
    pub identify_properties: IdentifyProperties,
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>, intents: u64) -> Self {
        Self {
            token: token.into(),
            intents,
            shard_override: None,
            gateway_version: GATEWAY_VERSION,
            transport_mode: TransportMode::Plain,
            reconnect_policy: Arc::new(FixedDelay::new(Duration::from_secs(5), None)),
            identify_properties: IdentifyProperties::default(),
        }
    }
}

/// Build the full connection URI from a base gateway URL
///
/// The compression query parameter is present only when zlib-stream mode is
/// requested; the base URL may come from `/gateway/bot` or from a READY
/// payload's resume URL.
pub fn build_gateway_url(base: &str, version: u8, mode: TransportMode) -> String {
    let base = base.trim_end_matches('/');
    match mode {
        TransportMode::Plain => format!("{base}/?v={version}&encoding=json"),
        TransportMode::ZlibStream => {
            format!("{base}/?v={version}&encoding=json&compress=zlib-stream")
        }
    }
}
