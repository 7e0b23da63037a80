//! Client configuration and gateway intents

use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;
use std::time::Duration;

use filament_gateway::config::{GatewayConfig, IdentifyProperties, TransportMode};
use filament_gateway::reconnect::{FixedDelay, ReconnectPolicy};
use filament_rest::DEFAULT_BASE_URL;

/// Bitmask selecting which event families the gateway delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Intents(pub u64);

impl Intents {
    pub const GUILDS: Intents = Intents(1 << 0);
    pub const GUILD_MEMBERS: Intents = Intents(1 << 1);
    pub const GUILD_MODERATION: Intents = Intents(1 << 2);
    pub const GUILD_VOICE_STATES: Intents = Intents(1 << 7);
    pub const GUILD_PRESENCES: Intents = Intents(1 << 8);
    pub const GUILD_MESSAGES: Intents = Intents(1 << 9);
    pub const GUILD_MESSAGE_REACTIONS: Intents = Intents(1 << 10);
    pub const DIRECT_MESSAGES: Intents = Intents(1 << 12);
    pub const MESSAGE_CONTENT: Intents = Intents(1 << 15);

    pub const fn none() -> Intents {
        Intents(0)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Intents) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Intents {
    type Output = Intents;

    fn bitor(self, rhs: Intents) -> Intents {
        Intents(self.0 | rhs.0)
    }
}

impl BitOrAssign for Intents {
    fn bitor_assign(&mut self, rhs: Intents) {
        self.0 |= rhs.0;
    }
}

/// Everything the client needs to connect
#[derive(Clone)]
pub struct ClientConfig {
    pub token: String,
    pub intents: Intents,
    pub rest_base_url: String,
    /// Force a shard count instead of the server-recommended one
    pub shard_override: Option<u32>,
    pub transport_mode: TransportMode,
    pub reconnect_policy: Arc<dyn ReconnectPolicy>,
    pub identify_properties: IdentifyProperties,
}

impl ClientConfig {
    pub fn new(token: impl Into<String>, intents: Intents) -> Self {
        Self {
            token: token.into(),
            intents,
            rest_base_url: DEFAULT_BASE_URL.to_string(),
            shard_override: None,
            transport_mode: TransportMode::ZlibStream,
            reconnect_policy: Arc::new(FixedDelay::new(Duration::from_secs(5), None)),
            identify_properties: IdentifyProperties::default(),
        }
    }

    /// Read the token from `FILAMENT_TOKEN` (after `dotenv` has run)
    pub fn from_env(intents: Intents) -> anyhow::Result<Self> {
        let token = std::env::var("FILAMENT_TOKEN")
            .map_err(|_| anyhow::anyhow!("FILAMENT_TOKEN environment variable not set"))?;
        Ok(Self::new(token, intents))
    }

    pub fn rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = url.into();
        self
    }

    pub fn shard_override(mut self, shards: u32) -> Self {
        self.shard_override = Some(shards);
        self
    }

    pub fn transport_mode(mut self, mode: TransportMode) -> Self {
        self.transport_mode = mode;
        self
    }

    pub fn reconnect_policy(mut self, policy: Arc<dyn ReconnectPolicy>) -> Self {
        self.reconnect_policy = policy;
        self
    }

    pub(crate) fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            token: self.token.clone(),
            intents: self.intents.bits(),
            shard_override: self.shard_override,
            gateway_version: filament_gateway::config::GATEWAY_VERSION,
            transport_mode: self.transport_mode,
            reconnect_policy: Arc::clone(&self.reconnect_policy),
            identify_properties: self.identify_properties.clone(),
        }
    }
}
