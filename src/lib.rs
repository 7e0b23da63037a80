//! Filament: a sharded gateway + REST client SDK
//!
//! ```text
//!            ┌─────────────────────────────┐
//!            │           Client            │
//!            └──────┬──────────────┬───────┘
//!                   │              │
//!         ┌─────────▼────────┐ ┌───▼───────────────┐
//!         │    ShardPool     │ │ RateLimitedClient │
//!         │(filament-gateway)│ │  (filament-rest)  │
//!         └─────────┬────────┘ └───────────────────┘
//!                   │ events
//!         ┌─────────▼────────┐
//!         │  EventRegistry   │
//!         └──────────────────┘
//! ```
//!
//! [`Client::start`] fetches `/gateway/bot`, spins up one session per
//! shard under the identify concurrency gate, and fans the resulting
//! event stream out to registered handlers.

pub mod client;
pub mod config;
pub mod error;
pub mod registry;

pub use client::Client;
pub use config::{ClientConfig, Intents};
pub use error::{ClientError, Result};
pub use registry::{EventHandler, EventRegistry};

pub use filament_gateway as gateway;
pub use filament_rest as rest;

pub use filament_gateway::{ShardEvent, TransportMode};
