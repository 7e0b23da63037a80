//! # filament-gateway
//!
//! Shard/session layer of the filament SDK: opens and maintains WebSocket
//! shards against the chat platform's gateway, runs the identify/resume
//! handshake, keeps connections alive with heartbeats, and recovers from
//! disconnects.
//!
//! ## Architecture
//!
//! ```text
//! ShardPool ──owns──> IdentifyGate (admission for concurrent identifies)
//!     │
//!     ├──> ShardSession 0 ──> GatewaySink/GatewayStream (one WebSocket)
//!     ├──> ShardSession 1 ──> ...          │
//!     │         │                          └─ ZlibStreamInflater (optional)
//!     │         └─ heartbeat ticker task
//!     └──> mpsc<ShardEvent> ──> owner (client facade)
//! ```
//!
//! Shards recover from transport failures on their own; the owner only sees
//! `Ready`/`Resumed`/`ConnectionLost`/`Dispatch` events.

pub mod config;
pub mod error;
pub mod event;
pub mod identify_gate;
pub mod inflate;
pub mod opcode;
pub mod pool;
pub mod reconnect;
pub mod session;
pub mod session_state;
pub mod shutdown;
pub mod transport;

pub use config::{build_gateway_url, GatewayConfig, IdentifyProperties, TransportMode, GATEWAY_VERSION};
pub use error::{GatewayError, Result};
pub use event::ShardEvent;
pub use identify_gate::IdentifyGate;
pub use inflate::{ZlibStreamInflater, ZLIB_SUFFIX};
pub use opcode::{GatewayFrame, OpCode, CLOSE_CODE_NO_STATUS, EVENT_READY, EVENT_RESUMED};
pub use pool::{GatewayInfo, SessionStartLimit, ShardPool};
pub use reconnect::{ExponentialBackoff, FixedDelay, ReconnectPolicy};
pub use session::{ShardHandle, ShardSession};
pub use session_state::{AtomicSessionState, SessionState};
pub use shutdown::Shutdown;
