//! Gateway wire protocol: opcodes, frames and well-known event names.

use serde::Deserialize;
use serde_json::Value;

/// Close code reported when the peer sends a close frame without a status.
pub const CLOSE_CODE_NO_STATUS: u16 = 1005;

/// Gateway protocol opcodes
///
/// The numeric values are fixed by the wire protocol and shared between
/// inbound and outbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Server event dispatch (carries `t` and `s`)
    Dispatch = 0,
    /// Keep-alive, sent by the client (or requested by the server)
    Heartbeat = 1,
    /// Fresh-session handshake
    Identify = 2,
    /// Presence update
    PresenceUpdate = 3,
    /// Voice state update
    VoiceStateUpdate = 4,
    /// Reattach to a previous session
    Resume = 6,
    /// Server asks the client to reconnect
    Reconnect = 7,
    /// Request guild member chunks
    RequestGuildMembers = 8,
    /// The session is no longer valid (payload says whether it is resumable)
    InvalidSession = 9,
    /// First server frame, carries the heartbeat interval
    Hello = 10,
    /// Server acknowledgment of a client heartbeat
    HeartbeatAck = 11,
}

impl OpCode {
    /// Map a raw opcode byte to the enum, if known
    pub fn from_u8(op: u8) -> Option<Self> {
        Some(match op {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::PresenceUpdate,
            4 => Self::VoiceStateUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            _ => return None,
        })
    }
}

/// One inbound gateway frame, parsed fresh per message
///
/// Only `op` is required by the protocol. `t` is meaningful for dispatches,
/// `s` is present on frames that advance the session sequence.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayFrame {
    pub op: u8,
    #[serde(rename = "t", default)]
    pub event: Option<String>,
    #[serde(rename = "s", default)]
    pub seq: Option<u64>,
    #[serde(rename = "d", default)]
    pub data: Option<Value>,
}

impl GatewayFrame {
    /// Parse a frame from the raw text of one logical message
    pub fn parse(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The frame's opcode, if it is one this client understands
    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_u8(self.op)
    }
}

/// Dispatch event name for a fresh session becoming live
pub const EVENT_READY: &str = "READY";
/// Dispatch event name for a successful resume
pub const EVENT_RESUMED: &str = "RESUMED";
