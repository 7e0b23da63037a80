//! WebSocket transport
//!
//! One connection = one `(GatewaySink, GatewayStream)` pair from
//! [`connect`]. The stream side reassembles logical messages (inflating
//! when the connection is zlib-stream compressed); the sink side frames and
//! sends outbound payloads. Reconnecting means calling [`connect`] again,
//! which naturally starts from fresh decompression and sequence state.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::config::TransportMode;
use crate::error::{GatewayError, Result};
use crate::inflate::ZlibStreamInflater;
use crate::opcode::{OpCode, CLOSE_CODE_NO_STATUS};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a gateway WebSocket connection
///
/// Safe to call any number of times; every call yields an independent
/// connection with its own decompression context.
pub async fn connect(url: &str, mode: TransportMode) -> Result<(GatewaySink, GatewayStream)> {
    debug!(%url, "connecting to gateway");
    let (ws, _response) = connect_async(url)
        .await
        .map_err(|e| GatewayError::WebSocket(e.to_string()))?;
    let (write, read) = ws.split();

    Ok((
        GatewaySink { write },
        GatewayStream {
            read,
            mode,
            inflater: ZlibStreamInflater::new(),
        },
    ))
}

/// Outbound half of a gateway connection
pub struct GatewaySink {
    write: SplitSink<WsStream, Message>,
}

impl GatewaySink {
    /// Serialize `{op, d}` and send it as one text frame
    pub async fn send(&mut self, op: OpCode, payload: Value) -> Result<()> {
        let frame = json!({ "op": op as u8, "d": payload });
        trace!(op = op as u8, "sending frame");
        self.write
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| GatewayError::WebSocket(e.to_string()))
    }

    /// Best-effort graceful close
    ///
    /// Errors from an already-broken socket are ignored; the handle is
    /// unusable afterwards either way.
    pub async fn close(&mut self) {
        let _ = self.write.close().await;
    }
}

/// Inbound half of a gateway connection
pub struct GatewayStream {
    read: SplitStream<WsStream>,
    mode: TransportMode,
    inflater: ZlibStreamInflater,
}

impl GatewayStream {
    /// Receive one complete logical message as text
    ///
    /// A close frame (or the stream ending without one) always surfaces as
    /// [`GatewayError::Closed`]; a close without a status code reports the
    /// defined "no status" code rather than nothing.
    pub async fn recv(&mut self) -> Result<String> {
        loop {
            let msg = match self.read.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(GatewayError::WebSocket(e.to_string())),
                None => return Err(close_error(None)),
            };

            match msg {
                Message::Text(text) => return Ok(text),
                Message::Binary(bytes) => match self.mode {
                    // Plain-mode binary frames are decoded leniently; a
                    // malformed byte must not kill the receive loop.
                    TransportMode::Plain => {
                        return Ok(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    TransportMode::ZlibStream => {
                        if let Some(text) = self.inflater.extend(&bytes)? {
                            return Ok(text);
                        }
                        // Partial logical message, keep reading.
                    }
                },
                Message::Close(frame) => {
                    debug!(?frame, "gateway closed the connection");
                    return Err(close_error(frame));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    // Control frames are handled by tungstenite itself.
                }
            }
        }
    }
}

/// Translate a close frame into the closed-connection error
///
/// `None` covers both an empty close frame and the stream ending without a
/// close handshake.
fn close_error(frame: Option<CloseFrame<'_>>) -> GatewayError {
    match frame {
        Some(frame) => GatewayError::Closed {
            code: u16::from(frame.code),
            reason: frame.reason.into_owned(),
        },
        None => GatewayError::Closed {
            code: CLOSE_CODE_NO_STATUS,
            reason: String::new(),
        },
    }
}
