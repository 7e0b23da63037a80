//! Scripted gateway server for shard integration tests
//!
//! Speaks just enough of the protocol to exercise a session: Hello on
//! connect, READY for Identify, RESUMED for Resume, acks for heartbeats.
//! Client frames are always plain text; downstream frames go out as
//! zlib-stream binary when compression is enabled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flate2::{Compress, Compression, FlushCompress};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

#[derive(Clone, Copy)]
pub struct MockOptions {
    pub heartbeat_interval_ms: u64,
    /// Compress downstream frames as one continuous zlib stream
    pub zlib: bool,
    /// Send a Reconnect opcode shortly after the first READY
    pub reconnect_after_first_ready: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 200,
            zlib: false,
            reconnect_after_first_ready: false,
        }
    }
}

#[derive(Default)]
pub struct ServerState {
    /// Identify `d` payloads, in arrival order across all connections
    pub identifies: Mutex<Vec<Value>>,
    /// Resume `d` payloads
    pub resumes: Mutex<Vec<Value>>,
    pub heartbeats: AtomicUsize,
    pub connections: AtomicUsize,
}

pub struct MockGatewayServer {
    pub url: String,
    pub state: Arc<ServerState>,
}

impl MockGatewayServer {
    pub async fn start(opts: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = format!("ws://{addr}");
        let state = Arc::new(ServerState::default());

        let own_url = url.clone();
        let state_clone = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let index = state_clone.connections.fetch_add(1, Ordering::SeqCst);
                let state = Arc::clone(&state_clone);
                let own_url = own_url.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(socket, state, opts, index, own_url).await {
                        verbose_println!("[mock-gw] connection {index} ended: {e}");
                    }
                });
            }
        });

        Self { url, state }
    }
}

/// Compresses downstream frames into one continuous stream with sync-flush
/// boundaries, so each frame ends in `00 00 FF FF`.
struct StreamCompressor {
    compress: Compress,
}

impl StreamCompressor {
    fn new() -> Self {
        Self {
            compress: Compress::new(Compression::fast(), true),
        }
    }

    fn frame(&mut self, text: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len() + 64);
        let mut consumed = 0usize;
        let input = text.as_bytes();
        loop {
            let before_in = self.compress.total_in();
            let before_out = self.compress.total_out();
            let mut buf = [0u8; 4096];
            self.compress
                .compress(&input[consumed..], &mut buf, FlushCompress::Sync)
                .unwrap();
            consumed += (self.compress.total_in() - before_in) as usize;
            let written = (self.compress.total_out() - before_out) as usize;
            out.extend_from_slice(&buf[..written]);
            if consumed == input.len() && out.ends_with(&[0x00, 0x00, 0xFF, 0xFF]) {
                return out;
            }
        }
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    state: Arc<ServerState>,
    opts: MockOptions,
    index: usize,
    own_url: String,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws = accept_async(socket).await?;
    let (mut sink, mut stream) = ws.split();
    let mut compressor = opts.zlib.then(StreamCompressor::new);

    let mut send = |frame: Value| {
        let text = frame.to_string();
        match compressor.as_mut() {
            Some(c) => Message::Binary(c.frame(&text)),
            None => Message::Text(text),
        }
    };

    sink.send(send(
        json!({"op": 10, "d": {"heartbeat_interval": opts.heartbeat_interval_ms}}),
    ))
    .await?;

    let mut seq = 0u64;
    while let Some(msg) = stream.next().await {
        let Message::Text(text) = msg? else {
            continue;
        };
        let frame: Value = serde_json::from_str(&text).unwrap();
        let op = frame.get("op").and_then(Value::as_u64).unwrap_or(255);
        verbose_println!("[mock-gw] conn {index} <- op {op}");

        match op {
            // Heartbeat
            1 => {
                state.heartbeats.fetch_add(1, Ordering::SeqCst);
                sink.send(send(json!({"op": 11}))).await?;
            }
            // Identify
            2 => {
                state
                    .identifies
                    .lock()
                    .push(frame.get("d").cloned().unwrap_or(Value::Null));
                seq += 1;
                sink.send(send(json!({
                    "op": 0,
                    "t": "READY",
                    "s": seq,
                    "d": {
                        "session_id": format!("sess-{index}"),
                        "resume_gateway_url": own_url,
                        "user": {"id": "1", "username": "mock-bot"},
                    },
                })))
                .await?;

                if index == 0 && opts.reconnect_after_first_ready {
                    sink.send(send(json!({"op": 7, "d": null}))).await?;
                }
            }
            // Resume
            6 => {
                state
                    .resumes
                    .lock()
                    .push(frame.get("d").cloned().unwrap_or(Value::Null));
                seq += 1;
                sink.send(send(json!({
                    "op": 0,
                    "t": "RESUMED",
                    "s": seq,
                    "d": null,
                })))
                .await?;
            }
            _ => {}
        }
    }
    Ok(())
}
