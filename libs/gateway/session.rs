//! Shard session: one WebSocket connection's protocol state machine
//!
//! Lifecycle per connection: `PendingHello -> PendingAck -> Ready`, with
//! `ConnectionLost` reachable from any point. The session owns its socket
//! exclusively, runs the receive loop and a heartbeat ticker, and reports
//! lifecycle events upward through the pool's channel. Transport failures
//! never leave this module as errors; they become `ConnectionLost` events
//! and a reconnect.
//!
//! Reconnect rules:
//! - `Reconnect` opcode, or `InvalidSession` with a truthy payload, resumes
//!   against the stored resume URL when a session id is known.
//! - Everything else (close frames, stream errors, missed heartbeat acks)
//!   re-identifies from scratch after the configured delay. Resuming here
//!   might be possible, but the conservative re-identify is deliberate.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{build_gateway_url, GatewayConfig};
use crate::error::{GatewayError, Result};
use crate::event::ShardEvent;
use crate::identify_gate::IdentifyGate;
use crate::opcode::{GatewayFrame, OpCode, EVENT_READY, EVENT_RESUMED};
use crate::session_state::{AtomicSessionState, SessionState};
use crate::shutdown::Shutdown;
use crate::transport::{self, GatewaySink, GatewayStream};

/// Fallback when a Hello arrives without an interval; matches the server's
/// usual value.
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 41_250;

/// Everything needed to reattach to a previous session
struct ResumeState {
    session_id: String,
    resume_url: String,
    last_seq: Option<u64>,
}

/// Per-connection mutable state, reset on every redial
struct Connection {
    heartbeat: Option<JoinHandle<()>>,
    beat_tx: mpsc::Sender<()>,
    beat_rx: mpsc::Receiver<()>,
    /// True between a heartbeat ack and the next ticker beat.
    acked: Arc<AtomicBool>,
    last_seq: Option<u64>,
    /// An identify-gate permit is held until READY/RESUMED releases it.
    holding_permit: bool,
}

impl Connection {
    fn new(last_seq: Option<u64>) -> Self {
        let (beat_tx, beat_rx) = mpsc::channel(1);
        Self {
            heartbeat: None,
            beat_tx,
            beat_rx,
            acked: Arc::new(AtomicBool::new(true)),
            last_seq,
            holding_permit: false,
        }
    }
}

/// Why the per-connection loop ended
enum LoopExit {
    Shutdown,
    /// Server-driven reconnect; `resumable` decides Resume vs re-Identify
    Reconnect { resumable: bool },
}

enum Tick {
    Shutdown,
    Beat,
    Frame(Result<String>),
}

/// One shard's session, created and supervised by the pool
pub struct ShardSession {
    shard_id: u32,
    total_shards: u32,
    gateway_url: String,
    config: Arc<GatewayConfig>,
    gate: Arc<IdentifyGate>,
    events: mpsc::Sender<ShardEvent>,
    state: Arc<AtomicSessionState>,
    shutdown: Arc<Shutdown>,
}

/// Control handle for a running shard task
pub struct ShardHandle {
    shard_id: u32,
    state: Arc<AtomicSessionState>,
    shutdown: Arc<Shutdown>,
    join: JoinHandle<()>,
}

impl ShardHandle {
    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    /// Snapshot of the shard's protocol state
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Stop the shard and wait for its task to unwind
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.join.await;
    }
}

impl ShardSession {
    pub fn new(
        shard_id: u32,
        total_shards: u32,
        gateway_url: String,
        config: Arc<GatewayConfig>,
        gate: Arc<IdentifyGate>,
        events: mpsc::Sender<ShardEvent>,
    ) -> Self {
        Self {
            shard_id,
            total_shards,
            gateway_url,
            config,
            gate,
            events,
            state: Arc::new(AtomicSessionState::new(SessionState::ConnectionLost)),
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Spawn the shard's run loop
    ///
    /// Resolves once the first connection attempt has completed (in either
    /// direction), so the pool can start shards strictly one after another.
    pub async fn start(self) -> ShardHandle {
        let shard_id = self.shard_id;
        let state = Arc::clone(&self.state);
        let shutdown = Arc::clone(&self.shutdown);

        let (first_attempt_tx, first_attempt_rx) = oneshot::channel();
        let join = tokio::spawn(self.run(first_attempt_tx));
        let _ = first_attempt_rx.await;

        ShardHandle {
            shard_id,
            state,
            shutdown,
            join,
        }
    }

    async fn run(self, first_attempt: oneshot::Sender<()>) {
        let mut first_attempt = Some(first_attempt);
        let mut resume: Option<ResumeState> = None;
        let mut attempt = 0usize;

        while !self.shutdown.is_triggered() {
            let url = match &resume {
                Some(r) => build_gateway_url(
                    &r.resume_url,
                    self.config.gateway_version,
                    self.config.transport_mode,
                ),
                None => self.gateway_url.clone(),
            };

            let connected = transport::connect(&url, self.config.transport_mode).await;
            if let Some(tx) = first_attempt.take() {
                let _ = tx.send(());
            }

            match connected {
                Ok((mut sink, mut stream)) => {
                    attempt = 0;
                    let exit = self
                        .run_connection(&mut sink, &mut stream, &mut resume)
                        .await;
                    sink.close().await;

                    match exit {
                        Ok(LoopExit::Shutdown) => break,
                        Ok(LoopExit::Reconnect { resumable }) => {
                            self.connection_lost().await;
                            let can_resume = resumable && resume.is_some();
                            if !can_resume {
                                resume = None;
                            }
                            debug!(
                                shard = self.shard_id,
                                resume = can_resume,
                                "server requested reconnect"
                            );
                            // Redial immediately; identify pacing is the
                            // gate's job.
                            continue;
                        }
                        Err(e) => {
                            warn!(shard = self.shard_id, error = %e, "connection failed");
                            self.connection_lost().await;
                            // Conservative path: this session's continuity is
                            // unknown, so the next connect re-identifies.
                            resume = None;
                        }
                    }
                }
                Err(e) => {
                    warn!(shard = self.shard_id, error = %e, "connect failed");
                    self.state.set(SessionState::ConnectionLost);
                }
            }

            let Some(delay) = self.config.reconnect_policy.next_delay(attempt) else {
                warn!(shard = self.shard_id, "reconnect policy exhausted, stopping");
                break;
            };
            attempt += 1;
            debug!(shard = self.shard_id, ?delay, "waiting before reconnect");
            tokio::select! {
                _ = self.shutdown.wait() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!(shard = self.shard_id, "shard task exiting");
    }

    /// Drive one connection until it ends
    async fn run_connection(
        &self,
        sink: &mut GatewaySink,
        stream: &mut GatewayStream,
        resume: &mut Option<ResumeState>,
    ) -> Result<LoopExit> {
        self.state.set(SessionState::PendingHello);
        let mut conn = Connection::new(resume.as_ref().and_then(|r| r.last_seq));

        let exit = loop {
            let tick = tokio::select! {
                _ = self.shutdown.wait() => Tick::Shutdown,
                beat = conn.beat_rx.recv() => match beat {
                    Some(()) => Tick::Beat,
                    // We hold a sender, so this only happens on teardown.
                    None => Tick::Shutdown,
                },
                msg = stream.recv() => Tick::Frame(msg),
            };

            match tick {
                Tick::Shutdown => break Ok(LoopExit::Shutdown),
                Tick::Beat => {
                    if !conn.acked.load(Ordering::Acquire) {
                        // The previous beat was never acknowledged; the
                        // connection is a zombie.
                        break Err(GatewayError::MissedHeartbeat {
                            shard: self.shard_id,
                        });
                    }
                    conn.acked.store(false, Ordering::Release);
                    if let Err(e) = self.send_heartbeat(sink, conn.last_seq).await {
                        break Err(e);
                    }
                }
                Tick::Frame(Err(e)) => break Err(e),
                Tick::Frame(Ok(text)) => {
                    match self.handle_frame(&text, sink, &mut conn, resume).await {
                        Ok(None) => {}
                        Ok(Some(exit)) => break Ok(exit),
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        if let Some(heartbeat) = conn.heartbeat.take() {
            heartbeat.abort();
        }
        if conn.holding_permit {
            // Disconnected mid-identify; free the slot for other shards.
            let _ = self.gate.release();
        }
        exit
    }

    /// Process one inbound frame; `Some(exit)` ends the connection loop
    async fn handle_frame(
        &self,
        text: &str,
        sink: &mut GatewaySink,
        conn: &mut Connection,
        resume: &mut Option<ResumeState>,
    ) -> Result<Option<LoopExit>> {
        let frame = match GatewayFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(shard = self.shard_id, error = %e, "dropping unparseable frame");
                return Ok(None);
            }
        };

        if let Some(seq) = frame.seq {
            conn.last_seq = Some(seq);
            if let Some(r) = resume.as_mut() {
                r.last_seq = Some(seq);
            }
        }

        match frame.opcode() {
            Some(OpCode::Hello) => {
                let interval_ms = frame
                    .data
                    .as_ref()
                    .and_then(|d| d.get("heartbeat_interval"))
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS);
                if conn.heartbeat.is_none() {
                    conn.heartbeat = Some(spawn_heartbeat(
                        Duration::from_millis(interval_ms),
                        conn.beat_tx.clone(),
                    ));
                }

                if let Some(r) = resume.as_ref() {
                    debug!(shard = self.shard_id, "resuming previous session");
                    sink.send(
                        OpCode::Resume,
                        json!({
                            "token": self.config.token,
                            "session_id": r.session_id,
                            "seq": r.last_seq.unwrap_or(0),
                        }),
                    )
                    .await?;
                    self.state.set(SessionState::PendingAck);
                } else {
                    match self.identify(sink, conn).await? {
                        Some(exit) => return Ok(Some(exit)),
                        None => self.state.set(SessionState::PendingAck),
                    }
                }
            }
            Some(OpCode::Heartbeat) => {
                // Server-requested beat: reply out of band, leave the local
                // ticker and ack flag alone.
                self.send_heartbeat(sink, conn.last_seq).await?;
            }
            Some(OpCode::HeartbeatAck) => {
                conn.acked.store(true, Ordering::Release);
            }
            Some(OpCode::Dispatch) => {
                return self.handle_dispatch(frame, conn, resume).await.map(|()| None);
            }
            Some(OpCode::Reconnect) => {
                return Ok(Some(LoopExit::Reconnect { resumable: true }));
            }
            Some(OpCode::InvalidSession) => {
                let resumable = invalid_session_resumable(frame.data.as_ref());
                return Ok(Some(LoopExit::Reconnect { resumable }));
            }
            other => {
                debug!(shard = self.shard_id, op = frame.op, ?other, "ignoring frame");
            }
        }
        Ok(None)
    }

    /// Acquire an identify permit (heartbeating while queued) and identify
    ///
    /// Returns `Some(LoopExit::Shutdown)` when the gate is torn down or the
    /// shutdown signal trips while waiting.
    async fn identify(
        &self,
        sink: &mut GatewaySink,
        conn: &mut Connection,
    ) -> Result<Option<LoopExit>> {
        let Connection {
            beat_rx,
            last_seq,
            ..
        } = conn;

        let mut acquire = std::pin::pin!(self.gate.acquire());
        loop {
            tokio::select! {
                permit = &mut acquire => {
                    match permit {
                        Ok(()) => break,
                        Err(GatewayError::GateDisposed) => return Ok(Some(LoopExit::Shutdown)),
                        Err(e) => return Err(e),
                    }
                }
                _ = self.shutdown.wait() => return Ok(Some(LoopExit::Shutdown)),
                beat = beat_rx.recv() => {
                    if beat.is_some() {
                        // The receive loop is paused while queued here, so
                        // acks go unread; keep beating to hold the socket
                        // open and leave ack enforcement to the main loop.
                        self.send_heartbeat(sink, *last_seq).await?;
                    }
                }
            }
        }
        conn.holding_permit = true;

        info!(shard = self.shard_id, "identifying");
        sink.send(
            OpCode::Identify,
            json!({
                "token": self.config.token,
                "intents": self.config.intents,
                "properties": self.config.identify_properties,
                "shard": [self.shard_id, self.total_shards],
            }),
        )
        .await?;
        Ok(None)
    }

    async fn handle_dispatch(
        &self,
        frame: GatewayFrame,
        conn: &mut Connection,
        resume: &mut Option<ResumeState>,
    ) -> Result<()> {
        let Some(event) = frame.event else {
            debug!(shard = self.shard_id, "dispatch without event name");
            return Ok(());
        };

        match event.as_str() {
            EVENT_READY => {
                let data = frame.data.unwrap_or(Value::Null);
                let session_id = data
                    .get("session_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let resume_url = data
                    .get("resume_gateway_url")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let user = data.get("user").cloned();

                if !session_id.is_empty() && !resume_url.is_empty() {
                    *resume = Some(ResumeState {
                        session_id: session_id.clone(),
                        resume_url,
                        last_seq: conn.last_seq,
                    });
                }

                self.state.set(SessionState::Ready);
                self.release_permit(conn);
                info!(shard = self.shard_id, %session_id, "shard ready");
                self.emit(ShardEvent::Ready {
                    shard: self.shard_id,
                    session_id,
                    user,
                })
                .await;
            }
            EVENT_RESUMED => {
                self.state.set(SessionState::Ready);
                self.release_permit(conn);
                info!(shard = self.shard_id, "session resumed");
                self.emit(ShardEvent::Resumed {
                    shard: self.shard_id,
                })
                .await;
            }
            _ => {
                self.emit(ShardEvent::Dispatch {
                    shard: self.shard_id,
                    event,
                    seq: frame.seq,
                    data: frame.data.unwrap_or(Value::Null),
                })
                .await;
            }
        }
        Ok(())
    }

    async fn send_heartbeat(&self, sink: &mut GatewaySink, last_seq: Option<u64>) -> Result<()> {
        let seq = last_seq.map_or(Value::Null, Value::from);
        sink.send(OpCode::Heartbeat, seq).await
    }

    fn release_permit(&self, conn: &mut Connection) {
        if conn.holding_permit {
            conn.holding_permit = false;
            let _ = self.gate.release();
        }
    }

    async fn connection_lost(&self) {
        self.state.set(SessionState::ConnectionLost);
        self.emit(ShardEvent::ConnectionLost {
            shard: self.shard_id,
        })
        .await;
    }

    async fn emit(&self, event: ShardEvent) {
        if self.events.send(event).await.is_err() {
            debug!(shard = self.shard_id, "event channel closed");
        }
    }
}

/// A truthy InvalidSession payload means the session can still be resumed
fn invalid_session_resumable(data: Option<&Value>) -> bool {
    data.and_then(Value::as_bool).unwrap_or(false)
}

/// Ticker driving the heartbeat cadence
///
/// The first tick fires immediately (one beat right after Hello), then once
/// per interval. The receive loop does the sending and the ack accounting;
/// this task only paces it.
fn spawn_heartbeat(interval: Duration, beat_tx: mpsc::Sender<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if beat_tx.send(()).await.is_err() {
                break;
            }
        }
    })
}
