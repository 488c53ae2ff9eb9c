//! Per-connection transport: one reader task, one writer task, two bounded
//! queues, and an idempotent close latch.
//!
//! The reader enforces the keepalive contract (read deadline refreshed by
//! any inbound frame, pongs included) and feeds decoded envelopes to the
//! inbound queue. The writer serves three alternatives — close latch,
//! outbound queue, ping tick — whichever is ready first. Neither task holds
//! any shared lock across a suspension point.
//!
//! Termination is symmetric: the reader returning closes the inbound queue,
//! which ends the per-session relay handler, which closes the session,
//! which stops the writer. A writer failure cancels the latch the same way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::envelope::Envelope;
use super::metrics;

/// Time allowed for a single write to the peer.
pub const WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// Time allowed between inbound frames before the reader gives up.
pub const PONG_DEADLINE: Duration = Duration::from_secs(60);
/// Ping cadence. Must be below `PONG_DEADLINE` (0.9 ×).
pub const PING_INTERVAL: Duration = Duration::from_secs(54);
/// Maximum size of one encoded envelope; larger frames are read errors.
pub const MAX_MESSAGE_SIZE: usize = 512;
/// Transport read buffer size.
pub const READ_BUFFER: usize = 1024;
/// Transport write buffer size.
pub const WRITE_BUFFER: usize = 1024;

const INBOUND_CAPACITY: usize = 32;
const OUTBOUND_CAPACITY: usize = 128;

/// Lifetime outbound drops after which a slow session is closed rather
/// than throttling everyone else.
pub(crate) const MAX_OUTBOUND_DROPS: u64 = 64;

/// One entry on the outbound queue: a routed envelope, or a close
/// directive carrying its policy code.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Envelope(Envelope),
    Close { code: u16, reason: String },
}

/// One live connection for an authenticated user.
pub struct Session {
    pub id: String,
    pub user: String,
    outbound_tx: mpsc::Sender<Outbound>,
    done: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    drops: AtomicU64,
}

impl Session {
    /// Split the socket and spawn the reader/writer pair. Returns the
    /// session handle and the inbound envelope queue; the queue closes when
    /// the reader terminates for any reason.
    pub fn spawn(user: impl Into<String>, ws: WebSocket) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        let (ws_tx, ws_rx) = ws.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let done = CancellationToken::new();
        let id = Uuid::new_v4().to_string();

        let reader = tokio::spawn(reader_task(ws_rx, inbound_tx, done.clone(), id.clone()));
        let writer = tokio::spawn(writer_task(ws_tx, outbound_rx, done.clone(), id.clone()));

        metrics::session_opened();

        let session = Arc::new(Session {
            id,
            user: user.into(),
            outbound_tx,
            done,
            tasks: Mutex::new(vec![reader, writer]),
            drops: AtomicU64::new(0),
        });
        (session, inbound_rx)
    }

    /// Queue an envelope for the writer. Returns `false` when the session
    /// is closing or the queue is full; a full queue counts as a drop, and
    /// a session past the drop threshold is closed.
    pub fn emit(&self, envelope: Envelope) -> bool {
        if self.done.is_cancelled() {
            return false;
        }
        match self.outbound_tx.try_send(Outbound::Envelope(envelope)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::outbound_drop();
                let drops = self.drops.fetch_add(1, Ordering::Relaxed) + 1;
                if drops >= MAX_OUTBOUND_DROPS {
                    warn!(
                        session_id = %self.id,
                        user = %self.user,
                        drops,
                        "session: slow consumer — closing"
                    );
                    self.done.cancel();
                } else {
                    debug!(session_id = %self.id, drops, "session: outbound queue full — dropped");
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a close frame with the given policy code. Falls back to the
    /// close latch when the queue cannot take it, so the session still
    /// terminates.
    pub fn emit_close(&self, code: u16, reason: impl Into<String>) -> bool {
        let directive = Outbound::Close { code, reason: reason.into() };
        match self.outbound_tx.try_send(directive) {
            Ok(()) => true,
            Err(_) => {
                self.done.cancel();
                false
            }
        }
    }

    /// Lifetime count of envelopes dropped on a full outbound queue.
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Whether the close latch has fired.
    pub fn is_closed(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Idempotent close: fire the latch, then wait for the reader and
    /// writer to drain. The underlying connection closes once both halves
    /// of the split socket are dropped.
    pub async fn close(&self) {
        self.done.cancel();
        let mut tasks = self.tasks.lock().await;
        if tasks.is_empty() {
            return;
        }
        for task in tasks.drain(..) {
            let _ = task.await;
        }
        metrics::session_closed();
    }

    /// Test-only session with no transport behind it; the returned receiver
    /// observes the outbound queue directly.
    #[cfg(test)]
    pub(crate) fn stub(user: &str) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        Self::stub_with_capacity(user, OUTBOUND_CAPACITY)
    }

    /// Same as [`stub`], with a custom outbound capacity.
    #[cfg(test)]
    pub(crate) fn stub_with_capacity(user: &str, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let session = Arc::new(Session {
            id: Uuid::new_v4().to_string(),
            user: user.to_owned(),
            outbound_tx,
            done: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            drops: AtomicU64::new(0),
        });
        (session, outbound_rx)
    }
}

/// Read frames until EOF, error, or deadline; decode one envelope per text
/// frame into the inbound queue. Any inbound frame refreshes the read
/// deadline — pongs answer our pings, text answers itself.
async fn reader_task(
    mut ws_rx: SplitStream<WebSocket>,
    inbound_tx: mpsc::Sender<Envelope>,
    done: CancellationToken,
    session_id: String,
) {
    let mut deadline = Instant::now() + PONG_DEADLINE;
    loop {
        let frame = tokio::select! {
            _ = done.cancelled() => return,
            frame = tokio::time::timeout_at(deadline, ws_rx.next()) => frame,
        };

        let msg = match frame {
            Err(_) => {
                debug!(session_id = %session_id, "session: read deadline exceeded");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                // Unexpected close — logged, otherwise identical to EOF.
                warn!(session_id = %session_id, error = %e, "session: read error");
                return;
            }
            Ok(Some(Ok(msg))) => msg,
        };
        deadline = Instant::now() + PONG_DEADLINE;

        match msg {
            Message::Text(text) => {
                let envelope = match Envelope::from_json(&text) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "session: undecodable frame");
                        return;
                    }
                };
                tokio::select! {
                    // Latch fired mid-send: drop the message and stop reading.
                    _ = done.cancelled() => return,
                    sent = inbound_tx.send(envelope) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            // Pings are auto-answered by the transport; both refresh the deadline.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(frame) => {
                if let Some(f) = frame {
                    if f.code != close_code::NORMAL && f.code != close_code::AWAY {
                        debug!(session_id = %session_id, code = f.code, "session: unexpected close");
                    }
                }
                return;
            }
            Message::Binary(_) => {
                warn!(session_id = %session_id, "session: binary frame on a JSON transport");
                return;
            }
        }
    }
}

/// Serve the outbound side: close latch → best-effort empty close frame;
/// queued envelope → JSON write under the write deadline; ping tick →
/// keepalive ping. A queued close directive becomes a close frame with its
/// policy code. The queue closing is equivalent to the latch firing.
async fn writer_task(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    done: CancellationToken,
    session_id: String,
) {
    let mut next_ping = Instant::now() + PING_INTERVAL;
    loop {
        tokio::select! {
            _ = done.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return;
            }
            item = outbound_rx.recv() => {
                let Some(item) = item else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return;
                };
                match item {
                    Outbound::Envelope(envelope) => {
                        let json = match envelope.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(session_id = %session_id, error = %e, "session: encode failed");
                                close_with(&mut ws_tx, close_code::ERROR, "encode failed").await;
                                done.cancel();
                                return;
                            }
                        };
                        let write =
                            tokio::time::timeout(WRITE_DEADLINE, ws_tx.send(Message::Text(json.into())));
                        match write.await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                warn!(session_id = %session_id, error = %e, "session: write error");
                                close_with(&mut ws_tx, close_code::ERROR, "write failed").await;
                                done.cancel();
                                return;
                            }
                            Err(_) => {
                                warn!(session_id = %session_id, "session: write deadline exceeded");
                                close_with(&mut ws_tx, close_code::ERROR, "write timed out").await;
                                done.cancel();
                                return;
                            }
                        }
                    }
                    Outbound::Close { code, reason } => {
                        close_with(&mut ws_tx, code, &reason).await;
                        done.cancel();
                        return;
                    }
                }
            }
            _ = tokio::time::sleep_until(next_ping) => {
                let ping =
                    tokio::time::timeout(WRITE_DEADLINE, ws_tx.send(Message::Ping(Vec::new().into())));
                if !matches!(ping.await, Ok(Ok(()))) {
                    done.cancel();
                    return;
                }
                next_ping = Instant::now() + PING_INTERVAL;
            }
        }
    }
}

/// Best-effort close frame with a code and reason, under the write deadline.
async fn close_with(ws_tx: &mut SplitSink<WebSocket, Message>, code: u16, reason: &str) {
    let frame = CloseFrame { code, reason: reason.to_owned().into() };
    let _ = tokio::time::timeout(WRITE_DEADLINE, ws_tx.send(Message::Close(Some(frame)))).await;
}
