//! The chat orchestrator: one serialized event loop per process.
//!
//! The loop consumes three sources — shutdown, session lifecycle events,
//! and bus deliveries — so directory mutations, presence notifications and
//! fan-out never interleave racily. Per-connection handlers run outside
//! the loop and only touch it through the event queue and the bus.
//!
//! Every cross-user message goes through the bus, even when sender and
//! recipient share a process; the friends snapshot is the one exception,
//! delivered locally because it is addressed to the connecting user alone.

use std::sync::Arc;

use axum::extract::ws::{close_code, WebSocket};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::bus::BusClient;
use super::directory::SessionDirectory;
use super::envelope::{Envelope, Friend};
use super::friends::FriendResolver;
use super::hub::SessionHub;
use super::metrics;
use super::session::Session;
use super::substrate::{Substrate, SubstrateError};

/// A session lifecycle edge, emitted exactly once per connect/disconnect
/// by the per-connection handler and consumed by the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected { user: String, session_id: String },
    Disconnected { user: String, session_id: String },
}

const EVENT_CAPACITY: usize = 64;

pub struct Relay {
    hub: SessionHub,
    bus: BusClient,
    directory: SessionDirectory,
    friends: Arc<dyn FriendResolver>,
    events_tx: mpsc::Sender<SessionEvent>,
    shutdown: CancellationToken,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl Relay {
    /// Wire up the engine: subscribe to the bus channel and start the
    /// event loop.
    pub async fn start(
        substrate: Arc<dyn Substrate>,
        channel: impl Into<String>,
        friends: Arc<dyn FriendResolver>,
    ) -> Result<Arc<Self>, SubstrateError> {
        let bus = BusClient::new(substrate.clone(), channel);
        let (remote_rx, sub_cancel) = bus.subscribe().await?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);

        let relay = Arc::new(Relay {
            hub: SessionHub::new(),
            bus,
            directory: SessionDirectory::new(substrate),
            friends,
            events_tx,
            shutdown: CancellationToken::new(),
            loop_task: Mutex::new(None),
        });

        let task = tokio::spawn(Arc::clone(&relay).run(events_rx, remote_rx, sub_cancel));
        *relay.loop_task.lock().await = Some(task);
        Ok(relay)
    }

    async fn run(
        self: Arc<Self>,
        mut events_rx: mpsc::Receiver<SessionEvent>,
        mut remote_rx: mpsc::Receiver<Envelope>,
        sub_cancel: CancellationToken,
    ) {
        info!(channel = self.bus.channel(), "relay: event loop started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = events_rx.recv() => match event {
                    Some(SessionEvent::Connected { user, session_id }) => {
                        self.connected(&user, &session_id).await;
                    }
                    Some(SessionEvent::Disconnected { user, session_id }) => {
                        self.disconnected(&user, &session_id).await;
                    }
                    None => break,
                },
                envelope = remote_rx.recv() => match envelope {
                    Some(envelope) => self.deliver_local(envelope).await,
                    None => break,
                },
            }
        }
        sub_cancel.cancel();
        self.hub.close_all().await;
        info!("relay: event loop stopped");
    }

    async fn connected(&self, user: &str, session_id: &str) {
        info!(user, session_id, "relay: session connected");
        if let Err(e) = self.directory.add(user, session_id).await {
            warn!(user, session_id, error = %e, "relay: directory add failed");
            self.hub.emit_close(session_id, close_code::ERROR, "directory update failed").await;
            return;
        }

        // Friends snapshot for the connecting user, delivered locally to
        // every one of their sessions.
        let mut statuses = Vec::new();
        for friend in self.friends.friends_of(user) {
            let online = self.directory.is_online(&friend).await;
            statuses.push(Friend { username: friend, online });
        }
        let snapshot = Envelope::friends(user, statuses);
        match self.directory.members(user).await {
            Ok(session_ids) => {
                for sid in session_ids {
                    self.hub.emit(&sid, snapshot.clone()).await;
                }
            }
            Err(e) => warn!(user, error = %e, "relay: friends snapshot lookup failed"),
        }

        self.notify_presence(user, true).await;
    }

    async fn disconnected(&self, user: &str, session_id: &str) {
        info!(user, session_id, "relay: session disconnected");
        if let Err(e) = self.directory.remove(user, session_id).await {
            warn!(user, session_id, error = %e, "relay: directory remove failed");
            self.hub.emit_close(session_id, close_code::ERROR, "directory update failed").await;
            return;
        }

        // A multi-device user stays online; friends see `false` only when
        // the last session is gone.
        let online = self.directory.is_online(user).await;
        self.notify_presence(user, online).await;
    }

    /// Publish the user's presence to each friend. Failures are logged and
    /// skipped — a partial notification never aborts the loop.
    async fn notify_presence(&self, user: &str, online: bool) {
        for friend in self.friends.friends_of(user) {
            let envelope = Envelope::presence(user, &friend, online);
            if let Err(e) = self.bus.publish(&envelope).await {
                warn!(user, friend = %envelope.to, error = %e, "relay: presence publish failed");
                metrics::publish_failure();
            }
        }
    }

    /// Resolve a bus delivery to local sessions of the recipient. Session
    /// ids the hub does not hold — other processes' sessions, or stale
    /// directory entries — are skipped silently.
    async fn deliver_local(&self, envelope: Envelope) {
        let session_ids = match self.directory.members(&envelope.to).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(to = %envelope.to, error = %e, "relay: recipient lookup failed");
                return;
            }
        };
        for sid in session_ids {
            if self.hub.emit(&sid, envelope.clone()).await {
                metrics::envelope_delivered();
            }
        }
    }

    /// Per-connection handler, one per upgraded session. Registers the
    /// session, announces the connect, then relays every inbound envelope
    /// to the sender's friends until the transport closes.
    pub async fn serve_session(&self, ws: WebSocket, user: String) {
        let (session, mut inbound) = Session::spawn(user.clone(), ws);
        let session_id = session.id.clone();
        self.hub.register(Arc::clone(&session)).await;

        let connected =
            SessionEvent::Connected { user: user.clone(), session_id: session_id.clone() };
        if self.events_tx.send(connected).await.is_err() {
            // The loop is gone — we are shutting down.
            self.hub.deregister(&session_id).await;
            session.close().await;
            return;
        }

        while let Some(mut envelope) = inbound.recv().await {
            envelope.from = user.clone();
            for friend in self.friends.friends_of(&user) {
                let mut routed = envelope.clone();
                routed.to = friend;
                if let Err(e) = self.bus.publish(&routed).await {
                    warn!(user = %user, error = %e, "relay: publish failed");
                }
            }
        }

        let disconnected =
            SessionEvent::Disconnected { user: user.clone(), session_id: session_id.clone() };
        let _ = self.events_tx.send(disconnected).await;
        self.hub.deregister(&session_id).await;
        session.close().await;
        debug!(user = %user, session_id = %session_id, "relay: session handler complete");
    }

    /// Number of sessions attached to this process.
    pub async fn session_count(&self) -> usize {
        self.hub.len().await
    }

    /// Whether the user has at least one open session anywhere.
    pub async fn is_online(&self, user: &str) -> bool {
        self.directory.is_online(user).await
    }

    /// Stop the event loop, the bus decoder, and every attached session.
    /// Idempotent.
    pub async fn close(&self) {
        self.shutdown.cancel();
        if let Some(task) = self.loop_task.lock().await.take() {
            let _ = task.await;
        }
    }
}
