//! Persistent-session lifecycle, from upgrade through close.
//!
//! ```text
//! Connecting --open--> Active --(peer close | transport error | shutdown)--> Closed
//!                        ^  |
//!                        +--+ decode, route
//! ```

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use mockwire_core::envelope::decode;
use mockwire_core::{Clock, Envelope, Inbound, Kind, Payload};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::broadcast::BroadcastEngine;
use super::connection::Connection;
use super::registry::ConnectionRegistry;
use super::transport::{FrameSource, TransportError};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_PARSE_ERRORS_TOTAL,
};

const ECHO_WELCOME: &str = "Connected to Echo WebSocket. Send any JSON message to echo it back.";
const BROADCAST_WELCOME: &str =
    "Connected to Broadcast WebSocket. Your messages will be sent to all connected clients.";

/// Lifecycle state of one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Upgraded, not yet registered or welcomed.
    Connecting,
    /// Reading and routing.
    Active,
    /// Deregistered; terminal.
    Closed,
}

/// Routing semantics of a session.
#[derive(Clone, Debug)]
pub enum Scope {
    /// Replies go to the sender only.
    Direct,
    /// Messages fan out to every connection in the registry.
    Global(Arc<ConnectionRegistry>),
    /// Messages fan out to one audience of the registry.
    Audience {
        /// Room registry.
        registry: Arc<ConnectionRegistry>,
        /// Audience label.
        label: String,
    },
}

impl Scope {
    /// Short name for logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Direct => "echo",
            Self::Global(_) => "broadcast",
            Self::Audience { .. } => "room",
        }
    }

    fn label(&self) -> Option<&str> {
        match self {
            Self::Audience { label, .. } => Some(label.as_str()),
            _ => None,
        }
    }
}

/// One connection's read loop plus its registry membership.
pub struct Session<S> {
    conn: Arc<Connection>,
    source: S,
    scope: Scope,
    engine: BroadcastEngine,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    state: SessionState,
    opened_at: Option<Instant>,
}

impl<S: FrameSource> Session<S> {
    /// Session in `Connecting` for an upgraded connection.
    pub fn new(
        conn: Arc<Connection>,
        source: S,
        scope: Scope,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            conn,
            source,
            scope,
            engine: BroadcastEngine::new(Arc::clone(&clock)),
            clock,
            shutdown,
            state: SessionState::Connecting,
            opened_at: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The session's connection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Open, run until the peer goes away or shutdown, then close.
    #[instrument(skip_all, fields(conn_id = %self.conn.id(), scope = self.scope.name(), room = tracing::field::Empty))]
    pub async fn serve(mut self) {
        if let Some(label) = self.scope.label() {
            let _ = tracing::Span::current().record("room", label);
        }
        match self.open().await {
            Ok(()) => self.run().await,
            Err(e) => warn!(error = %e, "failed to open session"),
        }
        self.close().await;
    }

    /// `Connecting -> Active`: register, welcome, announce the join.
    ///
    /// The joiner is already a member when the join notice goes out, so it
    /// receives its own notice.
    pub async fn open(&mut self) -> Result<(), TransportError> {
        if self.state != SessionState::Connecting {
            return Ok(());
        }
        self.state = SessionState::Active;
        self.opened_at = Some(Instant::now());
        counter!(WS_CONNECTIONS_TOTAL, "scope" => self.scope.name()).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE, "scope" => self.scope.name()).increment(1.0);

        let welcome = match &self.scope {
            Scope::Direct => Envelope::new(Kind::Welcome, Payload::text(ECHO_WELCOME)),
            Scope::Global(registry) => {
                registry.register(&self.conn);
                Envelope::new(Kind::Welcome, Payload::text(BROADCAST_WELCOME))
            }
            Scope::Audience { registry, label } => {
                registry.register(&self.conn);
                registry.join(&self.conn, label);
                Envelope::new(
                    Kind::Welcome,
                    Payload::fields([(
                        "message",
                        format!("Connected to room {label}. Send JSON messages to chat."),
                    )]),
                )
                .with_audience(label.as_str())
            }
        };
        info!("client connected");
        self.reply(welcome).await?;

        if let Scope::Audience { registry, label } = &self.scope {
            let notice = Envelope::new(
                Kind::Join,
                Payload::fields([("message", format!("User joined room {label}"))]),
            )
            .with_audience(label.as_str());
            self.fan_out(notice, registry, Some(label.as_str())).await?;
        }
        Ok(())
    }

    /// `Active` loop: read, decode, route. Returns once the transport ends or
    /// shutdown is signalled.
    pub async fn run(&mut self) {
        while self.state == SessionState::Active {
            let frame = tokio::select! {
                () = self.shutdown.cancelled() => {
                    debug!("shutdown signalled");
                    break;
                }
                frame = self.source.receive() => frame,
            };
            let frame = match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("peer closed");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "read failed");
                    break;
                }
            };
            if let Err(e) = self.route(decode(&frame, self.clock.now())).await {
                debug!(error = %e, "write failed, ending session");
                break;
            }
        }
    }

    async fn route(&self, inbound: Inbound) -> Result<(), TransportError> {
        match inbound {
            Inbound::Rejected(rejection) => {
                counter!(WS_PARSE_ERRORS_TOTAL, "kind" => rejection.kind.to_string()).increment(1);
                debug!(kind = %rejection.kind, "rejected frame");
                self.reply_privately(rejection).await
            }
            // rejection kinds sent by a client stay with that client
            Inbound::Message(envelope) if envelope.kind.is_rejection() => {
                debug!(kind = %envelope.kind, "client-sent rejection returned to sender");
                self.reply_privately(envelope).await
            }
            Inbound::Message(envelope) => {
                debug!(kind = %envelope.kind, "message received");
                match &self.scope {
                    Scope::Direct => self.reply(envelope.retag(Kind::Echo, None)).await,
                    Scope::Global(registry) => {
                        self.fan_out(envelope.retag(Kind::Broadcast, None), registry, None)
                            .await
                    }
                    Scope::Audience { registry, label } => {
                        let label = label.as_str();
                        self.fan_out(envelope.retag(Kind::Chat, Some(label)), registry, Some(label))
                            .await
                    }
                }
            }
        }
    }

    /// Reply to the sender only, tagged with the room when there is one.
    async fn reply_privately(&self, mut envelope: Envelope) -> Result<(), TransportError> {
        envelope.audience = self.scope.label().map(str::to_owned);
        self.reply(envelope).await
    }

    /// Stamp and write to this session's own connection.
    async fn reply(&self, mut envelope: Envelope) -> Result<(), TransportError> {
        envelope.stamp(self.clock.now());
        match envelope.encode() {
            Ok(text) => self.conn.send(text).await,
            Err(e) => {
                warn!(kind = %envelope.kind, error = %e, "failed to encode reply");
                Ok(())
            }
        }
    }

    /// Fan out to a snapshot. Reports `Err` only when this session's own
    /// connection was among the failed recipients.
    async fn fan_out(
        &self,
        envelope: Envelope,
        registry: &ConnectionRegistry,
        audience: Option<&str>,
    ) -> Result<(), TransportError> {
        let snapshot = registry.snapshot(audience);
        match self.engine.deliver(envelope, &snapshot).await {
            Ok(report) if report.failed.contains(&self.conn.id()) => {
                Err(TransportError::Io("own delivery failed".into()))
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "failed to encode fan-out");
                Ok(())
            }
        }
    }

    /// `-> Closed`: leave, deregister, announce the departure to whoever is
    /// left. Closing a closed session does nothing.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let was_active = self.state == SessionState::Active;
        self.state = SessionState::Closed;

        match &self.scope {
            Scope::Direct => {}
            Scope::Global(registry) => registry.deregister(&self.conn).await,
            Scope::Audience { registry, label } => {
                registry.leave(&self.conn, label);
                registry.deregister(&self.conn).await;
                if was_active {
                    let notice = Envelope::new(
                        Kind::Leave,
                        Payload::fields([("message", format!("User left room {label}"))]),
                    )
                    .with_audience(label.as_str());
                    let _ = self.fan_out(notice, registry, Some(label.as_str())).await;
                }
            }
        }
        self.conn.close().await;

        if was_active {
            gauge!(WS_CONNECTIONS_ACTIVE, "scope" => self.scope.name()).decrement(1.0);
            if let Some(opened) = self.opened_at {
                histogram!(WS_CONNECTION_DURATION_SECONDS, "scope" => self.scope.name())
                    .record(opened.elapsed().as_secs_f64());
            }
        }
        info!("client disconnected");
    }
}
