//! Connection manager: owns the broker link for one chat session
//!
//! `ChatSession` is the caller-owned handle. `connect` spawns a single task
//! that owns the WebSocket and multiplexes, with `tokio::select!`:
//! - cancellation from `disconnect()`
//! - publish commands from the handle
//! - the outbound heart-beat ticker
//! - the inbound silence deadline
//! - frames arriving from the broker
//!
//! When an established link drops, the task waits `reconnect_delay` and dials
//! again until it succeeds or the session is disconnected. Every successful
//! link subscribes to the broadcast destination and re-announces the user.
//!
//! ## Publish policy
//!
//! Best effort, no outbound queue: events published while not `Connected`
//! are dropped, and commands still in flight when a link drops are discarded
//! rather than replayed on the next link. File sends are the exception that
//! reports failure back to the caller.

use super::config::SessionConfig;
use super::router::{Subscription, SubscriptionRouter};
use super::SessionError;
use crate::chat::{codec, ChatEvent, FileEncoder, Route, BROADCAST_DESTINATION};
use crate::stomp::{self, Command as StompCommand, Frame, HeartBeat, Incoming, Negotiated};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep, sleep_until, timeout, Instant, Interval};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Id of our single broker subscription
const SUBSCRIPTION_ID: &str = "sub-0";

/// Lifecycle of the broker link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// State shared by the handle and the connection task
struct Shared {
    state: watch::Sender<ConnectionState>,
    /// Set once by `disconnect()`; no transition may leave Disconnected after
    closed: AtomicBool,
}

impl Shared {
    /// Apply a transition unless the session was closed. Returns whether it
    /// was applied.
    fn transition(&self, next: ConnectionState) -> bool {
        if next != ConnectionState::Disconnected && self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = ?prev, to = ?next, "Connection state changed");
        }
        true
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

/// Commands from the handle to the connection task
enum Command {
    Publish {
        destination: &'static str,
        body: String,
        /// Present when the caller wants the write result
        ack: Option<oneshot::Sender<Result<(), SessionError>>>,
    },
}

/// A chat session: one user, one broker link, one consumer.
///
/// Construct it explicitly, call [`connect`](Self::connect) once, and
/// [`disconnect`](Self::disconnect) (or drop it) at the end.
pub struct ChatSession {
    config: SessionConfig,
    username: Option<String>,
    shared: Arc<Shared>,
    router: SubscriptionRouter,
    files: FileEncoder,
    commands: Option<mpsc::UnboundedSender<Command>>,
    shutdown: CancellationToken,
}

impl ChatSession {
    pub fn new(config: SessionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            username: None,
            shared: Arc::new(Shared {
                state,
                closed: AtomicBool::new(false),
            }),
            router: SubscriptionRouter::new(),
            files: FileEncoder::new(),
            commands: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Username fixed by `connect`
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.current()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Observe connection state changes; any number of observers
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Register the event consumer (hands over from any previous one)
    pub fn subscribe(&self) -> Subscription {
        self.router.subscribe()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connect as `username`.
    ///
    /// Resolves once the broker accepted the session, the broadcast
    /// subscription is in place and the JOIN event has been written. On
    /// failure the session stays `Disconnected` and nothing is retried.
    pub async fn connect(&mut self, username: &str) -> Result<(), SessionError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        if self.commands.is_some() {
            return Err(SessionError::AlreadyStarted);
        }
        let join = ChatEvent::join(username)?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        self.username = Some(username.to_string());
        self.commands = Some(cmd_tx);

        let task = ConnectionTask {
            config: self.config.clone(),
            join,
            shared: self.shared.clone(),
            router: self.router.clone(),
            commands: cmd_rx,
            shutdown: self.shutdown.clone(),
        };
        info!(username = %username, url = %self.config.ws_url, "Connecting to chat server");
        tokio::spawn(task.run(ready_tx));

        match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(SessionError::ConnectFailure(
                "connection task ended before the handshake completed".into(),
            )),
        }
    }

    /// Tear the session down. Idempotent; terminal once the session was
    /// started. Cancels any pending reconnection.
    pub fn disconnect(&self) {
        if self.commands.is_none() {
            return;
        }
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(username = ?self.username, "Disconnecting from chat server");
        self.shutdown.cancel();
        self.shared.transition(ConnectionState::Disconnected);
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    fn link(&self) -> Option<&mpsc::UnboundedSender<Command>> {
        if !self.is_connected() {
            return None;
        }
        self.commands.as_ref()
    }

    /// Publish `event` on `route`. Dropped silently when not connected.
    pub fn publish(&self, route: Route, event: ChatEvent) {
        let Some(commands) = self.link() else {
            debug!(
                destination = route.destination(),
                kind = %event.kind(),
                "Not connected, event dropped"
            );
            return;
        };
        let body = codec::encode(&event.stamped());
        if commands
            .send(Command::Publish {
                destination: route.destination(),
                body,
                ack: None,
            })
            .is_err()
        {
            debug!(destination = route.destination(), "Connection task gone, event dropped");
        }
    }

    /// Publish on the event's own route; `Leave` has none and is ignored
    pub fn publish_event(&self, event: ChatEvent) {
        match Route::for_kind(event.kind()) {
            Some(route) => self.publish(route, event),
            None => debug!(kind = %event.kind(), "Event kind has no outbound route"),
        }
    }

    pub fn send_text(&self, content: &str) {
        let Some(username) = self.username.as_deref() else {
            return;
        };
        if let Ok(event) = ChatEvent::text(username, content) {
            self.publish(Route::SendMessage, event);
        }
    }

    pub fn send_typing(&self) {
        let Some(username) = self.username.as_deref() else {
            return;
        };
        if let Ok(event) = ChatEvent::typing(username) {
            self.publish(Route::Typing, event);
        }
    }

    /// Publish an already-encoded `File` event and wait for the socket write
    pub async fn send_file_event(&self, event: ChatEvent) -> Result<(), SessionError> {
        let commands = self.link().ok_or(SessionError::NotConnected)?;
        let body = codec::encode(&event.stamped());
        debug!(bytes = body.len(), "Sending file message");

        let (ack_tx, ack_rx) = oneshot::channel();
        commands
            .send(Command::Publish {
                destination: Route::SendFile.destination(),
                body,
                ack: Some(ack_tx),
            })
            .map_err(|_| SessionError::NotConnected)?;
        ack_rx.await.map_err(|_| {
            SessionError::PublishFailure("connection closed before the file was written".into())
        })?
    }

    /// Encode `bytes` as an attachment and send it
    pub async fn send_file(&self, bytes: &[u8], media_type: &str) -> Result<(), SessionError> {
        let username = self.username.as_deref().ok_or(SessionError::NotConnected)?;
        let event = self.files.encode(username, bytes, media_type)?;
        self.send_file_event(event).await
    }

    /// Read, encode and send a file from disk
    pub async fn send_file_from_path(&self, path: &Path) -> Result<(), SessionError> {
        let username = self.username.as_deref().ok_or(SessionError::NotConnected)?;
        let event = self.files.encode_path(username, path).await?;
        self.send_file_event(event).await
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ============================================================================
// Connection task
// ============================================================================

/// An established, subscribed broker link
struct Link {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    heartbeat: Negotiated,
}

impl Link {
    async fn send_frame(&mut self, frame: &Frame) -> Result<(), SessionError> {
        self.sink
            .send(Message::Text(frame.encode().into()))
            .await
            .map_err(|e| SessionError::PublishFailure(e.to_string()))
    }

    /// Polite shutdown: DISCONNECT then close, errors ignored
    async fn close(mut self) {
        let _ = self.send_frame(&Frame::disconnect()).await;
        let _ = self.sink.close().await;
    }
}

/// Why `drive` returned
enum LinkEnd {
    Shutdown,
    Lost(String),
}

struct ConnectionTask {
    config: SessionConfig,
    join: ChatEvent,
    shared: Arc<Shared>,
    router: SubscriptionRouter,
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown: CancellationToken,
}

impl ConnectionTask {
    async fn run(mut self, ready: oneshot::Sender<Result<(), SessionError>>) {
        let mut link = match self.establish_cancellable().await {
            Ok(link) => link,
            Err(e) => {
                warn!(error = %e, "Initial connection failed");
                self.shared.transition(ConnectionState::Disconnected);
                let _ = ready.send(Err(e));
                return;
            }
        };
        info!(username = %self.join.sender(), "Connected to chat server");
        let _ = ready.send(Ok(()));

        loop {
            match self.drive(&mut link).await {
                LinkEnd::Shutdown => {
                    link.close().await;
                    self.shared.transition(ConnectionState::Disconnected);
                    debug!("Connection task stopped");
                    return;
                }
                LinkEnd::Lost(reason) => {
                    warn!(reason = %reason, "Connection to chat server lost");
                    self.shared.transition(ConnectionState::Disconnected);
                    self.discard_pending();
                    drop(link);
                    match self.reconnect().await {
                        Some(next) => link = next,
                        None => return,
                    }
                }
            }
        }
    }

    /// Dial, handshake, subscribe and announce the user
    async fn establish(&mut self) -> Result<Link, SessionError> {
        if !self.shared.transition(ConnectionState::Connecting) {
            return Err(SessionError::Closed);
        }
        let url = self.config.endpoint_url()?;
        let handshake = timeout(self.config.connect_timeout, self.handshake(&url))
            .await
            .map_err(|_| {
                SessionError::ConnectFailure(format!(
                    "handshake timed out after {:?}",
                    self.config.connect_timeout
                ))
            })??;
        let mut link = handshake;

        link.send_frame(&Frame::subscribe(SUBSCRIPTION_ID, BROADCAST_DESTINATION))
            .await
            .map_err(|e| SessionError::ConnectFailure(e.to_string()))?;

        match self.announce(&mut link).await {
            Ok(()) => Ok(link),
            Err(SessionError::Closed) => {
                link.close().await;
                Err(SessionError::Closed)
            }
            Err(e) => Err(e),
        }
    }

    /// Write the JOIN, then report Connected. A failed write leaves the
    /// state at Connecting.
    async fn announce(&self, link: &mut Link) -> Result<(), SessionError> {
        let join = codec::encode(&self.join.clone().stamped());
        link.send_frame(&Frame::send(Route::AddUser.destination(), join))
            .await
            .map_err(|e| SessionError::ConnectFailure(e.to_string()))?;
        if !self.shared.transition(ConnectionState::Connected) {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    /// WebSocket upgrade plus STOMP CONNECT/CONNECTED exchange
    async fn handshake(&self, url: &str) -> Result<Link, SessionError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| SessionError::ConnectFailure(format!("{}: {}", url, e)))?;
        let (mut sink, mut stream) = ws.split();

        let ours = HeartBeat::new(self.config.heartbeat_outgoing, self.config.heartbeat_incoming);
        let connect = Frame::connect(&self.config.broker_host(), &ours.to_header());
        sink.send(Message::Text(connect.encode().into()))
            .await
            .map_err(|e| SessionError::ConnectFailure(e.to_string()))?;

        while let Some(msg) = stream.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => return Err(SessionError::ConnectFailure(e.to_string())),
            };
            match stomp::parse(&text) {
                Ok(Incoming::Heartbeat) => continue,
                Ok(Incoming::Frame(frame)) if frame.command == StompCommand::Connected => {
                    let theirs = frame.get("heart-beat").map(HeartBeat::parse).unwrap_or_default();
                    let heartbeat = ours.negotiate(theirs);
                    debug!(
                        version = frame.get("version").unwrap_or("1.0"),
                        send_every = ?heartbeat.send_every,
                        expect_every = ?heartbeat.expect_every,
                        "STOMP session established"
                    );
                    return Ok(Link {
                        sink,
                        stream,
                        heartbeat,
                    });
                }
                Ok(Incoming::Frame(frame)) if frame.command == StompCommand::Error => {
                    let message = frame.get("message").unwrap_or("broker error").to_string();
                    return Err(SessionError::ConnectFailure(message));
                }
                Ok(Incoming::Frame(frame)) => {
                    trace!(command = frame.command.as_str(), "Ignoring frame before CONNECTED");
                }
                Err(e) => {
                    warn!(error = %e, "Unparsable frame during handshake");
                }
            }
        }
        Err(SessionError::ConnectFailure(
            "connection closed during handshake".into(),
        ))
    }

    async fn establish_cancellable(&mut self) -> Result<Link, SessionError> {
        let shutdown = self.shutdown.clone();
        tokio::select! {
            _ = shutdown.cancelled() => Err(SessionError::Closed),
            result = self.establish() => result,
        }
    }

    /// Wait, redial, repeat. `None` when the session was disconnected.
    async fn reconnect(&mut self) -> Option<Link> {
        loop {
            let delay = self.config.reconnect_delay;
            debug!(delay = ?delay, "Reconnecting after delay");
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = sleep(delay) => {}
            }
            self.discard_pending();

            match self.establish_cancellable().await {
                Ok(link) => {
                    info!(username = %self.join.sender(), "Reconnected to chat server");
                    return Some(link);
                }
                Err(SessionError::Closed) => return None,
                Err(e) => {
                    warn!(error = %e, "Reconnection attempt failed");
                    self.shared.transition(ConnectionState::Disconnected);
                }
            }
        }
    }

    /// Drop commands that were queued for a link that no longer exists
    fn discard_pending(&mut self) {
        while let Ok(Command::Publish {
            destination, ack, ..
        }) = self.commands.try_recv()
        {
            debug!(destination = destination, "Discarding publish queued for a lost link");
            if let Some(ack) = ack {
                let _ = ack.send(Err(SessionError::NotConnected));
            }
        }
    }

    /// Serve one link until it is lost or the session shuts down
    async fn drive(&mut self, link: &mut Link) -> LinkEnd {
        let mut ticker: Option<Interval> = link
            .heartbeat
            .send_every
            .map(|every| interval_at(Instant::now() + every, every));
        let silence_limit = link.heartbeat.silence_limit();
        let mut last_seen = Instant::now();

        loop {
            let silence_deadline = silence_limit.map(|limit| last_seen + limit);

            tokio::select! {
                _ = self.shutdown.cancelled() => return LinkEnd::Shutdown,

                cmd = self.commands.recv() => {
                    let Some(Command::Publish { destination, body, ack }) = cmd else {
                        // Handle dropped without disconnect()
                        return LinkEnd::Shutdown;
                    };
                    let result = link.send_frame(&Frame::send(destination, body)).await;
                    let failure = result.as_ref().err().map(|e| e.to_string());
                    match ack {
                        Some(ack) => {
                            let _ = ack.send(result);
                        }
                        None => {
                            if let Some(reason) = &failure {
                                debug!(destination = destination, error = %reason, "Publish failed, event dropped");
                            } else {
                                trace!(destination = destination, "Frame published");
                            }
                        }
                    }
                    if let Some(reason) = failure {
                        return LinkEnd::Lost(reason);
                    }
                }

                _ = async {
                    match ticker.as_mut() {
                        Some(t) => { t.tick().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    if let Err(e) = link.sink.send(Message::Text("\n".to_string().into())).await {
                        return LinkEnd::Lost(format!("heart-beat send failed: {}", e));
                    }
                }

                _ = async {
                    match silence_deadline {
                        Some(deadline) => sleep_until(deadline).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    return LinkEnd::Lost("heart-beat timeout".into());
                }

                msg = link.stream.next() => {
                    last_seen = Instant::now();
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(end) = self.handle_text(&text) {
                                return end;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return LinkEnd::Lost("closed by broker".into());
                        }
                        Some(Ok(_)) => {
                            // Ping/Pong/Binary only prove liveness
                        }
                        Some(Err(e)) => return LinkEnd::Lost(e.to_string()),
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) -> Option<LinkEnd> {
        match stomp::parse(text) {
            Ok(Incoming::Heartbeat) => {
                trace!("Heart-beat received");
                None
            }
            Ok(Incoming::Frame(frame)) => match frame.command {
                StompCommand::Message => {
                    if frame.get("subscription").is_some_and(|id| id != SUBSCRIPTION_ID) {
                        trace!("MESSAGE for another subscription ignored");
                        return None;
                    }
                    self.router.dispatch(&frame.body);
                    None
                }
                StompCommand::Error => {
                    let message = frame.get("message").unwrap_or("broker error").to_string();
                    Some(LinkEnd::Lost(format!("broker error: {}", message)))
                }
                other => {
                    trace!(command = other.as_str(), "Ignoring frame");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Dropping unparsable STOMP frame");
                None
            }
        }
    }
}
