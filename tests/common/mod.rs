//! In-process STOMP-over-WebSocket broker for integration tests
//!
//! Behaves like the chat server's simple broker: every SEND to an
//! application destination is recorded and rebroadcast as a MESSAGE to all
//! subscribers of the broadcast topic.
#![allow(dead_code)]

use chatterbox::chat::{codec, ChatEvent, EventKind, BROADCAST_DESTINATION};
use chatterbox::session::{SessionConfig, Subscription};
use chatterbox::stomp::{self, Command, Frame, Incoming};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct BrokerOptions {
    /// Answer CONNECT with an ERROR frame carrying this message
    pub reject_connect: Option<String>,
    /// `heart-beat` header of the CONNECTED reply, "0,0" when unset
    pub heart_beat: Option<String>,
    /// Record SENDs without rebroadcasting them, so the socket carries
    /// nothing after CONNECTED
    pub silent: bool,
}

enum Outbound {
    Text(String),
    Close,
}

struct Client {
    tx: mpsc::UnboundedSender<Outbound>,
    /// Subscription id for the broadcast topic, once subscribed
    subscription: Option<String>,
}

#[derive(Default)]
struct BrokerState {
    options: BrokerOptions,
    clients: Mutex<HashMap<u64, Client>>,
    sends: Mutex<Vec<(String, String)>>,
    changed: Notify,
    next_client: AtomicU64,
    next_message: AtomicU64,
    connections: AtomicUsize,
}

impl BrokerState {
    fn record_send(&self, destination: String, body: String) {
        self.sends.lock().unwrap().push((destination, body));
        self.changed.notify_waiters();
    }

    fn broadcast(&self, body: &str) {
        let clients = self.clients.lock().unwrap();
        for client in clients.values() {
            if let Some(id) = &client.subscription {
                let message_id = self.next_message.fetch_add(1, Ordering::SeqCst);
                let frame = Frame::new(Command::Message)
                    .header("subscription", id.as_str())
                    .header("destination", BROADCAST_DESTINATION)
                    .header("message-id", message_id.to_string())
                    .header("content-type", "application/json")
                    .with_body(body)
                    .encode();
                let _ = client.tx.send(Outbound::Text(frame));
            }
        }
    }
}

pub struct MockBroker {
    addr: SocketAddr,
    state: Arc<BrokerState>,
    accept_task: JoinHandle<()>,
}

impl MockBroker {
    pub async fn start() -> Self {
        Self::start_with(BrokerOptions::default()).await
    }

    pub async fn start_with(options: BrokerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(BrokerState {
            options,
            ..Default::default()
        });

        let accept_state = state.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_client(stream, accept_state.clone()));
            }
        });

        Self {
            addr,
            state,
            accept_task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Session settings for this broker with test-friendly timings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            sockjs: false,
            reconnect_delay: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(2),
            ..SessionConfig::new(self.url())
        }
    }

    /// Total WebSocket connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Decoded events SENT to `destination`, in arrival order
    pub fn sends_to(&self, destination: &str) -> Vec<ChatEvent> {
        self.state
            .sends
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == destination)
            .filter_map(|(_, body)| codec::decode(body).ok())
            .collect()
    }

    /// Wait until at least `count` events were SENT to `destination`
    pub async fn wait_for_sends(&self, destination: &str, count: usize) -> Vec<ChatEvent> {
        let deadline = Instant::now() + WAIT;
        loop {
            let notified = self.state.changed.notified();
            let sends = self.sends_to(destination);
            if sends.len() >= count {
                return sends;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if timeout(remaining, notified).await.is_err() {
                panic!(
                    "timed out waiting for {} sends to {}, got {}",
                    count,
                    destination,
                    sends.len()
                );
            }
        }
    }

    /// Push a raw body to every subscriber
    pub fn broadcast_raw(&self, body: &str) {
        self.state.broadcast(body);
    }

    /// Close every client socket, as a broker restart would
    pub fn drop_all_connections(&self) {
        let mut clients = self.state.clients.lock().unwrap();
        for (_, client) in clients.drain() {
            let _ = client.tx.send(Outbound::Close);
        }
    }
}

impl Drop for MockBroker {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.drop_all_connections();
    }
}

async fn serve_client(stream: TcpStream, state: Arc<BrokerState>) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (mut sink, mut source) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = state.next_client.fetch_add(1, Ordering::SeqCst);
    state.clients.lock().unwrap().insert(
        id,
        Client {
            tx: tx.clone(),
            subscription: None,
        },
    );

    let writer = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            match out {
                Outbound::Text(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    break;
                }
            }
        }
    });

    while let Some(Ok(msg)) = source.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let frame = match stomp::parse(&text) {
            Ok(Incoming::Frame(frame)) => frame,
            Ok(Incoming::Heartbeat) | Err(_) => continue,
        };
        match frame.command {
            Command::Connect | Command::Stomp => {
                if let Some(message) = &state.options.reject_connect {
                    let error = Frame::new(Command::Error).header("message", message.as_str());
                    let _ = tx.send(Outbound::Text(error.encode()));
                    let _ = tx.send(Outbound::Close);
                    break;
                }
                let heart_beat = state.options.heart_beat.as_deref().unwrap_or("0,0");
                let connected = Frame::new(Command::Connected)
                    .header("version", "1.2")
                    .header("heart-beat", heart_beat);
                let _ = tx.send(Outbound::Text(connected.encode()));
            }
            Command::Subscribe => {
                if frame.get("destination") == Some(BROADCAST_DESTINATION) {
                    if let Some(client) = state.clients.lock().unwrap().get_mut(&id) {
                        client.subscription = frame.get("id").map(str::to_string);
                    }
                }
            }
            Command::Send => {
                let destination = frame.get("destination").unwrap_or_default().to_string();
                if destination.starts_with("/app/") && !state.options.silent {
                    state.broadcast(&frame.body);
                }
                state.record_send(destination, frame.body);
            }
            Command::Disconnect => break,
            _ => {}
        }
    }

    state.clients.lock().unwrap().remove(&id);
    drop(tx);
    let _ = writer.await;
}

/// Next event of `kind` on `sub`, skipping others
pub async fn next_of_kind(sub: &mut Subscription, kind: EventKind) -> ChatEvent {
    timeout(WAIT, async {
        loop {
            match sub.recv().await {
                Some(event) if event.kind() == kind => return event,
                Some(_) => continue,
                None => panic!("subscription ended while waiting for {}", kind),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {} event", kind))
}
