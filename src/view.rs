//! Chat view: the interaction logic of the chat page, minus the rendering
//!
//! Input changes drive the outbound typing throttle, submissions send text,
//! inbound typing events feed the registry and every other event lands in
//! the transcript. A front end only has to feed it input and events and
//! draw what it exposes.

use crate::chat::file::decode_file_data;
use crate::chat::{
    ChatEvent, Clock, EventKind, Payload, TokioClock, TypingRegistry, TypingThrottle, TYPING_WINDOW,
};
use crate::session::{ChatSession, SessionError};
use chrono::{DateTime, Local};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

pub const CONNECT_ERROR_BANNER: &str =
    "Could not connect to chat server. Make sure the backend is running, then restart.";

pub struct ChatView<C: Clock = TokioClock> {
    session: ChatSession,
    clock: C,
    throttle: TypingThrottle,
    typing: TypingRegistry,
    transcript: Vec<ChatEvent>,
    connection_error: Option<String>,
}

impl ChatView<TokioClock> {
    pub fn new(session: ChatSession) -> Self {
        Self::with_clock(session, TokioClock)
    }
}

impl<C: Clock> ChatView<C> {
    pub fn with_clock(session: ChatSession, clock: C) -> Self {
        Self {
            session,
            clock,
            throttle: TypingThrottle::new(TYPING_WINDOW),
            typing: TypingRegistry::new(TYPING_WINDOW),
            transcript: Vec::new(),
            connection_error: None,
        }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn username(&self) -> Option<&str> {
        self.session.username()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Connect the session; a failure is kept as a persistent banner
    pub async fn connect(&mut self, username: &str) -> Result<(), SessionError> {
        let result = self.session.connect(username).await;
        if result.is_err() {
            self.connection_error = Some(CONNECT_ERROR_BANNER.to_string());
        }
        result
    }

    pub fn connection_error(&self) -> Option<&str> {
        self.connection_error.as_deref()
    }

    pub fn disconnect(&self) {
        self.session.disconnect();
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// The input box changed. Returns whether a typing signal went out.
    pub fn on_input_changed(&mut self, value: &str) -> bool {
        if value.trim().is_empty() || !self.session.is_connected() {
            return false;
        }
        if !self.throttle.try_acquire(self.clock.now()) {
            return false;
        }
        self.session.send_typing();
        true
    }

    /// Submit the input box. Returns whether a message went out.
    pub fn submit(&mut self, input: &str) -> bool {
        let content = input.trim();
        if content.is_empty() || !self.session.is_connected() {
            return false;
        }
        self.session.send_text(content);
        self.throttle.reset();
        true
    }

    /// Line-mode input: the finished line is the only input change seen, so
    /// it signals typing once before it is submitted.
    pub fn submit_line(&mut self, line: &str) -> bool {
        self.on_input_changed(line);
        self.submit(line)
    }

    pub async fn attach_file(&self, path: &Path) -> Result<(), SessionError> {
        self.session.send_file_from_path(path).await
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Prepend a preloaded history before anything received live
    pub fn load_history(&mut self, history: Vec<ChatEvent>) {
        let mut events: Vec<ChatEvent> = history
            .into_iter()
            .filter(|e| e.kind() != EventKind::Typing)
            .collect();
        debug!(count = events.len(), "History loaded into transcript");
        events.append(&mut self.transcript);
        self.transcript = events;
    }

    /// Apply one inbound event. Returns whether the transcript grew.
    pub fn on_event(&mut self, event: ChatEvent) -> bool {
        let own = self.username() == Some(event.sender());
        match event.kind() {
            EventKind::Typing => {
                if !own {
                    self.typing.mark(event.sender(), self.clock.now());
                }
                false
            }
            kind => {
                if kind == EventKind::Text {
                    self.typing.clear(event.sender());
                }
                self.transcript.push(event);
                true
            }
        }
    }

    /// Drop expired typing entries; returns who stopped typing
    pub fn expire_typing(&mut self) -> Vec<String> {
        self.typing.expire(self.clock.now())
    }

    /// When the next typing entry expires, for the front end's timer
    pub fn next_typing_expiry(&self) -> Option<Instant> {
        self.typing.next_expiry()
    }

    pub fn typing_banner(&self) -> Option<String> {
        typing_banner(&self.typing.typing(self.clock.now()))
    }

    pub fn transcript(&self) -> &[ChatEvent] {
        &self.transcript
    }
}

/// "bob is typing..." / "alice, bob are typing..."
pub fn typing_banner(names: &[String]) -> Option<String> {
    match names {
        [] => None,
        [one] => Some(format!("{} is typing...", one)),
        many => Some(format!("{} are typing...", many.join(", "))),
    }
}

fn format_timestamp(epoch_ms: Option<u64>) -> Option<String> {
    let ms = i64::try_from(epoch_ms?).ok()?;
    let utc = DateTime::from_timestamp_millis(ms)?;
    Some(utc.with_timezone(&Local).format("%H:%M").to_string())
}

fn human_size(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{} B", bytes)
    } else if b < KIB * KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{:.1} MiB", b / (KIB * KIB))
    }
}

/// One transcript line for a terminal
pub fn render_line(event: &ChatEvent) -> String {
    let stamp = format_timestamp(event.timestamp())
        .map(|t| format!("[{}] ", t))
        .unwrap_or_default();
    match event.payload() {
        Payload::Join => format!("{} joined!", event.sender()),
        Payload::Leave => format!("{} left!", event.sender()),
        Payload::Text { content } => format!("{}{}: {}", stamp, event.sender(), content),
        Payload::File { data, media_type } => {
            let size = decode_file_data(data)
                .map(|bytes| human_size(bytes.len()))
                .unwrap_or_else(|_| "unreadable".to_string());
            format!("{}{} sent a file ({}, {})", stamp, event.sender(), media_type, size)
        }
        Payload::Typing => format!("{} is typing...", event.sender()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ManualClock;
    use crate::test_helpers::offline_session;
    use std::time::Duration;

    fn view() -> (ChatView<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (ChatView::with_clock(offline_session(), clock.clone()), clock)
    }

    #[test]
    fn test_typing_events_feed_registry_not_transcript() {
        let (mut view, clock) = view();
        assert!(!view.on_event(ChatEvent::typing("bob").unwrap()));
        assert!(view.transcript().is_empty());
        assert_eq!(view.typing_banner().as_deref(), Some("bob is typing..."));

        clock.advance(Duration::from_millis(2999));
        assert!(view.expire_typing().is_empty());
        clock.advance(Duration::from_millis(1));
        assert_eq!(view.expire_typing(), vec!["bob".to_string()]);
        assert!(view.typing_banner().is_none());
    }

    #[test]
    fn test_text_clears_typing_but_join_does_not() {
        let (mut view, _clock) = view();
        view.on_event(ChatEvent::typing("bob").unwrap());
        view.on_event(ChatEvent::typing("carol").unwrap());
        assert_eq!(view.typing_banner().as_deref(), Some("bob, carol are typing..."));

        assert!(view.on_event(ChatEvent::join("carol").unwrap()));
        assert!(view.on_event(ChatEvent::text("bob", "hi").unwrap()));
        assert_eq!(view.typing_banner().as_deref(), Some("carol is typing..."));
        assert_eq!(view.transcript().len(), 2);
    }

    #[test]
    fn test_history_goes_before_live_events() {
        let (mut view, _clock) = view();
        view.on_event(ChatEvent::text("bob", "live").unwrap());
        view.load_history(vec![
            ChatEvent::text("alice", "old").unwrap(),
            ChatEvent::typing("alice").unwrap(),
        ]);
        let contents: Vec<_> = view.transcript().iter().map(|e| e.content()).collect();
        assert_eq!(contents, vec![Some("old"), Some("live")]);
    }

    #[test]
    fn test_input_ignored_while_disconnected() {
        let (mut view, _clock) = view();
        assert!(!view.on_input_changed("hello"));
        assert!(!view.submit("hello"));
        assert!(!view.submit("   "));
    }

    #[test]
    fn test_render_lines() {
        let join = ChatEvent::join("alice").unwrap();
        assert_eq!(render_line(&join), "alice joined!");
        assert_eq!(render_line(&ChatEvent::leave("alice").unwrap()), "alice left!");

        let text = ChatEvent::text("bob", "hello").unwrap();
        assert_eq!(render_line(&text), "bob: hello");

        let stamped = ChatEvent::text("bob", "hello")
            .unwrap()
            .with_timestamp(1_700_000_000_000);
        let line = render_line(&stamped);
        assert!(line.starts_with('['));
        assert!(line.ends_with("] bob: hello"));

        let file = ChatEvent::file("bob", "aGVsbG8=", "text/plain").unwrap();
        assert_eq!(render_line(&file), "bob sent a file (text/plain, 5 B)");
    }

    #[test]
    fn test_typing_banner_wording() {
        assert!(typing_banner(&[]).is_none());
        assert_eq!(
            typing_banner(&["a".to_string(), "b".to_string()]).as_deref(),
            Some("a, b are typing...")
        );
    }
}
