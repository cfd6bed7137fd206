//! Chat event types: the single entity carried over the broadcast channel

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind tag of a chat event
///
/// Serialized with the broker's names (`CHAT`, `JOIN`, `LEAVE`, `TYPING`, `FILE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    #[serde(rename = "CHAT")]
    Text,
    Join,
    Leave,
    Typing,
    File,
}

impl EventKind {
    /// Wire name of the kind (e.g. "CHAT")
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Text => "CHAT",
            EventKind::Join => "JOIN",
            EventKind::Leave => "LEAVE",
            EventKind::Typing => "TYPING",
            EventKind::File => "FILE",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific fields of an event. Each variant carries exactly the
/// fields its kind populates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text { content: String },
    Join,
    Leave,
    Typing,
    File {
        /// Base64 of the whole attachment
        data: String,
        media_type: String,
    },
}

impl Payload {
    pub fn kind(&self) -> EventKind {
        match self {
            Payload::Text { .. } => EventKind::Text,
            Payload::Join => EventKind::Join,
            Payload::Leave => EventKind::Leave,
            Payload::Typing => EventKind::Typing,
            Payload::File { .. } => EventKind::File,
        }
    }
}

/// Rejected event construction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("sender name must not be empty")]
    EmptySender,
}

/// A chat event. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    sender: String,
    payload: Payload,
    /// Epoch milliseconds, never zero
    timestamp: Option<u64>,
}

impl ChatEvent {
    /// Build an event, rejecting a blank sender
    pub fn new(sender: impl Into<String>, payload: Payload) -> Result<Self, EventError> {
        let sender = sender.into();
        if sender.trim().is_empty() {
            return Err(EventError::EmptySender);
        }
        Ok(Self {
            sender,
            payload,
            timestamp: None,
        })
    }

    pub fn text(sender: impl Into<String>, content: impl Into<String>) -> Result<Self, EventError> {
        Self::new(
            sender,
            Payload::Text {
                content: content.into(),
            },
        )
    }

    pub fn join(sender: impl Into<String>) -> Result<Self, EventError> {
        Self::new(sender, Payload::Join)
    }

    pub fn leave(sender: impl Into<String>) -> Result<Self, EventError> {
        Self::new(sender, Payload::Leave)
    }

    pub fn typing(sender: impl Into<String>) -> Result<Self, EventError> {
        Self::new(sender, Payload::Typing)
    }

    pub fn file(
        sender: impl Into<String>,
        data: impl Into<String>,
        media_type: impl Into<String>,
    ) -> Result<Self, EventError> {
        Self::new(
            sender,
            Payload::File {
                data: data.into(),
                media_type: media_type.into(),
            },
        )
    }

    /// Set the timestamp (epoch ms). Zero means "unstamped".
    pub fn with_timestamp(mut self, epoch_ms: u64) -> Self {
        self.timestamp = (epoch_ms > 0).then_some(epoch_ms);
        self
    }

    /// Stamp with the current time unless a timestamp is already present
    pub fn stamped(self) -> Self {
        if self.timestamp.is_some() {
            return self;
        }
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.with_timestamp(now)
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    pub fn content(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text { content } => Some(content),
            _ => None,
        }
    }

    pub fn file_data(&self) -> Option<&str> {
        match &self.payload {
            Payload::File { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn file_media_type(&self) -> Option<&str> {
        match &self.payload {
            Payload::File { media_type, .. } => Some(media_type),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_sender_rejected() {
        assert_eq!(ChatEvent::text("", "hi"), Err(EventError::EmptySender));
        assert_eq!(ChatEvent::join("   "), Err(EventError::EmptySender));
        assert!(ChatEvent::typing("bob").is_ok());
    }

    #[test]
    fn test_accessors_follow_kind() {
        let text = ChatEvent::text("alice", "hi").unwrap();
        assert_eq!(text.kind(), EventKind::Text);
        assert_eq!(text.content(), Some("hi"));
        assert!(text.file_data().is_none());
        assert!(text.file_media_type().is_none());

        let file = ChatEvent::file("alice", "aGk=", "image/png").unwrap();
        assert_eq!(file.kind(), EventKind::File);
        assert!(file.content().is_none());
        assert_eq!(file.file_data(), Some("aGk="));
        assert_eq!(file.file_media_type(), Some("image/png"));

        let join = ChatEvent::join("alice").unwrap();
        assert!(join.content().is_none());
        assert!(join.file_data().is_none());
    }

    #[test]
    fn test_zero_timestamp_means_absent() {
        let event = ChatEvent::join("alice").unwrap().with_timestamp(0);
        assert_eq!(event.timestamp(), None);
        let event = event.with_timestamp(1_700_000_000_000);
        assert_eq!(event.timestamp(), Some(1_700_000_000_000));
    }

    #[test]
    fn test_stamped_keeps_existing_timestamp() {
        let event = ChatEvent::text("alice", "hi").unwrap().with_timestamp(42);
        assert_eq!(event.stamped().timestamp(), Some(42));

        let fresh = ChatEvent::text("alice", "hi").unwrap().stamped();
        assert!(fresh.timestamp().unwrap() > 1_600_000_000_000);
    }

    #[test]
    fn test_kind_serde_uses_broker_names() {
        assert_eq!(serde_json::to_string(&EventKind::Text).unwrap(), "\"CHAT\"");
        assert_eq!(serde_json::to_string(&EventKind::Typing).unwrap(), "\"TYPING\"");
        let kind: EventKind = serde_json::from_str("\"FILE\"").unwrap();
        assert_eq!(kind, EventKind::File);
        assert_eq!(EventKind::Leave.to_string(), "LEAVE");
    }
}
