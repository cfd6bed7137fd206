//! Message codec: JSON wire form of a [`ChatEvent`] and its publish routes
//!
//! Decoding checks structure only: the `type` tag, a non-blank `sender`, and
//! the field combination each kind allows. It never re-validates semantics
//! such as attachment size.

use super::types::{ChatEvent, EventKind, Payload};
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Destination every client subscribes to; all kinds arrive here
pub const BROADCAST_DESTINATION: &str = "/topic/public";

/// Inbound payload did not have the shape of a chat event
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}

/// Logical publish destination for an outbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    SendMessage,
    Typing,
    SendFile,
    AddUser,
}

impl Route {
    /// Broker destination for this route
    pub fn destination(self) -> &'static str {
        match self {
            Route::SendMessage => "/app/chat.sendMessage",
            Route::Typing => "/app/chat.typing",
            Route::SendFile => "/app/chat.sendFile",
            Route::AddUser => "/app/chat.addUser",
        }
    }

    /// Route for an event kind. `Leave` is broker-originated and has none.
    pub fn for_kind(kind: EventKind) -> Option<Route> {
        match kind {
            EventKind::Text => Some(Route::SendMessage),
            EventKind::Typing => Some(Route::Typing),
            EventKind::File => Some(Route::SendFile),
            EventKind::Join => Some(Route::AddUser),
            EventKind::Leave => None,
        }
    }
}

/// Deserialization target: every field optional so shape errors can be
/// reported precisely instead of as generic serde failures.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    #[serde(rename = "type")]
    kind: Option<EventKind>,
    sender: Option<String>,
    content: Option<String>,
    file_content: Option<String>,
    file_type: Option<String>,
    /// Any JSON number; only positive integers up to `u64::MAX` count
    timestamp: Option<Number>,
}

/// Encode an event to its JSON wire form. Absent fields are omitted.
pub fn encode(event: &ChatEvent) -> String {
    let mut map = Map::new();
    map.insert("type".into(), Value::from(event.kind().as_str()));
    map.insert("sender".into(), Value::from(event.sender()));
    match event.payload() {
        Payload::Text { content } => {
            map.insert("content".into(), Value::from(content.as_str()));
        }
        Payload::File { data, media_type } => {
            map.insert("fileContent".into(), Value::from(data.as_str()));
            map.insert("fileType".into(), Value::from(media_type.as_str()));
        }
        Payload::Join | Payload::Leave | Payload::Typing => {}
    }
    if let Some(ts) = event.timestamp() {
        map.insert("timestamp".into(), Value::from(ts));
    }
    Value::Object(map).to_string()
}

/// Decode a frame body into an event
pub fn decode(body: &str) -> Result<ChatEvent, CodecError> {
    let wire: WireEvent =
        serde_json::from_str(body).map_err(|e| CodecError::MalformedFrame(e.to_string()))?;
    from_wire(wire)
}

/// Decode an already-parsed JSON value (history entries)
pub fn decode_value(value: Value) -> Result<ChatEvent, CodecError> {
    let wire: WireEvent =
        serde_json::from_value(value).map_err(|e| CodecError::MalformedFrame(e.to_string()))?;
    from_wire(wire)
}

fn malformed(reason: impl Into<String>) -> CodecError {
    CodecError::MalformedFrame(reason.into())
}

fn from_wire(wire: WireEvent) -> Result<ChatEvent, CodecError> {
    let kind = wire.kind.ok_or_else(|| malformed("missing `type`"))?;
    let sender = wire.sender.ok_or_else(|| malformed("missing `sender`"))?;

    let has_file_fields = wire.file_content.is_some() || wire.file_type.is_some();
    let payload = match kind {
        EventKind::Text => {
            if has_file_fields {
                return Err(malformed("CHAT event carries file fields"));
            }
            let content = wire
                .content
                .ok_or_else(|| malformed("CHAT event without `content`"))?;
            Payload::Text { content }
        }
        EventKind::File => {
            if wire.content.is_some() {
                return Err(malformed("FILE event carries `content`"));
            }
            match (wire.file_content, wire.file_type) {
                (Some(data), Some(media_type)) => Payload::File { data, media_type },
                _ => return Err(malformed("FILE event needs `fileContent` and `fileType`")),
            }
        }
        EventKind::Join | EventKind::Leave | EventKind::Typing => {
            if wire.content.is_some() || has_file_fields {
                return Err(malformed(format!("{} event carries a payload", kind)));
            }
            match kind {
                EventKind::Join => Payload::Join,
                EventKind::Leave => Payload::Leave,
                _ => Payload::Typing,
            }
        }
    };

    let event = ChatEvent::new(sender, payload).map_err(|e| malformed(e.to_string()))?;
    Ok(match wire.timestamp.as_ref().and_then(Number::as_u64) {
        Some(ts) => event.with_timestamp(ts),
        None => event,
    })
}
