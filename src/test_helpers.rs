//! Test helper factories
//!
//! Sessions that never reach a broker, and STOMP frames as a broker would
//! emit them.
#![allow(dead_code)]

use crate::chat::{codec, ChatEvent, BROADCAST_DESTINATION};
use crate::session::{ChatSession, SessionConfig};
use crate::stomp::{Command, Frame};

/// Nothing listens on the discard port
pub const UNREACHABLE_WS_URL: &str = "ws://127.0.0.1:9/ws";

/// A session pointed at an address nothing listens on
pub fn offline_session() -> ChatSession {
    ChatSession::new(SessionConfig::new(UNREACHABLE_WS_URL))
}

/// MESSAGE frame carrying `event` on the broadcast destination
pub fn message_frame(subscription: &str, event: &ChatEvent) -> String {
    Frame::new(Command::Message)
        .header("subscription", subscription)
        .header("destination", BROADCAST_DESTINATION)
        .header("message-id", "0")
        .with_body(codec::encode(event))
        .encode()
}

/// ERROR frame with a `message` header
pub fn error_frame(message: &str) -> String {
    Frame::new(Command::Error).header("message", message).encode()
}
