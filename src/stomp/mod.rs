//! STOMP over WebSocket: the framing the chat broker speaks

mod frame;
mod heartbeat;

pub use frame::{parse, Command, Frame, FrameError, Incoming};
pub use heartbeat::{HeartBeat, Negotiated};
