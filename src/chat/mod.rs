//! Chat module: the event model and the pieces that shape it
//!
//! - `types`: `ChatEvent`, the single entity on the wire
//! - `codec`: JSON encode/decode and publish routes
//! - `file`: attachment validation and inline encoding
//! - `typing`: outbound throttle and remote typing registry
//! - `clock`: injectable time source for typing deadlines

pub mod clock;
pub mod codec;
pub mod file;
pub mod types;
pub mod typing;

pub use clock::{Clock, ManualClock, TokioClock};
pub use codec::{CodecError, Route, BROADCAST_DESTINATION};
pub use file::{FileEncoder, FileError, MAX_FILE_BYTES};
pub use types::{ChatEvent, EventError, EventKind, Payload};
pub use typing::{TypingRegistry, TypingThrottle, TYPING_WINDOW};
