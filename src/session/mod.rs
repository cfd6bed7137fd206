//! Session layer: the broker link and the inbound event stream
//!
//! - `connection`: [`ChatSession`], lifecycle, reconnect and publishing
//! - `router`: single-consumer dispatch of decoded broadcast events
//! - `config`: endpoint and timing settings for one session

pub mod config;
pub mod connection;
mod error;
pub mod router;

pub use config::SessionConfig;
pub use connection::{ChatSession, ConnectionState};
pub use error::SessionError;
pub use router::{Subscription, SubscriptionRouter};
