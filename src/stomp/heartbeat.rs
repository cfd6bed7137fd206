//! STOMP heart-beat header and interval negotiation

use std::time::Duration;

/// Intervals from a `heart-beat:<outgoing>,<incoming>` header, in ms.
/// Zero means "cannot send / do not want".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    pub outgoing_ms: u64,
    pub incoming_ms: u64,
}

impl HeartBeat {
    pub fn new(outgoing: Duration, incoming: Duration) -> Self {
        Self {
            outgoing_ms: outgoing.as_millis() as u64,
            incoming_ms: incoming.as_millis() as u64,
        }
    }

    /// Parse a header value; malformed values mean no heart-beating
    pub fn parse(value: &str) -> Self {
        let mut parts = value.split(',').map(|p| p.trim().parse::<u64>());
        match (parts.next(), parts.next(), parts.next()) {
            (Some(Ok(outgoing_ms)), Some(Ok(incoming_ms)), None) => Self {
                outgoing_ms,
                incoming_ms,
            },
            _ => Self::default(),
        }
    }

    pub fn to_header(self) -> String {
        format!("{},{}", self.outgoing_ms, self.incoming_ms)
    }

    /// Combine our (client) setting with the server's CONNECTED header
    pub fn negotiate(self, server: HeartBeat) -> Negotiated {
        let pick = |ours: u64, theirs: u64| {
            (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
        };
        Negotiated {
            send_every: pick(self.outgoing_ms, server.incoming_ms),
            expect_every: pick(self.incoming_ms, server.outgoing_ms),
        }
    }
}

/// Agreed heart-beating for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Negotiated {
    /// How often we send an EOL
    pub send_every: Option<Duration>,
    /// How often the server promised traffic
    pub expect_every: Option<Duration>,
}

impl Negotiated {
    /// Silence after which the link is declared dead (twice the promised
    /// interval, the usual tolerance)
    pub fn silence_limit(&self) -> Option<Duration> {
        self.expect_every.map(|every| every * 2)
    }
}
