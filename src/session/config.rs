//! Session configuration and endpoint resolution

use super::SessionError;
use std::time::Duration;

pub const DEFAULT_WS_URL: &str = "http://localhost:8080/ws";
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(4);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for one chat session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Broker endpoint; `http(s)` is mapped to `ws(s)`
    pub ws_url: String,
    /// Endpoint is a SockJS endpoint; use its raw WebSocket path
    pub sockjs: bool,
    /// How often we offer to send heart-beats
    pub heartbeat_outgoing: Duration,
    /// How often we ask the broker for heart-beats
    pub heartbeat_incoming: Duration,
    /// Wait before each automatic reconnection attempt
    pub reconnect_delay: Duration,
    /// Bound on the WebSocket + STOMP handshake
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Self::default()
        }
    }

    /// Resolve `ws_url` to the URL the WebSocket client dials
    pub fn endpoint_url(&self) -> Result<String, SessionError> {
        let invalid = |reason: String| SessionError::InvalidEndpoint {
            url: self.ws_url.clone(),
            reason,
        };
        let mut url = reqwest::Url::parse(&self.ws_url).map_err(|e| invalid(e.to_string()))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(invalid(format!("unsupported scheme {:?}", other))),
        };
        url.set_scheme(scheme)
            .map_err(|_| invalid("cannot switch scheme".to_string()))?;

        if self.sockjs {
            let path = url.path().trim_end_matches('/').to_string();
            if !path.ends_with("/websocket") {
                url.set_path(&format!("{}/websocket", path));
            }
        }
        Ok(url.to_string())
    }

    /// Host header for the STOMP CONNECT frame
    pub fn broker_host(&self) -> String {
        reqwest::Url::parse(&self.ws_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            sockjs: true,
            heartbeat_outgoing: DEFAULT_HEARTBEAT,
            heartbeat_incoming: DEFAULT_HEARTBEAT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}
