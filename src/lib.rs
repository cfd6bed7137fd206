//! ChatterBox
//!
//! A chat client for a STOMP-over-WebSocket broadcast broker:
//! - STOMP 1.2 framing and heart-beat negotiation
//! - A reconnecting session with publish/subscribe primitives
//! - Typing presence throttling and file attachments
//! - REST history preload and a terminal chat view

pub mod chat;
pub mod history;
pub mod session;
pub mod stomp;
pub mod view;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::Result;
use serde::Deserialize;
use session::SessionConfig;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub endpoints: EndpointsYamlConfig,
    pub session: SessionYamlConfig,
    pub history: HistoryYamlConfig,
}

/// Where the chat server lives
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointsYamlConfig {
    pub api_url: String,
    pub ws_url: String,
    pub sockjs: bool,
}

impl Default for EndpointsYamlConfig {
    fn default() -> Self {
        Self {
            api_url: history::DEFAULT_API_URL.into(),
            ws_url: session::config::DEFAULT_WS_URL.into(),
            sockjs: true,
        }
    }
}

/// Session timing section, all in milliseconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionYamlConfig {
    pub heartbeat_outgoing_ms: u64,
    pub heartbeat_incoming_ms: u64,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for SessionYamlConfig {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            heartbeat_outgoing_ms: defaults.heartbeat_outgoing.as_millis() as u64,
            heartbeat_incoming_ms: defaults.heartbeat_incoming.as_millis() as u64,
            reconnect_delay_ms: defaults.reconnect_delay.as_millis() as u64,
            connect_timeout_ms: defaults.connect_timeout.as_millis() as u64,
        }
    }
}

/// History preload section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryYamlConfig {
    pub limit: usize,
}

impl Default for HistoryYamlConfig {
    fn default() -> Self {
        Self {
            limit: history::DEFAULT_HISTORY_LIMIT,
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub ws_url: String,
    pub sockjs: bool,
    pub heartbeat_outgoing: Duration,
    pub heartbeat_incoming: Duration,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    /// Clamped to what the history endpoint accepts
    pub history_limit: usize,
}

impl Config {
    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "chatterbox.yaml" in CWD. A missing or
    /// unparsable file falls back to env vars / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        Ok(Self {
            api_url: std::env::var("CHAT_API_URL").unwrap_or(yaml.endpoints.api_url),
            ws_url: std::env::var("CHAT_WS_URL").unwrap_or(yaml.endpoints.ws_url),
            sockjs: std::env::var("CHAT_SOCKJS")
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(yaml.endpoints.sockjs),
            heartbeat_outgoing: Duration::from_millis(yaml.session.heartbeat_outgoing_ms),
            heartbeat_incoming: Duration::from_millis(yaml.session.heartbeat_incoming_ms),
            reconnect_delay: Duration::from_millis(yaml.session.reconnect_delay_ms),
            connect_timeout: Duration::from_millis(yaml.session.connect_timeout_ms),
            history_limit: history::clamp_limit(
                std::env::var("CHAT_HISTORY_LIMIT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(yaml.history.limit),
            ),
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("chatterbox.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    /// Settings for the chat session
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ws_url: self.ws_url.clone(),
            sockjs: self.sockjs,
            heartbeat_outgoing: self.heartbeat_outgoing,
            heartbeat_incoming: self.heartbeat_incoming,
            reconnect_delay: self.reconnect_delay,
            connect_timeout: self.connect_timeout,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
