//! History preload over the REST API
//!
//! One-shot, no retry. Any failure yields an empty history so the chat view
//! can start regardless.

use crate::chat::{codec, ChatEvent};
use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_HISTORY_LIMIT: usize = 50;
/// Upper bound the server enforces on `limit`
pub const MAX_HISTORY_LIMIT: usize = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Clamp a requested limit to what the server accepts
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_HISTORY_LIMIT)
}

#[derive(Debug, Clone)]
pub struct HistoryClient {
    client: reqwest::Client,
    url: String,
}

impl HistoryClient {
    /// `api_url` is the server root (e.g. "http://localhost:8080")
    pub fn new(api_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let url = format!("{}/api/messages", api_url.trim_end_matches('/'));
        Self { client, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Most recent messages, oldest first. Empty on any failure.
    pub async fn fetch_recent(&self, limit: usize) -> Vec<ChatEvent> {
        let limit = clamp_limit(limit);
        match self.try_fetch(limit).await {
            Ok(events) => {
                debug!(count = events.len(), limit, "Loaded chat history");
                events
            }
            Err(e) => {
                debug!(url = %self.url, error = %format!("{:#}", e), "Chat history unavailable");
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self, limit: usize) -> Result<Vec<ChatEvent>> {
        let url = format!("{}?limit={}", self.url, limit);
        let entries: Vec<Value> = self
            .client
            .get(&url)
            .send()
            .await
            .context("history request failed")?
            .error_for_status()
            .context("history request rejected")?
            .json()
            .await
            .context("history body is not a JSON array")?;

        let total = entries.len();
        let events: Vec<ChatEvent> = entries
            .into_iter()
            .filter_map(|entry| match codec::decode_value(entry) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed history entry");
                    None
                }
            })
            .collect();
        if events.len() < total {
            debug!(skipped = total - events.len(), "Some history entries were dropped");
        }
        Ok(events)
    }
}

impl Default for HistoryClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_builds_correct_url() {
        let client = HistoryClient::new("http://localhost:8080");
        assert_eq!(client.url(), "http://localhost:8080/api/messages");
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let client = HistoryClient::new("http://chat.example.com/");
        assert_eq!(client.url(), "http://chat.example.com/api/messages");
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(50), 50);
        assert_eq!(clamp_limit(100), 100);
        assert_eq!(clamp_limit(500), 100);
    }
}
