//! Pass-through gateway to the external natural-language query service
//!
//! The service turns a question into SQL, runs it and explains the result.
//! Tally only forwards the question and reshapes the answer; it keeps no
//! conversation state.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable for the chat service base URL
pub const CHAT_URL_ENV: &str = "TALLY_CHAT_URL";

/// Environment variable for the request timeout in seconds
pub const CHAT_TIMEOUT_ENV: &str = "TALLY_CHAT_TIMEOUT_SECS";

pub const DEFAULT_CHAT_URL: &str = "http://localhost:8000";
pub const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 30;

/// A question from the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            conversation_id: None,
        }
    }
}

/// The service's answer, as returned to the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub query: String,
    pub sql: Option<String>,
    pub results: Value,
    pub explanation: Option<String>,
    pub conversation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Body sent upstream
#[derive(Debug, Serialize)]
struct UpstreamRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
}

/// Body the service returns
#[derive(Debug, Deserialize)]
struct UpstreamResponse {
    #[serde(default)]
    sql: Option<String>,
    #[serde(default)]
    results: Value,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
}

/// Anything that can answer a data question
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn ask(&self, request: &ChatRequest) -> Result<ChatReply>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatGatewayConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ChatGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CHAT_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_CHAT_TIMEOUT_SECS),
        }
    }
}

impl ChatGatewayConfig {
    /// Read `TALLY_CHAT_URL` and `TALLY_CHAT_TIMEOUT_SECS`, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = std::env::var(CHAT_URL_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.base_url);
        let timeout = std::env::var(CHAT_TIMEOUT_ENV)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        Self { base_url, timeout }
    }
}

/// HTTP client for the query service (`POST {base_url}/api/query`)
#[derive(Clone)]
pub struct ChatGateway {
    http_client: Client,
    base_url: String,
}

impl ChatGateway {
    pub fn new(config: &ChatGatewayConfig) -> Result<Self> {
        let http_client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&ChatGatewayConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatService for ChatGateway {
    async fn ask(&self, request: &ChatRequest) -> Result<ChatReply> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(Error::InvalidData("Query cannot be empty".to_string()));
        }

        let body = UpstreamRequest {
            query,
            conversation_id: request.conversation_id.as_deref(),
        };

        debug!(url = %self.base_url, "Forwarding chat query");

        let response = self
            .http_client
            .post(format!("{}/api/query", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Chat(format!("Query service unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Chat(format!(
                "Query service error: {} - {}",
                status, text
            )));
        }

        let upstream: UpstreamResponse = response
            .json()
            .await
            .map_err(|e| Error::Chat(format!("Invalid query service response: {}", e)))?;

        Ok(ChatReply {
            query: query.to_string(),
            sql: upstream.sql,
            results: upstream.results,
            explanation: upstream.explanation,
            conversation_id: upstream.conversation_id,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockChatServer;
    use serde_json::json;

    fn gateway(url: &str) -> ChatGateway {
        ChatGateway::new(&ChatGatewayConfig {
            base_url: url.to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_ask_maps_response() {
        let server = MockChatServer::start().await;
        server
            .set_response(json!({
                "sql": "SELECT vendor_name FROM extracted_data LIMIT 5",
                "results": [{"vendor_name": "Acme"}],
                "explanation": "Top vendors",
                "conversation_id": "conv-1"
            }))
            .await;

        let reply = gateway(&server.url())
            .ask(&ChatRequest::new("  who are my top vendors?  "))
            .await
            .unwrap();

        assert_eq!(reply.query, "who are my top vendors?");
        assert_eq!(
            reply.sql.as_deref(),
            Some("SELECT vendor_name FROM extracted_data LIMIT 5")
        );
        assert_eq!(reply.results, json!([{"vendor_name": "Acme"}]));
        assert_eq!(reply.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(server.received_queries().await, vec!["who are my top vendors?"]);
    }

    #[tokio::test]
    async fn test_empty_query_rejected_before_network() {
        let server = MockChatServer::start().await;
        let err = gateway(&server.url())
            .ask(&ChatRequest::new("   "))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidData(_)));
        assert!(server.received_queries().await.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_error_status() {
        let server = MockChatServer::start().await;
        server.set_failure(true).await;

        let err = gateway(&server.url())
            .ask(&ChatRequest::new("total spend"))
            .await
            .unwrap_err();

        match err {
            Error::Chat(msg) => assert!(msg.contains("500"), "unexpected message: {}", msg),
            other => panic!("expected chat error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        // Nothing listens on port 1
        let err = gateway("http://127.0.0.1:1")
            .ask(&ChatRequest::new("total spend"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Chat(_)));
    }

    #[test]
    fn test_config_defaults() {
        let config = ChatGatewayConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_request_accepts_camel_case() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"query": "hi", "conversationId": "c1"}"#).unwrap();
        assert_eq!(req.conversation_id.as_deref(), Some("c1"));
    }
}
