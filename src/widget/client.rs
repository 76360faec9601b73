use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::FantabaseError;

pub const GUEST_MESSAGE_PATH: &str = "/api/chatbot/guest/message";

/// Trim and validate an API base address, dropping one trailing slash.
/// Returns `None` for blank input, unparsable URLs, and non-HTTP schemes.
pub fn normalize_api_base_url(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let url = reqwest::Url::parse(trimmed).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let text = url.to_string();
    Some(text.strip_suffix('/').unwrap_or(&text).to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestMessageRequest {
    pub message: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleeper_username: Option<String>,
}

/// Outcome of a guest message that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub enum GuestReply {
    Success {
        text: Option<String>,
        remaining_messages: Option<f64>,
    },
    /// HTTP 429: the server says the guest allowance is used up.
    RateLimited,
    Failed {
        status: u16,
        message: Option<String>,
    },
}

impl GuestReply {
    /// Classify a response. `body` is `None` when it was not valid JSON;
    /// fields of the wrong type are treated as absent.
    pub fn from_response(status: u16, body: Option<&Value>) -> Self {
        let field = |name: &str| body.and_then(|b| b.get(name));
        if (200..300).contains(&status) {
            return GuestReply::Success {
                text: field("text").and_then(Value::as_str).map(str::to_string),
                remaining_messages: field("remainingMessages").and_then(Value::as_f64),
            };
        }
        if status == 429 {
            return GuestReply::RateLimited;
        }
        GuestReply::Failed {
            status,
            message: field("message").and_then(Value::as_str).map(str::to_string),
        }
    }
}

// ---------------------------------------------------------------------------
// API trait
// ---------------------------------------------------------------------------

/// Remote chat API. `Err` means the request never produced an HTTP response
/// (transport failure); every HTTP status maps to a [`GuestReply`].
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_guest_message(
        &self,
        request: &GuestMessageRequest,
    ) -> Result<GuestReply, FantabaseError>;
}

pub struct GuestChatClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GuestChatClient {
    pub fn new(api_base_url: &str, timeout: Duration) -> Result<Self, FantabaseError> {
        let base = normalize_api_base_url(api_base_url).ok_or_else(|| {
            FantabaseError::Config(format!("invalid api_base_url: {api_base_url:?}"))
        })?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{base}{GUEST_MESSAGE_PATH}"),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatApi for GuestChatClient {
    async fn send_guest_message(
        &self,
        request: &GuestMessageRequest,
    ) -> Result<GuestReply, FantabaseError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| FantabaseError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = match response.bytes().await {
            Ok(bytes) => serde_json::from_slice::<Value>(&bytes).ok(),
            Err(e) => {
                debug!("failed to read chat API response body: {}", e);
                None
            }
        };
        debug!(
            "guest message status={} session={} body_json={}",
            status,
            request.session_id,
            body.is_some()
        );
        Ok(GuestReply::from_response(status, body.as_ref()))
    }
}
