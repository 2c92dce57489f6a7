//! Review model API client.
//!
//! `ReviewClient` is the seam between the invoker and the network; the
//! real client talks to the Anthropic Messages API, the mocks next to it
//! drive the invoker and orchestrator tests. Exactly one outbound request
//! is made per `complete` call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{self, ApiKey};

#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("Rate limited (HTTP 429): {0}")]
    RateLimited(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Transient conditions are worth a retry; everything else is terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::RateLimited(_) | ClientError::Connection(_))
    }
}

/// One model completion. Token usage is best-effort accounting from the
/// API response; absent usage reports as zero.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Model API abstraction (allows mocking).
pub trait ReviewClient {
    fn complete(&self, system: &str, user: &str) -> Result<Completion, ClientError>;

    fn model(&self) -> &str;
}

// ── Anthropic Messages API ──────────────────────────────────────────────────

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [UserMessage<'a>; 1],
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// HTTP client for the Anthropic Messages API.
///
/// The credential is taken by value at construction; nothing here reads or
/// writes process environment.
pub struct AnthropicClient {
    api_key: ApiKey,
    model: String,
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl AnthropicClient {
    pub fn new(api_key: ApiKey) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config::REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            api_key,
            model: config::REVIEW_MODEL.to_string(),
            endpoint: config::ANTHROPIC_API_URL.to_string(),
            client,
        }
    }

    /// Point the client at a different endpoint (local stub servers).
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

impl ReviewClient for AnthropicClient {
    fn complete(&self, system: &str, user: &str) -> Result<Completion, ClientError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: config::MAX_OUTPUT_TOKENS,
            system,
            messages: [UserMessage {
                role: "user",
                content: user,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.as_str())
            .header("anthropic-version", config::ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ClientError::Connection(e.to_string())
                } else {
                    ClientError::Connection(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().unwrap_or_default();
            return Err(ClientError::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok(Completion {
            text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ── Test doubles ────────────────────────────────────────────────────────────

/// Mock client returning a fixed response; counts calls so tests can
/// assert how often (or that never) the network boundary was crossed.
pub struct MockReviewClient {
    response: String,
    model: String,
    calls: Arc<AtomicUsize>,
}

impl MockReviewClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            model: config::REVIEW_MODEL.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shareable call counter, usable after the client is boxed away.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl ReviewClient for MockReviewClient {
    fn complete(&self, _system: &str, _user: &str) -> Result<Completion, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Completion {
            text: self.response.clone(),
            input_tokens: 1200,
            output_tokens: 340,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Mock client that fails with a fixed error N times, then succeeds.
pub struct FailThenSucceedClient {
    failures: usize,
    error: ClientError,
    response: String,
    model: String,
    calls: Arc<AtomicUsize>,
}

impl FailThenSucceedClient {
    pub fn new(failures: usize, error: ClientError, response: &str) -> Self {
        Self {
            failures,
            error,
            response: response.to_string(),
            model: config::REVIEW_MODEL.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl ReviewClient for FailThenSucceedClient {
    fn complete(&self, _system: &str, _user: &str) -> Result<Completion, ClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(self.error.clone())
        } else {
            Ok(Completion {
                text: self.response.clone(),
                input_tokens: 0,
                output_tokens: 0,
            })
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}
