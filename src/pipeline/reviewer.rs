//! Review invocation: request assembly, retry/backoff, response parsing.

use std::time::{Duration, Instant};

use super::client::{ClientError, ReviewClient};
use super::parser;
use super::prompt;
use super::types::ReviewResult;

/// Maximum invocation attempts per review.
pub const MAX_ATTEMPTS: usize = 3;

/// Backoff bases double per attempt: 10s/20s/40s for rate limits,
/// 5s/10s/20s for connection failures.
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(10);
const CONNECTION_BACKOFF: Duration = Duration::from_secs(5);

/// Drives the model call for one combined-spec payload.
///
/// Transient client errors (rate limit, connection) are retried with
/// exponential backoff up to the attempt cap; terminal API errors and
/// response-parse failures are recorded into `ReviewResult.error` with no
/// further retries. The error-in-result shape means callers always get the
/// raw response and timing for audit, even on failure.
pub struct Reviewer {
    client: Box<dyn ReviewClient + Send + Sync>,
    max_attempts: usize,
    rate_limit_backoff: Duration,
    connection_backoff: Duration,
}

impl Reviewer {
    pub fn new(client: Box<dyn ReviewClient + Send + Sync>) -> Self {
        Self {
            client,
            max_attempts: MAX_ATTEMPTS,
            rate_limit_backoff: RATE_LIMIT_BACKOFF,
            connection_backoff: CONNECTION_BACKOFF,
        }
    }

    /// Override backoff bases (tests use zero to avoid real sleeps).
    pub fn with_backoff(mut self, rate_limit: Duration, connection: Duration) -> Self {
        self.rate_limit_backoff = rate_limit;
        self.connection_backoff = connection;
        self
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Send the combined specifications for review.
    pub fn review(&self, combined_content: &str) -> ReviewResult {
        let start = Instant::now();
        let user_message = prompt::build_user_message(combined_content);

        let mut result = ReviewResult::empty(self.client.model());
        let mut last_transient: Option<String> = None;

        for attempt in 0..self.max_attempts {
            tracing::debug!(
                attempt = attempt + 1,
                max = self.max_attempts,
                "calling review model"
            );

            match self.client.complete(prompt::SYSTEM_PROMPT, &user_message) {
                Ok(completion) => {
                    result.raw_response = completion.text;
                    result.input_tokens = completion.input_tokens;
                    result.output_tokens = completion.output_tokens;

                    match parser::parse_findings(&result.raw_response) {
                        Ok(parsed) => {
                            if parsed.dropped > 0 {
                                tracing::debug!(
                                    dropped = parsed.dropped,
                                    kept = parsed.findings.len(),
                                    "dropped malformed finding elements"
                                );
                            }
                            result.findings = parsed.findings;
                        }
                        Err(e) => {
                            result.error = Some(format!("Response parse error: {e}"));
                        }
                    }
                    result.elapsed_seconds = start.elapsed().as_secs_f64();
                    return result;
                }
                Err(e) if e.is_transient() => {
                    let base = match &e {
                        ClientError::RateLimited(_) => self.rate_limit_backoff,
                        _ => self.connection_backoff,
                    };
                    let wait = base * 2u32.pow(attempt as u32);
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        wait_secs = wait.as_secs(),
                        "transient review error, backing off"
                    );
                    last_transient = Some(e.to_string());
                    if attempt + 1 < self.max_attempts {
                        std::thread::sleep(wait);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "terminal review error");
                    result.error = Some(e.to_string());
                    result.elapsed_seconds = start.elapsed().as_secs_f64();
                    return result;
                }
            }
        }

        result.error = Some(format!(
            "Failed after {} attempts. Last error: {}",
            self.max_attempts,
            last_transient.unwrap_or_else(|| "unknown".to_string())
        ));
        result.elapsed_seconds = start.elapsed().as_secs_f64();
        result
    }
}
