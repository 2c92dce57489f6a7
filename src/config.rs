use std::fmt;

/// Application-level constants
pub const APP_NAME: &str = "specreview";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Single allowed model for this tool (no model selection).
pub const REVIEW_MODEL: &str = "claude-opus-4-5-20251101";

/// Anthropic Messages API endpoint and wire version.
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Upper bound on the model's response length.
pub const MAX_OUTPUT_TOKENS: u32 = 32_768;

/// A full review of several specs can take minutes of generation time.
pub const REQUEST_TIMEOUT_SECS: u64 = 600;

/// Default tracing filter when RUST_LOG is not set.
pub fn default_log_filter() -> &'static str {
    "specreview=info,warn"
}

/// API credential, passed explicitly into the review client.
///
/// Front-ends resolve the key once (flag, env, keychain, ...) and hand the
/// value down. The library never reads or mutates process environment on
/// its own, so two runs in one process cannot interfere through ambient
/// credential state.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Convenience for front-ends: read ANTHROPIC_API_KEY from the
    /// environment. Returns None when unset or blank.
    pub fn from_env() -> Option<Self> {
        std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(ApiKey)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}
