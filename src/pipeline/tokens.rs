//! Token counting and limit checking.
//!
//! Counts are produced with the `cl100k_base` BPE encoder, the same
//! encoder family the original tooling used for this model. Treat the
//! numbers as an estimate of the vendor's billing tokenizer; the budget
//! constants below carry enough buffer that the estimate is safe to gate
//! on.

use std::sync::OnceLock;

use serde::Serialize;
use tiktoken_rs::{cl100k_base, CoreBPE};

pub const MAX_CONTEXT_TOKENS: usize = 200_000;
/// Reserved headroom for the system prompt and the response.
pub const SAFETY_BUFFER: usize = 50_000;
pub const RECOMMENDED_MAX: usize = MAX_CONTEXT_TOKENS - SAFETY_BUFFER;

/// Token count for a single piece of content.
#[derive(Debug, Clone, Serialize)]
pub struct TokenCount {
    pub name: String,
    pub tokens: usize,
    pub chars: usize,
}

/// Summary of token counts for a review job.
///
/// Pure function of its inputs: identical inputs always produce an
/// identical summary, so it is safe to compute once for a UI preview and
/// again inside the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct TokenSummary {
    pub items: Vec<TokenCount>,
    pub system_prompt_tokens: usize,
    pub total_tokens: usize,
    pub within_limit: bool,
    pub warning_message: Option<String>,
}

impl TokenSummary {
    pub fn content_tokens(&self) -> usize {
        self.items.iter().map(|i| i.tokens).sum()
    }
}

fn encoder() -> &'static CoreBPE {
    static ENCODER: OnceLock<CoreBPE> = OnceLock::new();
    ENCODER.get_or_init(|| cl100k_base().expect("cl100k_base vocabulary is embedded"))
}

/// Count tokens in a text string.
pub fn count_tokens(text: &str) -> usize {
    encoder().encode_ordinary(text).len()
}

/// Budget verdict for a given total: `(within_limit, warning_message)`.
///
/// Tiers: silence below 80% of the recommended ceiling, an informational
/// note up to the ceiling, a hard warning above it, and a critical warning
/// above the absolute context maximum.
fn budget_verdict(total_tokens: usize) -> (bool, Option<String>) {
    let within_limit = total_tokens <= RECOMMENDED_MAX;

    let warning_message = if total_tokens > MAX_CONTEXT_TOKENS {
        Some(format!(
            "CRITICAL: Total tokens ({total_tokens}) exceeds maximum context \
             ({MAX_CONTEXT_TOKENS}). Review cannot proceed. Remove some \
             specifications or reduce content."
        ))
    } else if total_tokens > RECOMMENDED_MAX {
        Some(format!(
            "WARNING: Total tokens ({total_tokens}) exceeds recommended limit \
             ({RECOMMENDED_MAX}). Response may be truncated. Consider removing \
             some specifications."
        ))
    } else if total_tokens as f64 > RECOMMENDED_MAX as f64 * 0.8 {
        let pct = total_tokens as f64 / RECOMMENDED_MAX as f64 * 100.0;
        Some(format!(
            "Note: Using {total_tokens} of {RECOMMENDED_MAX} recommended tokens \
             ({pct:.0}%). Approaching limit."
        ))
    } else {
        None
    };

    (within_limit, warning_message)
}

/// Analyze token usage for a set of specs plus the system prompt.
///
/// `within_limit` is the single source of truth the orchestrator's
/// admission gate consults.
pub fn analyze_token_usage(
    spec_contents: &[(String, String)],
    system_prompt: &str,
) -> TokenSummary {
    let system_prompt_tokens = count_tokens(system_prompt);

    let items: Vec<TokenCount> = spec_contents
        .iter()
        .map(|(name, content)| TokenCount {
            name: name.clone(),
            tokens: count_tokens(content),
            chars: content.chars().count(),
        })
        .collect();

    let content_tokens: usize = items.iter().map(|i| i.tokens).sum();
    let total_tokens = system_prompt_tokens + content_tokens;
    let (within_limit, warning_message) = budget_verdict(total_tokens);

    TokenSummary {
        items,
        system_prompt_tokens,
        total_tokens,
        within_limit,
        warning_message,
    }
}

/// Format a token summary for terminal display.
pub fn format_token_summary(summary: &TokenSummary) -> String {
    let mut lines = vec!["Token Usage:".to_string()];

    for item in &summary.items {
        lines.push(format!(
            "  - {}: {} tokens ({} chars)",
            item.name, item.tokens, item.chars
        ));
    }
    lines.push(format!(
        "  System prompt: {} tokens",
        summary.system_prompt_tokens
    ));
    lines.push(format!(
        "  Total: {} / {} tokens",
        summary.total_tokens, RECOMMENDED_MAX
    ));

    match &summary.warning_message {
        Some(warning) => lines.push(format!("  !! {warning}")),
        None => lines.push("  Within recommended limits".to_string()),
    }

    lines.join("\n")
}
