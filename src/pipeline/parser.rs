//! Lenient parsing of the model's findings output.
//!
//! The response contract is a narrative preamble (optional) followed by
//! exactly one top-level JSON array with no code fences. We locate the
//! array by scanning for the first `[` and the last `]`, which tolerates
//! the preamble. A `]` inside a string value after the true end of the
//! array would widen the slice; the output contract (array last, nothing
//! after it) is what keeps that from happening in practice.

use serde_json::Value;
use thiserror::Error;

use super::types::{ActionType, Finding, Severity};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("No JSON array found in model response")]
    MissingArray,

    #[error("Invalid findings JSON: {0}")]
    InvalidJson(String),
}

/// Findings recovered from a response, plus how many array elements were
/// dropped as malformed.
#[derive(Debug)]
pub struct ParsedFindings {
    pub findings: Vec<Finding>,
    pub dropped: usize,
}

/// Parse the model response into findings.
///
/// A response without array delimiters is an empty finding list only when
/// it is genuinely empty or explicitly acknowledges no issues; anything
/// else without an array is a parse failure. Within the array, elements
/// that fail to coerce are skipped and counted rather than discarding the
/// valid ones.
pub fn parse_findings(response: &str) -> Result<ParsedFindings, ParseError> {
    let (start, end) = match (response.find('['), response.rfind(']')) {
        (Some(start), Some(end)) if end > start => (start, end),
        _ => {
            let trimmed = response.trim();
            if trimmed.is_empty() || trimmed.to_lowercase().contains("no issues") {
                return Ok(ParsedFindings {
                    findings: Vec::new(),
                    dropped: 0,
                });
            }
            return Err(ParseError::MissingArray);
        }
    };

    let elements: Vec<Value> = serde_json::from_str(&response[start..=end])
        .map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let mut findings = Vec::with_capacity(elements.len());
    let mut dropped = 0;
    for element in &elements {
        match finding_from_value(element) {
            Some(finding) => findings.push(finding),
            None => dropped += 1,
        }
    }

    Ok(ParsedFindings { findings, dropped })
}

fn str_field(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn opt_str_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Convert one array element to a Finding. Returns None (element dropped)
/// when severity or issue is missing or the action is unrecognized; the
/// ADD/DELETE field invariants are normalized here so every Finding in the
/// system satisfies them.
fn finding_from_value(value: &Value) -> Option<Finding> {
    let obj = value.as_object()?;

    let severity_raw = obj.get("severity").and_then(Value::as_str)?;
    if severity_raw.trim().is_empty() {
        return None;
    }
    let severity = Severity::parse(severity_raw);

    let issue = str_field(obj, "issue");
    if issue.is_empty() {
        return None;
    }

    let action_type = ActionType::parse(obj.get("actionType").and_then(Value::as_str)?)?;

    let mut existing_text = opt_str_field(obj, "existingText");
    let mut replacement_text = opt_str_field(obj, "replacementText");
    match action_type {
        ActionType::Add => existing_text = None,
        ActionType::Delete => replacement_text = None,
        ActionType::Edit => {}
    }

    Some(Finding {
        severity,
        file_name: str_field(obj, "fileName"),
        section: str_field(obj, "section"),
        issue,
        action_type,
        existing_text,
        replacement_text,
        code_reference: opt_str_field(obj, "codeReference"),
    })
}
