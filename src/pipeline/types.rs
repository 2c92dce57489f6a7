use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::detect::AlertRecord;

/// Canonical severity set. Unrecognized model output coerces to
/// `Unclassified` rather than being accepted as free text, so per-severity
/// rollups always sum to the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Gripes,
    Unclassified,
}

impl Severity {
    /// Fixed report ordering, most severe first.
    pub const ORDER: [Severity; 6] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Gripes,
        Severity::Unclassified,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Gripes => "GRIPES",
            Severity::Unclassified => "UNCLASSIFIED",
        }
    }

    /// Lenient parse of a model-supplied severity string.
    pub fn parse(raw: &str) -> Severity {
        match raw.trim().to_uppercase().as_str() {
            "CRITICAL" => Severity::Critical,
            "HIGH" => Severity::High,
            "MEDIUM" => Severity::Medium,
            "LOW" => Severity::Low,
            "GRIPES" => Severity::Gripes,
            _ => Severity::Unclassified,
        }
    }
}

/// What the model wants done about a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Add,
    Edit,
    Delete,
}

impl ActionType {
    pub fn label(&self) -> &'static str {
        match self {
            ActionType::Add => "ADD",
            ActionType::Edit => "EDIT",
            ActionType::Delete => "DELETE",
        }
    }

    /// Strict parse: an element with an unrecognized action is malformed.
    pub fn parse(raw: &str) -> Option<ActionType> {
        match raw.trim().to_uppercase().as_str() {
            "ADD" => Some(ActionType::Add),
            "EDIT" => Some(ActionType::Edit),
            "DELETE" => Some(ActionType::Delete),
            _ => None,
        }
    }
}

/// A single review finding returned by the model.
///
/// Invariants, enforced at parse time:
/// `action_type == Add` implies `existing_text` is None;
/// `action_type == Delete` implies `replacement_text` is None.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub severity: Severity,
    pub file_name: String,
    pub section: String,
    pub issue: String,
    pub action_type: ActionType,
    pub existing_text: Option<String>,
    pub replacement_text: Option<String>,
    pub code_reference: Option<String>,
}

/// Per-severity finding counts for the summary table and findings.json.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub gripes: usize,
    pub unclassified: usize,
    pub total: usize,
}

/// Result of one review invocation.
///
/// If `error` is set, `findings` is empty and the run is failed; the raw
/// response (when any was received) is kept for audit.
#[derive(Debug, Clone)]
pub struct ReviewResult {
    pub findings: Vec<Finding>,
    pub raw_response: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub elapsed_seconds: f64,
    pub error: Option<String>,
}

impl ReviewResult {
    pub fn empty(model: &str) -> Self {
        Self {
            findings: Vec::new(),
            raw_response: String::new(),
            model: model.to_string(),
            input_tokens: 0,
            output_tokens: 0,
            elapsed_seconds: 0.0,
            error: None,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    pub fn total_count(&self) -> usize {
        self.findings.len()
    }

    pub fn severity_counts(&self) -> SeverityCounts {
        SeverityCounts {
            critical: self.count(Severity::Critical),
            high: self.count(Severity::High),
            medium: self.count(Severity::Medium),
            low: self.count(Severity::Low),
            gripes: self.count(Severity::Gripes),
            unclassified: self.count(Severity::Unclassified),
            total: self.total_count(),
        }
    }
}

/// Everything one run produced. The sole return value of the orchestrator;
/// front-ends build their post-run behavior entirely from this.
#[derive(Debug)]
pub struct PipelineOutputs {
    pub run_dir: PathBuf,
    pub report_pdf: PathBuf,
    pub findings_json: PathBuf,
    pub raw_response_txt: PathBuf,
    pub inputs_combined_txt: PathBuf,
    pub token_summary_json: PathBuf,
    /// None on dry runs.
    pub review_result: Option<ReviewResult>,
    pub leed_alert_count: usize,
    pub placeholder_alert_count: usize,
    /// One entry per input file that failed extraction and was skipped.
    pub extraction_warnings: Vec<String>,
}

// ── findings.json document schema ───────────────────────────────────────────

#[derive(Serialize)]
pub struct FindingsMeta<'a> {
    pub model: &'a str,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub elapsed_seconds: f64,
    pub files_reviewed: &'a [String],
    pub dry_run: bool,
}

#[derive(Serialize)]
pub struct AlertsSection<'a> {
    pub leed: &'a [AlertRecord],
    pub placeholder: &'a [AlertRecord],
}

#[derive(Serialize)]
pub struct FindingsDocument<'a> {
    pub meta: FindingsMeta<'a>,
    pub summary: SeverityCounts,
    pub alerts: AlertsSection<'a>,
    pub findings: &'a [Finding],
}
