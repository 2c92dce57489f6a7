//! Detection-only preprocessing.
//!
//! Scans extracted spec text for two advisory pattern families: LEED /
//! green-building references and unresolved editorial placeholders. Alerts
//! are surfaced in the report and JSON artifacts only; they are never sent
//! to the model, whose prompt tells it not to flag the same issues.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// LEED detection patterns.
const LEED_PATTERNS: &[(&str, &str)] = &[
    (r"(?i)\bLEED\b", "LEED reference"),
    (r"(?i)\bLEED[-\s]?NC\b", "LEED-NC reference"),
    (r"(?i)\bLEED[-\s]?CI\b", "LEED-CI reference"),
    (r"(?i)\bLEED[-\s]?EB\b", "LEED-EB reference"),
    (r"(?i)\bUSGBC\b", "USGBC reference"),
    (r"(?i)\bGreen\s+Building\b", "Green Building reference"),
];

/// Placeholder patterns (unresolved editorial markers).
const PLACEHOLDER_PATTERNS: &[(&str, &str)] = &[
    (r"\[\s*INSERT[^\]]*\]", "INSERT placeholder"),
    (r"\[\s*VERIFY[^\]]*\]", "VERIFY placeholder"),
    (r"\[\s*EDIT[^\]]*\]", "EDIT placeholder"),
    (r"\[\s*SELECT[^\]]*\]", "SELECT placeholder"),
    (r"\[\s*COORDINATE[^\]]*\]", "COORDINATE placeholder"),
    (r"\[\s*TO\s+BE\s+DETERMINED[^\]]*\]", "TBD placeholder"),
    (r"\[\s*TBD[^\]]*\]", "TBD placeholder"),
    (r"\[\s*N/A[^\]]*\]", "N/A placeholder"),
    (r"\[\s*OPTION[^\]]*\]", "OPTION placeholder"),
    (r"<\s*VERIFY[^>]*>", "VERIFY tag"),
    (r"<\s*EDIT[^>]*>", "EDIT tag"),
    (r"<\s*INSERT[^>]*>", "INSERT tag"),
    (r"_{3,}", "Underscore placeholder"),
    (r"\[\s*\.\.\.\s*\]", "Ellipsis placeholder"),
    (r"\[\s*\]", "Empty bracket placeholder"),
];

const MAX_LEED_MATCHES: usize = 50;
const MAX_PLACEHOLDER_MATCHES: usize = 200;

/// Characters of surrounding line kept on each side of a match.
const CONTEXT_RADIUS: usize = 60;

/// One pattern match, positioned by 1-based line number.
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    pub filename: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    #[serde(rename = "match")]
    pub matched_text: String,
    pub context: String,
    pub line: usize,
}

/// Aggregated alerts for one spec.
#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    pub leed: Vec<AlertRecord>,
    pub placeholders: Vec<AlertRecord>,
}

/// Compile a pattern table once, skipping any pattern that fails to
/// compile: detection is best-effort and must never abort a run.
fn compile(patterns: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    patterns
        .iter()
        .filter_map(|(pattern, label)| match Regex::new(pattern) {
            Ok(re) => Some((re, *label)),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "skipping malformed alert pattern");
                None
            }
        })
        .collect()
}

fn leed_patterns() -> &'static [(Regex, &'static str)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| compile(LEED_PATTERNS))
}

fn placeholder_patterns() -> &'static [(Regex, &'static str)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| compile(PLACEHOLDER_PATTERNS))
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

fn context_window(line: &str, start: usize, end: usize) -> String {
    let from = floor_char_boundary(line, start.saturating_sub(CONTEXT_RADIUS));
    let to = ceil_char_boundary(line, (end + CONTEXT_RADIUS).min(line.len()));
    line[from..to].trim().to_string()
}

/// Scan line by line; matches identical in (line, type) collapse to one
/// record so repeated boilerplate does not flood the report.
fn find_matches(
    patterns: &[(Regex, &'static str)],
    content: &str,
    filename: &str,
    max_matches: usize,
) -> Vec<AlertRecord> {
    let mut alerts: Vec<AlertRecord> = Vec::new();
    let mut seen: HashSet<(usize, &'static str)> = HashSet::new();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        for (re, label) in patterns {
            for m in re.find_iter(line) {
                if !seen.insert((line_no, *label)) {
                    continue;
                }
                alerts.push(AlertRecord {
                    filename: filename.to_string(),
                    alert_type: (*label).to_string(),
                    matched_text: m.as_str().to_string(),
                    context: context_window(line, m.start(), m.end()),
                    line: line_no,
                });
                if alerts.len() >= max_matches {
                    return alerts;
                }
            }
        }
    }
    alerts
}

/// Detection-only preprocessing for a single specification. Returns
/// alerts; never modifies content, never fails.
pub fn detect_alerts(content: &str, filename: &str) -> DetectionResult {
    DetectionResult {
        leed: find_matches(leed_patterns(), content, filename, MAX_LEED_MATCHES),
        placeholders: find_matches(
            placeholder_patterns(),
            content,
            filename,
            MAX_PLACEHOLDER_MATCHES,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_leed_references_case_insensitive() {
        let result = detect_alerts("Project pursues leed certification.", "a.docx");
        assert_eq!(result.leed.len(), 1);
        assert_eq!(result.leed[0].alert_type, "LEED reference");
        assert_eq!(result.leed[0].matched_text, "leed");
        assert_eq!(result.leed[0].line, 1);
    }

    #[test]
    fn leed_variant_produces_both_records() {
        // "LEED-NC" satisfies both the bare LEED pattern and the NC variant;
        // the two are distinct alert types, so both survive dedup.
        let result = detect_alerts("Comply with LEED-NC v4 and USGBC rules.", "a.docx");
        let types: Vec<&str> = result.leed.iter().map(|a| a.alert_type.as_str()).collect();
        assert!(types.contains(&"LEED reference"));
        assert!(types.contains(&"LEED-NC reference"));
        assert!(types.contains(&"USGBC reference"));
    }

    #[test]
    fn detects_bracketed_placeholders() {
        let text = "Provide [INSERT MANUFACTURER] pumps.\nCapacity [TBD].";
        let result = detect_alerts(text, "pumps.docx");
        assert_eq!(result.placeholders.len(), 2);
        assert_eq!(result.placeholders[0].alert_type, "INSERT placeholder");
        assert_eq!(result.placeholders[0].matched_text, "[INSERT MANUFACTURER]");
        assert_eq!(result.placeholders[0].line, 1);
        assert_eq!(result.placeholders[1].alert_type, "TBD placeholder");
        assert_eq!(result.placeholders[1].line, 2);
    }

    #[test]
    fn detects_underscore_runs_and_empty_brackets() {
        let result = detect_alerts("Model: ____ Serial: [ ]", "blank.docx");
        let types: Vec<&str> = result
            .placeholders
            .iter()
            .map(|a| a.alert_type.as_str())
            .collect();
        assert!(types.contains(&"Underscore placeholder"));
        assert!(types.contains(&"Empty bracket placeholder"));
    }

    #[test]
    fn same_type_same_line_collapses_to_one_record() {
        let result = detect_alerts("[INSERT SIZE] and [INSERT RATING] here", "dup.docx");
        assert_eq!(result.placeholders.len(), 1);
    }

    #[test]
    fn same_pattern_on_different_lines_kept_separately() {
        let result = detect_alerts("[TBD]\n[TBD]", "two.docx");
        assert_eq!(result.placeholders.len(), 2);
        assert_eq!(result.placeholders[0].line, 1);
        assert_eq!(result.placeholders[1].line, 2);
    }

    #[test]
    fn placeholder_records_capped_per_file() {
        let text = (0..300).map(|_| "[TBD]\n").collect::<String>();
        let result = detect_alerts(&text, "huge.docx");
        assert_eq!(result.placeholders.len(), 200);
    }

    #[test]
    fn context_window_is_bounded_and_contains_match() {
        let mut line = "x".repeat(200);
        line.push_str(" [VERIFY FLOW RATE] ");
        line.push_str(&"y".repeat(200));
        let result = detect_alerts(&line, "ctx.docx");

        assert_eq!(result.placeholders.len(), 1);
        let ctx = &result.placeholders[0].context;
        assert!(ctx.contains("[VERIFY FLOW RATE]"));
        assert!(ctx.len() <= "[VERIFY FLOW RATE]".len() + 2 * CONTEXT_RADIUS + 2);
    }

    #[test]
    fn clean_text_produces_no_alerts() {
        let result = detect_alerts(
            "Provide Schedule 40 steel pipe with welded joints per ASME B31.9.",
            "clean.docx",
        );
        assert!(result.leed.is_empty());
        assert!(result.placeholders.is_empty());
    }

    #[test]
    fn alert_record_serializes_report_field_names() {
        let result = detect_alerts("[TBD]", "x.docx");
        let json = serde_json::to_value(&result.placeholders[0]).unwrap();
        assert_eq!(json["type"], "TBD placeholder");
        assert_eq!(json["match"], "[TBD]");
        assert_eq!(json["line"], 1);
        assert_eq!(json["filename"], "x.docx");
    }
}
