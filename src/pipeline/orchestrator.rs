//! Top-level run sequencing.
//!
//! One call to [`run_review`] drives the whole workflow: eligibility
//! check, per-file extraction and alert detection, token analysis, the
//! admission gate, the model invocation, and artifact persistence into a
//! fresh run directory. The CLI and any other front-end call this and
//! build everything they show the user from the returned
//! [`PipelineOutputs`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use super::detect::{self, AlertRecord};
use super::prompt;
use super::reviewer::Reviewer;
use super::tokens::{self, TokenCount, TokenSummary};
use super::types::{
    AlertsSection, FindingsDocument, FindingsMeta, PipelineOutputs, ReviewResult,
};
use super::PipelineError;
use crate::extract::{self, ExtractedSpec};
use crate::report;

/// Per-run inputs, as supplied by the front-end.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub dry_run: bool,
    pub verbose: bool,
}

/// Plain synchronous callbacks plus an optional cancellation flag.
///
/// Callbacks are invoked on the pipeline thread; callers that drive a UI
/// must marshal onto their own event loop and must not block here. The
/// cancel flag is checked at each phase boundary.
#[derive(Default)]
pub struct RunHooks<'a> {
    pub on_log: Option<&'a (dyn Fn(&str) + 'a)>,
    pub on_progress: Option<&'a (dyn Fn(f32, &str) + 'a)>,
    pub cancel: Option<&'a AtomicBool>,
}

impl RunHooks<'_> {
    fn log(&self, message: &str) {
        if let Some(log) = self.on_log {
            log(message);
        }
    }

    fn progress(&self, percent: f32, message: &str) {
        if let Some(progress) = self.on_progress {
            progress(percent, message);
        }
    }

    fn check_cancelled(&self) -> Result<(), PipelineError> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(PipelineError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Eligible inputs: `*.docx` (case-insensitive), excluding editor lock
/// files (`~$` prefix), in stable filename-ascending order.
pub fn eligible_docx_files(input_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files: Vec<PathBuf> = fs::read_dir(input_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|e| e.eq_ignore_ascii_case("docx"))
                .unwrap_or(false)
        })
        .filter(|path| {
            path.file_name()
                .map(|n| !n.to_string_lossy().starts_with("~$"))
                .unwrap_or(false)
        })
        .collect();

    files.sort_by_key(|path| path.file_name().map(|n| n.to_os_string()));

    if files.is_empty() {
        return Err(PipelineError::NoInputFiles(input_dir.to_path_buf()));
    }
    Ok(files)
}

/// Create the exclusively-owned, timestamp-named run directory. A
/// same-second collision gets a numeric suffix rather than sharing the
/// directory.
fn create_run_dir(output_dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H%M%S").to_string();

    let mut candidate = output_dir.join(format!("review_{timestamp}"));
    let mut suffix = 1;
    loop {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                suffix += 1;
                candidate = output_dir.join(format!("review_{timestamp}_{suffix}"));
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Serialize)]
struct TokenSummaryDocument<'a> {
    model: &'a str,
    recommended_max_tokens: usize,
    within_limit: bool,
    total_tokens: usize,
    system_prompt_tokens: usize,
    items: &'a [TokenCount],
    warning_message: &'a Option<String>,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| PipelineError::Io(io::Error::other(e)))?;
    fs::write(path, json)?;
    Ok(())
}

fn write_token_summary(
    path: &Path,
    model: &str,
    summary: &TokenSummary,
) -> Result<(), PipelineError> {
    write_json(
        path,
        &TokenSummaryDocument {
            model,
            recommended_max_tokens: tokens::RECOMMENDED_MAX,
            within_limit: summary.within_limit,
            total_tokens: summary.total_tokens,
            system_prompt_tokens: summary.system_prompt_tokens,
            items: &summary.items,
            warning_message: &summary.warning_message,
        },
    )
}

/// Single source of truth for the whole workflow; every front-end calls
/// this.
pub fn run_review(
    reviewer: &Reviewer,
    opts: &RunOptions,
    hooks: &RunHooks<'_>,
) -> Result<PipelineOutputs, PipelineError> {
    let docx_files = eligible_docx_files(&opts.input_dir)?;
    let run_dir = create_run_dir(&opts.output_dir)?;
    tracing::info!(
        run_dir = %run_dir.display(),
        files = docx_files.len(),
        dry_run = opts.dry_run,
        "starting review run"
    );

    // EXTRACT + DETECT, one file at a time. A file that fails extraction
    // becomes a warning, not a dead run; zero successes is fatal.
    hooks.progress(0.0, "Extracting DOCX text...");
    let mut specs: Vec<ExtractedSpec> = Vec::new();
    let mut extraction_warnings: Vec<String> = Vec::new();
    let mut leed_alerts: Vec<AlertRecord> = Vec::new();
    let mut placeholder_alerts: Vec<AlertRecord> = Vec::new();

    let total = docx_files.len();
    for (i, path) in docx_files.iter().enumerate() {
        hooks.check_cancelled()?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        hooks.log(&format!("Loading: {display_name}"));

        match extract::extract_text_from_docx(path) {
            Ok(spec) => {
                let detection = detect::detect_alerts(&spec.content, &spec.filename);
                leed_alerts.extend(detection.leed);
                placeholder_alerts.extend(detection.placeholders);
                specs.push(spec);
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "extraction failed, skipping file");
                hooks.log(&format!("WARNING: skipping {display_name}: {e}"));
                extraction_warnings.push(format!("{display_name}: {e}"));
            }
        }
        hooks.progress(
            ((i + 1) as f32 / total as f32) * 35.0,
            &format!("Loaded {}/{}", i + 1, total),
        );
    }

    if specs.is_empty() {
        return Err(PipelineError::AllExtractionsFailed {
            failed: extraction_warnings.len(),
            first: extraction_warnings
                .first()
                .cloned()
                .unwrap_or_default(),
        });
    }

    // ESTIMATE_TOKENS. The summary artifact is written unconditionally so
    // an aborted run still explains itself.
    hooks.check_cancelled()?;
    hooks.progress(40.0, "Analyzing tokens...");
    let spec_contents: Vec<(String, String)> = specs
        .iter()
        .map(|s| (s.filename.clone(), s.content.clone()))
        .collect();
    let token_summary = tokens::analyze_token_usage(&spec_contents, prompt::SYSTEM_PROMPT);
    if let Some(warning) = &token_summary.warning_message {
        hooks.log(warning);
    }

    let token_summary_json = run_dir.join("token_summary.json");
    write_token_summary(&token_summary_json, reviewer.model(), &token_summary)?;

    // COMBINE before the gate: an over-budget run keeps its reproducibility
    // snapshot. The gate still precedes any network call.
    hooks.progress(45.0, "Preparing combined input...");
    let combined = prompt::combine_specs(&specs);
    let inputs_combined_txt = run_dir.join("inputs_combined.txt");
    fs::write(&inputs_combined_txt, &combined)?;

    // ADMIT: within_limit is the single source of truth.
    if !token_summary.within_limit {
        tracing::error!(
            total = token_summary.total_tokens,
            limit = tokens::RECOMMENDED_MAX,
            "token budget exceeded, refusing to invoke model"
        );
        return Err(PipelineError::TokenBudgetExceeded {
            total: token_summary.total_tokens,
            limit: tokens::RECOMMENDED_MAX,
        });
    }

    hooks.check_cancelled()?;

    // INVOKE (or synthesize on dry run).
    let result: ReviewResult = if opts.dry_run {
        hooks.log("Dry-run enabled: skipping API call.");
        ReviewResult::empty(reviewer.model())
    } else {
        hooks.progress(55.0, &format!("Calling {}...", reviewer.model()));
        reviewer.review(&combined)
    };

    let raw_response_txt = run_dir.join("raw_response.txt");
    fs::write(&raw_response_txt, &result.raw_response)?;

    if let Some(error) = &result.error {
        fs::write(run_dir.join("error.txt"), error)?;
        return Err(PipelineError::Invocation(error.clone()));
    }

    if opts.verbose {
        hooks.log(&format!(
            "Model returned {} finding(s) in {:.1}s",
            result.total_count(),
            result.elapsed_seconds
        ));
    }

    // PERSIST_FINDINGS.
    let files_reviewed: Vec<String> = specs.iter().map(|s| s.filename.clone()).collect();
    let findings_json = run_dir.join("findings.json");
    write_json(
        &findings_json,
        &FindingsDocument {
            meta: FindingsMeta {
                model: &result.model,
                input_tokens: result.input_tokens,
                output_tokens: result.output_tokens,
                elapsed_seconds: result.elapsed_seconds,
                files_reviewed: &files_reviewed,
                dry_run: opts.dry_run,
            },
            summary: result.severity_counts(),
            alerts: AlertsSection {
                leed: &leed_alerts,
                placeholder: &placeholder_alerts,
            },
            findings: &result.findings,
        },
    )?;

    // REPORT.
    hooks.check_cancelled()?;
    hooks.progress(85.0, "Generating report.pdf...");
    let report_pdf = report::generate_report(
        &result,
        &files_reviewed,
        &leed_alerts,
        &placeholder_alerts,
        &run_dir.join("report.pdf"),
    )?;

    hooks.progress(
        100.0,
        if opts.dry_run { "Dry run complete." } else { "Done." },
    );
    tracing::info!(
        findings = result.total_count(),
        leed_alerts = leed_alerts.len(),
        placeholder_alerts = placeholder_alerts.len(),
        "review run complete"
    );

    Ok(PipelineOutputs {
        run_dir,
        report_pdf,
        findings_json,
        raw_response_txt,
        inputs_combined_txt,
        token_summary_json,
        review_result: if opts.dry_run { None } else { Some(result) },
        leed_alert_count: leed_alerts.len(),
        placeholder_alert_count: placeholder_alerts.len(),
        extraction_warnings,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::io::Write;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use super::*;
    use crate::pipeline::client::{ClientError, FailThenSucceedClient, MockReviewClient};
    use zip::write::SimpleFileOptions;

    const FINDINGS_RESPONSE: &str = r#"Two issues, one of them serious.

[
  {
    "severity": "CRITICAL",
    "fileName": "a.docx",
    "section": "Part 2, Article 2.3.A",
    "issue": "Seismic bracing references ASCE 7-16 instead of ASCE 7-22",
    "actionType": "EDIT",
    "existingText": "ASCE 7-16",
    "replacementText": "ASCE 7-22",
    "codeReference": "CBC 2022"
  },
  {
    "severity": "GRIPES",
    "fileName": "b.docx",
    "section": "Part 1",
    "issue": "Inconsistent capitalization of article headings",
    "actionType": "EDIT",
    "existingText": "GENERAL Requirements",
    "replacementText": "GENERAL REQUIREMENTS",
    "codeReference": null
  }
]"#;

    fn write_docx(dir: &Path, name: &str, paragraphs: &[&str]) -> PathBuf {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?>\
             <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
             <w:body>{body}</w:body></w:document>"
        );
        let path = dir.join(name);
        let file = fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap();
        path
    }

    fn mock_reviewer(response: &str) -> Reviewer {
        Reviewer::new(Box::new(MockReviewClient::new(response)))
    }

    fn options(input: &Path, output: &Path, dry_run: bool) -> RunOptions {
        RunOptions {
            input_dir: input.to_path_buf(),
            output_dir: output.to_path_buf(),
            dry_run,
            verbose: false,
        }
    }

    fn artifact_names(run_dir: &Path) -> BTreeSet<String> {
        fs::read_dir(run_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn live_run_produces_findings_and_artifacts() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_docx(input.path(), "a.docx", &["Seismic design per ASCE 7-16."]);
        write_docx(input.path(), "b.docx", &["GENERAL Requirements article."]);

        let reviewer = mock_reviewer(FINDINGS_RESPONSE);
        let outputs = run_review(
            &reviewer,
            &options(input.path(), output.path(), false),
            &RunHooks::default(),
        )
        .unwrap();

        let result = outputs.review_result.as_ref().unwrap();
        assert_eq!(result.total_count(), 2);
        assert!(outputs.report_pdf.exists());
        assert!(outputs.findings_json.exists());
        assert!(outputs.token_summary_json.exists());
        assert!(outputs.inputs_combined_txt.exists());
        assert!(outputs.raw_response_txt.exists());
        assert!(outputs.extraction_warnings.is_empty());

        let combined = fs::read_to_string(&outputs.inputs_combined_txt).unwrap();
        assert_eq!(combined.matches("===== FILE: ").count(), 2);
        assert!(combined.contains("===== FILE: a.docx ====="));
    }

    #[test]
    fn findings_json_has_documented_shape() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_docx(
            input.path(),
            "a.docx",
            &["Pursue LEED certification.", "Capacity [TBD]."],
        );

        let reviewer = mock_reviewer(FINDINGS_RESPONSE);
        let outputs = run_review(
            &reviewer,
            &options(input.path(), output.path(), false),
            &RunHooks::default(),
        )
        .unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&outputs.findings_json).unwrap()).unwrap();

        assert_eq!(doc["meta"]["model"], crate::config::REVIEW_MODEL);
        assert_eq!(doc["meta"]["files_reviewed"][0], "a.docx");
        assert_eq!(doc["meta"]["dry_run"], false);
        assert_eq!(doc["summary"]["critical"], 1);
        assert_eq!(doc["summary"]["gripes"], 1);
        assert_eq!(doc["summary"]["total"], 2);
        assert_eq!(doc["alerts"]["leed"][0]["type"], "LEED reference");
        assert_eq!(doc["alerts"]["placeholder"][0]["type"], "TBD placeholder");
        assert_eq!(doc["findings"][0]["actionType"], "EDIT");
        assert_eq!(doc["findings"][0]["severity"], "CRITICAL");
    }

    #[test]
    fn dry_run_writes_same_artifact_set_as_live_run() {
        let input = tempfile::tempdir().unwrap();
        write_docx(input.path(), "a.docx", &["Short spec body."]);

        let live_out = tempfile::tempdir().unwrap();
        let live = run_review(
            &mock_reviewer(FINDINGS_RESPONSE),
            &options(input.path(), live_out.path(), false),
            &RunHooks::default(),
        )
        .unwrap();

        let dry_out = tempfile::tempdir().unwrap();
        let dry = run_review(
            &mock_reviewer(FINDINGS_RESPONSE),
            &options(input.path(), dry_out.path(), true),
            &RunHooks::default(),
        )
        .unwrap();

        assert_eq!(
            artifact_names(&live.run_dir),
            artifact_names(&dry.run_dir)
        );
        assert!(dry.review_result.is_none());
        assert_eq!(fs::read_to_string(&dry.raw_response_txt).unwrap(), "");
    }

    #[test]
    fn dry_run_never_calls_the_client() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_docx(input.path(), "a.docx", &["Body text."]);

        let client = MockReviewClient::new(FINDINGS_RESPONSE);
        let calls = client.counter();
        let reviewer = Reviewer::new(Box::new(client));

        run_review(
            &reviewer,
            &options(input.path(), output.path(), true),
            &RunHooks::default(),
        )
        .unwrap();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn over_budget_run_never_invokes_and_keeps_audit_artifacts() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let filler = "the mechanical contractor shall verify duct pressure \
                      ratings before installation. "
            .repeat(20_000);
        write_docx(input.path(), "huge.docx", &[filler.as_str()]);

        let client = MockReviewClient::new(FINDINGS_RESPONSE);
        let calls = client.counter();
        let reviewer = Reviewer::new(Box::new(client));

        let result = run_review(
            &reviewer,
            &options(input.path(), output.path(), false),
            &RunHooks::default(),
        );

        assert!(matches!(
            result,
            Err(PipelineError::TokenBudgetExceeded { .. })
        ));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        let run_dir = fs::read_dir(output.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        assert!(run_dir.join("token_summary.json").exists());
        assert!(run_dir.join("inputs_combined.txt").exists());

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(run_dir.join("token_summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary["within_limit"], false);
        assert!(summary["warning_message"]
            .as_str()
            .unwrap()
            .contains("CRITICAL"));
    }

    #[test]
    fn zero_eligible_files_fails_before_creating_run_dir() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(input.path().join("notes.txt"), "not a docx").unwrap();
        fs::write(input.path().join("~$lock.docx"), "editor lock file").unwrap();

        let result = run_review(
            &mock_reviewer("[]"),
            &options(input.path(), output.path(), false),
            &RunHooks::default(),
        );

        assert!(matches!(result, Err(PipelineError::NoInputFiles(_))));
        assert_eq!(fs::read_dir(output.path()).unwrap().count(), 0);
    }

    #[test]
    fn bad_file_is_skipped_with_warning() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_docx(input.path(), "good.docx", &["Valid body."]);
        fs::write(input.path().join("bad.docx"), b"garbage, not a zip").unwrap();

        let outputs = run_review(
            &mock_reviewer("[]"),
            &options(input.path(), output.path(), true),
            &RunHooks::default(),
        )
        .unwrap();

        assert_eq!(outputs.extraction_warnings.len(), 1);
        assert!(outputs.extraction_warnings[0].starts_with("bad.docx"));

        let combined = fs::read_to_string(&outputs.inputs_combined_txt).unwrap();
        assert!(combined.contains("good.docx"));
        assert!(!combined.contains("bad.docx"));
    }

    #[test]
    fn all_files_bad_is_fatal() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(input.path().join("one.docx"), b"junk").unwrap();
        fs::write(input.path().join("two.docx"), b"more junk").unwrap();

        let result = run_review(
            &mock_reviewer("[]"),
            &options(input.path(), output.path(), true),
            &RunHooks::default(),
        );

        assert!(matches!(
            result,
            Err(PipelineError::AllExtractionsFailed { failed: 2, .. })
        ));
    }

    #[test]
    fn invocation_failure_persists_error_artifact() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_docx(input.path(), "a.docx", &["Body."]);

        let client = FailThenSucceedClient::new(
            10,
            ClientError::Api {
                status: 400,
                body: "invalid_request_error".into(),
            },
            "[]",
        );
        let reviewer =
            Reviewer::new(Box::new(client)).with_backoff(Duration::ZERO, Duration::ZERO);

        let result = run_review(
            &reviewer,
            &options(input.path(), output.path(), false),
            &RunHooks::default(),
        );

        assert!(matches!(result, Err(PipelineError::Invocation(_))));

        let run_dir = fs::read_dir(output.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let error_text = fs::read_to_string(run_dir.join("error.txt")).unwrap();
        assert!(error_text.contains("invalid_request_error"));
        assert!(!run_dir.join("findings.json").exists());
    }

    #[test]
    fn cancellation_stops_the_run_at_a_phase_boundary() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_docx(input.path(), "a.docx", &["Body."]);

        let cancel = AtomicBool::new(true);
        let hooks = RunHooks {
            cancel: Some(&cancel),
            ..RunHooks::default()
        };

        let result = run_review(
            &mock_reviewer("[]"),
            &options(input.path(), output.path(), false),
            &hooks,
        );

        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[test]
    fn progress_is_monotonic_and_reaches_completion() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_docx(input.path(), "a.docx", &["Body one."]);
        write_docx(input.path(), "b.docx", &["Body two."]);

        let seen = std::sync::Mutex::new(Vec::<f32>::new());
        let on_progress = |pct: f32, _msg: &str| {
            seen.lock().unwrap().push(pct);
        };
        let hooks = RunHooks {
            on_progress: Some(&on_progress),
            ..RunHooks::default()
        };

        run_review(
            &mock_reviewer(FINDINGS_RESPONSE),
            &options(input.path(), output.path(), false),
            &hooks,
        )
        .unwrap();

        let seen = seen.into_inner().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 100.0);
    }

    #[test]
    fn files_are_processed_in_filename_order() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_docx(input.path(), "23 21 13.docx", &["Hydronic piping."]);
        write_docx(input.path(), "22 11 16.docx", &["Domestic water."]);
        write_docx(input.path(), "23 05 00.docx", &["Common work."]);

        let outputs = run_review(
            &mock_reviewer("[]"),
            &options(input.path(), output.path(), true),
            &RunHooks::default(),
        )
        .unwrap();

        let combined = fs::read_to_string(&outputs.inputs_combined_txt).unwrap();
        let first = combined.find("22 11 16.docx").unwrap();
        let second = combined.find("23 05 00.docx").unwrap();
        let third = combined.find("23 21 13.docx").unwrap();
        assert!(first < second && second < third);
    }
}
