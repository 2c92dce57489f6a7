//! PDF report generation.
//!
//! Renders the review result, file list, and both alert families into one
//! `report.pdf`: title and metadata, files reviewed, a severity-count
//! summary row, alerts grouped by file (capped per file), then findings
//! grouped by severity in fixed priority order. Existing text renders red
//! and replacement text green so an edit scans at a glance.

use std::io::BufWriter;
use std::path::{Path, PathBuf};

use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Rgb,
};
use thiserror::Error;

use crate::pipeline::detect::AlertRecord;
use crate::pipeline::types::{Finding, ReviewResult, Severity};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 20.0;
const MARGIN_BOTTOM: f32 = 18.0;
const TOP_Y: f32 = 280.0;

/// Alert records shown per file before the "... and N more" fallback.
const MAX_ALERTS_PER_FILE: usize = 5;

fn severity_color(severity: Severity) -> Color {
    let (r, g, b) = match severity {
        Severity::Critical => (0.75, 0.0, 0.0),
        Severity::High => (1.0, 0.4, 0.0),
        Severity::Medium => (0.75, 0.6, 0.0),
        Severity::Low => (0.0, 0.44, 0.75),
        Severity::Gripes => (0.5, 0.0, 0.5),
        Severity::Unclassified => (0.4, 0.4, 0.4),
    };
    Color::Rgb(Rgb::new(r, g, b, None))
}

fn black() -> Color {
    Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None))
}

fn red() -> Color {
    Color::Rgb(Rgb::new(0.75, 0.0, 0.0, None))
}

fn green() -> Color {
    Color::Rgb(Rgb::new(0.0, 0.5, 0.0, None))
}

/// Simple word-wrap helper for PDF text rendering.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(current.clone());
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Approximate characters per line for Helvetica at a given point size
/// across the usable page width.
fn wrap_width(size: f32) -> usize {
    (960.0 / size) as usize
}

/// Group alerts by filename in first-seen order.
pub fn group_alerts_by_file(alerts: &[AlertRecord]) -> Vec<(&str, Vec<&AlertRecord>)> {
    let mut groups: Vec<(&str, Vec<&AlertRecord>)> = Vec::new();
    for alert in alerts {
        match groups.iter_mut().find(|entry| entry.0 == alert.filename) {
            Some(entry) => entry.1.push(alert),
            None => groups.push((alert.filename.as_str(), vec![alert])),
        }
    }
    groups
}

/// Y-cursor page writer: tracks the current layer and vertical position,
/// breaking to a fresh page when a line would cross the bottom margin.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self, ReportError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ReportError::Pdf(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ReportError::Pdf(e.to_string()))?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            y: TOP_Y,
        })
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = TOP_Y;
    }

    fn advance(&mut self, mm: f32) {
        self.y -= mm;
        if self.y < MARGIN_BOTTOM {
            self.new_page();
        }
    }

    /// Write one wrapped block of text at the given indent.
    fn text(&mut self, text: &str, size: f32, indent: f32, bold: bool, color: Option<Color>) {
        let font = if bold {
            self.bold.clone()
        } else {
            self.regular.clone()
        };
        let line_height = size * 0.5;

        for line in wrap_text(text, wrap_width(size)) {
            if self.y < MARGIN_BOTTOM + line_height {
                self.new_page();
            }
            if let Some(color) = color.clone() {
                self.layer.set_fill_color(color);
            }
            self.layer.use_text(
                line,
                size,
                Mm(MARGIN_LEFT + indent),
                Mm(self.y),
                &font,
            );
            if color.is_some() {
                self.layer.set_fill_color(black());
            }
            self.advance(line_height);
        }
    }

    fn heading(&mut self, text: &str, size: f32, color: Option<Color>) {
        self.advance(3.0);
        self.text(text, size, 0.0, true, color);
        self.advance(2.0);
    }

    fn gap(&mut self, mm: f32) {
        self.advance(mm);
    }

    fn save(self, path: &Path) -> Result<(), ReportError> {
        let file = std::fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.doc
            .save(&mut writer)
            .map_err(|e| ReportError::Pdf(e.to_string()))?;
        Ok(())
    }
}

fn alerts_section(
    pdf: &mut PageWriter,
    heading: &str,
    intro: &str,
    alerts: &[AlertRecord],
) {
    if alerts.is_empty() {
        return;
    }
    pdf.heading(heading, 13.0, None);
    pdf.text(intro, 10.0, 0.0, false, None);
    pdf.gap(2.0);

    for (filename, records) in group_alerts_by_file(alerts) {
        pdf.text(filename, 10.0, 0.0, true, None);
        for alert in records.iter().take(MAX_ALERTS_PER_FILE) {
            pdf.text(
                &format!("- Line {}: {}", alert.line, alert.context),
                9.0,
                5.0,
                false,
                None,
            );
        }
        if records.len() > MAX_ALERTS_PER_FILE {
            pdf.text(
                &format!("... and {} more", records.len() - MAX_ALERTS_PER_FILE),
                9.0,
                5.0,
                false,
                None,
            );
        }
        pdf.gap(2.0);
    }
}

fn finding_entry(pdf: &mut PageWriter, index: usize, finding: &Finding) {
    pdf.text(
        &format!(
            "{index}. [{}] {}",
            finding.severity.label(),
            finding.file_name
        ),
        10.5,
        0.0,
        true,
        Some(severity_color(finding.severity)),
    );

    if !finding.section.is_empty() {
        pdf.text(&format!("Section: {}", finding.section), 10.0, 5.0, false, None);
    }
    pdf.text(&format!("Issue: {}", finding.issue), 10.0, 5.0, false, None);
    pdf.text(
        &format!("Action: {}", finding.action_type.label()),
        10.0,
        5.0,
        false,
        None,
    );
    if let Some(existing) = &finding.existing_text {
        pdf.text(
            &format!("Existing Text: {existing}"),
            10.0,
            5.0,
            false,
            Some(red()),
        );
    }
    if let Some(replacement) = &finding.replacement_text {
        pdf.text(
            &format!("Replace With: {replacement}"),
            10.0,
            5.0,
            false,
            Some(green()),
        );
    }
    if let Some(reference) = &finding.code_reference {
        pdf.text(&format!("Reference: {reference}"), 10.0, 5.0, false, None);
    }
    pdf.gap(4.0);
}

/// Generate the review report PDF.
pub fn generate_report(
    review_result: &ReviewResult,
    files_reviewed: &[String],
    leed_alerts: &[AlertRecord],
    placeholder_alerts: &[AlertRecord],
    output_path: &Path,
) -> Result<PathBuf, ReportError> {
    let mut pdf = PageWriter::new("M&P Specification Review Report")?;

    // Title and metadata
    pdf.text("M&P Specification Review Report", 16.0, 0.0, true, None);
    pdf.gap(2.0);
    pdf.text(
        &format!(
            "Generated: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M")
        ),
        10.0,
        0.0,
        false,
        None,
    );
    pdf.text(&format!("Model: {}", review_result.model), 10.0, 0.0, false, None);
    pdf.text(
        &format!("Files Reviewed: {}", files_reviewed.len()),
        10.0,
        0.0,
        false,
        None,
    );

    pdf.heading("Files Reviewed", 13.0, None);
    for filename in files_reviewed {
        pdf.text(&format!("- {filename}"), 10.0, 5.0, false, None);
    }

    // Severity-count summary
    pdf.heading("Summary", 13.0, None);
    let counts = review_result.severity_counts();
    let summary_row = Severity::ORDER
        .iter()
        .map(|s| format!("{}: {}", s.label(), review_result.count(*s)))
        .collect::<Vec<_>>()
        .join("    ");
    pdf.text(
        &format!("{summary_row}    TOTAL: {}", counts.total),
        10.0,
        0.0,
        true,
        None,
    );
    pdf.gap(2.0);
    pdf.text(
        &format!(
            "Token Usage: {} input -> {} output",
            review_result.input_tokens, review_result.output_tokens
        ),
        10.0,
        0.0,
        false,
        None,
    );
    pdf.text(
        &format!("Processing Time: {:.1} seconds", review_result.elapsed_seconds),
        10.0,
        0.0,
        false,
        None,
    );

    // Alerts
    if !leed_alerts.is_empty() || !placeholder_alerts.is_empty() {
        pdf.heading("Alerts", 14.0, None);
        alerts_section(
            &mut pdf,
            "LEED References Detected",
            "The following LEED references were found. Since this is not a LEED \
             project, these should be removed:",
            leed_alerts,
        );
        alerts_section(
            &mut pdf,
            "Unresolved Placeholders",
            "The following placeholders need to be resolved:",
            placeholder_alerts,
        );
    }

    // Findings grouped by severity
    pdf.heading("Findings", 14.0, None);
    if review_result.total_count() == 0 {
        pdf.text("No issues found.", 11.0, 0.0, false, Some(green()));
    } else {
        for severity in Severity::ORDER {
            let group: Vec<&Finding> = review_result
                .findings
                .iter()
                .filter(|f| f.severity == severity)
                .collect();
            if group.is_empty() {
                continue;
            }
            pdf.heading(
                &format!("{} ({})", severity.label(), group.len()),
                12.0,
                Some(severity_color(severity)),
            );
            for (i, finding) in group.iter().enumerate() {
                finding_entry(&mut pdf, i + 1, finding);
            }
        }
    }

    pdf.save(output_path)?;
    Ok(output_path.to_path_buf())
}
