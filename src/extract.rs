//! DOCX text extraction.
//!
//! A `.docx` file is a zip archive; all visible body text lives in
//! `word/document.xml`. We flatten paragraphs and table rows into plain
//! text: one block per paragraph, table rows rendered as their cell texts
//! joined with `" | "` after the paragraph blocks, blank blocks dropped.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Not a .docx file: {0}")]
    NotDocx(String),

    #[error("Invalid or corrupted .docx file: {0}")]
    InvalidArchive(String),

    #[error("Malformed document XML: {0}")]
    Xml(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Container for extracted specification content.
#[derive(Debug, Clone)]
pub struct ExtractedSpec {
    pub filename: String,
    pub content: String,
    pub word_count: usize,
}

/// Extract text content from a `.docx` file.
pub fn extract_text_from_docx(path: &Path) -> Result<ExtractedSpec, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::NotFound(path.display().to_string()));
    }
    let is_docx = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("docx"))
        .unwrap_or(false);
    if !is_docx {
        return Err(ExtractError::NotDocx(path.display().to_string()));
    }

    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| ExtractError::InvalidArchive(e.to_string()))?;
    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::InvalidArchive(e.to_string()))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;

    let (paragraphs, table_rows) = parse_document_xml(&xml)?;

    let content = paragraphs
        .into_iter()
        .chain(table_rows)
        .collect::<Vec<_>>()
        .join("\n\n");
    let word_count = content.split_whitespace().count();

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(ExtractedSpec {
        filename,
        content,
        word_count,
    })
}

/// Walk the OOXML body. Paragraph text outside tables becomes one block per
/// `<w:p>`; inside a table, paragraphs accumulate into the enclosing
/// `<w:tc>` cell and each `<w:tr>` row becomes one `" | "`-joined block.
fn parse_document_xml(xml: &str) -> Result<(Vec<String>, Vec<String>), ExtractError> {
    let mut reader = Reader::from_str(xml);

    let mut paragraphs: Vec<String> = Vec::new();
    let mut table_rows: Vec<String> = Vec::new();

    let mut table_depth = 0usize;
    let mut in_para = false;
    let mut para_buf = String::new();
    let mut cell_buf = String::new();
    let mut row_cells: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:tbl" => table_depth += 1,
                b"w:tr" if table_depth > 0 => row_cells.clear(),
                b"w:tc" if table_depth > 0 => cell_buf.clear(),
                b"w:p" => {
                    in_para = true;
                    para_buf.clear();
                }
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:tbl" => table_depth = table_depth.saturating_sub(1),
                b"w:p" => {
                    in_para = false;
                    let text = para_buf.trim();
                    if !text.is_empty() {
                        if table_depth > 0 {
                            if !cell_buf.is_empty() {
                                cell_buf.push(' ');
                            }
                            cell_buf.push_str(text);
                        } else {
                            paragraphs.push(text.to_string());
                        }
                    }
                }
                b"w:tc" if table_depth > 0 => {
                    let text = cell_buf.trim();
                    if !text.is_empty() {
                        row_cells.push(text.to_string());
                    }
                }
                b"w:tr" if table_depth > 0 => {
                    if !row_cells.is_empty() {
                        table_rows.push(row_cells.join(" | "));
                        row_cells.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if in_para {
                    let text = t
                        .unescape()
                        .map_err(|e| ExtractError::Xml(e.to_string()))?;
                    para_buf.push_str(&text);
                }
            }
            Ok(Event::Empty(e)) => {
                if in_para {
                    match e.name().as_ref() {
                        b"w:tab" | b"w:br" => para_buf.push(' '),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Xml(e.to_string())),
            Ok(_) => {}
        }
    }

    Ok((paragraphs, table_rows))
}
