pub mod client;
pub mod detect;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod reviewer;
pub mod tokens;
pub mod types;

pub use client::*;
pub use detect::*;
pub use orchestrator::*;
pub use parser::*;
pub use prompt::*;
pub use reviewer::*;
pub use tokens::*;
pub use types::*;

use std::path::PathBuf;

use thiserror::Error;

use crate::report::ReportError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No .docx files found in: {0}")]
    NoInputFiles(PathBuf),

    #[error("All {failed} input file(s) failed extraction; first error: {first}")]
    AllExtractionsFailed { failed: usize, first: String },

    #[error(
        "Token limit exceeded: {total} > {limit} tokens. Split the input specs and re-run."
    )]
    TokenBudgetExceeded { total: usize, limit: usize },

    #[error("Review invocation failed: {0}")]
    Invocation(String),

    #[error("Report generation failed: {0}")]
    Report(#[from] ReportError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
