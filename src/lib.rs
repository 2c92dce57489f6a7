//! Automated mechanical/plumbing specification review for California K-12
//! (DSA) construction projects.
//!
//! The library is the whole product: front-ends call
//! [`pipeline::run_review`] and render the returned
//! [`pipeline::PipelineOutputs`]. One run extracts text from every `.docx`
//! in the input directory, scans for LEED references and unresolved
//! placeholders, checks the token budget, sends the combined text to the
//! review model, and writes the report plus audit artifacts into a fresh
//! timestamped run directory.

pub mod config;
pub mod extract;
pub mod pipeline;
pub mod report;

pub use config::ApiKey;
pub use extract::{extract_text_from_docx, ExtractError, ExtractedSpec};
pub use pipeline::{run_review, PipelineError, PipelineOutputs, RunHooks, RunOptions};
