//! CLI front-end. All review logic lives in the library; this binary
//! parses arguments, resolves the API credential, and renders progress
//! and summaries.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use specreview::config::{self, ApiKey};
use specreview::pipeline::{
    analyze_token_usage, eligible_docx_files, format_token_summary, run_review,
    AnthropicClient, PipelineOutputs, Reviewer, RunHooks, RunOptions, Severity, SYSTEM_PROMPT,
};
use specreview::extract::extract_text_from_docx;

#[derive(Parser)]
#[command(name = "specreview")]
#[command(about = "M&P specification review for California K-12 (DSA) projects")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show detailed processing information
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Review all .docx specifications in a directory
    Review(ReviewArgs),

    /// Estimate token usage for a directory without calling the API
    Tokens(TokensArgs),
}

#[derive(Args)]
struct ReviewArgs {
    /// Directory containing .docx specification files
    #[arg(short, long)]
    input_dir: PathBuf,

    /// Output directory for review results
    #[arg(short, long, default_value = "./output")]
    output_dir: PathBuf,

    /// Process files but do not call the API
    #[arg(long)]
    dry_run: bool,

    /// API key (falls back to the ANTHROPIC_API_KEY environment variable)
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Args)]
struct TokensArgs {
    /// Directory containing .docx specification files
    #[arg(short, long)]
    input_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    match cli.command {
        Commands::Review(args) => cmd_review(args, cli.verbose),
        Commands::Tokens(args) => cmd_tokens(args),
    }
}

fn print_header() {
    println!(
        "{}  {}",
        style("MEP SPEC REVIEW").cyan().bold(),
        style(format!("v{}", config::APP_VERSION)).dim()
    );
    println!(
        "{}",
        style(format!("Model: {} (single-model)", config::REVIEW_MODEL)).dim()
    );
    println!();
}

fn cmd_review(args: ReviewArgs, verbose: bool) -> Result<()> {
    print_header();

    let api_key = match args.api_key {
        Some(key) => ApiKey::new(key),
        // Dry runs never reach the API; an empty key satisfies the client
        // constructor without weakening the live-run requirement.
        None if args.dry_run => ApiKey::new(String::new()),
        None => bail!(
            "No API key provided. Pass --api-key or set ANTHROPIC_API_KEY."
        ),
    };

    let reviewer = Reviewer::new(Box::new(AnthropicClient::new(api_key)));
    let opts = RunOptions {
        input_dir: args.input_dir,
        output_dir: args.output_dir,
        dry_run: args.dry_run,
        verbose,
    };

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .context("invalid progress template")?,
    );

    let on_progress = |percent: f32, message: &str| {
        bar.set_position(percent.round() as u64);
        bar.set_message(message.to_string());
    };
    let on_log = |message: &str| {
        bar.println(message);
    };
    let hooks = RunHooks {
        on_log: Some(&on_log),
        on_progress: Some(&on_progress),
        cancel: None,
    };

    let outputs = match run_review(&reviewer, &opts, &hooks) {
        Ok(outputs) => {
            bar.finish_and_clear();
            outputs
        }
        Err(e) => {
            bar.finish_and_clear();
            return Err(e).context("review run failed");
        }
    };

    print_outputs(&outputs);
    Ok(())
}

fn print_outputs(outputs: &PipelineOutputs) {
    for warning in &outputs.extraction_warnings {
        println!("{} {}", style("Skipped:").yellow().bold(), warning);
    }

    if outputs.leed_alert_count > 0 || outputs.placeholder_alert_count > 0 {
        println!("{}", style("Alerts (not sent to the model):").yellow().bold());
        println!("  LEED references  {}", outputs.leed_alert_count);
        println!("  Placeholders     {}", outputs.placeholder_alert_count);
        println!();
    }

    match &outputs.review_result {
        Some(result) => {
            println!(
                "{} ({:.1}s)",
                style("Review complete!").green().bold(),
                result.elapsed_seconds
            );
            if result.input_tokens > 0 || result.output_tokens > 0 {
                println!(
                    "{}",
                    style(format!(
                        "Tokens: {} in -> {} out",
                        result.input_tokens, result.output_tokens
                    ))
                    .dim()
                );
            }
            println!();
            println!("{}", style("Findings Summary:").bold());
            for severity in Severity::ORDER {
                println!("  {:<13} {}", severity.label(), result.count(severity));
            }
            println!("  {:<13} {}", "TOTAL", result.total_count());
        }
        None => println!("{}", style("Dry run complete.").cyan()),
    }
    println!();
    println!(
        "{}",
        style(format!("Outputs written to: {}", outputs.run_dir.display())).dim()
    );
}

fn cmd_tokens(args: TokensArgs) -> Result<()> {
    print_header();

    let files = eligible_docx_files(&args.input_dir)?;
    println!("Analyzing {} file(s)...", files.len());

    let mut contents: Vec<(String, String)> = Vec::new();
    for path in &files {
        match extract_text_from_docx(path) {
            Ok(spec) => contents.push((spec.filename, spec.content)),
            Err(e) => println!(
                "{} {}: {e}",
                style("Skipped:").yellow().bold(),
                path.display()
            ),
        }
    }
    if contents.is_empty() {
        bail!("none of the input files could be extracted");
    }

    let summary = analyze_token_usage(&contents, SYSTEM_PROMPT);
    println!();
    println!("{}", format_token_summary(&summary));
    Ok(())
}
