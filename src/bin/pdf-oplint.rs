//! PDF Operator Lint CLI tool
//!
//! A command-line tool for listing and validating the operators used in PDF
//! page content streams.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use glob::glob;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use pdf_oplint::pdf::extract_metadata;
use pdf_oplint::{CancellationToken, PageFailure, ScanOptions, Session, ValidationIssue};

/// PDF Operator Lint - inspect and validate PDF content stream operators
#[derive(Parser)]
#[command(name = "pdf-oplint")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # List every operator used in a document
    pdf-oplint list-operators report.pdf

    # Validate the content of page 3 only
    pdf-oplint validate-content -p 3 report.pdf

    # Validate a batch of files in parallel, as JSON
    pdf-oplint validate-content --parallel --json \"out/*.pdf\"

    # Resolve a value through the object graph
    pdf-oplint get report.pdf Root.Pages.Count")]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all of the operators used in page content streams
    ListOperators {
        /// Input PDF files. Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Limit the operator list to one page (1-based)
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        page: Option<u64>,
    },

    /// Check the operands given to each operator against its expected format
    ValidateContent {
        /// Input PDF files. Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Limit validation to one page (1-based)
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        page: Option<u64>,

        /// Print issues as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Process pages in parallel
        #[arg(long)]
        parallel: bool,

        /// Stop scanning new pages after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Print the number of pages in each file
    PageCount {
        /// Input PDF files. Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// Resolve a dotted path such as Root.Pages.Count or Page.0.MediaBox
    Get {
        /// PDF file to inspect
        input: PathBuf,

        /// Path starting at Root or Page.<index> (0-based)
        path: String,
    },

    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let result = match cli.command {
        Commands::ListOperators { inputs, page } => cmd_list_operators(inputs, page),
        Commands::ValidateContent {
            inputs,
            page,
            json,
            parallel,
            timeout_secs,
        } => cmd_validate_content(inputs, page, json, parallel, timeout_secs),
        Commands::PageCount { inputs } => cmd_page_count(inputs),
        Commands::Get { input, path } => cmd_get(input, path).map(|_| true),
        Commands::Info { input } => cmd_info(input).map(|_| true),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(2);
        }
    }
}

/// Expand glob patterns in input paths
fn expand_globs(patterns: Vec<String>) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        // Check if pattern contains glob characters
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched = false;
            for entry in glob(&pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))? {
                match entry {
                    Ok(path) => {
                        paths.push(path);
                        matched = true;
                    }
                    Err(e) => log::warn!("glob error for {}: {}", pattern, e),
                }
            }
            if !matched {
                bail!("No PDF files found matching pattern: {}", pattern);
            }
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }

    // Sort paths for consistent ordering
    paths.sort();

    Ok(paths)
}

fn open_session(path: &Path) -> Result<Session> {
    Session::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

/// Convert the 1-based page flag to a 0-based index
fn page_index(page: Option<u64>) -> Option<usize> {
    page.map(|p| (p - 1) as usize)
}

fn print_failures(failures: &[PageFailure]) {
    for failure in failures {
        eprintln!("Page {}: {}", failure.page_number, failure.error);
    }
}

/// List operators used in each file
fn cmd_list_operators(inputs: Vec<String>, page: Option<u64>) -> Result<bool> {
    let inputs = expand_globs(inputs)?;
    let mut clean = true;

    for path in &inputs {
        let session = open_session(path)?;
        if inputs.len() > 1 {
            println!("File: {}", path.display());
        }
        if page.is_none() {
            println!("Parsing {} pages...", session.page_count()?);
        }

        let report = session.list_operators(page_index(page))?;
        println!(
            "Found {} operators: {}",
            report.operators.len(),
            report.operators.join(", ")
        );

        print_failures(&report.failures);
        clean &= report.failures.is_empty();
    }

    Ok(clean)
}

#[derive(Serialize)]
struct JsonFailure {
    page_number: usize,
    error: String,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    file: &'a Path,
    issues: &'a [ValidationIssue],
    failures: Vec<JsonFailure>,
}

/// Validate content stream instructions in each file
fn cmd_validate_content(
    inputs: Vec<String>,
    page: Option<u64>,
    json: bool,
    parallel: bool,
    timeout_secs: Option<u64>,
) -> Result<bool> {
    let inputs = expand_globs(inputs)?;

    let mut cancel = CancellationToken::new();
    if let Some(secs) = timeout_secs {
        cancel = cancel.with_timeout(Duration::from_secs(secs));
    }
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nShutdown requested. Finishing current pages...");
        handler_token.cancel();
    })
    .context("Error setting Ctrl-C handler")?;

    let options = ScanOptions::default()
        .with_page(page_index(page))
        .with_parallel(parallel)
        .with_cancellation(cancel);

    let mut clean = true;
    let mut json_reports = Vec::new();
    let mut reports = Vec::new();

    for path in &inputs {
        let session = open_session(path)?;
        let report = session.validate_content_with(&options)?;
        clean &= report.is_clean();
        reports.push((path, report));
    }

    for (path, report) in &reports {
        if json {
            json_reports.push(JsonReport {
                file: path,
                issues: &report.issues,
                failures: report
                    .failures
                    .iter()
                    .map(|f| JsonFailure {
                        page_number: f.page_number,
                        error: f.error.to_string(),
                    })
                    .collect(),
            });
            continue;
        }

        if inputs.len() > 1 {
            println!("File: {}", path.display());
        }
        if page.is_none() {
            println!("Parsing {} pages...", report.pages_scanned);
        }
        println!("Found {} issues", report.issues.len());
        if !report.issues.is_empty() {
            print_issue_table(&report.issues);
        }
        print_failures(&report.failures);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&json_reports)?);
    }

    Ok(clean)
}

/// Print issues as an aligned table: page, line, OP, content, msg
fn print_issue_table(issues: &[ValidationIssue]) {
    let rows: Vec<[String; 5]> = issues
        .iter()
        .map(|issue| {
            [
                issue.page_number.to_string(),
                issue.line_number.to_string(),
                issue.operator_name.clone(),
                issue.raw_text.trim().to_string(),
                issue.message.clone().unwrap_or_default(),
            ]
        })
        .collect();

    let headers = ["page", "line", "OP", "content", "msg"];
    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_row = |cells: [&str; 5]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join(" ")
            .trim_end()
            .to_string()
    };

    println!("{}", format_row(headers));
    println!("{}", format_row(widths.map(|w| "─".repeat(w)).each_ref().map(String::as_str)));
    for row in &rows {
        println!("{}", format_row(row.each_ref().map(String::as_str)));
    }
}

/// Print the page count of each file
fn cmd_page_count(inputs: Vec<String>) -> Result<bool> {
    let inputs = expand_globs(inputs)?;

    for path in &inputs {
        let session = open_session(path)?;
        let count = session.page_count()?;
        if inputs.len() > 1 {
            println!("{}: {}", path.display(), count);
        } else {
            println!("{}", count);
        }
    }

    Ok(true)
}

/// Resolve a path through the object graph
fn cmd_get(input: PathBuf, path: String) -> Result<()> {
    let session = open_session(&input)?;
    let value = session.get(&path)?;
    println!("{:?}", value);
    Ok(())
}

/// Show information about a PDF
fn cmd_info(input: PathBuf) -> Result<()> {
    let session = open_session(&input)?;
    let metadata = extract_metadata(session.store())?;

    println!("File: {}", input.display());
    println!("Pages: {}", metadata.page_count);
    if metadata.reachable_pages != metadata.page_count {
        println!("Reachable pages: {}", metadata.reachable_pages);
    }
    println!("Objects: {}", metadata.xref_size);
    if metadata.encrypted {
        println!("Encrypted: yes");
    }

    if let Some(title) = metadata.title {
        println!("Title: {}", title);
    }
    if let Some(author) = metadata.author {
        println!("Author: {}", author);
    }

    Ok(())
}
