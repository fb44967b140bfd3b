//! PDF Operator Lint Library
//!
//! Inspects PDF documents at the object level and lints the instructions in
//! page content streams. This library provides functionality to:
//! - Resolve indirect references safely, including cyclic object graphs
//! - Walk the page tree with inherited page attributes
//! - Extract and concatenate page content streams
//! - Tokenize content into line-oriented instructions
//! - Validate each instruction against a per-operator grammar
//!
//! # Example
//!
//! ```no_run
//! use pdf_oplint::Session;
//! use std::path::Path;
//!
//! let session = Session::open(Path::new("report.pdf")).expect("Failed to open PDF");
//!
//! let operators = session.list_operators(None).expect("Failed to list operators");
//! println!("Operators: {}", operators.operators.join(", "));
//!
//! let report = session.validate_content(None).expect("Failed to validate");
//! for issue in &report.issues {
//!     println!("page {} line {}: {}", issue.page_number, issue.line_number, issue.raw_text);
//! }
//! ```

pub mod error;
pub mod grammar;
pub mod pdf;
pub mod scan;
pub mod tokenize;

// Re-export commonly used items
pub use error::{Error, Result};
pub use grammar::{validate, Grammar, IssueKind, ValidationIssue};
pub use lopdf::{Dictionary, Object, Stream};
pub use scan::{CancellationToken, OperatorReport, PageFailure, ScanOptions, Session, ValidationReport};
pub use tokenize::{tokenize, Instruction};
