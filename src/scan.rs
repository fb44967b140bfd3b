//! Document sessions and page-by-page scans
//!
//! A [`Session`] is the explicit per-document context: every operation
//! borrows its object store. Scans process pages independently, optionally
//! in parallel, and keep results in page order. A structural failure on one
//! page is recorded and the remaining pages are still scanned.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lopdf::Object;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::grammar::{validate, ValidationIssue};
use crate::pdf::content::get_content_bytes;
use crate::pdf::pages::{self, PageNode};
use crate::pdf::resolve::{follow_path, parse_path, PathSegment};
use crate::pdf::store::{DocumentStore, ObjectStore};
use crate::tokenize::{tokenize, Instruction};

/// Cooperative cancellation, checked before each page is processed
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop once `timeout` has elapsed from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Request cancellation; visible to every clone of this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Options for scanning a document
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Restrict the scan to one page (zero-based); all pages when `None`
    pub page_index: Option<usize>,
    /// Process pages on the rayon thread pool
    pub parallel: bool,
    /// Checked before each page
    pub cancel: CancellationToken,
}

impl ScanOptions {
    pub fn with_page(mut self, page_index: Option<usize>) -> Self {
        self.page_index = page_index;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A page that could not be processed
#[derive(Debug)]
pub struct PageFailure {
    /// One-based page number
    pub page_number: usize,
    pub error: Error,
}

/// Result of [`Session::validate_content`]
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Number of pages the scan covered
    pub pages_scanned: usize,
    /// Findings in page-then-line order
    pub issues: Vec<ValidationIssue>,
    /// Pages that failed structurally, in page order
    pub failures: Vec<PageFailure>,
}

impl ValidationReport {
    /// No issues and no failed pages
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.failures.is_empty()
    }
}

/// Result of [`Session::list_operators`]
#[derive(Debug, Default)]
pub struct OperatorReport {
    /// Distinct operator names, sorted by byte value (uppercase first)
    pub operators: Vec<String>,
    /// Pages that failed structurally, in page order
    pub failures: Vec<PageFailure>,
}

/// Per-document processing context
pub struct Session<S: ObjectStore = DocumentStore> {
    store: S,
}

impl Session<DocumentStore> {
    /// Open a PDF file
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(DocumentStore::load(path)?))
    }

    /// Parse a PDF held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(DocumentStore::load_mem(bytes)?))
    }
}

impl<S: ObjectStore> Session<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of pages declared by the page tree root
    pub fn page_count(&self) -> Result<usize> {
        pages::page_count(&self.store)
    }

    /// The page at `index` (zero-based) with inherited attributes resolved
    pub fn page(&self, index: usize) -> Result<PageNode> {
        pages::get_page(&self.store, index)
    }

    /// Decoded content of the page at `index`
    pub fn content(&self, index: usize) -> Result<Vec<u8>> {
        get_content_bytes(&self.store, &self.page(index)?)
    }

    /// Instructions of the page at `index`
    pub fn instructions(&self, index: usize) -> Result<Vec<Instruction>> {
        let page = self.page(index)?;
        let content = get_content_bytes(&self.store, &page)?;
        Ok(tokenize(&content, page.number()).collect())
    }

    /// Resolve a dotted path from `Root` or `Page.<index>`
    ///
    /// `Root.Pages.Count` walks from the catalog; `Page.0.MediaBox` walks
    /// from the first page's dictionary with inherited attributes merged in.
    pub fn get(&self, path: &str) -> Result<Arc<Object>> {
        let segments = parse_path(path);
        let not_found = |segment: &str| Error::PathNotFound {
            path: path.to_string(),
            segment: segment.to_string(),
        };

        match segments.as_slice() {
            [PathSegment::Key(anchor), rest @ ..] if anchor == "Root" => {
                let root = Object::Reference(self.store.trailer().root.into());
                follow_path(&self.store, &root, rest)
            }
            [PathSegment::Key(anchor), PathSegment::Index(index), rest @ ..] if anchor == "Page" => {
                let page = self.page(*index)?;
                follow_path(&self.store, &Object::Dictionary(page.effective_dictionary()), rest)
            }
            [first, ..] => Err(not_found(&first.to_string())),
            [] => Err(not_found("")),
        }
    }

    /// Distinct operators used on one page or on all pages
    pub fn list_operators(&self, page_index: Option<usize>) -> Result<OperatorReport> {
        self.list_operators_with(&ScanOptions::default().with_page(page_index))
    }

    pub fn list_operators_with(&self, options: &ScanOptions) -> Result<OperatorReport> {
        let results = self.scan_pages(options, |page, content| {
            tokenize(content, page.number())
                .map(|instruction| instruction.operator_name)
                .collect::<Vec<_>>()
        })?;

        let mut operators = BTreeSet::new();
        let mut failures = Vec::new();
        for (page_number, result) in results {
            match result {
                Ok(names) => operators.extend(names),
                Err(error) => failures.push(PageFailure { page_number, error }),
            }
        }

        Ok(OperatorReport {
            operators: operators.into_iter().collect(),
            failures,
        })
    }

    /// Validation issues for one page or for all pages
    pub fn validate_content(&self, page_index: Option<usize>) -> Result<ValidationReport> {
        self.validate_content_with(&ScanOptions::default().with_page(page_index))
    }

    pub fn validate_content_with(&self, options: &ScanOptions) -> Result<ValidationReport> {
        let results = self.scan_pages(options, |page, content| {
            tokenize(content, page.number())
                .filter_map(|instruction| validate(&instruction))
                .collect::<Vec<_>>()
        })?;

        let mut report = ValidationReport {
            pages_scanned: results.len(),
            ..ValidationReport::default()
        };
        for (page_number, result) in results {
            match result {
                Ok(issues) => report.issues.extend(issues),
                Err(error) => report.failures.push(PageFailure { page_number, error }),
            }
        }

        Ok(report)
    }

    /// Run `process` over the decoded content of each selected page
    ///
    /// The page tree is walked once up front; pages are then decoded and
    /// processed independently. Returns one-based page numbers with their
    /// per-page outcomes, in page order whether or not pages ran in parallel.
    /// Only document-level failures (such as an unreadable page count) are
    /// returned as `Err`.
    fn scan_pages<T, F>(&self, options: &ScanOptions, process: F) -> Result<Vec<(usize, Result<T>)>>
    where
        T: Send,
        F: Fn(&PageNode, &[u8]) -> T + Sync,
    {
        let count = self.page_count()?;
        let selected: Vec<(usize, Result<PageNode>)> = match options.page_index {
            Some(index) if index >= count => {
                return Err(Error::PageIndexOutOfRange { index, count })
            }
            Some(index) => vec![(index, pages::get_page(&self.store, index))],
            None => pages::collect_pages(&self.store, count)
                .into_iter()
                .enumerate()
                .collect(),
        };
        log::debug!("Scanning {} of {} pages", selected.len(), count);

        let run = |page: Result<PageNode>| -> Result<T> {
            options.cancel.check()?;
            let page = page?;
            let content = get_content_bytes(&self.store, &page)?;
            Ok(process(&page, &content))
        };
        let run_page = |(index, page): (usize, Result<PageNode>)| {
            let result = run(page);
            if let Err(error) = &result {
                log::warn!("Page {} failed: {}", index + 1, error);
            }
            (index + 1, result)
        };

        Ok(if options.parallel {
            selected.into_par_iter().map(run_page).collect()
        } else {
            selected.into_iter().map(run_page).collect()
        })
    }
}
