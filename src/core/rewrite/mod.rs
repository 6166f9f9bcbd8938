//! Resource-closing rewriter.
//!
//! Finds JDBC-style handle declarations that are never closed deterministically
//! and moves them into `try (...)` blocks. Works by:
//!
//! 1. Snapshotting every declaration of each handle category in a file
//! 2. Extracting the rest of the enclosing block with a comment-aware brace scanner
//! 3. Rebuilding the declaration as a resource header with a fresh symbol
//! 4. Renaming references inside the extracted block and splicing the result back
//! 5. Wrapping `createStatement()` calls chained inside existing `try (...)` headers
//!
//! Anything ambiguous is skipped and reported, never guessed.

mod driver;
mod patterns;
mod rename;
mod repair;
mod scope;
mod synth;

use std::fmt;
use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;

pub use rename::find_references;

use patterns::DeclarationPatterns;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::files;

/// Helper for `skip_serializing_if` on zero-value usize fields.
fn is_zero(v: &usize) -> bool {
    *v == 0
}

// ============================================================================
// Types
// ============================================================================

/// The handle categories that get rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    /// Result-cursor handles (`ResultSet`).
    Cursor,
    /// Prepared-query handles (`PreparedStatement`).
    Query,
}

impl HandleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleKind::Cursor => "cursor",
            HandleKind::Query => "query",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single occurrence was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The declaration has no code-level `;` before its block closes.
    NoInitializerMatch,
    /// The block returns the handle or a call chained off it.
    ReturnsHandle,
    /// The handle is assigned again inside its own block.
    Reassigned,
    /// Block comments inside the block do not balance.
    UnbalancedComment,
    /// The enclosing block never closes.
    UnterminatedScope,
    /// The initializer is not a single call a resource header can hold.
    SynthesisMismatch,
    /// Every numbered name for the handle prefix is already taken.
    NameExhausted,
}

impl SkipReason {
    pub fn describe(&self) -> &'static str {
        match self {
            SkipReason::NoInitializerMatch => "declaration has no terminated initializer",
            SkipReason::ReturnsHandle => "handle is returned from its block",
            SkipReason::Reassigned => "handle is reassigned inside its block",
            SkipReason::UnbalancedComment => "malformed comment nesting",
            SkipReason::UnterminatedScope => "enclosing block never closes",
            SkipReason::SynthesisMismatch => "initializer is not a single call expression",
            SkipReason::NameExhausted => "no fresh symbol name left for this prefix",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Found vs rewritten declarations of one category in one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub found: usize,
    pub rewritten: usize,
}

/// Outcome of the loose-statement repair pass for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairSummary {
    pub found: usize,
    pub repaired: usize,
    /// Why the pass stopped early, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A declaration that was detected but not rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedOccurrence {
    pub category: HandleKind,
    pub symbol: String,
    /// 1-indexed line in the original file.
    pub line: usize,
    pub reason: SkipReason,
}

/// A call chain that creates a statement without keeping it. Report only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakWarning {
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Io,
    Unexpected,
}

/// Text windows around the occurrence that was being processed when a file failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureContext {
    /// Window from the content as it was when the failure happened.
    pub found: String,
    /// Window from the file as it was read.
    pub original: String,
}

/// A failure that abandoned a whole file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<FailureContext>,
}

impl FileFailure {
    pub fn io(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Io,
            message: message.into(),
            context: None,
        }
    }

    pub fn unexpected(message: impl Into<String>, context: Option<FailureContext>) -> Self {
        Self {
            kind: FailureKind::Unexpected,
            message: message.into(),
            context,
        }
    }
}

/// Result of rewriting one source text in memory.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    /// Rewritten text. Equal to the input when nothing applied or the file failed.
    pub content: String,
    pub cursors: CategoryCounts,
    pub queries: CategoryCounts,
    pub statements: RepairSummary,
    pub skipped: Vec<SkippedOccurrence>,
    pub possible_leaks: Vec<LeakWarning>,
    pub failure: Option<FileFailure>,
    /// Extraction steps, recorded only in verbose mode.
    pub trace: Vec<String>,
}

impl RewriteOutcome {
    /// Whether the content should be persisted.
    pub fn changed(&self) -> bool {
        self.failure.is_none()
            && (self.cursors.rewritten + self.queries.rewritten + self.statements.repaired) > 0
    }
}

/// Per-file entry in the run report.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    /// File path relative to the scanned root.
    pub file: String,
    pub cursors: CategoryCounts,
    pub queries: CategoryCounts,
    pub statements: RepairSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedOccurrence>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub possible_leaks: Vec<LeakWarning>,
    /// Whether any rewrite or repair applied.
    pub changed: bool,
    /// Whether the new content was written to disk.
    pub written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FileFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

impl FileReport {
    fn from_outcome(file: String, outcome: RewriteOutcome) -> Self {
        Self {
            file,
            changed: outcome.changed(),
            cursors: outcome.cursors,
            queries: outcome.queries,
            statements: outcome.statements,
            skipped: outcome.skipped,
            possible_leaks: outcome.possible_leaks,
            written: false,
            failure: outcome.failure,
            trace: outcome.trace,
        }
    }

    fn failed(file: String, failure: FileFailure) -> Self {
        Self {
            file,
            cursors: CategoryCounts::default(),
            queries: CategoryCounts::default(),
            statements: RepairSummary::default(),
            skipped: Vec::new(),
            possible_leaks: Vec::new(),
            changed: false,
            written: false,
            failure: Some(failure),
            trace: Vec::new(),
        }
    }

    /// Whether the file has anything worth listing in the run report.
    pub fn is_notable(&self) -> bool {
        self.cursors.found > 0
            || self.queries.found > 0
            || self.statements.found > 0
            || !self.possible_leaks.is_empty()
            || self.failure.is_some()
    }
}

/// Aggregate counts for a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub files_scanned: usize,
    pub files_changed: usize,
    pub files_written: usize,
    pub cursors_found: usize,
    pub cursors_rewritten: usize,
    pub queries_found: usize,
    pub queries_rewritten: usize,
    pub statements_repaired: usize,
    pub occurrences_skipped: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub possible_leaks: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub io_failures: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub unexpected_failures: usize,
}

/// Complete result of rewriting a source tree.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub root: String,
    pub dry_run: bool,
    pub summary: RunSummary,
    pub files: Vec<FileReport>,
}

impl RunReport {
    fn from_reports(root: &Path, dry_run: bool, reports: Vec<FileReport>) -> Self {
        let mut summary = RunSummary {
            files_scanned: reports.len(),
            ..RunSummary::default()
        };

        for report in &reports {
            summary.files_changed += usize::from(report.changed);
            summary.files_written += usize::from(report.written);
            summary.cursors_found += report.cursors.found;
            summary.cursors_rewritten += report.cursors.rewritten;
            summary.queries_found += report.queries.found;
            summary.queries_rewritten += report.queries.rewritten;
            summary.statements_repaired += report.statements.repaired;
            summary.occurrences_skipped += report.skipped.len();
            summary.possible_leaks += report.possible_leaks.len();
            match report.failure.as_ref().map(|f| f.kind) {
                Some(FailureKind::Io) => summary.io_failures += 1,
                Some(FailureKind::Unexpected) => summary.unexpected_failures += 1,
                None => {}
            }
        }

        RunReport {
            root: root.display().to_string(),
            dry_run,
            summary,
            files: reports.into_iter().filter(FileReport::is_notable).collect(),
        }
    }

    /// Process exit code: 3 if any file hit an I/O failure, 1 if any hit an
    /// unexpected failure, 0 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.summary.io_failures > 0 {
            3
        } else if self.summary.unexpected_failures > 0 {
            1
        } else {
            0
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Compiled rewriter for one set of settings. Shared read-only across workers.
#[derive(Debug, Clone)]
pub struct Rewriter {
    settings: Settings,
    patterns: DeclarationPatterns,
}

impl Rewriter {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let patterns = DeclarationPatterns::new(&settings)?;
        Ok(Self { settings, patterns })
    }

    /// Rewrite one source text in memory.
    pub fn rewrite_source(&self, content: &str) -> RewriteOutcome {
        driver::rewrite_content(content, &self.patterns, &self.settings)
    }

    /// Read, rewrite and (unless dry-run) persist one file.
    ///
    /// The file is written whole, and only when at least one rewrite or
    /// repair applied.
    pub fn rewrite_file(&self, path: &Path, root: &Path) -> FileReport {
        let file = files::relative_display(path, root);

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => return FileReport::failed(file, FileFailure::io(format!("read: {}", e))),
        };

        let outcome = self.rewrite_source(&content);
        let changed = outcome.changed();
        let new_content = if changed && !self.settings.dry_run {
            Some(outcome.content.clone())
        } else {
            None
        };

        let mut report = FileReport::from_outcome(file, outcome);
        if let Some(new_content) = new_content {
            match std::fs::write(path, new_content) {
                Ok(()) => report.written = true,
                Err(e) => report.failure = Some(FileFailure::io(format!("write: {}", e))),
            }
        }
        report
    }
}

/// Rewrite every matching file under `root` on a bounded worker pool.
///
/// Workers return reports; all logging happens here, in file order, after the
/// pool finishes.
pub fn rewrite_path(root: &Path, settings: &Settings) -> Result<RunReport> {
    let rewriter = Rewriter::new(settings.clone())?;
    let files = files::collect_source_files(root, settings.extension())?;

    log_status!(
        "rewrite",
        "Scanning {} .{} file(s) under {}",
        files.len(),
        settings.extension(),
        root.display()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.threads)
        .build()
        .map_err(|e| Error::internal_unexpected(format!("build worker pool: {}", e)))?;

    let reports: Vec<FileReport> = pool.install(|| {
        files
            .par_iter()
            .map(|path| rewriter.rewrite_file(path, root))
            .collect()
    });

    for report in &reports {
        log_file_report(report);
    }

    let run = RunReport::from_reports(root, settings.dry_run, reports);

    log_status!(
        "rewrite",
        "Complete: {} file(s) changed, {} cursor(s) and {} quer(ies) rewritten, {} statement(s) repaired, {} skipped",
        run.summary.files_changed,
        run.summary.cursors_rewritten,
        run.summary.queries_rewritten,
        run.summary.statements_repaired,
        run.summary.occurrences_skipped
    );

    Ok(run)
}

fn log_file_report(report: &FileReport) {
    for leak in &report.possible_leaks {
        log_status!(
            "leak",
            "{}:{} possibly non-closed resource: {}",
            report.file,
            leak.line,
            leak.text
        );
    }

    for skip in &report.skipped {
        log_status!(
            "skip",
            "{}:{} {} `{}`: {}",
            report.file,
            skip.line,
            skip.category,
            skip.symbol,
            skip.reason
        );
    }

    if let Some(error) = &report.statements.error {
        log_status!("repair", "{}: loose statement repair stopped: {}", report.file, error);
    }

    if report.changed {
        log_status!(
            "rewrite",
            "{}: cursors {}/{}, queries {}/{}, statements {}/{} (rewritten/found)",
            report.file,
            report.cursors.rewritten,
            report.cursors.found,
            report.queries.rewritten,
            report.queries.found,
            report.statements.repaired,
            report.statements.found
        );
    }

    if let Some(failure) = &report.failure {
        log_status!("error", "{}: {}", report.file, failure.message);
        if let Some(context) = &failure.context {
            log_status!("error", "Found:\n{}", context.found);
            log_status!("error", "Original:\n{}", context.original);
        }
    }

    for line in &report.trace {
        log_status!("trace", "{}: {}", report.file, line);
    }
}

// ============================================================================
// Tests
// ============================================================================
