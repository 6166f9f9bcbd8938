//! Placeholder audit.
//!
//! Lists generated handle symbols that are declared but never executed or
//! iterated. Such a symbol usually means a rewrite wrapped a statement whose
//! result was discarded, which is worth a human look. Read-only.

use std::collections::BTreeSet;
use std::path::Path;

use regex::Regex;
use serde::Serialize;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::files;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnusedPlaceholder {
    pub symbol: String,
    /// 1-indexed line of the first declaration.
    pub line: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilePlaceholders {
    pub file: String,
    pub declared: usize,
    pub unused: Vec<UnusedPlaceholder>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceholderReport {
    pub root: String,
    pub prefix: String,
    pub files_scanned: usize,
    pub placeholders_declared: usize,
    pub placeholders_unused: usize,
    pub files: Vec<FilePlaceholders>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unreadable: Vec<String>,
}

fn declaration_regex(prefix: &str) -> Result<Regex> {
    Regex::new(&format!(r"\s({}\d+)\s", regex::escape(prefix)))
        .map_err(|e| Error::internal_unexpected(format!("placeholder pattern: {}", e)))
}

/// Declared placeholder symbols in `content`, first occurrence first.
fn declared_placeholders(content: &str, re: &Regex) -> Vec<(String, usize)> {
    let mut seen = BTreeSet::new();
    let mut declared = Vec::new();
    for caps in re.captures_iter(content) {
        let Some(symbol) = caps.get(1) else {
            continue;
        };
        if seen.insert(symbol.as_str().to_string()) {
            let line = content[..symbol.start()].matches('\n').count() + 1;
            declared.push((symbol.as_str().to_string(), line));
        }
    }
    declared
}

fn is_used(content: &str, symbol: &str) -> Result<bool> {
    let re = Regex::new(&format!(r"\b{}\.(?:exe|next)", regex::escape(symbol)))
        .map_err(|e| Error::internal_unexpected(format!("placeholder use pattern: {}", e)))?;
    Ok(re.is_match(content))
}

/// Placeholders with `prefix` that are never `.exe…`-cuted or `.next()`-ed.
pub fn find_unused_placeholders(content: &str, prefix: &str) -> Result<Vec<UnusedPlaceholder>> {
    let re = declaration_regex(prefix)?;
    let mut unused = Vec::new();
    for (symbol, line) in declared_placeholders(content, &re) {
        if !is_used(content, &symbol)? {
            unused.push(UnusedPlaceholder { symbol, line });
        }
    }
    Ok(unused)
}

/// Audit every matching file under `root`.
pub fn audit_path(root: &Path, settings: &Settings) -> Result<PlaceholderReport> {
    settings.validate()?;
    let prefix = settings.handle_prefix.as_str();
    let re = declaration_regex(prefix)?;
    let paths = files::collect_source_files(root, settings.extension())?;

    let mut report = PlaceholderReport {
        root: root.display().to_string(),
        prefix: prefix.to_string(),
        files_scanned: paths.len(),
        placeholders_declared: 0,
        placeholders_unused: 0,
        files: Vec::new(),
        unreadable: Vec::new(),
    };

    for path in &paths {
        let file = files::relative_display(path, root);
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log_status!("audit", "Skipping {}: {}", file, e);
                report.unreadable.push(file);
                continue;
            }
        };

        let declared = declared_placeholders(&content, &re).len();
        if declared == 0 {
            continue;
        }
        let unused = find_unused_placeholders(&content, prefix)?;
        for placeholder in &unused {
            log_status!("audit", "{}:{} `{}` is never used", file, placeholder.line, placeholder.symbol);
        }

        report.placeholders_declared += declared;
        report.placeholders_unused += unused.len();
        report.files.push(FilePlaceholders {
            file,
            declared,
            unused,
        });
    }

    Ok(report)
}
