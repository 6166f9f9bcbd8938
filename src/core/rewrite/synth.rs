//! Statement synthesizer: builds the resource header for a `try (...)` block.
//!
//! Prepared queries are rebuilt from their call expression and argument list;
//! result cursors pass their initializer through unchanged. Either way the
//! initializer must be a single expression ending in a call, or the
//! occurrence is skipped.

use std::sync::OnceLock;

use regex::Regex;

use super::patterns::Occurrence;
use super::scope::{Lexer, Region};
use super::{HandleKind, SkipReason};

fn comment_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*//.*\n?").unwrap())
}

/// `<call>(<args>[, <...KEYS>])` with nothing after the closing paren.
fn query_initializer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*([^;(]*?)\s*\(\s*(.*?)\s*(?:,\s*([\w.]*KEYS)\s*)?\)\s*$").unwrap()
    })
}

/// Build `<DeclaredType> <name> = <initializer>` for the occurrence.
///
/// The header keeps the original symbol name; the rename engine rewrites it
/// together with the scope body.
pub fn synthesize_header(occurrence: &Occurrence) -> Result<String, SkipReason> {
    let initializer = occurrence
        .initializer
        .as_deref()
        .ok_or(SkipReason::NoInitializerMatch)?;
    let initializer = strip_comment_lines(initializer);
    if !is_single_call(&initializer) {
        return Err(SkipReason::SynthesisMismatch);
    }
    let rebuilt = match occurrence.kind {
        HandleKind::Query => rebuild_query_call(&initializer)?,
        HandleKind::Cursor => pass_through_cursor(&initializer),
    };

    Ok(format!(
        "{} {} = {}",
        occurrence.declared_type.trim(),
        occurrence.name,
        rebuilt
    ))
}

fn strip_comment_lines(text: &str) -> String {
    comment_line_re().replace_all(text, "").into_owned()
}

/// True when `expr` is one expression whose last token closes a call.
///
/// Brackets must balance in code regions, no comma may sit at the top level
/// and the final non-blank character must be a code `)`.
fn is_single_call(expr: &str) -> bool {
    let mut depth: i64 = 0;
    let mut ends_in_call = false;
    for (_, c, region) in Lexer::new(expr) {
        if c.is_whitespace() {
            continue;
        }
        ends_in_call = region == Region::Code && c == ')';
        if region != Region::Code {
            continue;
        }
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            ',' if depth == 0 => return false,
            _ => {}
        }
    }
    depth == 0 && ends_in_call
}

fn rebuild_query_call(initializer: &str) -> Result<String, SkipReason> {
    let caps = query_initializer_re()
        .captures(initializer)
        .ok_or(SkipReason::SynthesisMismatch)?;

    let call = collapse_call(&caps[1]);
    if call.is_empty() {
        return Err(SkipReason::SynthesisMismatch);
    }

    let args = caps[2].trim_end_matches(',').trim();
    let mut rebuilt = format!("{}({}", call, args);
    if let Some(keys) = caps.get(3) {
        if !args.is_empty() {
            rebuilt.push_str(", ");
        }
        rebuilt.push_str(keys.as_str());
    }
    rebuilt.push(')');
    Ok(rebuilt)
}

/// Drop whitespace around member access dots, keep one space elsewhere.
fn collapse_call(call: &str) -> String {
    let mut out = String::with_capacity(call.len());
    let mut pending_space = false;
    for c in call.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && c != '.' && !out.ends_with('.') {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

fn pass_through_cursor(initializer: &str) -> String {
    initializer.trim().to_string()
}
