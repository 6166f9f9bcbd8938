//! Per-file rewrite loop.
//!
//! Each category is processed against a snapshot worklist taken from the file
//! as it was read. Every snapshot entry is re-located in the live content with
//! a forward cursor, so a rewrite that changes the text never makes the loop
//! revisit an occurrence it already skipped.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use regex::Regex;

use super::patterns::{DeclarationPatterns, Occurrence};
use super::rename::{find_references, is_ident_char, rename_references, NameAllocator};
use super::repair::repair_loose_statements;
use super::scope::extract_scope;
use super::synth::synthesize_header;
use super::{
    CategoryCounts, FailureContext, FileFailure, HandleKind, LeakWarning, RepairSummary,
    RewriteOutcome, SkipReason, SkippedOccurrence,
};
use crate::config::Settings;

/// Bytes of context captured on each side of a failing occurrence.
const CONTEXT_WINDOW: usize = 50;

/// Result cursors first, so cursors declared inside a query's block are
/// already wrapped when the query's block is extracted.
const CATEGORY_ORDER: [HandleKind; 2] = [HandleKind::Cursor, HandleKind::Query];

fn possible_leak_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^[^\n]*\bc\w+S\w+\s*\(\s*\)(?:"[^"]*"|[^;"{}])*\)\s*;"#).unwrap()
    })
}

/// Calls chained onto a freshly created statement without keeping it.
///
/// The call may span lines; the warning carries the first one. Report only;
/// nothing is rewritten for these.
pub fn detect_possible_leaks(content: &str) -> Vec<LeakWarning> {
    possible_leak_re()
        .find_iter(content)
        .map(|m| LeakWarning {
            line: content[..m.start()].matches('\n').count() + 1,
            text: m.as_str().lines().next().unwrap_or_default().trim().to_string(),
        })
        .collect()
}

/// A planned replacement of one declaration and the rest of its block.
struct Splice {
    range: Range<usize>,
    text: String,
    symbol: String,
    header: String,
}

struct Driver<'a> {
    patterns: &'a DeclarationPatterns,
    names: NameAllocator,
    verbose: bool,
    trace: Vec<String>,
}

/// Apply both rewrite categories and the repair pass to `content`.
///
/// On an unexpected failure the returned content is the input, unchanged.
pub(crate) fn rewrite_content(
    content: &str,
    patterns: &DeclarationPatterns,
    settings: &Settings,
) -> RewriteOutcome {
    let mut outcome = RewriteOutcome {
        content: content.to_string(),
        cursors: CategoryCounts::default(),
        queries: CategoryCounts::default(),
        statements: RepairSummary::default(),
        skipped: Vec::new(),
        possible_leaks: detect_possible_leaks(content),
        failure: None,
        trace: Vec::new(),
    };

    let mut driver = Driver {
        patterns,
        names: NameAllocator::new(content, &settings.handle_prefix, &settings.statement_prefix),
        verbose: settings.verbose,
        trace: Vec::new(),
    };

    let mut current = content.to_string();
    for kind in CATEGORY_ORDER {
        let result = driver.rewrite_category(kind, &mut current, content, &mut outcome.skipped);
        match result {
            Ok(counts) => match kind {
                HandleKind::Cursor => outcome.cursors = counts,
                HandleKind::Query => outcome.queries = counts,
            },
            Err(failure) => {
                outcome.failure = Some(failure);
                outcome.trace = driver.trace;
                return outcome;
            }
        }
    }

    let names = &mut driver.names;
    match guarded(|| repair_loose_statements(&mut current, names)) {
        Ok(summary) => outcome.statements = summary,
        Err(panic_message) => {
            outcome.failure = Some(FileFailure::unexpected(
                format!("loose statement repair: {}", panic_message),
                None,
            ));
            outcome.trace = driver.trace;
            return outcome;
        }
    }

    outcome.content = current;
    outcome.trace = driver.trace;
    outcome
}

impl Driver<'_> {
    fn rewrite_category(
        &mut self,
        kind: HandleKind,
        content: &mut String,
        original: &str,
        skipped: &mut Vec<SkippedOccurrence>,
    ) -> Result<CategoryCounts, FileFailure> {
        let worklist = self.patterns.scan(kind, original);
        let mut counts = CategoryCounts {
            found: worklist.len(),
            rewritten: 0,
        };
        let mut cursor = 0;

        for (index, snapshot) in worklist.iter().enumerate() {
            let Some(live) = self.patterns.next_at(kind, content, cursor) else {
                break;
            };
            let line = snapshot.line_in(original);

            let attempt = {
                let live_content: &str = content;
                guarded(|| self.plan_rewrite(&live, live_content))
            };

            match attempt {
                Ok(Ok(splice)) => {
                    if self.verbose {
                        self.trace.push(format!(
                            "line {}: {} `{}` -> `{}`: try ({})",
                            line, kind, live.name, splice.symbol, splice.header
                        ));
                    }
                    content.replace_range(splice.range, &splice.text);
                    cursor = live.start;
                    counts.rewritten += 1;
                }
                Ok(Err(reason)) => {
                    if self.verbose {
                        self.trace
                            .push(format!("line {}: {} `{}` skipped: {}", line, kind, live.name, reason));
                    }
                    skipped.push(SkippedOccurrence {
                        category: kind,
                        symbol: live.name.clone(),
                        line,
                        reason,
                    });
                    cursor = live.end;
                }
                Err(panic_message) => {
                    let context = FailureContext {
                        found: window(content, live.start, live.end),
                        original: window(original, snapshot.start, snapshot.end),
                    };
                    return Err(FileFailure::unexpected(
                        format!(
                            "{} rewrite {} of {} at line {}: {}",
                            kind,
                            index + 1,
                            worklist.len(),
                            line,
                            panic_message
                        ),
                        Some(context),
                    ));
                }
            }
        }

        Ok(counts)
    }

    fn plan_rewrite(&mut self, occurrence: &Occurrence, content: &str) -> Result<Splice, SkipReason> {
        let header = synthesize_header(occurrence)?;
        let scope = extract_scope(&content[occurrence.end..])?;
        check_scope(&occurrence.name, scope)?;

        let symbol = self.names.next_handle().ok_or(SkipReason::NameExhausted)?;
        let (header, _) = rename_references(&header, &occurrence.name, &symbol);

        let body = scope.trim_end();
        let trailing = &scope[body.len()..];
        let (body, _) = rename_references(body, &occurrence.name, &symbol);

        let text = format!(
            "try ({}) {{{}\n{}}}{}",
            header, body, occurrence.indent, trailing
        );

        Ok(Splice {
            range: occurrence.start..occurrence.end + scope.len(),
            text,
            symbol,
            header,
        })
    }
}

/// Reject blocks that return the handle or assign it again.
fn check_scope(name: &str, scope: &str) -> Result<(), SkipReason> {
    for pos in find_references(scope, name) {
        let before = scope[..pos].trim_end();
        let after = scope[pos + name.len()..].trim_start();

        if let Some(head) = before.strip_suffix("return") {
            let keyword = !head.chars().next_back().is_some_and(is_ident_char);
            if keyword && (after.starts_with(';') || after.starts_with('.')) {
                return Err(SkipReason::ReturnsHandle);
            }
        }

        if after.starts_with('=') && !after.starts_with("==") {
            return Err(SkipReason::Reassigned);
        }
    }
    Ok(())
}

/// Run `f`, turning a panic into its message.
pub(crate) fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    })
}

/// `text[start..end]` widened by the context window, clamped to char boundaries.
fn window(text: &str, start: usize, end: usize) -> String {
    let mut from = start.min(text.len()).saturating_sub(CONTEXT_WINDOW);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = end.saturating_add(CONTEXT_WINDOW).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(content: &str) -> RewriteOutcome {
        let settings = Settings::default();
        let patterns = DeclarationPatterns::new(&settings).unwrap();
        rewrite_content(content, &patterns, &settings)
    }

    #[test]
    fn query_block_becomes_try_with_resources() {
        let content = "class A {\n  void f() {\n    PreparedStatement ps = conn.prepareStatement(sql);\n    ps.setString(1, id);\n    ps.execute();\n  }\n}\n";
        let outcome = rewrite(content);

        assert_eq!(
            outcome.content,
            "class A {\n  void f() {\n    try (PreparedStatement generatedVariable1 = conn.prepareStatement(sql)) {\n    generatedVariable1.setString(1, id);\n    generatedVariable1.execute();\n    }\n  }\n}\n"
        );
        assert_eq!(outcome.queries, CategoryCounts { found: 1, rewritten: 1 });
        assert!(outcome.changed());
    }

    #[test]
    fn cursor_inside_query_block_is_nested() {
        let content = "  void f() {\n    PreparedStatement ps = conn.prepareStatement(sql);\n    ResultSet rs = ps.executeQuery();\n    rs.next();\n  }\n";
        let outcome = rewrite(content);

        assert_eq!(
            outcome.content,
            "  void f() {\n    try (PreparedStatement generatedVariable2 = conn.prepareStatement(sql)) {\n    try (ResultSet generatedVariable1 = generatedVariable2.executeQuery()) {\n    generatedVariable1.next();\n    }\n    }\n  }\n"
        );
        assert_eq!(outcome.cursors.rewritten, 1);
        assert_eq!(outcome.queries.rewritten, 1);
    }

    #[test]
    fn returned_handle_is_skipped_and_others_still_rewrite() {
        let content = "  ResultSet open() {\n    ResultSet rs = ps.executeQuery();\n    return rs;\n  }\n  void g() {\n    ResultSet other = st.executeQuery();\n    other.next();\n  }\n";
        let outcome = rewrite(content);

        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].reason, SkipReason::ReturnsHandle);
        assert_eq!(outcome.skipped[0].symbol, "rs");
        assert_eq!(outcome.skipped[0].line, 2);
        assert_eq!(outcome.cursors, CategoryCounts { found: 2, rewritten: 1 });
        assert!(outcome.content.contains("    ResultSet rs = ps.executeQuery();\n    return rs;"));
        assert!(outcome.content.contains("try (ResultSet generatedVariable1 = st.executeQuery()) {"));
    }

    #[test]
    fn chained_return_is_skipped() {
        assert_eq!(
            check_scope("rs", "\n    return rs.getString(1);\n  "),
            Err(SkipReason::ReturnsHandle)
        );
        assert_eq!(check_scope("rs", "\n    returnrs(); rs.close();\n"), Ok(()));
    }

    #[test]
    fn reassignment_is_skipped() {
        assert_eq!(
            check_scope("rs", "\n    rs.next();\n    rs = ps.executeQuery();\n"),
            Err(SkipReason::Reassigned)
        );
        assert_eq!(check_scope("rs", "\n    if (rs == null) {}\n"), Ok(()));
    }

    #[test]
    fn unbalanced_comment_skips_only_that_occurrence() {
        let content = "  void f() {\n    ResultSet rs = ps.executeQuery();\n    /* dangling\n  }\n";
        let outcome = rewrite(content);

        assert_eq!(outcome.skipped[0].reason, SkipReason::UnbalancedComment);
        assert_eq!(outcome.content, content);
        assert!(outcome.failure.is_none());
        assert!(!outcome.changed());
    }

    #[test]
    fn first_skipped_second_rewritten_in_same_block() {
        let content = "  void f() {\n    ResultSet a = cached;\n    ResultSet b = st.executeQuery();\n    b.next();\n  }\n";
        let outcome = rewrite(content);

        assert_eq!(outcome.cursors, CategoryCounts { found: 2, rewritten: 1 });
        assert_eq!(outcome.skipped[0].reason, SkipReason::SynthesisMismatch);
        assert!(outcome.content.contains("    ResultSet a = cached;\n    try (ResultSet generatedVariable1"));
    }

    fn skip_reason(content: &str) -> SkipReason {
        let outcome = rewrite(content);
        assert_eq!(outcome.content, content);
        assert_eq!(outcome.skipped.len(), 1, "{:?}", outcome.skipped);
        outcome.skipped[0].reason
    }

    #[test]
    fn each_skip_reason_is_reachable() {
        assert_eq!(
            skip_reason("  void f() {\n    ResultSet rs =\n  }\n"),
            SkipReason::NoInitializerMatch
        );
        assert_eq!(
            skip_reason("  ResultSet f() {\n    ResultSet rs = ps.executeQuery();\n    return rs;\n  }\n"),
            SkipReason::ReturnsHandle
        );
        assert_eq!(
            skip_reason("  void f() {\n    ResultSet rs = a.executeQuery();\n    rs = b.executeQuery();\n  }\n"),
            SkipReason::Reassigned
        );
        assert_eq!(
            skip_reason("  void f() {\n    ResultSet rs = ps.executeQuery();\n    /* open\n  }\n"),
            SkipReason::UnbalancedComment
        );
        assert_eq!(
            skip_reason("ResultSet rs = ps.executeQuery();\nrs.next();\n"),
            SkipReason::UnterminatedScope
        );
        assert_eq!(
            skip_reason("  void f() {\n    ResultSet rs = cached;\n    rs.next();\n  }\n"),
            SkipReason::SynthesisMismatch
        );
        assert_eq!(
            skip_reason("  void f() {\n    ResultSet generatedVariable18446744073709551615 = q();\n  }\n"),
            SkipReason::NameExhausted
        );
    }

    #[test]
    fn semicolon_inside_sql_literal_stays_in_the_literal() {
        let content = "    void f() {\n        PreparedStatement ps = conn.prepareStatement(\"INSERT INTO t VALUES (?, ?);\");\n        ps.execute();\n    }\n";
        let outcome = rewrite(content);

        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.queries, CategoryCounts { found: 1, rewritten: 1 });
        assert_eq!(
            outcome.content,
            "    void f() {\n        try (PreparedStatement generatedVariable1 = conn.prepareStatement(\"INSERT INTO t VALUES (?, ?);\")) {\n        generatedVariable1.execute();\n        }\n    }\n"
        );
    }

    #[test]
    fn multi_declarator_statement_is_left_alone() {
        let content = "  void f() {\n    ResultSet a = s1.executeQuery(), b = s2.executeQuery();\n    a.next();\n    b.next();\n  }\n";
        assert_eq!(skip_reason(content), SkipReason::SynthesisMismatch);
    }

    #[test]
    fn rewriting_is_idempotent() {
        let content = "  void f() {\n    PreparedStatement ps = conn.prepareStatement(sql);\n    ResultSet rs = ps.executeQuery();\n    rs.next();\n  }\n";
        let once = rewrite(content);
        let twice = rewrite(&once.content);

        assert_eq!(twice.content, once.content);
        assert!(!twice.changed());
    }

    #[test]
    fn existing_generated_names_are_not_reused() {
        let content = "  void f() {\n    ResultSet generatedVariable3 = a.executeQuery();\n    generatedVariable3.next();\n  }\n";
        let outcome = rewrite(content);
        assert!(outcome.content.contains("try (ResultSet generatedVariable4 = a.executeQuery())"));
    }

    #[test]
    fn leak_heuristic_reports_chained_statement() {
        let content = "void f() {\n  conn.createStatement().execute(\"DROP x;\");\n  Statement keep = conn.createStatement();\n}\n";
        let leaks = detect_possible_leaks(content);

        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].line, 2);
        assert_eq!(leaks[0].text, "conn.createStatement().execute(\"DROP x;\");");
    }

    #[test]
    fn leak_heuristic_follows_arguments_across_lines() {
        let content = "void f() {\n  conn.createStatement().execute(\"DROP TABLE \" +\n      \"t;\");\n  conn.createStatement().executeUpdate(\"\"\"\n      DELETE FROM t;\n      \"\"\");\n  if (conn.createStatement() != null) {\n    log(x);\n  }\n}\n";
        let leaks = detect_possible_leaks(content);
        let lines: Vec<usize> = leaks.iter().map(|l| l.line).collect();

        assert_eq!(lines, vec![2, 4]);
        assert_eq!(leaks[0].text, "conn.createStatement().execute(\"DROP TABLE \" +");
    }

    #[test]
    fn verbose_records_trace() {
        let settings = Settings {
            verbose: true,
            ..Settings::default()
        };
        let patterns = DeclarationPatterns::new(&settings).unwrap();
        let outcome = rewrite_content(
            "  void f() {\n    ResultSet rs = ps.executeQuery();\n  }\n",
            &patterns,
            &settings,
        );
        assert_eq!(outcome.trace.len(), 1);
        assert!(outcome.trace[0].starts_with("line 2: cursor `rs` -> `generatedVariable1`"));
    }

    #[test]
    fn window_respects_char_boundaries() {
        let text = format!("{}ResultSet rs{}", "é".repeat(40), "ü".repeat(40));
        let start = "é".repeat(40).len();
        let out = window(&text, start, start + 12);
        assert!(out.contains("ResultSet rs"));
    }

    #[test]
    fn guarded_reports_panic_message() {
        let result: Result<(), String> = guarded(|| panic!("boom"));
        assert_eq!(result, Err("boom".to_string()));
    }
}
