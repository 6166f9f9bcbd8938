//! Declaration scanner: statement-anchored patterns for handle declarations.
//!
//! The regex only anchors the declaration head (`Type name =`). The end of the
//! statement is found with the lexer, so a `;` inside a string literal, a
//! comment or a nested bracket never ends the initializer early.

use regex::{Captures, Regex};

use super::scope::{Lexer, Region};
use super::HandleKind;
use crate::config::Settings;
use crate::error::{Error, Result};

/// One matched declaration of a handle, located against a specific content snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub kind: HandleKind,
    /// Byte offset of the declared type (indentation excluded).
    pub start: usize,
    /// Byte offset just past the terminating `;`, or past the `=` when the
    /// statement has no terminator.
    pub end: usize,
    /// Leading whitespace of the declaration line.
    pub indent: String,
    /// Declared type text, including a `final` modifier if present.
    pub declared_type: String,
    /// Declared symbol name.
    pub name: String,
    /// Initializer expression between `=` and `;`, trimmed. `None` when the
    /// enclosing block closes before any terminating `;`.
    pub initializer: Option<String>,
}

impl Occurrence {
    /// 1-indexed line of the declaration within `content`.
    pub fn line_in(&self, content: &str) -> usize {
        content[..self.start].matches('\n').count() + 1
    }
}

/// Compiled name/type patterns for both handle categories.
#[derive(Debug, Clone)]
pub struct DeclarationPatterns {
    cursor: Regex,
    query: Regex,
}

impl DeclarationPatterns {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            cursor: declaration_regex(&settings.cursor_type)?,
            query: declaration_regex(&settings.query_type)?,
        })
    }

    fn regex(&self, kind: HandleKind) -> &Regex {
        match kind {
            HandleKind::Cursor => &self.cursor,
            HandleKind::Query => &self.query,
        }
    }

    /// Every non-null declaration of `kind` in `content`, in textual order.
    pub fn scan(&self, kind: HandleKind, content: &str) -> Vec<Occurrence> {
        let mut found = Vec::new();
        let mut from = 0;
        while let Some(occurrence) = self.next_at(kind, content, from) {
            from = occurrence.end;
            found.push(occurrence);
        }
        found
    }

    /// First non-null declaration of `kind` starting at or after byte `from`.
    pub fn next_at(&self, kind: HandleKind, content: &str, from: usize) -> Option<Occurrence> {
        let re = self.regex(kind);
        let mut from = from;
        while from <= content.len() {
            let caps = re.captures_at(content, from)?;
            let whole = caps.get(0)?;
            if let Some(occurrence) = occurrence_from(kind, &caps, content) {
                return Some(occurrence);
            }
            from = whole.end();
        }
        None
    }
}

fn declaration_regex(type_suffix: &str) -> Result<Regex> {
    let pattern = format!(
        r"(?m)^([ \t]*)((?:final\s+)?[\w.]*{})\s+(\w+)\s*=",
        regex::escape(type_suffix)
    );
    Regex::new(&pattern).map_err(|e| {
        Error::internal_unexpected(format!("declaration pattern for {}: {}", type_suffix, e))
    })
}

fn occurrence_from(kind: HandleKind, caps: &Captures<'_>, content: &str) -> Option<Occurrence> {
    let head = caps.get(0)?;
    let indent = caps.get(1)?;
    let declared_type = caps.get(2)?;
    let name = caps.get(3)?;

    let rest = &content[head.end()..];
    if rest.starts_with('=') {
        return None;
    }

    let (initializer, end) = match statement_end(rest) {
        Some(semi) => {
            let initializer = rest[..semi].trim();
            if is_null_literal_tail(initializer) {
                return None;
            }
            (Some(initializer.to_string()), head.end() + semi + 1)
        }
        None => (None, head.end()),
    };

    Some(Occurrence {
        kind,
        start: declared_type.start(),
        end,
        indent: indent.as_str().to_string(),
        declared_type: declared_type.as_str().to_string(),
        name: name.as_str().to_string(),
        initializer,
    })
}

/// Offset of the `;` that ends the statement `text` is inside.
///
/// Only code-level semicolons outside nested brackets count. Returns `None`
/// when an unmatched closing bracket (the enclosing block) or the end of
/// input comes first.
fn statement_end(text: &str) -> Option<usize> {
    let mut depth: i64 = 0;
    for (i, c, region) in Lexer::new(text) {
        if region != Region::Code {
            continue;
        }
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            ';' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// True when the initializer ends in a bare `null` token.
fn is_null_literal_tail(initializer: &str) -> bool {
    let trimmed = initializer.trim_end();
    match trimmed.strip_suffix("null") {
        Some(head) => !head
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> DeclarationPatterns {
        DeclarationPatterns::new(&Settings::default()).unwrap()
    }

    #[test]
    fn captures_query_declaration() {
        let content = "  void f() {\n    PreparedStatement ps = conn.prepareStatement(sql);\n  }\n";
        let found = patterns().scan(HandleKind::Query, content);

        assert_eq!(found.len(), 1);
        let occ = &found[0];
        assert_eq!(occ.indent, "    ");
        assert_eq!(occ.declared_type, "PreparedStatement");
        assert_eq!(occ.name, "ps");
        assert_eq!(occ.initializer.as_deref(), Some("conn.prepareStatement(sql)"));
        assert_eq!(&content[occ.start..occ.end], "PreparedStatement ps = conn.prepareStatement(sql);");
        assert_eq!(occ.line_in(content), 2);
    }

    #[test]
    fn semicolon_inside_string_does_not_end_statement() {
        let content = "PreparedStatement ps = conn.prepareStatement(\"INSERT INTO t VALUES (?, ?);\");\nps.execute();\n";
        let found = patterns().scan(HandleKind::Query, content);

        assert_eq!(
            found[0].initializer.as_deref(),
            Some("conn.prepareStatement(\"INSERT INTO t VALUES (?, ?);\")")
        );
        assert_eq!(&content[found[0].end..], "\nps.execute();\n");
    }

    #[test]
    fn semicolon_in_comment_or_lambda_does_not_end_statement() {
        let content = "ResultSet rs = run(/* a; b */ () -> { step(); return q(); });\n";
        let found = patterns().scan(HandleKind::Cursor, content);
        assert_eq!(
            found[0].initializer.as_deref(),
            Some("run(/* a; b */ () -> { step(); return q(); })")
        );
    }

    #[test]
    fn unterminated_statement_has_no_initializer() {
        let content = "  void f() {\n    ResultSet rs =\n  }\n";
        let found = patterns().scan(HandleKind::Cursor, content);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].initializer, None);
        assert_eq!(&content[found[0].start..found[0].end], "ResultSet rs =");
    }

    #[test]
    fn multi_declarator_initializer_is_captured_whole() {
        let content = "ResultSet a = s1.executeQuery(), b = s2.executeQuery();\n";
        let found = patterns().scan(HandleKind::Cursor, content);
        assert_eq!(
            found[0].initializer.as_deref(),
            Some("s1.executeQuery(), b = s2.executeQuery()")
        );
    }

    #[test]
    fn qualified_and_final_types_match() {
        let content = "final java.sql.ResultSet rs = ps.executeQuery();\n";
        let found = patterns().scan(HandleKind::Cursor, content);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].declared_type, "final java.sql.ResultSet");
    }

    #[test]
    fn null_initializers_are_ignored() {
        let content = "ResultSet rs = null;\nResultSet other = fetchnull();\nResultSet last = x ? y : null ;\n";
        let found = patterns().scan(HandleKind::Cursor, content);
        let names: Vec<&str> = found.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["other"]);
    }

    #[test]
    fn declarations_must_start_a_line() {
        let content = "foo(); ResultSet rs = ps.executeQuery();\nreturn (ResultSet) rs2;\n";
        assert!(patterns().scan(HandleKind::Cursor, content).is_empty());
    }

    #[test]
    fn next_at_resumes_from_cursor() {
        let content = "ResultSet a = q1();\nResultSet b = q2();\n";
        let p = patterns();
        let first = p.next_at(HandleKind::Cursor, content, 0).unwrap();
        let second = p.next_at(HandleKind::Cursor, content, first.end).unwrap();
        assert_eq!(first.name, "a");
        assert_eq!(second.name, "b");
        assert!(p.next_at(HandleKind::Cursor, content, second.end).is_none());
    }

    #[test]
    fn categories_are_independent() {
        let content = "PreparedStatement ps = c.prepareStatement(s);\n";
        let p = patterns();
        assert_eq!(p.scan(HandleKind::Query, content).len(), 1);
        assert!(p.scan(HandleKind::Cursor, content).is_empty());
    }

    #[test]
    fn try_header_is_not_a_declaration() {
        let content = "    try (ResultSet generatedVariable1 = ps.executeQuery()) {\n";
        assert!(patterns().scan(HandleKind::Cursor, content).is_empty());
    }
}
