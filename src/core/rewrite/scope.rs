//! Balanced-scope extraction.
//!
//! The one piece of real structural reasoning in the rewriter: a small
//! character classifier that knows about line comments, block comments and
//! string/char literals, and a brace counter on top of it that finds where
//! the enclosing block ends.

use super::SkipReason;

/// Lexical region a character belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Region {
    Code,
    LineComment,
    BlockComment,
    Literal,
}

/// Character classifier over source text.
///
/// Per character the state is consulted in a fixed order: literal, line
/// comment, block comment, then code. A consumed two-character marker clears
/// the window, so `/*/` opens a comment without closing it again.
pub(crate) struct Lexer<'a> {
    chars: std::str::CharIndices<'a>,
    prev: Option<char>,
    line_comment: bool,
    block_depth: i32,
    literal: Option<char>,
    escaped: bool,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices(),
            prev: None,
            line_comment: false,
            block_depth: 0,
            literal: None,
            escaped: false,
        }
    }

    /// Block comment nesting seen so far. Negative after a stray `*/`.
    pub(crate) fn block_depth(&self) -> i32 {
        self.block_depth
    }

    fn classify(&mut self, c: char) -> Region {
        if let Some(quote) = self.literal {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == quote || c == '\n' {
                self.literal = None;
            }
            self.prev = None;
            return Region::Literal;
        }

        if self.line_comment {
            if c == '\n' {
                self.line_comment = false;
            }
            self.prev = None;
            return Region::LineComment;
        }

        if self.block_depth > 0 {
            match (self.prev, c) {
                (Some('*'), '/') => {
                    self.block_depth -= 1;
                    self.prev = None;
                }
                (Some('/'), '*') => {
                    self.block_depth += 1;
                    self.prev = None;
                }
                _ => self.prev = Some(c),
            }
            return Region::BlockComment;
        }

        match (self.prev, c) {
            (Some('/'), '/') => {
                self.line_comment = true;
                self.prev = None;
                Region::LineComment
            }
            (Some('/'), '*') => {
                self.block_depth += 1;
                self.prev = None;
                Region::BlockComment
            }
            (Some('*'), '/') => {
                self.block_depth -= 1;
                self.prev = None;
                Region::Code
            }
            (_, '"') | (_, '\'') => {
                self.literal = Some(c);
                self.escaped = false;
                self.prev = None;
                Region::Literal
            }
            _ => {
                self.prev = Some(c);
                Region::Code
            }
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = (usize, char, Region);

    fn next(&mut self) -> Option<Self::Item> {
        let (i, c) = self.chars.next()?;
        let region = self.classify(c);
        Some((i, c, region))
    }
}

/// Byte offset of the brace that closes the block `text` starts inside.
///
/// `text` must begin right after a statement inside an open block. Braces in
/// comments and literals are ignored.
pub(crate) fn scope_end(text: &str) -> Result<usize, SkipReason> {
    let mut lexer = Lexer::new(text);
    let mut depth: i64 = 0;

    while let Some((i, c, region)) = lexer.next() {
        if region != Region::Code {
            continue;
        }
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    if lexer.block_depth() != 0 {
                        return Err(SkipReason::UnbalancedComment);
                    }
                    return Ok(i);
                }
            }
            _ => {}
        }
    }

    if lexer.block_depth() != 0 {
        Err(SkipReason::UnbalancedComment)
    } else {
        Err(SkipReason::UnterminatedScope)
    }
}

/// The text of the enclosing block after a declaration, excluding its closing brace.
pub fn extract_scope(text: &str) -> Result<&str, SkipReason> {
    scope_end(text).map(|end| &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_enclosing_close_brace() {
        let text = "\n    ps.execute();\n  }\n  void next() {}\n";
        assert_eq!(extract_scope(text).unwrap(), "\n    ps.execute();\n  ");
    }

    #[test]
    fn nested_blocks_are_included() {
        let text = " if (x) { a(); } else { b(); } c(); } tail";
        assert_eq!(
            extract_scope(text).unwrap(),
            " if (x) { a(); } else { b(); } c(); "
        );
    }

    #[test]
    fn braces_in_line_comment_ignored() {
        let text = " a(); // }\n b(); } rest";
        assert_eq!(extract_scope(text).unwrap(), " a(); // }\n b(); ");
    }

    #[test]
    fn braces_in_block_comment_ignored() {
        let text = " a(); /*} { }*/ b(); } rest";
        assert_eq!(extract_scope(text).unwrap(), " a(); /*} { }*/ b(); ");
    }

    #[test]
    fn comment_marker_followed_by_brace_is_not_a_brace() {
        let text = " a(); /*}*/ //}\n } rest";
        assert_eq!(extract_scope(text).unwrap(), " a(); /*}*/ //}\n ");
    }

    #[test]
    fn slash_star_slash_does_not_close() {
        let text = " /*/ } */ b(); } rest";
        assert_eq!(extract_scope(text).unwrap(), " /*/ } */ b(); ");
    }

    #[test]
    fn braces_in_string_literals_ignored() {
        let text = " log(\"}\"); log(\"/* {\"); c = '}'; } rest";
        assert_eq!(
            extract_scope(text).unwrap(),
            " log(\"}\"); log(\"/* {\"); c = '}'; "
        );
    }

    #[test]
    fn escaped_quote_stays_in_literal() {
        let text = " s = \"a\\\"}\"; } rest";
        assert_eq!(extract_scope(text).unwrap(), " s = \"a\\\"}\"; ");
    }

    #[test]
    fn unterminated_block_comment_fails() {
        let text = " a(); /* never closed\n } \n}";
        assert_eq!(extract_scope(text), Err(SkipReason::UnbalancedComment));
    }

    #[test]
    fn stray_comment_close_fails() {
        let text = " a(); */ b(); } rest";
        assert_eq!(extract_scope(text), Err(SkipReason::UnbalancedComment));
    }

    #[test]
    fn unclosed_block_fails() {
        assert_eq!(
            extract_scope(" a(); { b(); "),
            Err(SkipReason::UnterminatedScope)
        );
    }

    #[test]
    fn lexer_classifies_regions() {
        let regions: Vec<Region> = Lexer::new("a\"b\"/*c*/").map(|(_, _, r)| r).collect();
        assert_eq!(
            regions,
            vec![
                Region::Code,
                Region::Literal,
                Region::Literal,
                Region::Literal,
                Region::Code,
                Region::BlockComment,
                Region::BlockComment,
                Region::BlockComment,
                Region::BlockComment,
            ]
        );
    }
}
