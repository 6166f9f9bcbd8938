//! Rename engine: fresh symbols and whole-token reference substitution.
//!
//! New names are deterministic: `<prefix><n>` where `n` is one past the
//! highest numbered `<prefix><digits>` identifier already in the file, so
//! output is reproducible and cannot collide with an existing identifier.
//! A prefix whose counter would pass `u64::MAX` yields no further names.

use super::scope::{Lexer, Region};

/// Characters that may precede a reference.
const LEFT_BOUNDARY: &[char] = &[
    '(', ')', '+', '-', '*', '/', '%', ',', '!', '=', '<', '>', '&', '|', '^', '?', ':', '[', '{',
    ';',
];

/// Characters that may follow a reference.
const RIGHT_BOUNDARY: &[char] = &[
    '=', '.', ')', ',', ';', '[', ']', '+', '-', '*', '/', '%', '<', '>', '&', '|', '^', '?', ':',
    '}',
];

pub(super) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Allocates `<prefix><n>` names above every numbered use of the prefix.
#[derive(Debug, Clone)]
pub struct SymbolCounter {
    prefix: String,
    next: Option<u64>,
}

impl SymbolCounter {
    /// Seed the counter from the identifiers already present in `content`.
    pub fn seeded(prefix: &str, content: &str) -> Self {
        let next = highest_suffix(content, prefix).map_or(Some(1), |n| n.checked_add(1));
        Self {
            prefix: prefix.to_string(),
            next,
        }
    }

    /// Next unused name, or `None` once the suffix space is used up.
    pub fn allocate(&mut self) -> Option<String> {
        let n = self.next?;
        self.next = n.checked_add(1);
        Some(format!("{}{}", self.prefix, n))
    }
}

/// Per-file name source for rewritten handles and repaired statements.
#[derive(Debug, Clone)]
pub struct NameAllocator {
    handles: SymbolCounter,
    statements: SymbolCounter,
}

impl NameAllocator {
    pub fn new(content: &str, handle_prefix: &str, statement_prefix: &str) -> Self {
        Self {
            handles: SymbolCounter::seeded(handle_prefix, content),
            statements: SymbolCounter::seeded(statement_prefix, content),
        }
    }

    pub fn next_handle(&mut self) -> Option<String> {
        self.handles.allocate()
    }

    pub fn next_statement(&mut self) -> Option<String> {
        self.statements.allocate()
    }
}

/// Largest `n` among whole identifiers spelled `<prefix><n>` in `content`.
fn highest_suffix(content: &str, prefix: &str) -> Option<u64> {
    let mut highest = None;
    let mut start = 0;

    while let Some(pos) = content[start..].find(prefix) {
        let abs = start + pos;
        start = abs + prefix.len();

        let left_ok = content[..abs]
            .chars()
            .next_back()
            .map_or(true, |c| !is_ident_char(c));
        if !left_ok {
            continue;
        }

        let rest = &content[abs + prefix.len()..];
        let digits_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits_len == 0 {
            continue;
        }
        let after = rest[digits_len..].chars().next();
        if after.is_some_and(is_ident_char) {
            continue;
        }
        if let Ok(n) = rest[..digits_len].parse::<u64>() {
            highest = highest.max(Some(n));
        }
    }

    highest
}

/// Byte offsets of whole-token references to `symbol` outside string and char literals.
pub fn find_references(text: &str, symbol: &str) -> Vec<usize> {
    if symbol.is_empty() {
        return Vec::new();
    }

    let literal_bytes: Vec<bool> = {
        let mut mask = vec![false; text.len()];
        for (i, c, region) in Lexer::new(text) {
            if region == Region::Literal {
                for slot in mask.iter_mut().skip(i).take(c.len_utf8()) {
                    *slot = true;
                }
            }
        }
        mask
    };

    let mut found = Vec::new();
    let mut start = 0;
    while let Some(pos) = text[start..].find(symbol) {
        let abs = start + pos;
        let end = abs + symbol.len();
        start = abs + 1;
        while !text.is_char_boundary(start) {
            start += 1;
        }

        if literal_bytes[abs] {
            continue;
        }

        let left_ok = text[..abs]
            .chars()
            .next_back()
            .map_or(true, |c| c.is_whitespace() || LEFT_BOUNDARY.contains(&c));
        let right_ok = text[end..]
            .chars()
            .next()
            .map_or(true, |c| c.is_whitespace() || RIGHT_BOUNDARY.contains(&c));

        if left_ok && right_ok {
            found.push(abs);
        }
    }

    found
}

/// Replace every whole-token reference of `old` with `new`.
///
/// Returns the rewritten text and the number of substitutions.
pub fn rename_references(text: &str, old: &str, new: &str) -> (String, usize) {
    let positions = find_references(text, old);
    if positions.is_empty() {
        return (text.to_string(), 0);
    }

    let mut out = String::with_capacity(text.len() + positions.len() * new.len());
    let mut last = 0;
    for &pos in &positions {
        out.push_str(&text[last..pos]);
        out.push_str(new);
        last = pos + old.len();
    }
    out.push_str(&text[last..]);

    (out, positions.len())
}
