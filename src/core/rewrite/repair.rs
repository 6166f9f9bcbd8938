//! Loose-statement repair.
//!
//! `try (ResultSet rs = conn.createStatement().executeQuery(sql)) {` closes the
//! cursor but leaks the statement. The repair hoists the statement into its
//! own resource header in front of the existing one.

use std::sync::OnceLock;

use regex::Regex;

use super::rename::NameAllocator;
use super::scope::extract_scope;
use super::RepairSummary;

/// Groups: indentation, `try (<Type> <name> =`, statement expression, chained call through `{`.
fn loose_statement_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^([ \t]*)(\btry\s*\(\s*\w+\s+\w+\s*=)(\s*[\w.()]*\.createStatement\(\)\s*)(\.[^{]*?\{)",
        )
        .unwrap()
    })
}

/// Rewrite every loose `createStatement()` header in `content`.
///
/// The first fix whose block cannot be extracted, or that finds no fresh
/// statement name, stops the pass; fixes already applied are kept.
pub(crate) fn repair_loose_statements(content: &mut String, names: &mut NameAllocator) -> RepairSummary {
    let re = loose_statement_re();
    let found = re.find_iter(content).count();
    let mut summary = RepairSummary {
        found,
        repaired: 0,
        error: None,
    };
    let mut cursor = 0;

    for _ in 0..found {
        let Some(caps) = re.captures_at(content, cursor) else {
            break;
        };
        let (Some(resource), Some(statement), Some(chain)) = (caps.get(2), caps.get(3), caps.get(4))
        else {
            break;
        };
        let indent = caps.get(1).map_or("", |m| m.as_str());
        let end = chain.end();

        let line = content[..resource.start()].matches('\n').count() + 1;
        let scope = match extract_scope(&content[end..]) {
            Ok(scope) => scope,
            Err(reason) => {
                summary.error = Some(format!("line {}: {}", line, reason));
                break;
            }
        };

        let Some(name) = names.next_statement() else {
            summary.error = Some(format!("line {}: no fresh statement name left", line));
            break;
        };
        let body = scope.trim_end();
        let trailing = &scope[body.len()..];
        let text = format!(
            "try (var {name} = {stmt}) {{ {resource} {name}{chain}{body}\n{indent}}}{trailing}",
            name = name,
            stmt = statement.as_str().trim(),
            resource = resource.as_str(),
            chain = chain.as_str(),
            body = body,
            indent = indent,
            trailing = trailing,
        );

        let range = resource.start()..end + scope.len();
        cursor = range.start;
        content.replace_range(range, &text);
        summary.repaired += 1;
    }

    summary
}
