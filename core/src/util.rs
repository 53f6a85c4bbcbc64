//! Small helpers shared across compiler stages.

/// Escapes text for inclusion between quotes, both when displaying source
/// literals and when serializing `.ASCIZ` directives. The escape set is the
/// one the lexer accepts: backslash, both quote styles, newline, carriage
/// return and tab.
pub(crate) fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
