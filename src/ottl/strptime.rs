//! Conversion of strptime-style time layouts into guard regexes.
//!
//! Time-parsing statements are gated on the parse-from value matching the
//! layout's shape, so values with a different format are skipped instead of
//! producing collector warnings on every record.

use crate::error::CompileError;

/// Regex fragment for a single strptime directive, or `None` for directives
/// the guard cannot express.
fn directive_pattern(directive: char) -> Option<&'static str> {
    match directive {
        'Y' => Some("[0-9]{4}"),
        'y' => Some("[0-9]{2}"),
        'm' => Some("[0-9]{2}"),
        'b' | 'h' => Some("[A-Za-z]{3}"),
        'B' => Some("[A-Za-z]+"),
        'd' => Some("[0-9]{2}"),
        'e' => Some("[0-9 ]?[0-9]"),
        'a' => Some("[A-Za-z]{3}"),
        'A' => Some("[A-Za-z]+"),
        'H' => Some("[0-9]{2}"),
        'I' => Some("[0-9]{2}"),
        'p' => Some("(?:AM|PM|am|pm)"),
        'M' => Some("[0-9]{2}"),
        'S' => Some("[0-9]{2}"),
        'L' => Some("[0-9]{3}"),
        'f' => Some("[0-9]+"),
        's' => Some("[0-9]+"),
        'j' => Some("[0-9]{3}"),
        'z' => Some("[+-][0-9]{2}:?(?:[0-9]{2})?"),
        'Z' => Some("[A-Za-z/_+-]+"),
        '%' => Some("%"),
        _ => None,
    }
}

/// Build an anchored regex matching values shaped like `layout`.
///
/// All unsupported directives of the layout are collected before failing, so
/// a single bad layout reports every problem at once.
pub fn regex_for_layout(layout: &str) -> Result<String, CompileError> {
    let mut pattern = String::from("^");
    let mut unsupported: Vec<String> = Vec::new();

    let mut chars = layout.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            pattern.push_str(&regex::escape(&c.to_string()));
            continue;
        }

        match chars.next() {
            Some(directive) => match directive_pattern(directive) {
                Some(fragment) => pattern.push_str(fragment),
                None => unsupported.push(format!("%{}", directive)),
            },
            // trailing lone '%'
            None => unsupported.push("%".to_string()),
        }
    }

    if !unsupported.is_empty() {
        return Err(CompileError::UnsupportedLayoutDirective {
            layout: layout.to_string(),
            directives: unsupported,
        });
    }

    pattern.push('$');
    Ok(pattern)
}
