//! Escaping and wrapping of expression-language snippets embedded in OTTL
//! statements, plus nil-safety analysis for field references.
//!
//! Editor statements crash noisily when they dereference a missing field, so
//! every generated statement carries conditions proving its inputs exist.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::CompileError;

/// Escape text for embedding inside a double-quoted expression-language
/// string. Backslashes first, then quotes, so already-present backslashes are
/// not double-escaped.
pub fn escape_embedded_string(text: &str) -> String {
    text.replace('\\', r"\\").replace('"', r#"\""#)
}

/// Wrap an expression snippet so the statement engine evaluates it as a
/// sub-expression instead of parsing it as a literal.
pub fn wrap_expr(snippet: &str) -> String {
    format!(r#"EXPR("{}")"#, escape_embedded_string(snippet))
}

fn rsplit_at_bracket(path: &str) -> Option<(&str, &str)> {
    path.rfind('[').map(|i| (&path[..i], &path[i..]))
}

/// `a.b.c` -> `a?.b?.c`
fn optional_chained(path: &str) -> String {
    path.split('.').collect::<Vec<_>>().join("?.")
}

/// `.b.c` -> `?.b?.c`, empty stays empty.
fn optional_chained_suffix(rest: &str) -> String {
    match rest.strip_prefix('.') {
        Some(tail) => format!("?.{}", optional_chained(tail)),
        None => rest.to_string(),
    }
}

/// Build an expression that is safe to evaluate on any record and is true iff
/// `path` has a non-nil value.
///
/// Optional chaining cannot cross a membership access, so for every bracket
/// access the check proves the container is a map (or array, for numeric
/// indexes) before indexing into it:
///
/// `attributes.test["a.b"].value` ->
/// `attributes?.test != nil && type(attributes.test) == "map" &&
///  attributes.test["a.b"]?.value != nil`
pub fn field_not_nil_check(path: &str) -> Result<String, CompileError> {
    not_nil_check(&path.replace("?.", "."))
}

fn not_nil_check(path: &str) -> Result<String, CompileError> {
    let invalid = |reason: &str| CompileError::InvalidFieldPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.is_empty() {
        return Err(invalid("empty field path"));
    }

    let Some((prefix, suffix)) = rsplit_at_bracket(path) else {
        return Ok(format!("{} != nil", optional_chained(path)));
    };
    if prefix.is_empty() {
        return Err(invalid("path starts with a membership access"));
    }

    let close = suffix.find(']').ok_or_else(|| invalid("unterminated '['"))?;
    let key = &suffix[..=close];
    let rest = &suffix[close + 1..];
    if !rest.is_empty() && !rest.starts_with('.') {
        return Err(invalid("expected '.' after membership access"));
    }

    let prefix_check = not_nil_check(prefix)?;

    // The conditions short-circuit left to right, so `prefix` is known
    // non-nil by the time it is indexed into.
    let container_check = if key.starts_with(r#"[""#) {
        format!(r#"type({}) == "map""#, prefix)
    } else {
        format!(r#"type({}) == "array""#, prefix)
    };

    Ok(format!(
        "{} && {} && {}{}{} != nil",
        prefix_check,
        container_check,
        prefix,
        key,
        optional_chained_suffix(rest),
    ))
}

static FIELD_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    // A record-field reference: a root accessor followed by dotted (possibly
    // null-safe) member accesses and/or bracketed string or numeric keys.
    Regex::new(
        r#"\b(attributes|resource|body)((\?\.|\.)[A-Za-z_$][A-Za-z0-9_$]*|\[\s*(?:"(?:[^"\\]|\\.)*"|[0-9]+)\s*\])*"#,
    )
    .expect("field reference pattern is valid")
});

static NUMERIC_INDEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\s*[0-9]").expect("numeric index pattern is valid"));

/// Build a combined not-nil check for every record field referenced in a
/// value expression, in order of first appearance. Returns an empty string
/// when the expression references no record fields.
///
/// References are found lexically (the expression AST is a collaborator's
/// concern) and truncated at the first numeric index, since element checks
/// beyond the containing collection add nothing.
pub fn fields_referenced_not_nil_check(expression: &str) -> Result<String, CompileError> {
    let mut seen: Vec<String> = Vec::new();
    let mut checks: Vec<String> = Vec::new();

    for m in FIELD_REFERENCE.find_iter(expression) {
        let mut reference = m.as_str();
        if let Some(idx) = NUMERIC_INDEX.find(reference) {
            reference = &reference[..idx.start()];
        }
        if seen.iter().any(|s| s == reference) {
            continue;
        }
        seen.push(reference.to_string());
        checks.push(field_not_nil_check(reference)?);
    }

    Ok(checks.join(" && "))
}
