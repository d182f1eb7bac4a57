//! Translation of dotted/bracket field-access paths into OTTL log-context
//! paths.
//!
//! Pipeline operators address fields with paths like
//! `attributes.test["a.b"].value`, optionally using `?.` null-safe
//! separators. OTTL addresses the same fields as
//! `attributes["test"]["a.b"]["value"]`.

/// Split at the right-most `[`, keeping the bracket at the start of the
/// second piece.
///
/// `attributes.test["a.b"].value["c.d"].e` ->
/// (`attributes.test["a.b"].value`, `["c.d"].e`)
fn rsplit_at_bracket(path: &str) -> Option<(&str, &str)> {
    path.rfind('[').map(|i| (&path[..i], &path[i..]))
}

/// Ordered segments of a field path. A bracketed key may itself contain dots
/// and is kept as a single segment.
///
/// `a.b?.c` -> ["a", "b", "c"]
/// `a.b["c.d"].e` -> ["a", "b", "c.d", "e"]
pub fn path_parts(path: &str) -> Vec<String> {
    segments(&path.replace("?.", "."))
}

fn segments(path: &str) -> Vec<String> {
    let Some((prefix, suffix)) = rsplit_at_bracket(path) else {
        // no membership access left
        return path.split('.').map(str::to_string).collect();
    };

    // recurse on everything before the right-most membership access
    let mut parts = segments(prefix);

    match suffix.find(']') {
        Some(close) => {
            parts.push(suffix[1..close].trim_matches('"').to_string());
            // segments after the membership access, eg the `.e` in `["c.d"].e`
            let rest = &suffix[close + 1..];
            if let Some(rest) = rest.strip_prefix('.') {
                parts.extend(rest.split('.').map(str::to_string));
            } else if !rest.is_empty() {
                parts.push(rest.to_string());
            }
        }
        // unterminated bracket; keep the function total
        None => parts.push(suffix.to_string()),
    }

    parts
}

/// Convert a pipeline field path to an equivalent OTTL log-context path.
///
/// Paths not rooted at `attributes`/`resource` address fixed record fields
/// (`body`, `time_unix_nano`, ...) and pass through unchanged.
pub fn to_ottl_path(path: &str) -> String {
    if !(path.starts_with("attributes") || path.starts_with("resource")) {
        return path.to_string();
    }

    let parts = path_parts(path);

    let mut ottl_path = if parts[0] == "resource" {
        "resource.attributes".to_string()
    } else {
        parts[0].clone()
    };

    for part in &parts[1..] {
        ottl_path.push_str(&format!(r#"["{}"]"#, part));
    }

    ottl_path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_parts_plain() {
        assert_eq!(path_parts("a.b.c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_path_parts_null_safe_separator() {
        assert_eq!(path_parts("a.b?.c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_path_parts_bracketed_key_with_dots() {
        assert_eq!(
            path_parts(r#"a.b["c.d"].e"#),
            vec!["a", "b", "c.d", "e"]
        );
        assert_eq!(
            path_parts(r#"attributes.test["a.b"].value["c.d"].e"#),
            vec!["attributes", "test", "a.b", "value", "c.d", "e"]
        );
    }

    #[test]
    fn test_attributes_path() {
        assert_eq!(
            to_ottl_path(r#"attributes.test["a.b"].value"#),
            r#"attributes["test"]["a.b"]["value"]"#
        );
    }

    #[test]
    fn test_resource_path_is_rewritten() {
        assert_eq!(
            to_ottl_path("resource.service"),
            r#"resource.attributes["service"]"#
        );
    }

    #[test]
    fn test_record_fields_pass_through() {
        assert_eq!(to_ottl_path("body"), "body");
        assert_eq!(to_ottl_path("time_unix_nano"), "time_unix_nano");
        assert_eq!(to_ottl_path("trace_id.string"), "trace_id.string");
    }

    #[test]
    fn test_translation_is_deterministic_and_idempotent() {
        let input = r#"attributes.test["a.b"].value"#;
        let once = to_ottl_path(input);
        assert_eq!(once, to_ottl_path(input));
        assert_eq!(once, to_ottl_path(&once));
    }

    #[test]
    fn test_dollar_in_key_is_preserved() {
        assert_eq!(to_ottl_path("attributes.$test"), r#"attributes["$test"]"#);
    }
}
