//! Unified-statement strategy: every pipeline compiles to a list of OTTL
//! statements, individually scoped by the pipeline's isolation marker, and
//! all pipelines share a single transform processor.

use crate::error::CompileError;
use crate::model::{Operator, OperatorKind, Pipeline, TimeLayoutType};
use crate::ottl::expr::{
    escape_embedded_string, field_not_nil_check, fields_referenced_not_nil_check, wrap_expr,
};
use crate::ottl::path::to_ottl_path;
use crate::ottl::statement::Statement;
use crate::ottl::strptime::regex_for_layout;

/// Private per-record attribute capturing pipeline membership. Wire-level
/// contract with already-deployed configs; do not change.
pub const MARKER_ATTRIBUTE: &str = "__matched-log-pipeline__";

/// Compile one pipeline into rendered OTTL statements.
///
/// An operator early in the pipeline may mutate a field referenced by the
/// pipeline's filter, so the filter cannot be re-evaluated per statement.
/// Instead the first statement records pipeline membership in a marker
/// attribute, every operator statement is gated on the marker alone, and the
/// last statement clears it.
pub fn statements_for_pipeline(pipeline: &Pipeline) -> Result<Vec<String>, CompileError> {
    let enabled: Vec<&Operator> = pipeline.enabled_operators().collect();
    if enabled.is_empty() {
        return Ok(Vec::new());
    }

    let filter_expr = pipeline.filter.to_expression()?;
    let marker = escape_embedded_string(&pipeline.marker());
    let marker_check = format!(r#"attributes["{}"] == "{}""#, MARKER_ATTRIBUTE, marker);

    let mut statements = Vec::new();

    let mut set_marker = Statement::new(format!(
        r#"set(attributes["{}"], "{}")"#,
        MARKER_ATTRIBUTE, marker
    ));
    if !filter_expr.is_empty() {
        set_marker = set_marker.when(wrap_expr(&filter_expr));
    }
    statements.push(set_marker.render());

    for op in &enabled {
        let compiled = statements_for_operator(op, &marker, &marker_check)
            .map_err(|e| e.in_operator(&op.name))?;
        statements.extend(compiled.into_iter().map(|s| s.render()));
    }

    statements.push(
        Statement::new(format!(r#"delete_key(attributes, "{}")"#, MARKER_ATTRIBUTE))
            .when(marker_check)
            .render(),
    );

    Ok(statements)
}

/// Compile one operator into marker-gated statements.
fn statements_for_operator(
    op: &Operator,
    marker: &str,
    marker_check: &str,
) -> Result<Vec<Statement>, CompileError> {
    let gated = |editor: String| Statement::new(editor).when(marker_check.to_string());

    match &op.kind {
        OperatorKind::Add { field, value } => {
            let target = to_ottl_path(field);
            if let Some(expression) = as_value_expression(value) {
                let mut stmt = gated(format!("set({}, {})", target, wrap_expr(expression)));
                let refs_check = fields_referenced_not_nil_check(expression)?;
                if !refs_check.is_empty() {
                    stmt = stmt.when(wrap_expr(&refs_check));
                }
                Ok(vec![stmt])
            } else {
                Ok(vec![gated(format!(
                    r#"set({}, "{}")"#,
                    target,
                    escape_embedded_string(value)
                ))])
            }
        }

        OperatorKind::Remove { field } => Ok(vec![delete_statement(field, marker_check)?]),

        OperatorKind::Copy { from, to } => Ok(vec![gated(format!(
            "set({}, {})",
            to_ottl_path(to),
            to_ottl_path(from)
        ))]),

        OperatorKind::Move { from, to } => Ok(vec![
            gated(format!("set({}, {})", to_ottl_path(to), to_ottl_path(from))),
            delete_statement(from, marker_check)?,
        ]),

        OperatorKind::RegexParser {
            parse_from,
            parse_to,
            regex,
        } => Ok(vec![gated(format!(
            r#"merge_maps({}, ExtractPatterns({}, "{}"), "upsert")"#,
            to_ottl_path(parse_to),
            to_ottl_path(parse_from),
            escape_embedded_string(regex)
        ))
        .when(wrap_expr(&field_not_nil_check(parse_from)?))]),

        OperatorKind::GrokParser {
            parse_from,
            parse_to,
            pattern,
        } => Ok(vec![gated(format!(
            r#"merge_maps({}, GrokParse({}, "{}"), "upsert")"#,
            to_ottl_path(parse_to),
            to_ottl_path(parse_from),
            escape_embedded_string(pattern)
        ))
        .when(wrap_expr(&field_not_nil_check(parse_from)?))]),

        OperatorKind::JsonParser {
            parse_from,
            parse_to,
        } => json_parser_statements(op, parse_from, parse_to, marker, marker_check),

        OperatorKind::TimeParser {
            parse_from,
            layout_type,
            layout,
        } => time_parser_statements(parse_from, *layout_type, layout, marker_check),

        OperatorKind::SeverityParser {
            parse_from,
            mapping,
        } => severity_parser_statements(parse_from, mapping, marker_check),

        OperatorKind::TraceParser {
            trace_id,
            span_id,
            trace_flags,
        } => {
            let mut statements = Vec::new();
            if let Some(sub) = trace_id {
                statements.push(
                    gated(format!(
                        "set(trace_id.string, {})",
                        to_ottl_path(&sub.parse_from)
                    ))
                    .when(wrap_expr(&field_not_nil_check(&sub.parse_from)?)),
                );
            }
            if let Some(sub) = span_id {
                statements.push(
                    gated(format!(
                        "set(span_id.string, {})",
                        to_ottl_path(&sub.parse_from)
                    ))
                    .when(wrap_expr(&field_not_nil_check(&sub.parse_from)?)),
                );
            }
            if let Some(sub) = trace_flags {
                statements.push(
                    gated(format!("set(flags, HexToInt({}))", to_ottl_path(&sub.parse_from)))
                        .when(wrap_expr(&field_not_nil_check(&sub.parse_from)?)),
                );
            }
            Ok(statements)
        }
    }
}

/// `EXPR(...)`-wrapped add values are evaluated expressions, everything else
/// is a literal.
fn as_value_expression(value: &str) -> Option<&str> {
    value
        .strip_prefix("EXPR(")
        .and_then(|rest| rest.strip_suffix(')'))
}

/// `delete_key` takes the containing map and the key separately, so split the
/// target path at its right-most membership access.
fn delete_statement(field: &str, marker_check: &str) -> Result<Statement, CompileError> {
    let ottl_path = to_ottl_path(field);

    let Some(bracket) = ottl_path.rfind('[') else {
        return Err(CompileError::InvalidFieldPath {
            path: field.to_string(),
            reason: "only attributes/resource fields can be deleted".to_string(),
        });
    };
    let target = &ottl_path[..bracket];
    // keep the key's surrounding quotes
    let key = &ottl_path[bracket + 1..ottl_path.len() - 1];

    Ok(Statement::new(format!("delete_key({}, {})", target, key))
        .when(marker_check.to_string())
        .when(wrap_expr(&field_not_nil_check(field)?)))
}

/// JSON parsing goes through scratch cache storage: extract the parsed map,
/// coerce the target into a map if needed, then merge.
fn json_parser_statements(
    op: &Operator,
    parse_from: &str,
    parse_to: &str,
    marker: &str,
    marker_check: &str,
) -> Result<Vec<Statement>, CompileError> {
    // Derived from marker + operator id so recompiling the same pipeline
    // yields an identical config.
    let cache_key = format!("{}-{}", marker, escape_embedded_string(&op.id));
    let cache_ref = format!(r#"cache["{}"]"#, cache_key);

    let from_path = to_ottl_path(parse_from);
    let to_path = to_ottl_path(parse_to);

    let parse_from_check = wrap_expr(&field_not_nil_check(parse_from)?);
    let looks_like_json_object = format!(r#"IsMatch({}, "^\\s*{{.*}}\\s*$")"#, from_path);

    Ok(vec![
        Statement::new(format!("set({}, ParseJSON({}))", cache_ref, from_path))
            .when(marker_check.to_string())
            .when(parse_from_check)
            .when(looks_like_json_object),
        Statement::new(format!(r#"set({}, ParseJSON("{{}}"))"#, to_path))
            .when(marker_check.to_string())
            .when(format!("{} != nil", cache_ref))
            .when(format!("not IsMap({})", to_path)),
        Statement::new(format!(r#"merge_maps({}, {}, "upsert")"#, to_path, cache_ref))
            .when(marker_check.to_string())
            .when(format!("{} != nil", cache_ref)),
    ])
}

fn time_parser_statements(
    parse_from: &str,
    layout_type: TimeLayoutType,
    layout: &str,
    marker_check: &str,
) -> Result<Vec<Statement>, CompileError> {
    let from_path = to_ottl_path(parse_from);
    let parse_from_check = wrap_expr(&field_not_nil_check(parse_from)?);

    match layout_type {
        TimeLayoutType::Strptime => {
            let layout_regex = regex_for_layout(layout)?;
            Ok(vec![Statement::new(format!(
                r#"set(time, Time({}, "{}"))"#,
                from_path,
                escape_embedded_string(layout)
            ))
            .when(marker_check.to_string())
            .when(parse_from_check)
            .when(format!(
                r#"IsMatch({}, "{}")"#,
                from_path,
                escape_embedded_string(&layout_regex)
            ))])
        }

        TimeLayoutType::Epoch => {
            let scale = epoch_scale_factor(layout)?;

            // fractional layouts like `seconds.milliseconds` expect a decimal
            // point in the value
            let value_pattern = if layout.contains('.') {
                r"^\\s*[0-9]+\\.[0-9]+\\s*$"
            } else {
                r"^\\s*[0-9]+\\s*$"
            };
            let numeric_check = wrap_expr(&format!(
                r#"string({}) matches "{}""#,
                parse_from, value_pattern
            ));

            let time_value = match scale {
                1 => format!("Double({})", from_path),
                _ => format!("Double({}) * {}", from_path, scale),
            };

            Ok(vec![Statement::new(format!(
                "set(time_unix_nano, {})",
                time_value
            ))
            .when(marker_check.to_string())
            .when(parse_from_check)
            .when(numeric_check)])
        }
    }
}

/// Multiplier taking an epoch value in the layout's unit to nanoseconds.
fn epoch_scale_factor(layout: &str) -> Result<u64, CompileError> {
    if layout.starts_with("seconds") {
        Ok(1_000_000_000)
    } else if layout == "milliseconds" {
        Ok(1_000_000)
    } else if layout == "microseconds" {
        Ok(1_000)
    } else if layout == "nanoseconds" {
        Ok(1)
    } else {
        Err(CompileError::UnsupportedLayoutType(layout.to_string()))
    }
}

fn severity_parser_statements(
    parse_from: &str,
    mapping: &indexmap::IndexMap<String, Vec<String>>,
    marker_check: &str,
) -> Result<Vec<Statement>, CompileError> {
    let from_path = to_ottl_path(parse_from);
    let parse_from_check = wrap_expr(&field_not_nil_check(parse_from)?);

    let mut statements = Vec::new();

    for (level, values) in mapping {
        let level_upper = level.to_uppercase();

        for value in values {
            let conditions: Vec<String> = if let Some(class_digit) = wildcard_class_digit(value) {
                // 2xx..5xx: numeric value, no fractional part, first digit
                // matching the class
                vec![
                    parse_from_check.clone(),
                    wrap_expr(&format!(
                        r#"type({}) in ["int", "float"] && {} == float(int({}))"#,
                        parse_from, parse_from, parse_from
                    )),
                    wrap_expr(&format!(
                        r#"string(int({})) matches "^{}[0-9]{{2}}$""#,
                        parse_from, class_digit
                    )),
                ]
            } else {
                vec![
                    parse_from_check.clone(),
                    format!("IsString({})", from_path),
                    format!(
                        r#"IsMatch({}, "(?i)^\\s*{}\\s*$")"#,
                        from_path,
                        escape_embedded_string(&regex::escape(value))
                    ),
                ]
            };

            for editor in [
                format!("set(severity_number, SEVERITY_NUMBER_{})", level_upper),
                format!(r#"set(severity_text, "{}")"#, level_upper),
            ] {
                let mut stmt = Statement::new(editor).when(marker_check.to_string());
                for c in &conditions {
                    stmt = stmt.when(c.clone());
                }
                statements.push(stmt);
            }
        }
    }

    Ok(statements)
}

/// `2xx`..`5xx` (any case, surrounding whitespace allowed) selects a numeric
/// wildcard class; returns its leading digit.
fn wildcard_class_digit(value: &str) -> Option<char> {
    let trimmed = value.trim().to_lowercase();
    let mut chars = trimmed.chars();
    let digit = chars.next()?;
    if matches!(digit, '2'..='5') && chars.as_str() == "xx" {
        Some(digit)
    } else {
        None
    }
}
