//! Per-pipeline strategy: each pipeline compiles into its own processor
//! containing a routing operator, the enabled operators linked into a chain,
//! and a terminal no-op.
//!
//! The router dispatches a record into the chain only when the pipeline
//! filter matches; everything else falls through to the no-op.

use serde_yaml::{Mapping, Value};

use crate::error::CompileError;
use crate::model::{Operator, OperatorKind, Pipeline};
use crate::ottl::expr::{field_not_nil_check, fields_referenced_not_nil_check};

pub const ROUTER_OPERATOR_ID: &str = "router_logweave";
pub const NOOP_OPERATOR_ID: &str = "noop";

fn put(map: &mut Mapping, key: &str, value: Value) {
    map.insert(Value::String(key.to_string()), value);
}

fn s(text: &str) -> Value {
    Value::String(text.to_string())
}

/// Compile one pipeline into an operator-chain processor definition, or
/// `None` when the pipeline has no enabled operators.
pub fn processor_for_pipeline(pipeline: &Pipeline) -> Result<Option<Value>, CompileError> {
    let enabled: Vec<&Operator> = pipeline.enabled_operators().collect();
    if enabled.is_empty() {
        return Ok(None);
    }

    let filter_expr = pipeline.filter.to_expression()?;
    let route_expr = if filter_expr.is_empty() {
        "true".to_string()
    } else {
        filter_expr
    };

    let mut operators: Vec<Value> = Vec::with_capacity(enabled.len() + 2);

    let mut route = Mapping::new();
    put(&mut route, "output", s(&enabled[0].id));
    put(&mut route, "expr", s(&route_expr));
    let mut router = Mapping::new();
    put(&mut router, "id", s(ROUTER_OPERATOR_ID));
    put(&mut router, "type", s("router"));
    put(&mut router, "routes", Value::Sequence(vec![Value::Mapping(route)]));
    put(&mut router, "default", s(NOOP_OPERATOR_ID));
    operators.push(Value::Mapping(router));

    for (i, op) in enabled.iter().enumerate() {
        let mut config = operator_config(op).map_err(|e| e.in_operator(&op.name))?;
        let next = enabled
            .get(i + 1)
            .map(|next_op| next_op.id.as_str())
            .unwrap_or(NOOP_OPERATOR_ID);
        put(&mut config, "output", s(next));
        operators.push(Value::Mapping(config));
    }

    let mut noop = Mapping::new();
    put(&mut noop, "id", s(NOOP_OPERATOR_ID));
    put(&mut noop, "type", s("noop"));
    operators.push(Value::Mapping(noop));

    let mut processor = Mapping::new();
    put(&mut processor, "operators", Value::Sequence(operators));
    Ok(Some(Value::Mapping(processor)))
}

/// Stanza-style configuration for one operator, guarded with an `if` clause
/// wherever a missing input would make the operator log a warning.
fn operator_config(op: &Operator) -> Result<Mapping, CompileError> {
    let mut config = Mapping::new();
    put(&mut config, "id", s(&op.id));
    put(&mut config, "type", s(op.kind.tag()));

    match &op.kind {
        OperatorKind::Add { field, value } => {
            put(&mut config, "field", s(field));
            put(&mut config, "value", s(value));
            if let Some(expression) = value
                .strip_prefix("EXPR(")
                .and_then(|rest| rest.strip_suffix(')'))
            {
                let refs_check = fields_referenced_not_nil_check(expression)?;
                if !refs_check.is_empty() {
                    put(&mut config, "if", s(&refs_check));
                }
            }
        }
        OperatorKind::Remove { field } => {
            put(&mut config, "field", s(field));
            put(&mut config, "if", s(&field_not_nil_check(field)?));
        }
        OperatorKind::Copy { from, to } => {
            put(&mut config, "from", s(from));
            put(&mut config, "to", s(to));
        }
        OperatorKind::Move { from, to } => {
            put(&mut config, "from", s(from));
            put(&mut config, "to", s(to));
            put(&mut config, "if", s(&field_not_nil_check(from)?));
        }
        OperatorKind::RegexParser {
            parse_from,
            parse_to,
            regex,
        } => {
            put(&mut config, "parse_from", s(parse_from));
            put(&mut config, "parse_to", s(parse_to));
            put(&mut config, "regex", s(regex));
            put(&mut config, "if", s(&field_not_nil_check(parse_from)?));
        }
        OperatorKind::GrokParser {
            parse_from,
            parse_to,
            pattern,
        } => {
            put(&mut config, "parse_from", s(parse_from));
            put(&mut config, "parse_to", s(parse_to));
            put(&mut config, "pattern", s(pattern));
            put(&mut config, "if", s(&field_not_nil_check(parse_from)?));
        }
        OperatorKind::JsonParser {
            parse_from,
            parse_to,
        } => {
            put(&mut config, "parse_from", s(parse_from));
            put(&mut config, "parse_to", s(parse_to));
            put(
                &mut config,
                "if",
                s(&format!(
                    r#"{} && string({}) matches "^\\s*{{.*}}\\s*$""#,
                    field_not_nil_check(parse_from)?,
                    parse_from
                )),
            );
        }
        OperatorKind::TimeParser {
            parse_from,
            layout_type,
            layout,
        } => {
            put(&mut config, "parse_from", s(parse_from));
            put(
                &mut config,
                "layout_type",
                serde_yaml::to_value(layout_type).unwrap_or(Value::Null),
            );
            put(&mut config, "layout", s(layout));
            put(&mut config, "if", s(&field_not_nil_check(parse_from)?));
        }
        OperatorKind::SeverityParser {
            parse_from,
            mapping,
        } => {
            put(&mut config, "parse_from", s(parse_from));
            let mut levels = Mapping::new();
            for (level, values) in mapping {
                put(
                    &mut levels,
                    level,
                    Value::Sequence(values.iter().map(|v| s(v)).collect()),
                );
            }
            put(&mut config, "mapping", Value::Mapping(levels));
            put(&mut config, "if", s(&field_not_nil_check(parse_from)?));
        }
        OperatorKind::TraceParser {
            trace_id,
            span_id,
            trace_flags,
        } => {
            for (key, sub) in [
                ("trace_id", trace_id),
                ("span_id", span_id),
                ("trace_flags", trace_flags),
            ] {
                if let Some(sub) = sub {
                    let mut sub_config = Mapping::new();
                    put(&mut sub_config, "parse_from", s(&sub.parse_from));
                    put(&mut config, key, Value::Mapping(sub_config));
                }
            }
        }
    }

    Ok(config)
}
