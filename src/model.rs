use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::filter::FilterSet;

/// A declarative log-transformation pipeline: a boolean filter plus an
/// ordered list of field-level operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    #[serde(default, rename = "orderId")]
    pub order_id: i32,
    pub name: String,
    /// Names the emitted processor. Unique within a deployment.
    pub alias: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    #[serde(default)]
    pub filter: FilterSet,
    #[serde(default)]
    pub operators: Vec<Operator>,
}

impl Pipeline {
    /// The isolation marker value for this pipeline. Derived deterministically
    /// so recompiles of the same pipeline produce identical statements.
    pub fn marker(&self) -> String {
        format!("{}-{}", self.alias, self.id)
    }

    pub fn enabled_operators(&self) -> impl Iterator<Item = &Operator> {
        self.operators.iter().filter(|op| op.enabled)
    }

    /// Validate the pipeline and all of its operators. Must pass before
    /// compilation; violations are caller-side errors, not compiler failures.
    pub fn validate(&self) -> Result<(), CompileError> {
        if self.alias.is_empty() {
            return Err(CompileError::InvalidOperator {
                kind: "pipeline".to_string(),
                reason: "pipeline alias must not be empty".to_string(),
            });
        }
        for op in &self.operators {
            op.validate()
                .map_err(|e| e.in_operator(&op.name).in_pipeline(&self.alias))?;
        }
        Ok(())
    }
}

/// One field-level transformation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: OperatorKind,
}

/// Kind-specific operator configuration. Decoded from the persisted
/// representation by the `type` tag, so each variant carries only the fields
/// relevant to its kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperatorKind {
    Add {
        field: String,
        value: String,
    },
    Remove {
        field: String,
    },
    Copy {
        from: String,
        to: String,
    },
    Move {
        from: String,
        to: String,
    },
    RegexParser {
        parse_from: String,
        parse_to: String,
        regex: String,
    },
    GrokParser {
        parse_from: String,
        parse_to: String,
        pattern: String,
    },
    JsonParser {
        parse_from: String,
        parse_to: String,
    },
    TimeParser {
        parse_from: String,
        layout_type: TimeLayoutType,
        layout: String,
    },
    SeverityParser {
        parse_from: String,
        /// severity level -> values that map to it, in declared order.
        mapping: IndexMap<String, Vec<String>>,
    },
    TraceParser {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trace_id: Option<TraceSubParser>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        span_id: Option<TraceSubParser>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trace_flags: Option<TraceSubParser>,
    },
}

impl OperatorKind {
    /// The persisted `type` tag for this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            OperatorKind::Add { .. } => "add",
            OperatorKind::Remove { .. } => "remove",
            OperatorKind::Copy { .. } => "copy",
            OperatorKind::Move { .. } => "move",
            OperatorKind::RegexParser { .. } => "regex_parser",
            OperatorKind::GrokParser { .. } => "grok_parser",
            OperatorKind::JsonParser { .. } => "json_parser",
            OperatorKind::TimeParser { .. } => "time_parser",
            OperatorKind::SeverityParser { .. } => "severity_parser",
            OperatorKind::TraceParser { .. } => "trace_parser",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeLayoutType {
    Strptime,
    Epoch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSubParser {
    pub parse_from: String,
}

impl Operator {
    pub fn validate(&self) -> Result<(), CompileError> {
        let invalid = |reason: &str| CompileError::InvalidOperator {
            kind: self.kind.tag().to_string(),
            reason: reason.to_string(),
        };

        match &self.kind {
            OperatorKind::Add { field, value } => {
                if field.is_empty() || value.is_empty() {
                    return Err(invalid("field and value are required"));
                }
            }
            OperatorKind::Remove { field } => {
                if field.is_empty() {
                    return Err(invalid("field is required"));
                }
            }
            OperatorKind::Copy { from, to } | OperatorKind::Move { from, to } => {
                if from.is_empty() || to.is_empty() {
                    return Err(invalid("from and to are required"));
                }
            }
            OperatorKind::RegexParser {
                parse_from,
                parse_to,
                regex,
            } => {
                if parse_from.is_empty() || parse_to.is_empty() {
                    return Err(invalid("parse_from and parse_to are required"));
                }
                if regex.is_empty() {
                    return Err(invalid("regex is required"));
                }
            }
            OperatorKind::GrokParser {
                parse_from,
                parse_to,
                pattern,
            } => {
                if parse_from.is_empty() || parse_to.is_empty() {
                    return Err(invalid("parse_from and parse_to are required"));
                }
                if pattern.is_empty() {
                    return Err(invalid("pattern is required"));
                }
            }
            OperatorKind::JsonParser {
                parse_from,
                parse_to,
            } => {
                if parse_from.is_empty() || parse_to.is_empty() {
                    return Err(invalid("parse_from and parse_to are required"));
                }
            }
            OperatorKind::TimeParser {
                parse_from, layout, ..
            } => {
                if parse_from.is_empty() {
                    return Err(invalid("parse_from is required"));
                }
                if layout.is_empty() {
                    return Err(invalid("layout is required"));
                }
            }
            OperatorKind::SeverityParser {
                parse_from,
                mapping,
            } => {
                if parse_from.is_empty() {
                    return Err(invalid("parse_from is required"));
                }
                if mapping.is_empty() {
                    return Err(invalid("severity mapping must not be empty"));
                }
            }
            OperatorKind::TraceParser {
                trace_id,
                span_id,
                trace_flags,
            } => {
                if trace_id.is_none() && span_id.is_none() && trace_flags.is_none() {
                    return Err(invalid(
                        "at least one of trace_id, span_id, trace_flags is required",
                    ));
                }
                for sub in [trace_id, span_id, trace_flags].into_iter().flatten() {
                    if sub.parse_from.is_empty() {
                        return Err(invalid("sub-parser parse_from must not be empty"));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_kind_decoded_by_type_tag() {
        let op: Operator = serde_json::from_str(
            r#"{
                "id": "test-regex-parser",
                "name": "Test regex parser",
                "enabled": true,
                "type": "regex_parser",
                "parse_from": "body",
                "parse_to": "attributes",
                "regex": "PAN: (?P<pan>[a-zA-Z]{5}[0-9]{4}[a-zA-Z]{1}) "
            }"#,
        )
        .unwrap();

        match op.kind {
            OperatorKind::RegexParser { ref parse_from, .. } => {
                assert_eq!(parse_from, "body");
            }
            _ => panic!("expected regex_parser"),
        }
        assert!(op.validate().is_ok());
    }

    #[test]
    fn test_add_requires_field_and_value() {
        let op = Operator {
            id: "add".to_string(),
            name: "add".to_string(),
            enabled: true,
            kind: OperatorKind::Add {
                field: "attributes.test".to_string(),
                value: String::new(),
            },
        };
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_trace_parser_requires_a_subparser() {
        let op = Operator {
            id: "trace".to_string(),
            name: "trace".to_string(),
            enabled: true,
            kind: OperatorKind::TraceParser {
                trace_id: None,
                span_id: None,
                trace_flags: None,
            },
        };
        assert!(op.validate().is_err());
    }

    // An empty parse_from is decodable from persisted YAML/JSON; it must be
    // rejected up front instead of surfacing later as a compile failure.
    #[test]
    fn test_trace_parser_rejects_empty_sub_parser_parse_from() {
        let op = Operator {
            id: "trace".to_string(),
            name: "trace".to_string(),
            enabled: true,
            kind: OperatorKind::TraceParser {
                trace_id: Some(TraceSubParser {
                    parse_from: String::new(),
                }),
                span_id: None,
                trace_flags: None,
            },
        };
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_pipeline_marker_is_stable() {
        let pipeline: Pipeline = serde_yaml::from_str(
            r#"
            id: pipeline-uuid-1
            name: pipeline 1
            alias: pipeline1
            enabled: true
            "#,
        )
        .unwrap();
        assert_eq!(pipeline.marker(), "pipeline1-pipeline-uuid-1");
        assert_eq!(pipeline.marker(), "pipeline1-pipeline-uuid-1");
    }
}
