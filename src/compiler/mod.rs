//! Compilation of pipelines into named collector processor definitions.

pub mod chain;
pub mod unified;

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::CompileError;
use crate::model::Pipeline;

/// Name of the single shared processor emitted by the unified strategy.
pub const UNIFIED_PROCESSOR_NAME: &str = "logweave/pipelines";

/// Name prefix of processors emitted by the per-pipeline strategy.
pub const PIPELINE_PROCESSOR_PREFIX: &str = "logweave/pipeline_";

/// How compiled pipelines are packaged into processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// All pipelines share one transform processor holding every statement;
    /// each pipeline's statements are scoped by its isolation marker.
    Unified,
    /// One routed operator-chain processor per pipeline. Requires full
    /// sequence reconciliation when weaving, since it contributes one
    /// distinctly named processor per pipeline.
    PerPipeline,
}

/// Compiled output: processor name -> definition, plus the order in which the
/// processors must appear in a collector pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct CompiledPipelines {
    pub processors: IndexMap<String, Value>,
    pub names: Vec<String>,
}

/// Compile every enabled pipeline, in declared order.
///
/// Validation runs first so shape errors surface before any compilation
/// output exists; a compile error in any pipeline fails the whole call.
pub fn compile_pipelines(
    pipelines: &[Pipeline],
    strategy: Strategy,
) -> Result<CompiledPipelines, CompileError> {
    for pipeline in pipelines {
        pipeline.validate()?;
    }

    let enabled: Vec<&Pipeline> = pipelines.iter().filter(|p| p.enabled).collect();

    let mut compiled = CompiledPipelines::default();

    match strategy {
        Strategy::Unified => {
            let mut statements: Vec<String> = Vec::new();
            for pipeline in &enabled {
                let pipeline_statements = unified::statements_for_pipeline(pipeline)
                    .map_err(|e| e.in_pipeline(&pipeline.alias))?;
                debug!(
                    pipeline = %pipeline.alias,
                    statements = pipeline_statements.len(),
                    "compiled pipeline statements"
                );
                statements.extend(pipeline_statements);
            }

            if !statements.is_empty() {
                compiled
                    .processors
                    .insert(UNIFIED_PROCESSOR_NAME.to_string(), transform_processor(statements));
                compiled.names.push(UNIFIED_PROCESSOR_NAME.to_string());
            }
        }

        Strategy::PerPipeline => {
            for pipeline in &enabled {
                let Some(definition) = chain::processor_for_pipeline(pipeline)
                    .map_err(|e| e.in_pipeline(&pipeline.alias))?
                else {
                    continue;
                };

                // Aliases are unique per deployment; if a caller violates
                // that, disambiguate with the pipeline id rather than
                // silently overwriting a processor.
                let mut name = format!("{}{}", PIPELINE_PROCESSOR_PREFIX, pipeline.alias);
                if compiled.processors.contains_key(&name) {
                    name = format!("{}{}-{}", PIPELINE_PROCESSOR_PREFIX, pipeline.alias, pipeline.id);
                }

                debug!(pipeline = %pipeline.alias, processor = %name, "compiled pipeline processor");
                compiled.processors.insert(name.clone(), definition);
                compiled.names.push(name);
            }
        }
    }

    Ok(compiled)
}

/// Definition of the shared transform processor for the unified strategy.
fn transform_processor(statements: Vec<String>) -> Value {
    let mut context = Mapping::new();
    context.insert(
        Value::String("context".to_string()),
        Value::String("log".to_string()),
    );
    context.insert(
        Value::String("statements".to_string()),
        Value::Sequence(statements.into_iter().map(Value::String).collect()),
    );

    let mut definition = Mapping::new();
    definition.insert(
        Value::String("error_mode".to_string()),
        Value::String("ignore".to_string()),
    );
    definition.insert(
        Value::String("log_statements".to_string()),
        Value::Sequence(vec![Value::Mapping(context)]),
    );

    Value::Mapping(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterSet;
    use crate::model::{Operator, OperatorKind, TraceSubParser};

    fn pipeline(alias: &str, id: &str, enabled: bool) -> Pipeline {
        Pipeline {
            id: id.to_string(),
            order_id: 1,
            name: alias.to_string(),
            alias: alias.to_string(),
            description: String::new(),
            enabled,
            filter: FilterSet::default(),
            operators: vec![Operator {
                id: "add".to_string(),
                name: "add".to_string(),
                enabled: true,
                kind: OperatorKind::Add {
                    field: "attributes.test".to_string(),
                    value: "val".to_string(),
                },
            }],
        }
    }

    #[test]
    fn test_unified_strategy_emits_at_most_one_processor() {
        let pipelines = vec![pipeline("a", "1", true), pipeline("b", "2", true)];
        let compiled = compile_pipelines(&pipelines, Strategy::Unified).unwrap();
        assert_eq!(compiled.names, vec![UNIFIED_PROCESSOR_NAME.to_string()]);
        assert_eq!(compiled.processors.len(), 1);

        let definition = &compiled.processors[UNIFIED_PROCESSOR_NAME];
        assert_eq!(
            definition.get("error_mode").and_then(Value::as_str),
            Some("ignore")
        );
        let statements = definition
            .get("log_statements")
            .and_then(Value::as_sequence)
            .and_then(|s| s[0].get("statements"))
            .and_then(Value::as_sequence)
            .unwrap();
        // 3 statements per pipeline (marker set, add, marker clear)
        assert_eq!(statements.len(), 6);
    }

    #[test]
    fn test_unified_strategy_with_no_enabled_pipelines_emits_nothing() {
        let pipelines = vec![pipeline("a", "1", false)];
        let compiled = compile_pipelines(&pipelines, Strategy::Unified).unwrap();
        assert!(compiled.names.is_empty());
        assert!(compiled.processors.is_empty());
    }

    #[test]
    fn test_per_pipeline_strategy_names_follow_declared_order() {
        let pipelines = vec![
            pipeline("b", "2", true),
            pipeline("a", "1", false),
            pipeline("c", "3", true),
        ];
        let compiled = compile_pipelines(&pipelines, Strategy::PerPipeline).unwrap();
        assert_eq!(
            compiled.names,
            vec![
                "logweave/pipeline_b".to_string(),
                "logweave/pipeline_c".to_string()
            ]
        );
        assert_eq!(compiled.processors.len(), 2);
    }

    #[test]
    fn test_alias_collisions_do_not_drop_processors() {
        let pipelines = vec![pipeline("same", "1", true), pipeline("same", "2", true)];
        let compiled = compile_pipelines(&pipelines, Strategy::PerPipeline).unwrap();
        assert_eq!(compiled.processors.len(), 2);
        assert_eq!(compiled.names[0], "logweave/pipeline_same");
        assert_eq!(compiled.names[1], "logweave/pipeline_same-2");
    }

    #[test]
    fn test_compile_error_carries_pipeline_context() {
        let mut bad = pipeline("broken", "1", true);
        bad.operators[0].kind = OperatorKind::TimeParser {
            parse_from: "attributes.ts".to_string(),
            layout_type: crate::model::TimeLayoutType::Strptime,
            layout: "%Q".to_string(),
        };
        let err = compile_pipelines(&[bad], Strategy::Unified).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("broken"), "missing pipeline alias: {message}");
    }

    #[test]
    fn test_empty_trace_sub_parser_is_a_validation_error() {
        let mut bad = pipeline("traced", "1", true);
        bad.operators[0].kind = OperatorKind::TraceParser {
            trace_id: Some(TraceSubParser {
                parse_from: String::new(),
            }),
            span_id: None,
            trace_flags: None,
        };
        let err = compile_pipelines(&[bad], Strategy::Unified).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("invalid trace_parser"), "{message}");
        assert!(!message.contains("field path"), "{message}");
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let pipelines = vec![pipeline("a", "1", true), pipeline("b", "2", true)];
        let first = compile_pipelines(&pipelines, Strategy::Unified).unwrap();
        let second = compile_pipelines(&pipelines, Strategy::Unified).unwrap();
        assert_eq!(first.names, second.names);
        assert_eq!(
            serde_yaml::to_string(&first.processors[UNIFIED_PROCESSOR_NAME]).unwrap(),
            serde_yaml::to_string(&second.processors[UNIFIED_PROCESSOR_NAME]).unwrap()
        );
    }
}
