//! Weaving compiled processors into an existing collector config document.
//!
//! The document is modified in place: the processor table gains/loses the
//! generated entries, and every logs pipeline stage has its processor
//! sequence reconciled against the desired names. Serializing the result
//! back (and any read-modify-write locking around it) is the caller's job.

pub mod reconcile;

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::compiler::CompiledPipelines;
use crate::error::WeaveError;

/// Prefix used by earlier releases for per-pipeline processors. Still
/// recognized as owned so upgrades clean up stale entries.
pub const LEGACY_PIPELINE_PROCESSOR_PREFIX: &str = "logstransform/pipeline_";

/// Whether a processor name was generated by this system and may therefore
/// be removed or repositioned during weaving.
pub fn is_owned_processor(name: &str) -> bool {
    name.starts_with("logweave/") || name.starts_with(LEGACY_PIPELINE_PROCESSOR_PREFIX)
}

/// Weave `compiled` into the collector config `doc`.
///
/// Updates the top-level `processors` table and reconciles the processor
/// sequence of every logs stage under `service.pipelines` (the stage named
/// `logs` and any named `logs/<suffix>`). All shape checks and reconciliation
/// run before the first mutation, so on error the document is untouched.
pub fn weave_pipelines_into_config(
    doc: &mut Value,
    compiled: &CompiledPipelines,
) -> Result<(), WeaveError> {
    let root = doc
        .as_mapping_mut()
        .ok_or_else(|| WeaveError::MalformedConfig("document root is not a mapping".to_string()))?;

    if root
        .get("processors")
        .is_some_and(|table| !table.is_mapping())
    {
        return Err(WeaveError::MalformedConfig(
            "'processors' is not a mapping".to_string(),
        ));
    }

    let stages = logs_stages(root)?;
    if stages.is_empty() && !compiled.names.is_empty() {
        return Err(WeaveError::MalformedConfig(
            "no logs pipeline stage under service.pipelines".to_string(),
        ));
    }

    let mut reconciled: Vec<(String, Vec<String>)> = Vec::with_capacity(stages.len());
    for (stage, current) in &stages {
        let merged = reconcile::reconcile(current, &compiled.names, is_owned_processor)?;
        reconciled.push((stage.clone(), merged));
    }

    update_processor_table(root, compiled);

    for (stage, merged) in reconciled {
        debug!(stage = %stage, processors = merged.len(), "reconciled logs stage");
        write_stage_processors(root, &stage, merged);
    }

    Ok(())
}

/// Remove owned processors that are no longer desired and upsert every
/// desired definition. Unowned entries and their order are untouched. The
/// table's shape has been checked by the caller.
fn update_processor_table(root: &mut Mapping, compiled: &CompiledPipelines) {
    if !root.contains_key("processors") {
        root.insert(
            Value::String("processors".to_string()),
            Value::Mapping(Mapping::new()),
        );
    }
    let Some(table) = root.get_mut("processors").and_then(Value::as_mapping_mut) else {
        return;
    };

    let stale: Vec<Value> = table
        .keys()
        .filter(|key| {
            key.as_str()
                .is_some_and(|name| is_owned_processor(name) && !compiled.processors.contains_key(name))
        })
        .cloned()
        .collect();
    for key in stale {
        debug!(processor = ?key, "removing stale generated processor");
        table.remove(&key);
    }

    for (name, definition) in &compiled.processors {
        table.insert(Value::String(name.clone()), definition.clone());
    }
}

/// Collect the name and current processor sequence of every logs stage.
fn logs_stages(root: &Mapping) -> Result<Vec<(String, Vec<String>)>, WeaveError> {
    let Some(service) = root.get("service") else {
        return Ok(Vec::new());
    };
    let Some(pipelines) = service.get("pipelines") else {
        return Ok(Vec::new());
    };
    let pipelines = pipelines.as_mapping().ok_or_else(|| {
        WeaveError::MalformedConfig("'service.pipelines' is not a mapping".to_string())
    })?;

    let mut stages = Vec::new();
    for (key, stage) in pipelines {
        let Some(name) = key.as_str() else { continue };
        if name != "logs" && !name.starts_with("logs/") {
            continue;
        }
        if !stage.is_mapping() {
            return Err(WeaveError::MalformedConfig(format!(
                "stage '{name}' is not a mapping"
            )));
        }

        let current = match stage.get("processors") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(seq)) => seq
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        WeaveError::MalformedConfig(format!(
                            "stage '{name}' has a non-string processor entry"
                        ))
                    })
                })
                .collect::<Result<Vec<String>, WeaveError>>()?,
            Some(_) => {
                return Err(WeaveError::MalformedConfig(format!(
                    "stage '{name}' processors is not a list"
                )))
            }
        };
        stages.push((name.to_string(), current));
    }
    Ok(stages)
}

// Stage shape has been checked by logs_stages.
fn write_stage_processors(root: &mut Mapping, stage: &str, processors: Vec<String>) {
    let sequence = Value::Sequence(processors.into_iter().map(Value::String).collect());
    if let Some(target) = root
        .get_mut("service")
        .and_then(|v| v.get_mut("pipelines"))
        .and_then(|v| v.get_mut(stage))
        .and_then(Value::as_mapping_mut)
    {
        target.insert(Value::String("processors".to_string()), sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn compiled(names: &[&str]) -> CompiledPipelines {
        let mut processors = IndexMap::new();
        for name in names {
            let mut def = Mapping::new();
            def.insert(
                Value::String("operators".to_string()),
                Value::Sequence(Vec::new()),
            );
            processors.insert(name.to_string(), Value::Mapping(def));
        }
        CompiledPipelines {
            processors,
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    fn base_config() -> Value {
        serde_yaml::from_str(
            r#"
receivers:
  otlp:
    protocols:
      grpc: {}
processors:
  memory_limiter:
    check_interval: 1s
  batch:
    send_batch_size: 10000
service:
  pipelines:
    logs:
      receivers: [otlp]
      processors: [memory_limiter, batch]
      exporters: [otlp]
    metrics:
      receivers: [otlp]
      processors: [batch]
      exporters: [otlp]
"#,
        )
        .unwrap()
    }

    fn stage_processors(doc: &Value, stage: &str) -> Vec<String> {
        doc.get("service")
            .and_then(|v| v.get("pipelines"))
            .and_then(|v| v.get(stage))
            .and_then(|v| v.get("processors"))
            .and_then(Value::as_sequence)
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_weave_inserts_processors_and_updates_logs_stage() {
        let mut doc = base_config();
        weave_pipelines_into_config(&mut doc, &compiled(&["logweave/pipeline_a"])).unwrap();

        assert!(doc
            .get("processors")
            .and_then(|t| t.get("logweave/pipeline_a"))
            .is_some());
        assert_eq!(
            stage_processors(&doc, "logs"),
            vec!["logweave/pipeline_a", "memory_limiter", "batch"]
        );
    }

    #[test]
    fn test_weave_leaves_non_logs_stages_alone() {
        let mut doc = base_config();
        weave_pipelines_into_config(&mut doc, &compiled(&["logweave/pipeline_a"])).unwrap();
        assert_eq!(stage_processors(&doc, "metrics"), vec!["batch"]);
    }

    #[test]
    fn test_weave_removes_stale_owned_processors() {
        let mut doc = base_config();
        weave_pipelines_into_config(&mut doc, &compiled(&["logweave/pipeline_old"])).unwrap();
        weave_pipelines_into_config(&mut doc, &compiled(&["logweave/pipeline_new"])).unwrap();

        let table = doc.get("processors").unwrap();
        assert!(table.get("logweave/pipeline_old").is_none());
        assert!(table.get("logweave/pipeline_new").is_some());
        assert!(table.get("memory_limiter").is_some());
        assert_eq!(
            stage_processors(&doc, "logs"),
            vec!["logweave/pipeline_new", "memory_limiter", "batch"]
        );
    }

    #[test]
    fn test_weave_removes_legacy_prefixed_processors() {
        let mut doc: Value = serde_yaml::from_str(
            r#"
processors:
  logstransform/pipeline_old: {}
  batch: {}
service:
  pipelines:
    logs:
      processors: [logstransform/pipeline_old, batch]
"#,
        )
        .unwrap();
        weave_pipelines_into_config(&mut doc, &compiled(&["logweave/pipeline_a"])).unwrap();

        assert!(doc
            .get("processors")
            .unwrap()
            .get("logstransform/pipeline_old")
            .is_none());
        assert_eq!(
            stage_processors(&doc, "logs"),
            vec!["logweave/pipeline_a", "batch"]
        );
    }

    #[test]
    fn test_weave_applies_to_every_logs_stage() {
        let mut doc: Value = serde_yaml::from_str(
            r#"
processors:
  batch: {}
service:
  pipelines:
    logs:
      processors: [batch]
    logs/other:
      processors: [batch]
"#,
        )
        .unwrap();
        weave_pipelines_into_config(&mut doc, &compiled(&["logweave/pipelines"])).unwrap();
        assert_eq!(
            stage_processors(&doc, "logs"),
            vec!["logweave/pipelines", "batch"]
        );
        assert_eq!(
            stage_processors(&doc, "logs/other"),
            vec!["logweave/pipelines", "batch"]
        );
    }

    #[test]
    fn test_weave_without_logs_stage_fails_when_processors_desired() {
        let mut doc: Value = serde_yaml::from_str("service:\n  pipelines:\n    metrics: {}\n").unwrap();
        let err =
            weave_pipelines_into_config(&mut doc, &compiled(&["logweave/pipeline_a"])).unwrap_err();
        assert!(matches!(err, WeaveError::MalformedConfig(_)));
    }

    #[test]
    fn test_weave_with_nothing_desired_still_cleans_up() {
        let mut doc: Value = serde_yaml::from_str(
            r#"
processors:
  logweave/pipeline_gone: {}
  batch: {}
service:
  pipelines:
    logs:
      processors: [logweave/pipeline_gone, batch]
"#,
        )
        .unwrap();
        weave_pipelines_into_config(&mut doc, &compiled(&[])).unwrap();
        assert!(doc
            .get("processors")
            .unwrap()
            .get("logweave/pipeline_gone")
            .is_none());
        assert_eq!(stage_processors(&doc, "logs"), vec!["batch"]);
    }

    #[test]
    fn test_reconcile_failure_leaves_document_untouched() {
        let mut doc: Value = serde_yaml::from_str(
            r#"
processors:
  batch: {}
service:
  pipelines:
    logs:
      processors: [processor1, batch, processor1]
"#,
        )
        .unwrap();
        let before = serde_yaml::to_string(&doc).unwrap();

        let err =
            weave_pipelines_into_config(&mut doc, &compiled(&["logweave/pipeline_a"])).unwrap_err();
        assert!(matches!(
            err,
            WeaveError::InconsistentProcessorSequence { .. }
        ));
        assert_eq!(serde_yaml::to_string(&doc).unwrap(), before);
    }

    #[test]
    fn test_malformed_stage_leaves_document_untouched() {
        let mut doc: Value = serde_yaml::from_str(
            r#"
processors:
  logweave/pipeline_stale: {}
service:
  pipelines:
    logs: ~
    logs/other:
      processors: [batch]
"#,
        )
        .unwrap();
        let before = serde_yaml::to_string(&doc).unwrap();

        let err =
            weave_pipelines_into_config(&mut doc, &compiled(&["logweave/pipeline_a"])).unwrap_err();
        assert!(matches!(err, WeaveError::MalformedConfig(_)));
        // the stale owned processor was not removed and no stage was rewritten
        assert_eq!(serde_yaml::to_string(&doc).unwrap(), before);
    }

    #[test]
    fn test_weave_rejects_non_mapping_root() {
        let mut doc = Value::Sequence(Vec::new());
        let err = weave_pipelines_into_config(&mut doc, &compiled(&[])).unwrap_err();
        assert!(matches!(err, WeaveError::MalformedConfig(_)));
    }

    #[test]
    fn test_weave_rejects_non_string_processor_entry() {
        let mut doc: Value = serde_yaml::from_str(
            "service:\n  pipelines:\n    logs:\n      processors: [batch, 42]\n",
        )
        .unwrap();
        let err =
            weave_pipelines_into_config(&mut doc, &compiled(&["logweave/pipeline_a"])).unwrap_err();
        assert!(matches!(err, WeaveError::MalformedConfig(_)));
    }
}
