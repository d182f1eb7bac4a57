//! Translation of a pre-parsed filter tree into the statement engine's
//! boolean expression dialect.
//!
//! Parsing filter query strings into this tree is a collaborator's job; the
//! tree arrives already validated.

use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::ottl::expr::escape_embedded_string;

/// Boolean tree of attribute comparisons.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default)]
    pub operator: FilterCombinator,
    #[serde(default)]
    pub items: Vec<FilterItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterCombinator {
    #[default]
    #[serde(alias = "and")]
    And,
    #[serde(alias = "or")]
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterItem {
    pub key: FilterKey,
    #[serde(rename = "op")]
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterKey {
    pub key: String,
    #[serde(default)]
    pub scope: FieldScope,
}

/// Which part of the log record a filter key addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldScope {
    #[default]
    Attribute,
    Resource,
    /// Fixed top-level record fields like `body`.
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "ncontains")]
    NotContains,
    #[serde(rename = "regex")]
    Regex,
    #[serde(rename = "nregex")]
    NotRegex,
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "nexists")]
    NotExists,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "nin")]
    NotIn,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Translate the tree into a boolean expression, or an empty string for an
    /// empty filter (meaning "match every record").
    pub fn to_expression(&self) -> Result<String, CompileError> {
        if self.items.is_empty() {
            return Ok(String::new());
        }

        let joiner = match self.operator {
            FilterCombinator::And => " and ",
            FilterCombinator::Or => " or ",
        };

        let parts = self
            .items
            .iter()
            .map(translate_item)
            .collect::<Result<Vec<_>, _>>()?;

        if parts.len() == 1 {
            Ok(parts.into_iter().next().unwrap_or_default())
        } else {
            Ok(parts
                .iter()
                .map(|p| format!("({})", p))
                .collect::<Vec<_>>()
                .join(joiner))
        }
    }
}

impl FilterKey {
    /// The expression-language accessor for this key.
    fn accessor(&self) -> String {
        match self.scope {
            FieldScope::Attribute => format!(r#"attributes["{}"]"#, escape_embedded_string(&self.key)),
            FieldScope::Resource => format!(r#"resource["{}"]"#, escape_embedded_string(&self.key)),
            FieldScope::Record => self.key.clone(),
        }
    }
}

fn translate_item(item: &FilterItem) -> Result<String, CompileError> {
    let path = item.key.accessor();

    // String membership and pattern operators are guarded with a nil check so
    // records missing the attribute don't produce evaluation warnings in the
    // collector.
    let expr = match item.operator {
        FilterOperator::Exists => format!("{} != nil", path),
        FilterOperator::NotExists => format!("{} == nil", path),
        FilterOperator::Eq => format!("{} == {}", path, literal(&item.value)?),
        FilterOperator::Neq => format!("{} != {}", path, literal(&item.value)?),
        FilterOperator::Lt => format!("{} != nil && {} < {}", path, path, literal(&item.value)?),
        FilterOperator::Lte => format!("{} != nil && {} <= {}", path, path, literal(&item.value)?),
        FilterOperator::Gt => format!("{} != nil && {} > {}", path, path, literal(&item.value)?),
        FilterOperator::Gte => format!("{} != nil && {} >= {}", path, path, literal(&item.value)?),
        // contains/ncontains are case insensitive, matching how stored logs
        // are queried.
        FilterOperator::Contains => format!(
            "{} != nil && lower({}) contains lower({})",
            path,
            path,
            literal(&item.value)?
        ),
        FilterOperator::NotContains => format!(
            "{} != nil && not (lower({}) contains lower({}))",
            path,
            path,
            literal(&item.value)?
        ),
        FilterOperator::Regex => format!(
            "{} != nil && {} matches {}",
            path,
            path,
            literal(&item.value)?
        ),
        FilterOperator::NotRegex => format!(
            "{} != nil && not ({} matches {})",
            path,
            path,
            literal(&item.value)?
        ),
        FilterOperator::In => format!("{} in {}", path, list_literal(&item.value)?),
        FilterOperator::NotIn => format!("not ({} in {})", path, list_literal(&item.value)?),
    };

    Ok(expr)
}

fn literal(value: &serde_json::Value) -> Result<String, CompileError> {
    match value {
        serde_json::Value::String(s) => Ok(format!(r#""{}""#, escape_embedded_string(s))),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        serde_json::Value::Null => Ok("nil".to_string()),
        other => Err(CompileError::FilterTranslation(format!(
            "unsupported filter literal: {}",
            other
        ))),
    }
}

fn list_literal(value: &serde_json::Value) -> Result<String, CompileError> {
    let items = value.as_array().ok_or_else(|| {
        CompileError::FilterTranslation("'in' filter requires a list value".to_string())
    })?;
    let rendered = items.iter().map(literal).collect::<Result<Vec<_>, _>>()?;
    Ok(format!("[{}]", rendered.join(", ")))
}
