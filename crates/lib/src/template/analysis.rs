//! # Structural Analysis
//!
//! Infers a type template from an example JSON object pasted into the
//! Add-metric form. Objects nested one level deep produce a read-only
//! *complex* structure; flat objects produce an editable parameter list that
//! is wrapped into a single `General` sub-group when finalized.

use super::{FieldType, SubGroup, TemplateField, TypeTemplate};
use crate::constants::GENERAL_GROUP;
use crate::errors::{EvalError, ValidationError};
use serde_json::{Map, Value};
use tracing::warn;

const TYPE_NAMES: [&str; 4] = ["Boolean", "Text", "Count", "List"];

/// Types a sample value by its runtime JSON type.
///
/// Strings default to a free List unless they already name a type or use the
/// `List [...]` form.
pub fn type_from_value(value: &Value) -> FieldType {
    match value {
        Value::String(s) => {
            if FieldType::is_list_literal(s) || TYPE_NAMES.contains(&s.as_str()) {
                FieldType::parse(s).unwrap_or(FieldType::List(Vec::new()))
            } else {
                FieldType::List(Vec::new())
            }
        }
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(_) => FieldType::Count,
        Value::Array(items) => {
            let joined = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            FieldType::parse(&format!("List [{joined}]")).unwrap_or(FieldType::List(Vec::new()))
        }
        _ => FieldType::List(Vec::new()),
    }
}

/// The user-selectable type of a simple-structure parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Boolean,
    Count,
    Text,
    List,
}

/// One editable parameter of a simple structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftParam {
    pub key: String,
    pub kind: ParamKind,
    /// Options of the list builder; kept when the kind changes so switching back restores them.
    pub options: Vec<String>,
}

impl DraftParam {
    pub fn new(key: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            key: key.into(),
            kind,
            options: Vec::new(),
        }
    }

    fn from_field_type(key: &str, field_type: FieldType) -> Self {
        let (kind, options) = match field_type {
            FieldType::Boolean => (ParamKind::Boolean, Vec::new()),
            FieldType::Count => (ParamKind::Count, Vec::new()),
            FieldType::Text => (ParamKind::Text, Vec::new()),
            FieldType::List(options) => (ParamKind::List, options),
        };
        Self {
            key: key.to_string(),
            kind,
            options,
        }
    }

    /// Adds a list option; blank input is ignored.
    pub fn add_option(&mut self, option: &str) {
        let option = option.trim();
        if !option.is_empty() {
            self.options.push(option.to_string());
        }
    }

    pub fn remove_option(&mut self, index: usize) {
        if index < self.options.len() {
            self.options.remove(index);
        }
    }
}

/// The outcome of analysing a sample object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureAnalysis {
    /// Nested sample; the structure is read-only.
    Complex(TypeTemplate),
    /// Flat sample; parameters may be edited before finalizing.
    Simple(Vec<DraftParam>),
}

impl StructureAnalysis {
    pub fn is_complex(&self) -> bool {
        matches!(self, StructureAnalysis::Complex(_))
    }

    /// Produces the template to submit. `metric_name` names the metric in error messages.
    pub fn finalize(&self, metric_name: &str) -> Result<TypeTemplate, EvalError> {
        match self {
            StructureAnalysis::Complex(template) => Ok(template.clone()),
            StructureAnalysis::Simple(params) => {
                let mut fields = Vec::new();
                for param in params {
                    let key = param.key.trim();
                    if key.is_empty() {
                        continue;
                    }
                    let field_type = match param.kind {
                        ParamKind::Boolean => FieldType::Boolean,
                        ParamKind::Count => FieldType::Count,
                        ParamKind::Text => FieldType::Text,
                        ParamKind::List => {
                            if param.options.is_empty() {
                                return Err(
                                    ValidationError::MissingListOptions(key.to_string()).into()
                                );
                            }
                            FieldType::List(param.options.clone())
                        }
                    };
                    fields.push(TemplateField {
                        name: key.to_string(),
                        field_type,
                    });
                }
                if fields.is_empty() {
                    return Err(ValidationError::EmptyParameters(metric_name.to_string()).into());
                }
                TypeTemplate::new(vec![SubGroup {
                    name: GENERAL_GROUP.to_string(),
                    fields,
                }])
            }
        }
    }
}

/// Infers a structure from a sample object.
pub fn analyze_structure(sample: &Map<String, Value>) -> Result<StructureAnalysis, EvalError> {
    let is_complex = sample.values().any(Value::is_object);

    if !is_complex {
        let params = sample
            .iter()
            .map(|(key, value)| DraftParam::from_field_type(key, type_from_value(value)))
            .collect();
        return Ok(StructureAnalysis::Simple(params));
    }

    let mut groups: Vec<SubGroup> = Vec::new();
    for (key, value) in sample {
        match value {
            Value::Object(props) => {
                if props.is_empty() {
                    warn!("Skipping empty sub-group '{key}' in template sample");
                    continue;
                }
                groups.push(SubGroup {
                    name: key.clone(),
                    fields: props
                        .iter()
                        .map(|(name, v)| TemplateField {
                            name: name.clone(),
                            field_type: type_from_value(v),
                        })
                        .collect(),
                });
            }
            other => {
                let field = TemplateField {
                    name: key.clone(),
                    field_type: type_from_value(other),
                };
                match groups.iter_mut().find(|g| g.name == GENERAL_GROUP) {
                    Some(general) => general.fields.push(field),
                    None => groups.push(SubGroup {
                        name: GENERAL_GROUP.to_string(),
                        fields: vec![field],
                    }),
                }
            }
        }
    }

    Ok(StructureAnalysis::Complex(TypeTemplate::new(groups)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn types_values_by_runtime_type() {
        assert_eq!(type_from_value(&json!(true)), FieldType::Boolean);
        assert_eq!(type_from_value(&json!(3)), FieldType::Count);
        assert_eq!(type_from_value(&json!("hello")), FieldType::List(vec![]));
        assert_eq!(type_from_value(&json!("Text")), FieldType::Text);
        assert_eq!(
            type_from_value(&json!("list [a, b]")),
            FieldType::List(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            type_from_value(&json!(["x", 2])),
            FieldType::List(vec!["x".to_string(), "2".to_string()])
        );
        assert_eq!(type_from_value(&json!(null)), FieldType::List(vec![]));
    }

    #[test]
    fn nested_sample_is_complex() {
        let sample = object(json!({
            "Request_Service": {
                "Supposed_To_Be_Called": true,
                "numberTimes_Supposed_To_Be_Called": 2
            },
            "Note": "free"
        }));
        let analysis = analyze_structure(&sample).unwrap();
        let StructureAnalysis::Complex(template) = &analysis else {
            panic!("expected a complex structure");
        };
        assert_eq!(
            template.to_json_string(),
            r#"{"Request_Service":{"Supposed_To_Be_Called":"Boolean","numberTimes_Supposed_To_Be_Called":"Count"},"General":{"Note":"List"}}"#
        );
        assert_eq!(analysis.finalize("x").unwrap(), *template);
    }

    #[test]
    fn flat_sample_is_simple_and_finalizes_under_general() {
        let sample = object(json!({"greeted": false, "tone": ["Calm", "Angry"]}));
        let mut analysis = analyze_structure(&sample).unwrap();
        assert!(!analysis.is_complex());

        if let StructureAnalysis::Simple(params) = &mut analysis {
            params[1].add_option("Neutral");
            params.push(DraftParam::new("  ", ParamKind::Text));
        }
        let template = analysis.finalize("Greeting").unwrap();
        assert_eq!(
            template.to_json_string(),
            r#"{"General":{"greeted":"Boolean","tone":"List [Calm, Angry, Neutral]"}}"#
        );
    }

    #[test]
    fn finalize_rejects_empty_lists_and_parameter_sets() {
        let analysis = StructureAnalysis::Simple(vec![DraftParam::new("tone", ParamKind::List)]);
        assert!(matches!(
            analysis.finalize("Tone"),
            Err(EvalError::Validation(ValidationError::MissingListOptions(k))) if k == "tone"
        ));

        let empty = StructureAnalysis::Simple(vec![]);
        assert!(matches!(
            empty.finalize("Tone"),
            Err(EvalError::Validation(ValidationError::EmptyParameters(n))) if n == "Tone"
        ));
    }
}
