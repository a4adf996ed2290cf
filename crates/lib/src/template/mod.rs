//! # Type Templates
//!
//! A type template describes how a metric is rated: an ordered set of named
//! sub-groups, each holding ordered fields typed as `Boolean`, `Count`, `Text`,
//! `List` (free text) or `List [a, b, ...]` (closed enumeration).
//!
//! Templates are stored in the `Metrics` sheet as compact JSON such as
//! `{"Request_Service":{"Called":"Boolean","Times":"Count"}}`.

pub mod analysis;
pub mod render;

use crate::errors::EvalError;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;

pub use analysis::{analyze_structure, type_from_value, DraftParam, ParamKind, StructureAnalysis};
pub use render::{
    collect_legacy, collect_template, input_name, render_legacy, render_template, Collected, Control,
    FormInputs, InputValue, RenderedField, RenderedSubGroup,
};

fn list_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)^List\s*\[(.*)\]$").expect("valid list pattern"))
}

/// The type of a single template field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Boolean,
    Count,
    Text,
    /// A List field. An empty option set means free text.
    List(Vec<String>),
}

impl FieldType {
    /// Parses a type string such as `Boolean` or `List [Yes, No]`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        match trimmed {
            "Boolean" => return Some(FieldType::Boolean),
            "Count" => return Some(FieldType::Count),
            "Text" => return Some(FieldType::Text),
            "List" => return Some(FieldType::List(Vec::new())),
            _ => {}
        }
        list_pattern()
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .map(|inner| FieldType::List(crate::types::split_list(inner.as_str())))
    }

    /// Whether `raw` is written in the `List [...]` form.
    pub fn is_list_literal(raw: &str) -> bool {
        list_pattern().is_match(raw.trim())
    }

    pub fn options(&self) -> &[String] {
        match self {
            FieldType::List(options) => options,
            _ => &[],
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Boolean => write!(f, "Boolean"),
            FieldType::Count => write!(f, "Count"),
            FieldType::Text => write!(f, "Text"),
            FieldType::List(options) if options.is_empty() => write!(f, "List"),
            FieldType::List(options) => write!(f, "List [{}]", options.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateField {
    pub name: String,
    pub field_type: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubGroup {
    pub name: String,
    pub fields: Vec<TemplateField>,
}

impl SubGroup {
    pub fn has_boolean(&self) -> bool {
        self.fields
            .iter()
            .any(|f| f.field_type == FieldType::Boolean)
    }
}

/// An immutable, ordered type template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTemplate {
    groups: Vec<SubGroup>,
}

impl TypeTemplate {
    /// Builds a template from sub-groups. At least one sub-group is required.
    pub fn new(groups: Vec<SubGroup>) -> Result<Self, EvalError> {
        if groups.is_empty() {
            return Err(EvalError::TemplateParse {
                message: "template has no sub-groups".to_string(),
                attempted: "{}".to_string(),
            });
        }
        Ok(Self { groups })
    }

    pub fn groups(&self) -> &[SubGroup] {
        &self.groups
    }

    /// Parses the JSON text stored in a sheet cell.
    pub fn parse(raw: &str) -> Result<Self, EvalError> {
        let value: Value = serde_json::from_str(raw).map_err(|e| EvalError::TemplateParse {
            message: e.to_string(),
            attempted: raw.to_string(),
        })?;
        Self::from_value(&value).map_err(|message| EvalError::TemplateParse {
            message,
            attempted: raw.to_string(),
        })
    }

    fn from_value(value: &Value) -> Result<Self, String> {
        let object = value
            .as_object()
            .ok_or_else(|| "template must be a JSON object".to_string())?;

        let mut groups = Vec::with_capacity(object.len());
        for (group_name, fields) in object {
            let fields = fields
                .as_object()
                .ok_or_else(|| format!("sub-group \"{group_name}\" must be an object"))?;
            let mut parsed = Vec::with_capacity(fields.len());
            for (field_name, type_value) in fields {
                let type_str = type_value.as_str().ok_or_else(|| {
                    format!("type of \"{group_name}.{field_name}\" must be a string")
                })?;
                let field_type = FieldType::parse(type_str).ok_or_else(|| {
                    format!("unknown type \"{type_str}\" for \"{group_name}.{field_name}\"")
                })?;
                parsed.push(TemplateField {
                    name: field_name.clone(),
                    field_type,
                });
            }
            groups.push(SubGroup {
                name: group_name.clone(),
                fields: parsed,
            });
        }

        if groups.is_empty() {
            return Err("template has no sub-groups".to_string());
        }
        Ok(Self { groups })
    }

    pub fn to_value(&self) -> Value {
        let mut outer = Map::new();
        for group in &self.groups {
            let inner: Map<String, Value> = group
                .fields
                .iter()
                .map(|f| (f.name.clone(), Value::String(f.field_type.to_string())))
                .collect();
            outer.insert(group.name.clone(), Value::Object(inner));
        }
        Value::Object(outer)
    }

    /// Compact JSON, the form in which templates are submitted.
    pub fn to_json_string(&self) -> String {
        self.to_value().to_string()
    }
}
