//! # Shared Types
//!
//! Sheet rows, metric definitions, rating values and the webhook payload
//! shapes exchanged with the two receivers.

use crate::template::{FieldType, TypeTemplate};
use chrono::{SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

// --- Sheet rows ---

/// One data row of a sheet export, keyed by header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRow(HashMap<String, String>);

impl SheetRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cell for `column`, or `""` when the column is absent.
    pub fn get(&self, column: &str) -> &str {
        self.0.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.0.insert(column.into(), value.into());
    }

    /// Builder-style variant of [`SheetRow::insert`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SheetRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// --- Metric definitions ---

/// The flat type of a metric that has no template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyType {
    Boolean,
    Count,
    List,
}

impl LegacyType {
    /// Parses the `Type` column. Matching is case-insensitive.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "boolean" => Some(LegacyType::Boolean),
            "count" => Some(LegacyType::Count),
            "list" => Some(LegacyType::List),
            _ => None,
        }
    }
}

/// A single evaluation metric loaded from the `Metrics` sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub name: String,
    pub description: String,
    /// Skill names as written in the sheet (`All` applies everywhere).
    pub skills: Vec<String>,
    pub template: Option<TypeTemplate>,
    /// The template cell exactly as stored; empty when the metric is legacy.
    pub raw_template: String,
    pub legacy_type: Option<LegacyType>,
    /// Options of a legacy List metric, from the `Values` column.
    pub list_values: Vec<String>,
    pub enabled: bool,
}

impl MetricDefinition {
    /// The key under which ratings for this metric are submitted.
    pub fn rating_key(&self) -> String {
        to_camel_case(&self.name)
    }

    /// Whether this metric applies to `skill` (case-insensitive, `All` matches everything).
    pub fn applies_to(&self, skill: &str) -> bool {
        let skill = skill.to_lowercase();
        self.skills.iter().any(|s| {
            let s = s.to_lowercase();
            s == "all" || s == skill
        })
    }

    /// Cards group metrics that share a template; legacy metrics stand alone.
    pub fn card_key(&self) -> String {
        if self.raw_template.is_empty() {
            format!("legacy_{}", self.name)
        } else {
            self.raw_template.clone()
        }
    }
}

/// Converts a metric definition such as `Correct Tool Usage` into `correctToolUsage`.
pub fn to_camel_case(s: &str) -> String {
    s.split(' ')
        .enumerate()
        .map(|(index, word)| {
            let word = word.to_lowercase();
            if index == 0 {
                return word;
            }
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Splits a comma-separated cell into trimmed, non-empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// --- Rating values ---

/// A collected value of one template field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Count(u64),
    Text(String),
}

impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Count(n) => Value::from(*n),
            FieldValue::Text(s) => Value::String(s.clone()),
        }
    }

    /// The value a field takes when its sub-group's Boolean is chosen but the field was left empty.
    pub fn default_for(field_type: &FieldType) -> Option<Self> {
        match field_type {
            FieldType::Boolean => None,
            FieldType::Count => Some(FieldValue::Count(0)),
            FieldType::Text | FieldType::List(_) => Some(FieldValue::Text(String::new())),
        }
    }
}

/// The collected value of one metric.
#[derive(Debug, Clone, PartialEq)]
pub enum RatingValue {
    Bool(bool),
    Count(u64),
    Text(String),
    /// Selections of a legacy List metric.
    Choices(Vec<String>),
    /// Sub-group name → field name → value, in template order.
    Nested(Vec<(String, Vec<(String, FieldValue)>)>),
}

impl RatingValue {
    pub fn to_json(&self) -> Value {
        match self {
            RatingValue::Bool(b) => Value::Bool(*b),
            RatingValue::Count(n) => Value::from(*n),
            RatingValue::Text(s) => Value::String(s.clone()),
            RatingValue::Choices(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            RatingValue::Nested(groups) => {
                let mut outer = Map::new();
                for (group, fields) in groups {
                    let inner: Map<String, Value> = fields
                        .iter()
                        .map(|(name, value)| (name.clone(), value.to_json()))
                        .collect();
                    outer.insert(group.clone(), Value::Object(inner));
                }
                Value::Object(outer)
            }
        }
    }

    /// Compact JSON text used to compare values byte-for-byte.
    pub fn serialized(&self) -> String {
        self.to_json().to_string()
    }
}

impl Serialize for RatingValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// One metric key and its collected value; serializes as `{ "<key>": value }`.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingEntry {
    pub metric: String,
    pub value: RatingValue,
}

impl RatingEntry {
    pub fn new(metric: impl Into<String>, value: RatingValue) -> Self {
        Self {
            metric: metric.into(),
            value,
        }
    }
}

impl Serialize for RatingEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.metric, &self.value)?;
        map.end()
    }
}

// --- Webhook payloads ---

/// One row of the add-metric payload, mirroring how the `Metrics` sheet stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSubmission {
    pub definition: String,
    pub description: String,
    /// The template as a compact JSON string.
    pub template: String,
    /// `"TRUE"` or `"FALSE"`.
    pub enabled: String,
    pub skills: Vec<String>,
}

impl MetricSubmission {
    pub fn enabled_flag(enabled: bool) -> String {
        let flag = if enabled { "TRUE" } else { "FALSE" };
        flag.to_string()
    }
}

/// Body posted to the add-metric webhook.
#[derive(Debug, Clone, Serialize)]
pub struct AddMetricPayload {
    pub timestamp: String,
    pub metrics: Vec<MetricSubmission>,
}

/// Body posted to the rate-conversation webhook.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatePayload {
    pub conversation_id: String,
    pub timestamp: String,
    pub skill: String,
    pub ratings: Vec<RatingEntry>,
}

/// The current time as an ISO-8601 string with millisecond precision.
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn camel_case_matches_metric_keys() {
        assert_eq!(to_camel_case("Correct Tool Usage"), "correctToolUsage");
        assert_eq!(to_camel_case("EMPATHY"), "empathy");
        assert_eq!(to_camel_case("a  b"), "aB");
    }

    #[test]
    fn rating_entry_serializes_as_single_key_object() {
        let entry = RatingEntry::new(
            "toolUsage",
            RatingValue::Nested(vec![(
                "A".to_string(),
                vec![
                    ("ok".to_string(), FieldValue::Bool(true)),
                    ("n".to_string(), FieldValue::Count(0)),
                ],
            )]),
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value, json!({ "toolUsage": { "A": { "ok": true, "n": 0 } } }));
        // Field order follows the template, not alphabetical order.
        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            r#"{"toolUsage":{"A":{"ok":true,"n":0}}}"#
        );
    }

    #[test]
    fn rate_payload_uses_camel_case_keys() {
        let payload = RatePayload {
            conversation_id: "c-1".to_string(),
            timestamp: "2025-01-01T00:00:00.000Z".to_string(),
            skill: "Sales".to_string(),
            ratings: vec![RatingEntry::new("empathy", RatingValue::Bool(false))],
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["conversationId"], "c-1");
        assert_eq!(value["ratings"][0]["empathy"], false);
    }

    #[test]
    fn applies_to_honours_all_and_case() {
        let metric = MetricDefinition {
            name: "Empathy".to_string(),
            description: String::new(),
            skills: vec!["Sales".to_string()],
            template: None,
            raw_template: String::new(),
            legacy_type: Some(LegacyType::Boolean),
            list_values: vec![],
            enabled: true,
        };
        assert!(metric.applies_to("sales"));
        assert!(!metric.applies_to("Support"));

        let universal = MetricDefinition {
            skills: vec!["ALL".to_string()],
            ..metric
        };
        assert!(universal.applies_to("Support"));
    }
}
