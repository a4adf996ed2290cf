//! # Template Rendering & Collection
//!
//! Turns a [`TypeTemplate`] (or a legacy flat metric) into a declarative list of
//! controls, and turns the values entered into those controls back into a
//! [`RatingValue`].
//!
//! A sub-group is *filled* when it contains a Boolean that has been explicitly
//! chosen, or when it has no Boolean and at least one field holds a value.
//! Empty Count/Text/List fields default to `0`/`""` only once a Boolean in the
//! same sub-group has been chosen.

use super::{FieldType, SubGroup, TypeTemplate};
use crate::errors::ValidationError;
use crate::types::{FieldValue, LegacyType, MetricDefinition, RatingValue};
use std::collections::HashMap;
use tracing::debug;

/// Splits the integer prefix of `raw` into `(is_negative, magnitude)`.
fn leading_integer(raw: &str) -> Option<(bool, u64)> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let magnitude = rest[..end].parse::<u64>().ok()?;
    Some((negative, magnitude))
}

/// A value entered into a single control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputValue {
    /// An explicit True/False selection.
    Choice(bool),
    Count(u64),
    /// Free text, a text area, or the selected dropdown option.
    Text(String),
    /// Checked options of a legacy multi-select.
    Selections(Vec<String>),
}

/// Values entered so far, keyed by input name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormInputs {
    values: HashMap<String, InputValue>,
}

impl FormInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.values.get(name)
    }

    pub fn choose(&mut self, name: &str, value: bool) {
        self.values
            .insert(name.to_string(), InputValue::Choice(value));
    }

    pub fn clear(&mut self, name: &str) {
        self.values.remove(name);
    }

    /// Enters raw text into a Count control.
    ///
    /// Only the leading integer counts, so `"3.5"` and `"3e2"` enter `3`.
    /// Negative numbers are rejected: the field is cleared and an error is returned.
    /// Text without a leading integer clears the field.
    pub fn enter_count(&mut self, name: &str, raw: &str) -> Result<(), ValidationError> {
        match leading_integer(raw) {
            Some((true, n)) if n > 0 => {
                self.values.remove(name);
                Err(ValidationError::NegativeCount(name.to_string()))
            }
            Some((_, n)) => {
                self.values.insert(name.to_string(), InputValue::Count(n));
                Ok(())
            }
            None => {
                if !raw.trim().is_empty() {
                    debug!("Ignoring non-numeric count input for '{name}': {}", raw.trim());
                }
                self.values.remove(name);
                Ok(())
            }
        }
    }

    /// Enters text into a Text control, a List text area, or selects a dropdown option.
    pub fn enter_text(&mut self, name: &str, raw: &str) {
        if raw.trim().is_empty() {
            self.values.remove(name);
        } else {
            self.values
                .insert(name.to_string(), InputValue::Text(raw.to_string()));
        }
    }

    /// Checks or unchecks one option of a legacy multi-select.
    pub fn toggle_selection(&mut self, name: &str, option: &str) {
        let mut selections = match self.values.remove(name) {
            Some(InputValue::Selections(items)) => items,
            _ => Vec::new(),
        };
        if let Some(pos) = selections.iter().position(|s| s == option) {
            selections.remove(pos);
        } else {
            selections.push(option.to_string());
        }
        if !selections.is_empty() {
            self.values
                .insert(name.to_string(), InputValue::Selections(selections));
        }
    }

    /// Whether any control holds a value at all.
    pub fn has_any_value(&self) -> bool {
        !self.values.is_empty()
    }

    /// Seeds the controls of a template metric from an existing value.
    pub fn prefill_template(&mut self, template: &TypeTemplate, primary_key: &str, value: &RatingValue) {
        let RatingValue::Nested(groups) = value else {
            return;
        };
        for (group_name, fields) in groups {
            let Some(group) = template.groups().iter().find(|g| &g.name == group_name) else {
                continue;
            };
            for (field_name, field_value) in fields {
                if !group.fields.iter().any(|f| &f.name == field_name) {
                    continue;
                }
                let name = input_name(primary_key, group_name, field_name);
                match field_value {
                    FieldValue::Bool(b) => self.choose(&name, *b),
                    FieldValue::Count(n) => {
                        self.values.insert(name, InputValue::Count(*n));
                    }
                    FieldValue::Text(s) => self.enter_text(&name, s),
                }
            }
        }
    }

    /// Seeds the control of a legacy metric from an existing value.
    pub fn prefill_legacy(&mut self, primary_key: &str, value: &RatingValue) {
        match value {
            RatingValue::Bool(b) => self.choose(primary_key, *b),
            RatingValue::Count(n) => {
                self.values
                    .insert(primary_key.to_string(), InputValue::Count(*n));
            }
            RatingValue::Choices(items) if !items.is_empty() => {
                self.values.insert(
                    primary_key.to_string(),
                    InputValue::Selections(items.clone()),
                );
            }
            _ => {}
        }
    }
}

/// The input name of a template field.
pub fn input_name(primary_key: &str, group: &str, field: &str) -> String {
    format!("{primary_key}.{group}.{field}")
}

// --- Rendering ---

/// The kind of control a field renders as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// True/False radio pair; `default` is the pre-displayed option.
    BinaryChoice { default: bool },
    NonNegativeInteger,
    TextLine,
    /// Single choice, no default selection.
    Dropdown { options: Vec<String> },
    TextArea,
    /// Legacy List metrics.
    MultiSelect { options: Vec<String> },
    /// A legacy metric whose type cannot be rated.
    Unsupported { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedField {
    pub input_name: String,
    pub label: String,
    pub control: Control,
    pub value: Option<InputValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSubGroup {
    pub name: String,
    pub fields: Vec<RenderedField>,
}

fn control_for(field_type: &FieldType) -> Control {
    match field_type {
        FieldType::Boolean => Control::BinaryChoice { default: false },
        FieldType::Count => Control::NonNegativeInteger,
        FieldType::Text => Control::TextLine,
        FieldType::List(options) if options.is_empty() => Control::TextArea,
        FieldType::List(options) => Control::Dropdown {
            options: options.clone(),
        },
    }
}

pub fn render_template(
    template: &TypeTemplate,
    primary_key: &str,
    inputs: &FormInputs,
) -> Vec<RenderedSubGroup> {
    template
        .groups()
        .iter()
        .map(|group| RenderedSubGroup {
            name: group.name.clone(),
            fields: group
                .fields
                .iter()
                .map(|field| {
                    let name = input_name(primary_key, &group.name, &field.name);
                    RenderedField {
                        value: inputs.get(&name).cloned(),
                        input_name: name,
                        label: field.name.clone(),
                        control: control_for(&field.field_type),
                    }
                })
                .collect(),
        })
        .collect()
}

pub fn render_legacy(metric: &MetricDefinition, primary_key: &str, inputs: &FormInputs) -> RenderedField {
    let control = match metric.legacy_type {
        Some(LegacyType::Boolean) => Control::BinaryChoice { default: false },
        Some(LegacyType::Count) => Control::NonNegativeInteger,
        Some(LegacyType::List) => Control::MultiSelect {
            options: metric.list_values.clone(),
        },
        None => Control::Unsupported {
            message: "This metric doesn't have a template defined. Please add a template using the \"Add Metric\" tab.".to_string(),
        },
    };
    RenderedField {
        input_name: primary_key.to_string(),
        label: metric.name.clone(),
        control,
        value: inputs.get(primary_key).cloned(),
    }
}

// --- Collection ---

/// The outcome of reading a metric's controls.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Collected {
    /// Present only when every sub-group is filled.
    pub value: Option<RatingValue>,
    /// Some, but not all, of the metric was filled in.
    pub incomplete: bool,
    /// The user entered at least one value.
    pub touched: bool,
}

fn collect_group(
    group: &SubGroup,
    primary_key: &str,
    inputs: &FormInputs,
    touched: &mut bool,
) -> (Vec<(String, FieldValue)>, bool) {
    let name_of = |field: &str| input_name(primary_key, &group.name, field);
    let boolean_chosen = group.fields.iter().any(|f| {
        f.field_type == FieldType::Boolean
            && matches!(inputs.get(&name_of(&f.name)), Some(InputValue::Choice(_)))
    });

    let mut data = Vec::new();
    for field in &group.fields {
        let entered = match (&field.field_type, inputs.get(&name_of(&field.name))) {
            (FieldType::Boolean, Some(InputValue::Choice(b))) => Some(FieldValue::Bool(*b)),
            (FieldType::Count, Some(InputValue::Count(n))) => Some(FieldValue::Count(*n)),
            (FieldType::Text | FieldType::List(_), Some(InputValue::Text(s)))
                if !s.trim().is_empty() =>
            {
                Some(FieldValue::Text(s.trim().to_string()))
            }
            _ => None,
        };
        match entered {
            Some(value) => {
                *touched = true;
                data.push((field.name.clone(), value));
            }
            None if boolean_chosen => {
                if let Some(default) = FieldValue::default_for(&field.field_type) {
                    data.push((field.name.clone(), default));
                }
            }
            None => {}
        }
    }
    (data, boolean_chosen)
}

/// Reads the controls of a template metric.
pub fn collect_template(template: &TypeTemplate, primary_key: &str, inputs: &FormInputs) -> Collected {
    let mut touched = false;
    let mut incomplete = false;
    let mut filled = Vec::new();

    for group in template.groups() {
        let (data, boolean_chosen) = collect_group(group, primary_key, inputs, &mut touched);

        if group.has_boolean() {
            if boolean_chosen {
                filled.push((group.name.clone(), data));
            } else if !data.is_empty() {
                incomplete = true;
            }
        } else if !data.is_empty() {
            filled.push((group.name.clone(), data));
        }
    }

    let total = template.groups().len();
    if filled.len() == total {
        Collected {
            value: Some(RatingValue::Nested(filled)),
            incomplete,
            touched,
        }
    } else {
        Collected {
            value: None,
            incomplete: incomplete || !filled.is_empty(),
            touched,
        }
    }
}

/// Reads the single control of a legacy metric.
pub fn collect_legacy(metric: &MetricDefinition, primary_key: &str, inputs: &FormInputs) -> Collected {
    let value = match (metric.legacy_type, inputs.get(primary_key)) {
        (Some(LegacyType::Boolean), Some(InputValue::Choice(b))) => Some(RatingValue::Bool(*b)),
        (Some(LegacyType::Count), Some(InputValue::Count(n))) => Some(RatingValue::Count(*n)),
        (Some(LegacyType::List), Some(InputValue::Selections(items))) if !items.is_empty() => {
            Some(RatingValue::Choices(items.clone()))
        }
        _ => None,
    };
    Collected {
        touched: value.is_some(),
        value,
        incomplete: false,
    }
}
