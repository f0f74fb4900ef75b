//! Forms described by a JSON schema fragment held in the parameter store.
//!
//! Each property maps to one [`FieldKind`]; coercion dispatches on the kind
//! rather than re-inspecting the schema.

use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("schema has no properties")]
    NoProperties,
    #[error("field {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Select { options: Vec<SelectOption> },
    Boolean,
    Number { integer: bool },
    Text,
    TextArea,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub placeholder: Option<String>,
    pub kind: FieldKind,
}

impl FormField {
    fn from_schema(name: &str, schema: &Value) -> Self {
        let text = |key: &str| schema.get(key).and_then(Value::as_str).map(String::from);
        Self {
            name: name.to_string(),
            title: text("title").unwrap_or_else(|| name.to_string()),
            description: text("description"),
            placeholder: text("placeholder"),
            kind: FieldKind::from_schema(schema),
        }
    }

    /// Converts raw input (usually a string from a text box) into the
    /// JSON value the field's kind calls for.
    pub fn coerce(&self, raw: &Value) -> Result<Value, FormError> {
        let invalid = |reason: &str| FormError::InvalidValue {
            field: self.name.clone(),
            reason: reason.to_string(),
        };
        match &self.kind {
            FieldKind::Select { options } => {
                let value = raw.as_str().ok_or_else(|| invalid("expected an option"))?;
                options
                    .iter()
                    .find(|option| option.value == value)
                    .map(|option| Value::String(option.value.clone()))
                    .ok_or_else(|| invalid("not one of the options"))
            }
            FieldKind::Boolean => match raw {
                Value::Bool(flag) => Ok(Value::Bool(*flag)),
                Value::String(text) if text == "true" => Ok(Value::Bool(true)),
                Value::String(text) if text == "false" || text.is_empty() => Ok(Value::Bool(false)),
                Value::Null => Ok(Value::Bool(false)),
                _ => Err(invalid("expected true or false")),
            },
            FieldKind::Number { integer } => {
                let number = match raw {
                    Value::Number(number) => number.clone(),
                    Value::String(text) => parse_number(text.trim(), *integer)
                        .ok_or_else(|| invalid("expected a number"))?,
                    _ => return Err(invalid("expected a number")),
                };
                if *integer && !(number.is_i64() || number.is_u64()) {
                    return Err(invalid("expected an integer"));
                }
                Ok(Value::Number(number))
            }
            FieldKind::Text | FieldKind::TextArea => match raw {
                Value::String(text) => Ok(Value::String(text.clone())),
                Value::Null => Ok(Value::String(String::new())),
                other => Ok(Value::String(other.to_string())),
            },
        }
    }
}

fn parse_number(text: &str, integer: bool) -> Option<Number> {
    if integer {
        text.parse::<i64>().ok().map(Number::from)
    } else {
        text.parse::<f64>().ok().and_then(Number::from_f64)
    }
}

impl FieldKind {
    fn from_schema(schema: &Value) -> Self {
        if let Some(options) = schema.get("enum") {
            return FieldKind::Select {
                options: select_options(options),
            };
        }
        match schema.get("type").and_then(Value::as_str) {
            Some("boolean") => return FieldKind::Boolean,
            Some("number") => return FieldKind::Number { integer: false },
            Some("integer") => return FieldKind::Number { integer: true },
            _ => {}
        }
        match schema.get("format").and_then(Value::as_str) {
            Some("textarea") => FieldKind::TextArea,
            _ => FieldKind::Text,
        }
    }
}

/// `enum` is either a value to label map or a plain list of values.
fn select_options(options: &Value) -> Vec<SelectOption> {
    match options {
        Value::Object(map) => map
            .iter()
            .map(|(value, label)| SelectOption {
                value: value.clone(),
                label: label.as_str().map_or_else(|| label.to_string(), String::from),
            })
            .collect(),
        Value::Array(values) => values
            .iter()
            .map(|value| {
                let value = value.as_str().map_or_else(|| value.to_string(), String::from);
                SelectOption {
                    label: value.clone(),
                    value,
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormSchema {
    pub fields: Vec<FormField>,
}

impl FormSchema {
    pub fn from_json(schema: &Value) -> Result<Self, FormError> {
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .ok_or(FormError::NoProperties)?;
        Ok(Self {
            fields: properties
                .iter()
                .map(|(name, field)| FormField::from_schema(name, field))
                .collect(),
        })
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Coerces every submitted value; fields left out of `data` are skipped
    /// and names the schema does not know are rejected.
    pub fn apply(&self, data: &Map<String, Value>) -> Result<Map<String, Value>, FormError> {
        data.iter()
            .map(|(name, raw)| {
                let field = self.field(name).ok_or_else(|| FormError::InvalidValue {
                    field: name.clone(),
                    reason: "unknown field".to_string(),
                })?;
                Ok((name.clone(), field.coerce(raw)?))
            })
            .collect()
    }
}
