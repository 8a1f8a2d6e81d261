//! Declarative tool parameter descriptors.
//!
//! Each tool declares its parameters as a list of [`ParamSpec`]s. The same
//! list drives input validation ([`validate`]), default merging
//! ([`apply_defaults`]) and the JSON Schema published through `tools/list`
//! ([`json_schema`]).

use serde_json::{Map, Value, json};

use crate::error::FieldIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    /// Multi-valued filter; sent upstream as a repeated query key.
    StringList,
}

impl ParamKind {
    fn expected(self) -> &'static str {
        match self {
            ParamKind::String => "expected a string",
            ParamKind::Integer => "expected an integer",
            ParamKind::Boolean => "expected a boolean",
            ParamKind::StringList => "expected a string or an array of strings",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<Value>,
    pub allowed: &'static [&'static str],
    pub min: Option<i64>,
    pub max: Option<i64>,
    /// The value becomes a URL path segment: non-blank and not a dot segment.
    pub path_segment: bool,
}

impl ParamSpec {
    fn new(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
            default: None,
            allowed: &[],
            min: None,
            max: None,
            path_segment: false,
        }
    }

    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::String, description)
    }

    pub fn integer(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::Integer, description)
    }

    pub fn boolean(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::Boolean, description)
    }

    pub fn string_list(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::StringList, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }

    pub fn min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn path_segment(mut self) -> Self {
        self.path_segment = true;
        self
    }

    fn property_schema(&self) -> Value {
        let mut schema = match self.kind {
            ParamKind::String => json!({ "type": "string" }),
            ParamKind::Integer => json!({ "type": "integer" }),
            ParamKind::Boolean => json!({ "type": "boolean" }),
            ParamKind::StringList => json!({
                "anyOf": [
                    { "type": "string" },
                    { "type": "array", "items": { "type": "string" } }
                ]
            }),
        };
        schema["description"] = Value::String(self.description.to_string());
        if !self.allowed.is_empty() {
            match self.kind {
                ParamKind::StringList => {
                    schema["anyOf"][0]["enum"] = json!(self.allowed);
                    schema["anyOf"][1]["items"]["enum"] = json!(self.allowed);
                }
                _ => schema["enum"] = json!(self.allowed),
            }
        }
        if let Some(min) = self.min {
            schema["minimum"] = json!(min);
        }
        if let Some(max) = self.max {
            schema["maximum"] = json!(max);
        }
        if let Some(default) = &self.default {
            schema["default"] = default.clone();
        }
        if self.path_segment && self.kind == ParamKind::String {
            schema["minLength"] = json!(1);
        }
        schema
    }

    /// Check a caller-supplied value and return its normalized form.
    fn check(&self, value: &Value) -> Result<Value, String> {
        let normalized = match self.kind {
            ParamKind::String => {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return Err(self.kind.expected().to_string()),
                };
                if self.path_segment {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        return Err("must not be blank".to_string());
                    }
                    if trimmed == "." || trimmed == ".." {
                        return Err(format!("'{trimmed}' is not a valid identifier"));
                    }
                    Value::String(trimmed.to_string())
                } else {
                    Value::String(text)
                }
            }
            ParamKind::Integer => {
                let parsed = match value {
                    Value::Number(n) => n
                        .as_i64()
                        .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                };
                let Some(parsed) = parsed else {
                    return Err(self.kind.expected().to_string());
                };
                if let Some(min) = self.min.filter(|min| parsed < *min) {
                    return Err(format!("must be >= {min}"));
                }
                if let Some(max) = self.max.filter(|max| parsed > *max) {
                    return Err(format!("must be <= {max}"));
                }
                json!(parsed)
            }
            ParamKind::Boolean => match value {
                Value::Bool(b) => Value::Bool(*b),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Value::Bool(false),
                _ => return Err(self.kind.expected().to_string()),
            },
            ParamKind::StringList => {
                let items: Vec<String> = match value {
                    Value::String(s) => s
                        .split(',')
                        .map(str::trim)
                        .filter(|item| !item.is_empty())
                        .map(ToOwned::to_owned)
                        .collect(),
                    Value::Array(values) => {
                        let mut items = Vec::with_capacity(values.len());
                        for item in values {
                            let Some(item) = item.as_str() else {
                                return Err(self.kind.expected().to_string());
                            };
                            items.push(item.to_string());
                        }
                        items
                    }
                    _ => return Err(self.kind.expected().to_string()),
                };
                if items.is_empty() {
                    return Err("must contain at least one value".to_string());
                }
                json!(items)
            }
        };

        if !self.allowed.is_empty() {
            let candidates: Vec<&str> = match &normalized {
                Value::String(s) => vec![s.as_str()],
                Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                _ => Vec::new(),
            };
            let rejected = candidates
                .iter()
                .find(|candidate| !self.allowed.iter().any(|allowed| *allowed == **candidate));
            if let Some(bad) = rejected {
                return Err(format!(
                    "'{bad}' is not one of: {}",
                    self.allowed.join(", ")
                ));
            }
        }

        Ok(normalized)
    }
}

/// Input that passed validation against a tool's parameter list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedInput(Map<String, Value>);

impl ValidatedInput {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid arguments: {}", summarize(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![FieldIssue::new(field, message)],
        }
    }
}

fn summarize(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("{} {}", issue.field, issue.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Protocol-facing JSON Schema for a parameter list.
pub fn json_schema(params: &[ParamSpec]) -> Value {
    let properties: Map<String, Value> = params
        .iter()
        .map(|param| (param.name.to_string(), param.property_schema()))
        .collect();
    let required: Vec<&str> = params
        .iter()
        .filter(|param| param.required)
        .map(|param| param.name)
        .collect();

    let mut schema = json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

/// Fill declared defaults for absent (or null) fields. Caller values win.
///
/// Non-object input is returned untouched so that [`validate`] reports it.
pub fn apply_defaults(params: &[ParamSpec], input: Value) -> Value {
    let mut map = match input {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => return other,
    };
    for param in params {
        let Some(default) = &param.default else {
            continue;
        };
        let missing = map.get(param.name).is_none_or(Value::is_null);
        if missing {
            map.insert(param.name.to_string(), default.clone());
        }
    }
    Value::Object(map)
}

/// Validate raw input against a parameter list, collecting every issue.
pub fn validate(params: &[ParamSpec], input: &Value) -> Result<ValidatedInput, ValidationError> {
    let empty = Map::new();
    let object = match input {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => return Err(ValidationError::single("arguments", "expected an object")),
    };

    let mut issues = Vec::new();
    for key in object.keys() {
        if !params.iter().any(|param| param.name == key) {
            issues.push(FieldIssue::new(key.clone(), "is not a recognized parameter"));
        }
    }

    let mut validated = Map::new();
    for param in params {
        match object.get(param.name) {
            None | Some(Value::Null) => {
                if param.required {
                    issues.push(FieldIssue::new(param.name, "is required"));
                }
            }
            Some(value) => match param.check(value) {
                Ok(normalized) => {
                    validated.insert(param.name.to_string(), normalized);
                }
                Err(message) => issues.push(FieldIssue::new(param.name, message)),
            },
        }
    }

    if issues.is_empty() {
        Ok(ValidatedInput(validated))
    } else {
        Err(ValidationError { issues })
    }
}
