//! Parameter schemas: the structural description of a tool's arguments.
//!
//! A schema is an ordered list of named parameters. It renders to the JSON
//! Schema object the endpoint expects and checks extracted arguments.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The JSON type a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Number,
    Integer,
    String,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }

    /// Whether `value` is an instance of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::String => value.is_string(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }
}

/// A single named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

/// Ordered set of parameters for one tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    params: Vec<Parameter>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required parameter.
    pub fn required(mut self, name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        self.params.push(Parameter {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        });
        self
    }

    /// Add an optional parameter.
    pub fn optional(mut self, name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        self.params.push(Parameter {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
        });
        self
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Render as a JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.params {
            properties.insert(
                p.name.clone(),
                serde_json::json!({
                    "type": p.kind.as_str(),
                    "description": p.description,
                }),
            );
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Check a parsed argument object: required parameters present and
    /// non-null, present parameters of the declared type.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), String> {
        for p in &self.params {
            match args.get(&p.name) {
                None | Some(Value::Null) if p.required => {
                    return Err(format!("missing required parameter '{}'", p.name));
                }
                Some(value) if !value.is_null() && !p.kind.accepts(value) => {
                    return Err(format!(
                        "parameter '{}' must be of type {}",
                        p.name,
                        p.kind.as_str()
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
