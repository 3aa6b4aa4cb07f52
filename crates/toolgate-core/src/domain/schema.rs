//! Tool input schemas.
//!
//! Providers describe tool arguments with JSON Schema. An [`InputSchema`] is
//! a schema that passed structural validation and compiled, so argument
//! checks at call time never have to deal with a broken schema.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Structural problems with a tool input schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("input schema must be a JSON object")]
    NotAnObject,

    #[error("input schema type must be \"object\", got {0}")]
    InvalidType(String),

    #[error("input schema properties must be an object")]
    InvalidProperties,

    #[error("input schema property '{0}' must be a schema object or boolean")]
    InvalidProperty(String),

    #[error("input schema required must be an array of strings")]
    InvalidRequired,

    #[error("input schema does not compile: {0}")]
    Compile(String),
}

/// A structurally valid, compiled JSON Schema for tool arguments.
#[derive(Clone)]
pub struct InputSchema {
    raw: Value,
    // `None` for the permissive schema; only the object check applies.
    validator: Option<Arc<jsonschema::Validator>>,
}

impl InputSchema {
    /// Validate and compile a schema document.
    pub fn parse(raw: Value) -> Result<Self, SchemaError> {
        check_structure(&raw)?;
        let validator =
            jsonschema::validator_for(&raw).map_err(|e| SchemaError::Compile(e.to_string()))?;
        Ok(Self {
            raw,
            validator: Some(Arc::new(validator)),
        })
    }

    /// The schema used when a provider omits one: any object.
    pub fn permissive() -> Self {
        Self {
            raw: json!({ "type": "object" }),
            validator: None,
        }
    }

    /// Parse an optional provider schema, falling back to [`Self::permissive`].
    pub fn from_optional(raw: Option<Value>) -> Result<Self, SchemaError> {
        match raw {
            None | Some(Value::Null) => Ok(Self::permissive()),
            Some(raw) => Self::parse(raw),
        }
    }

    pub const fn as_value(&self) -> &Value {
        &self.raw
    }

    /// Property names declared by the schema, in document order.
    pub fn property_names(&self) -> Vec<&str> {
        self.raw
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Check call arguments against the schema.
    ///
    /// Arguments must always be a JSON object. Returns every violation found.
    pub fn validate_arguments(&self, arguments: &Value) -> Result<(), Vec<String>> {
        if !arguments.is_object() {
            return Err(vec![format!(
                "arguments must be an object, got {}",
                json_type_name(arguments)
            )]);
        }

        let Some(validator) = &self.validator else {
            return Ok(());
        };

        let errors: Vec<String> = validator
            .iter_errors(arguments)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for InputSchema {
    fn default() -> Self {
        Self::permissive()
    }
}

impl fmt::Debug for InputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InputSchema").field(&self.raw).finish()
    }
}

impl PartialEq for InputSchema {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Serialize for InputSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InputSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::from_optional(Some(raw)).map_err(serde::de::Error::custom)
    }
}

fn check_structure(raw: &Value) -> Result<(), SchemaError> {
    let obj: &Map<String, Value> = raw.as_object().ok_or(SchemaError::NotAnObject)?;

    if let Some(ty) = obj.get("type") {
        if ty.as_str() != Some("object") {
            return Err(SchemaError::InvalidType(ty.to_string()));
        }
    }

    if let Some(props) = obj.get("properties") {
        let props = props.as_object().ok_or(SchemaError::InvalidProperties)?;
        for (name, prop) in props {
            if !(prop.is_object() || prop.is_boolean()) {
                return Err(SchemaError::InvalidProperty(name.clone()));
            }
        }
    }

    if let Some(required) = obj.get("required") {
        let all_strings = required
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string));
        if !all_strings {
            return Err(SchemaError::InvalidRequired);
        }
    }

    Ok(())
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
