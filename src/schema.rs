//! Schema validation capability.
//!
//! Route inputs and outputs are checked through the [`Schema`] trait:
//! `validate(value) -> value | error`. Two implementations ship with the
//! crate: [`JsonSchema`] (a JSON Schema document compiled by the
//! `jsonschema` crate) and [`FnSchema`] (any closure).
//!
//! Raw textual inputs (route params, query strings, form fields) arrive as
//! strings. [`Schema::validate_text`] lets a schema coerce those strings into
//! the primitive types it declares before validating, so `/hello/4` can
//! satisfy `{"type": "integer"}`.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// Shared handle to a schema.
pub type SchemaRef = Arc<dyn Schema>;

#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("invalid schema document: {0}")]
    InvalidSchema(String),

    #[error("{}", .issues.join("; "))]
    Invalid { issues: Vec<String> },
}

impl SchemaError {
    pub fn invalid(issue: impl Into<String>) -> Self {
        SchemaError::Invalid {
            issues: vec![issue.into()],
        }
    }

    pub fn issues(&self) -> &[String] {
        match self {
            SchemaError::Invalid { issues } => issues,
            SchemaError::InvalidSchema(_) => &[],
        }
    }
}

/// Validation capability consumed by the pipeline.
pub trait Schema: Send + Sync + fmt::Debug {
    /// Validate a structured value, returning the (possibly transformed) value.
    fn validate(&self, value: Value) -> Result<Value, SchemaError>;

    /// Validate a value whose leaves are raw strings taken from the request
    /// line or a form body.
    fn validate_text(&self, value: Value) -> Result<Value, SchemaError> {
        self.validate(value)
    }
}

/// A JSON Schema document.
pub struct JsonSchema {
    document: Value,
    validator: jsonschema::Validator,
}

impl JsonSchema {
    pub fn new(document: Value) -> Result<Self, SchemaError> {
        let validator = jsonschema::validator_for(&document)
            .map_err(|e| SchemaError::InvalidSchema(e.to_string()))?;
        Ok(Self {
            document,
            validator,
        })
    }

    /// Shared handle, ready to drop into `InputSchemas`/`OutputSchemas`.
    pub fn shared(document: Value) -> Result<SchemaRef, SchemaError> {
        Ok(Arc::new(Self::new(document)?))
    }

    pub fn document(&self) -> &Value {
        &self.document
    }
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema")
            .field("document", &self.document)
            .finish()
    }
}

impl Schema for JsonSchema {
    fn validate(&self, value: Value) -> Result<Value, SchemaError> {
        let issues: Vec<String> = self
            .validator
            .iter_errors(&value)
            .map(|e| e.to_string())
            .collect();
        if issues.is_empty() {
            Ok(value)
        } else {
            Err(SchemaError::Invalid { issues })
        }
    }

    fn validate_text(&self, value: Value) -> Result<Value, SchemaError> {
        self.validate(coerce(value, Some(&self.document)))
    }
}

/// Convert string leaves to the primitive types declared by `schema`.
///
/// Strings that do not parse are left alone so validation reports them.
fn coerce(value: Value, schema: Option<&Value>) -> Value {
    let declared = schema
        .and_then(|s| s.get("type"))
        .and_then(Value::as_str);

    match value {
        Value::String(raw) => match declared {
            Some("array") => {
                let items = schema.and_then(|s| s.get("items"));
                Value::Array(vec![coerce(Value::String(raw), items)])
            }
            _ => coerce_primitive(raw, declared),
        },
        Value::Array(values) => {
            let items = schema.and_then(|s| s.get("items"));
            Value::Array(values.into_iter().map(|v| coerce(v, items)).collect())
        }
        Value::Object(map) => {
            let properties = schema.and_then(|s| s.get("properties"));
            Value::Object(
                map.into_iter()
                    .map(|(key, v)| {
                        let prop = properties.and_then(|p| p.get(&key));
                        (key, coerce(v, prop))
                    })
                    .collect(),
            )
        }
        other => other,
    }
}

fn coerce_primitive(raw: String, declared: Option<&str>) -> Value {
    match declared {
        Some("integer") => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::String(raw)),
        Some("number") => match raw.parse::<i64>() {
            Ok(int) => Value::from(int),
            Err(_) => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::String(raw)),
        },
        Some("boolean") => raw
            .parse::<bool>()
            .map(Value::from)
            .unwrap_or(Value::String(raw)),
        Some("null") if raw.is_empty() => Value::Null,
        _ => Value::String(raw),
    }
}

/// Closure-backed schema.
pub struct FnSchema<F> {
    name: &'static str,
    check: F,
}

impl<F> FnSchema<F>
where
    F: Fn(Value) -> Result<Value, SchemaError> + Send + Sync + 'static,
{
    pub fn shared(name: &'static str, check: F) -> SchemaRef {
        Arc::new(Self { name, check })
    }
}

impl<F> fmt::Debug for FnSchema<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnSchema").field(&self.name).finish()
    }
}

impl<F> Schema for FnSchema<F>
where
    F: Fn(Value) -> Result<Value, SchemaError> + Send + Sync,
{
    fn validate(&self, value: Value) -> Result<Value, SchemaError> {
        (self.check)(value)
    }
}
