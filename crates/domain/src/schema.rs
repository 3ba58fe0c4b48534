//! Declarative payload schemas.
//!
//! A [`Schema`] describes the fields a JSON object payload may carry. It is
//! used for service-call parameters and for per-integration configuration,
//! validated before any handler or setup code runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Expected JSON shape of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Bool,
    Integer,
    Float,
    String,
    Object,
    Array,
    /// Any non-null value.
    Any,
}

impl FieldKind {
    fn matches(self, value: &serde_json::Value) -> bool {
        match self {
            Self::Bool => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::String => value.is_string(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => !value.is_null(),
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Object => "object",
            Self::Array => "array",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// JSON type name used in validation errors.
#[must_use]
pub fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// One declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub kind: FieldKind,
    pub required: bool,
}

/// Declarative schema for a JSON object payload.
///
/// Closed by default: fields not declared are rejected. Call [`Schema::open`]
/// to allow extras.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: BTreeMap<String, Field>,
    #[serde(default)]
    allow_extra: bool,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields
            .insert(name.into(), Field { kind, required: true });
        self
    }

    /// Declare an optional field.
    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields
            .insert(name.into(), Field { kind, required: false });
        self
    }

    /// Accept fields beyond the declared set.
    #[must_use]
    pub fn open(mut self) -> Self {
        self.allow_extra = true;
        self
    }

    /// Validate a payload against this schema.
    ///
    /// `null` is treated as an empty object, so schemas without required
    /// fields accept calls that carry no data at all.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] encountered: non-object payload,
    /// missing required field, wrong field type, or (for closed schemas) an
    /// undeclared field.
    pub fn validate(&self, data: &serde_json::Value) -> Result<(), SchemaError> {
        let empty = serde_json::Map::new();
        let object = match data {
            serde_json::Value::Null => &empty,
            serde_json::Value::Object(map) => map,
            other => {
                return Err(SchemaError::NotAnObject {
                    found: json_type_name(other),
                });
            }
        };

        for (name, field) in &self.fields {
            match object.get(name) {
                Some(value) => {
                    if !field.kind.matches(value) {
                        return Err(SchemaError::WrongType {
                            field: name.clone(),
                            expected: field.kind,
                            found: json_type_name(value),
                        });
                    }
                }
                None if field.required => {
                    return Err(SchemaError::MissingField {
                        field: name.clone(),
                    });
                }
                None => {}
            }
        }

        if !self.allow_extra {
            for name in object.keys() {
                if !self.fields.contains_key(name) {
                    return Err(SchemaError::UnknownField {
                        field: name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
