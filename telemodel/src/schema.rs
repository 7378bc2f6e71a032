//! Schema descriptor types for telemodel records.
//!
//! A [`Schema`] is an explicit, statically declared table of fields for one
//! record type. Each field names its semantic type and whether it is a tag,
//! the timestamp, or (by elimination) a value. Schemas are built once, either
//! through [`SchemaBuilder`] or by deserializing a JSON document, and are
//! immutable afterwards.
//!
//! # Example
//!
//! ```rust
//! use telemodel::schema::{FieldDef, FieldType, Schema};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::builder("sensor_reading")
//!     .tag("room", FieldType::String)
//!     .field_def(FieldDef::new("unit", FieldType::String).tag().with_default("celsius"))
//!     .field("temperature", FieldType::Float)
//!     .timestamp("ts", FieldType::Integer)
//!     .build()?;
//!
//! assert_eq!(schema.metric_name(), Some("sensor_reading"));
//! assert_eq!(schema.fields().len(), 4);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SchemaError};

/// Multiplier from milliseconds to nanoseconds.
///
/// Used when a schema does not declare its own timestamp scale.
pub const DEFAULT_TIMESTAMP_SCALE: u64 = 1_000_000;

/// Semantic type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 text.
    String,
    /// 64-bit floating point.
    Float,
    /// Signed 64-bit integer.
    Integer,
    /// Unsigned 64-bit integer.
    Unsigned,
    /// Boolean.
    Boolean,
    /// Integer epoch time in the schema's timestamp unit.
    Timestamp,
    /// A nested key/value structure, flattened on write.
    Nested,
}

/// Descriptor for a single schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name as it appears in the serialized record.
    pub name: String,

    /// Semantic type of the field.
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Whether the field is a tag (categorical dimension).
    #[serde(default, skip_serializing_if = "is_false")]
    pub tag: bool,

    /// Whether the field is the point's timestamp.
    #[serde(default, skip_serializing_if = "is_false")]
    pub timestamp: bool,

    /// Declared default value.
    ///
    /// A record field equal to its default is left out of the sparse
    /// serialization. Tags and the timestamp fall back to it when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl FieldDef {
    /// Creates a plain value field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            tag: false,
            timestamp: false,
            default: None,
        }
    }

    /// Marks this field as a tag.
    #[must_use]
    pub fn tag(mut self) -> Self {
        self.tag = true;
        self
    }

    /// Marks this field as the timestamp.
    #[must_use]
    pub fn timestamp(mut self) -> Self {
        self.timestamp = true;
        self
    }

    /// Sets the declared default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// A named, ordered set of field descriptors for one record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Metric (measurement) name records of this schema are written under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_name: Option<String>,

    /// Multiplier converting the timestamp field's unit to nanoseconds.
    ///
    /// `None` means [`DEFAULT_TIMESTAMP_SCALE`] (milliseconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_scale: Option<u64>,

    /// Fields in declaration order.
    pub fields: Vec<FieldDef>,
}

impl Schema {
    /// Starts building a schema whose records are written under `metric_name`.
    pub fn builder(metric_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            schema: Self {
                metric_name: Some(metric_name.into()),
                timestamp_scale: None,
                fields: Vec::new(),
            },
        }
    }

    /// Creates an unnamed schema from field descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the fields do not validate.
    pub fn from_fields(fields: Vec<FieldDef>) -> Result<Self> {
        let schema = Self {
            metric_name: None,
            timestamp_scale: None,
            fields,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Validates the schema definition.
    ///
    /// Checks that field names are non-empty and unique, that no field is
    /// both a tag and the timestamp, that at most one field is the timestamp
    /// and that an explicit timestamp scale is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.fields.len());
        let mut timestamp: Option<&str> = None;

        for field in &self.fields {
            if field.name.is_empty() {
                return Err(SchemaError::EmptyFieldName.into());
            }

            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    field: field.name.clone(),
                }
                .into());
            }

            if field.tag && field.timestamp {
                return Err(SchemaError::TagAndTimestamp {
                    field: field.name.clone(),
                }
                .into());
            }

            if field.timestamp {
                if let Some(first) = timestamp {
                    return Err(SchemaError::MultipleTimestampFields {
                        first: first.to_string(),
                        second: field.name.clone(),
                    }
                    .into());
                }
                timestamp = Some(field.name.as_str());
            }
        }

        if self.timestamp_scale == Some(0) {
            return Err(SchemaError::InvalidTimestampScale.into());
        }

        Ok(())
    }

    /// Returns the metric name, if one was declared.
    pub fn metric_name(&self) -> Option<&str> {
        self.metric_name.as_deref().filter(|name| !name.is_empty())
    }

    /// Returns the fields in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the declared default of a field, if any.
    pub fn default_of(&self, name: &str) -> Option<&Value> {
        self.field(name).and_then(|f| f.default.as_ref())
    }
}

/// Incremental builder for [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Adds a plain value field.
    #[must_use]
    pub fn field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field_def(FieldDef::new(name, field_type))
    }

    /// Adds a tag field.
    #[must_use]
    pub fn tag(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field_def(FieldDef::new(name, field_type).tag())
    }

    /// Adds the timestamp field.
    #[must_use]
    pub fn timestamp(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field_def(FieldDef::new(name, field_type).timestamp())
    }

    /// Adds a fully specified field descriptor.
    #[must_use]
    pub fn field_def(mut self, field: FieldDef) -> Self {
        self.schema.fields.push(field);
        self
    }

    /// Sets the timestamp scale (native unit to nanoseconds).
    #[must_use]
    pub fn timestamp_scale(mut self, scale: u64) -> Self {
        self.schema.timestamp_scale = Some(scale);
        self
    }

    /// Validates and returns the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if validation fails.
    pub fn build(self) -> Result<Schema> {
        self.schema.validate()?;
        Ok(self.schema)
    }
}

/// A record type that carries its own schema.
///
/// Implemented by hand next to the record's `serde` derives, so the field
/// table lives beside the struct it describes.
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use telemodel::schema::{FieldType, Model, Schema};
///
/// #[derive(Serialize, Deserialize)]
/// struct Reading {
///     #[serde(default, skip_serializing_if = "Option::is_none")]
///     room: Option<String>,
///     #[serde(default, skip_serializing_if = "Option::is_none")]
///     temperature: Option<f64>,
/// }
///
/// impl Model for Reading {
///     fn schema() -> Schema {
///         Schema::builder("reading")
///             .tag("room", FieldType::String)
///             .field("temperature", FieldType::Float)
///             .build()
///             .expect("static schema is valid")
///     }
/// }
/// ```
pub trait Model {
    /// Returns the descriptor table for this record type.
    fn schema() -> Schema;
}
