//! Schema classification.
//!
//! Splits a [`Schema`]'s fields into tags, the timestamp field and value
//! fields. Classification runs once when an adapter is constructed and the
//! result is immutable afterwards, so it can be shared across threads.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::schema::{DEFAULT_TIMESTAMP_SCALE, FieldType, Schema};

/// The tag / timestamp / value split of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Tag field names, sorted.
    tags: BTreeSet<String>,
    /// The timestamp field name, if the schema declares one.
    timestamp_field: Option<String>,
    /// Semantic type of the timestamp field.
    timestamp_type: Option<FieldType>,
    /// Every other field name, sorted.
    values: BTreeSet<String>,
    /// Multiplier from the timestamp field's unit to nanoseconds.
    timestamp_scale: u64,
}

impl Classification {
    /// Classifies a schema's fields.
    ///
    /// A field is a tag iff it is marked as one and the timestamp iff it is
    /// marked as the timestamp. Everything else is a value field.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`](crate::error::SchemaError) if the schema does
    /// not validate. In particular, a schema with more than one timestamp
    /// field is rejected rather than resolved silently.
    pub fn classify(schema: &Schema) -> Result<Self> {
        Self::classify_with_prefix(schema, "")
    }

    /// Classifies a schema with every field name prefixed by `prefix`.
    ///
    /// Used for sub-schemas embedded under a flattened key: a nested field
    /// `net` holding `{iface, rx}` flattens to `net_iface` / `net_rx`, so the
    /// sub-schema is classified with prefix `"net_"`.
    ///
    /// # Errors
    ///
    /// Same as [`Classification::classify`].
    pub fn classify_with_prefix(schema: &Schema, prefix: &str) -> Result<Self> {
        schema.validate()?;

        let mut tags = BTreeSet::new();
        let mut values = BTreeSet::new();
        let mut timestamp_field = None;
        let mut timestamp_type = None;

        for field in schema.fields() {
            let name = format!("{prefix}{}", field.name);
            if field.tag {
                tags.insert(name);
            } else if field.timestamp {
                timestamp_field = Some(name);
                timestamp_type = Some(field.field_type);
            } else {
                values.insert(name);
            }
        }

        Ok(Self {
            tags,
            timestamp_field,
            timestamp_type,
            values,
            timestamp_scale: schema.timestamp_scale.unwrap_or(DEFAULT_TIMESTAMP_SCALE),
        })
    }

    /// Overrides the timestamp scale. A scale of 0 keeps the current one.
    #[must_use]
    pub fn with_timestamp_scale(mut self, scale: u64) -> Self {
        if scale > 0 {
            self.timestamp_scale = scale;
        }
        self
    }

    /// Returns the tag field names in sorted order.
    pub fn tags(&self) -> impl ExactSizeIterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Returns `true` if `name` is a tag field.
    pub fn is_tag(&self, name: &str) -> bool {
        self.tags.contains(name)
    }

    /// Returns the timestamp field name, if any.
    pub fn timestamp_field(&self) -> Option<&str> {
        self.timestamp_field.as_deref()
    }

    /// Returns the semantic type of the timestamp field, if any.
    pub fn timestamp_type(&self) -> Option<FieldType> {
        self.timestamp_type
    }

    /// Returns the value field names in sorted order.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    /// Returns the multiplier from the timestamp's native unit to nanoseconds.
    pub fn timestamp_scale(&self) -> u64 {
        self.timestamp_scale
    }
}
