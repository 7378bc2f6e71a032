//! Metric points and the record-to-point conversion.
//!
//! A [`Point`] is the unit handed to a write sink: a metric name, a tag map,
//! a value map and an optional nanosecond timestamp. [`PointBuilder`] turns a
//! serialized record into a point using a schema's [`Classification`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::classify::Classification;
use crate::error::{Result, WriteError};
use crate::flatten::flatten_default;
use crate::schema::Schema;

/// A scalar metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean value.
    Boolean(bool),
    /// Signed integer value.
    Integer(i64),
    /// Unsigned integer value (only when it does not fit in `i64`).
    Unsigned(u64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    String(String),
}

impl FieldValue {
    /// Converts a JSON leaf into a field value.
    ///
    /// Returns `None` for `null`. Arrays and objects are carried as their JSON
    /// text since points only hold scalars.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Boolean(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Integer(i))
                } else if let Some(u) = n.as_u64() {
                    Some(Self::Unsigned(u))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            Value::String(s) => Some(Self::String(s.clone())),
            other => Some(Self::String(other.to_string())),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Unsigned(u) => write!(f, "{u}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// One write unit submitted to a [`WriteSink`](crate::sink::WriteSink).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Metric (measurement) name.
    pub metric: String,
    /// Tag key/value pairs.
    pub tags: BTreeMap<String, String>,
    /// Value fields.
    pub values: BTreeMap<String, FieldValue>,
    /// Nanoseconds since the Unix epoch. `None` lets the sink assign the
    /// write time.
    pub timestamp: Option<i64>,
}

impl Point {
    /// Creates a point with no tags, values or timestamp.
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            tags: BTreeMap::new(),
            values: BTreeMap::new(),
            timestamp: None,
        }
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds a value field.
    #[must_use]
    pub fn value(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Sets the timestamp in nanoseconds.
    #[must_use]
    pub fn timestamp(mut self, ns: i64) -> Self {
        self.timestamp = Some(ns);
        self
    }
}

/// Converts serialized records of one schema into points.
///
/// The conversion:
///
/// 1. drops unset (`null`) entries and entries equal to their declared
///    default, giving the sparse representation;
/// 2. flattens nested objects;
/// 3. pulls every tag out of the flattened map, falling back to the full
///    record and then to the declared default, so default-valued tags are
///    never lost and never become values;
/// 4. does the same for the timestamp and scales it to nanoseconds;
/// 5. keeps what is left as the value map.
#[derive(Debug, Clone, Copy)]
pub struct PointBuilder<'a> {
    metric: &'a str,
    schema: &'a Schema,
    classification: &'a Classification,
}

impl<'a> PointBuilder<'a> {
    /// Creates a builder for `metric` records described by `schema`.
    pub fn new(metric: &'a str, schema: &'a Schema, classification: &'a Classification) -> Self {
        Self {
            metric,
            schema,
            classification,
        }
    }

    /// Serializes `record` and converts it to a point.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError`] if the record does not serialize to an object,
    /// a tag or the timestamp cannot be resolved, or the timestamp is not a
    /// number that fits in `i64` nanoseconds once scaled.
    pub fn build<R: Serialize + ?Sized>(&self, record: &R) -> Result<Point> {
        let full = match serde_json::to_value(record)
            .map_err(|source| WriteError::Serialize { source })?
        {
            Value::Object(map) => map,
            other => {
                return Err(WriteError::NotAnObject {
                    kind: json_kind(&other),
                }
                .into());
            }
        };
        self.build_from_object(&full)
    }

    /// Converts an already serialized record to a point.
    ///
    /// # Errors
    ///
    /// Same as [`PointBuilder::build`], minus serialization.
    pub fn build_from_object(&self, full: &Map<String, Value>) -> Result<Point> {
        let mut data = flatten_default(&self.sparse(full));
        let full_flat = flatten_default(full);

        let mut tags = BTreeMap::new();
        for tag in self.classification.tags() {
            let value = self
                .resolve(tag, &mut data, &full_flat)
                .ok_or_else(|| WriteError::MissingTag {
                    tag: tag.to_string(),
                })?;
            tags.insert(tag.to_string(), tag_string(&value));
        }

        let timestamp = match self.classification.timestamp_field() {
            Some(field) => {
                let native = self.resolve(field, &mut data, &full_flat).ok_or_else(|| {
                    WriteError::MissingTimestamp {
                        field: field.to_string(),
                    }
                })?;
                Some(scale_timestamp(
                    field,
                    &native,
                    self.classification.timestamp_scale(),
                )?)
            }
            None => None,
        };

        let values = data
            .iter()
            .filter_map(|(key, value)| FieldValue::from_json(value).map(|v| (key.clone(), v)))
            .collect();

        Ok(Point {
            metric: self.metric.to_string(),
            tags,
            values,
            timestamp,
        })
    }

    /// Keeps only entries that are set and differ from their declared default.
    fn sparse(&self, full: &Map<String, Value>) -> Map<String, Value> {
        full.iter()
            .filter(|(key, value)| {
                !value.is_null() && self.schema.default_of(key) != Some(*value)
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Takes `key` out of the sparse data, else reads it off the full record,
    /// else uses the declared default.
    fn resolve(
        &self,
        key: &str,
        data: &mut BTreeMap<String, Value>,
        full_flat: &BTreeMap<String, Value>,
    ) -> Option<Value> {
        data.remove(key)
            .filter(|v| !v.is_null())
            .or_else(|| full_flat.get(key).filter(|v| !v.is_null()).cloned())
            .or_else(|| self.schema.default_of(key).cloned())
    }
}

/// Renders a tag value: strings verbatim, anything else as JSON text.
fn tag_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Multiplies a native timestamp by `scale`, giving nanoseconds.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)] // range checked before the cast
fn scale_timestamp(field: &str, native: &Value, scale: u64) -> Result<i64> {
    let overflow = || WriteError::TimestampOverflow {
        field: field.to_string(),
        value: native.to_string(),
        scale,
    };

    let Value::Number(n) = native else {
        return Err(WriteError::InvalidTimestamp {
            field: field.to_string(),
            value: native.to_string(),
        }
        .into());
    };

    if let Some(i) = n.as_i64() {
        let scale = i64::try_from(scale).map_err(|_| overflow())?;
        return i.checked_mul(scale).ok_or_else(|| overflow().into());
    }

    if n.is_u64() {
        return Err(overflow().into());
    }

    let scaled = (n.as_f64().unwrap_or(f64::NAN) * scale as f64).round();
    if !scaled.is_finite() || scaled < i64::MIN as f64 || scaled >= i64::MAX as f64 {
        return Err(overflow().into());
    }
    Ok(scaled as i64)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
