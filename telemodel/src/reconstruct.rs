//! Rebuilding records from stored rows.
//!
//! The inverse of the write path: a [`Row`]'s nanosecond time is converted
//! back to the schema's native timestamp unit and placed under the timestamp
//! field, the other cells are carried over, and the result is deserialized
//! into the record type. No validation happens: fields the row does not carry
//! stay unset, which for `Option` fields with `#[serde(default)]` means
//! `None`.

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use crate::classify::Classification;
use crate::error::{QueryError, Result};
use crate::result::Row;
use crate::schema::FieldType;

/// Converts rows back into records of one schema.
#[derive(Debug, Clone, Copy)]
pub struct RowReconstructor<'a> {
    timestamp_field: Option<&'a str>,
    timestamp_type: Option<FieldType>,
    timestamp_scale: u64,
}

impl<'a> RowReconstructor<'a> {
    /// Creates a reconstructor from a classification.
    pub fn new(classification: &'a Classification) -> Self {
        Self {
            timestamp_field: classification.timestamp_field(),
            timestamp_type: classification.timestamp_type(),
            timestamp_scale: classification.timestamp_scale(),
        }
    }

    /// Builds the record object for `row` without deserializing it.
    ///
    /// `null` cells are dropped so the matching fields stay unset.
    pub fn object_for(&self, row: &Row) -> Map<String, Value> {
        let mut object: Map<String, Value> = row
            .columns
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(field) = self.timestamp_field {
            let integral = matches!(
                self.timestamp_type,
                Some(FieldType::Integer | FieldType::Unsigned | FieldType::Timestamp)
            );
            object.insert(
                field.to_string(),
                native_timestamp(row.time, self.timestamp_scale, integral),
            );
        }

        object
    }

    /// Rebuilds one record from `row`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Reconstruct`] if the cells cannot be
    /// deserialized into `R` (a type mismatch, or a field `R` requires that
    /// the row does not carry).
    pub fn reconstruct<R: DeserializeOwned>(&self, row: &Row) -> Result<R> {
        serde_json::from_value(Value::Object(self.object_for(row)))
            .map_err(|source| QueryError::Reconstruct { source }.into())
    }
}

/// Converts nanoseconds to the native unit (`ns / scale`).
///
/// Equivalent to `seconds * 10^9 / scale`. For `integral` timestamp fields the
/// quotient is floored to a whole unit, so a time stored between two units
/// still fits an integer field. Otherwise exact quotients stay integers and
/// anything else becomes a float.
#[allow(clippy::cast_precision_loss)] // sub-unit precision is inherently approximate
fn native_timestamp(ns: i64, scale: u64, integral: bool) -> Value {
    if scale == 0 {
        return Value::Null;
    }
    if integral {
        // |quotient| <= |ns| for any scale >= 1.
        let floored = i128::from(ns).div_euclid(i128::from(scale));
        return i64::try_from(floored).map_or(Value::Null, Value::from);
    }
    if let Ok(divisor) = i64::try_from(scale) {
        if ns % divisor == 0 {
            return Value::from(ns / divisor);
        }
    }
    Number::from_f64(ns as f64 / scale as f64).map_or(Value::Null, Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, Schema};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reading {
        #[serde(default)]
        category: Option<String>,
        #[serde(default)]
        value: Option<f64>,
        #[serde(default)]
        ts: Option<i64>,
    }

    fn classification(scale: u64) -> Classification {
        let schema = Schema::builder("m")
            .tag("category", FieldType::String)
            .field("value", FieldType::Float)
            .timestamp("ts", FieldType::Integer)
            .timestamp_scale(scale)
            .build()
            .unwrap();
        Classification::classify(&schema).unwrap()
    }

    fn row(time: i64, cells: Value) -> Row {
        match cells {
            Value::Object(m) => Row::new(time, m),
            _ => Row::new(time, Map::new()),
        }
    }

    #[test]
    fn test_reconstruct_ms_timestamp() {
        let c = classification(1_000_000);
        let r = RowReconstructor::new(&c);

        let record: Reading = r
            .reconstruct(&row(
                1_700_000_000_123_000_000,
                json!({"category": "x", "value": 2.5}),
            ))
            .unwrap();

        assert_eq!(
            record,
            Reading {
                category: Some("x".to_string()),
                value: Some(2.5),
                ts: Some(1_700_000_000_123),
            }
        );
    }

    #[test]
    fn test_absent_fields_stay_unset() {
        let c = classification(1_000_000);
        let r = RowReconstructor::new(&c);

        let record: Reading = r
            .reconstruct(&row(0, json!({"value": null, "extra": 1})))
            .unwrap();
        assert_eq!(record.category, None);
        assert_eq!(record.value, None);
        assert_eq!(record.ts, Some(0));
    }

    #[test]
    fn test_inexact_timestamp_becomes_float() {
        assert_eq!(native_timestamp(1_500_000, 1_000_000, false), json!(1.5));
        assert_eq!(native_timestamp(2_000_000, 1_000_000, false), json!(2));
        assert_eq!(native_timestamp(5, 1, false), json!(5));
        assert_eq!(native_timestamp(1_500_000_000, 1_000_000_000, false), json!(1.5));
    }

    #[test]
    fn test_integral_timestamp_is_floored() {
        assert_eq!(native_timestamp(1_500_000, 1_000_000, true), json!(1));
        assert_eq!(native_timestamp(2_000_000, 1_000_000, true), json!(2));
        assert_eq!(native_timestamp(-1, 1_000_000, true), json!(-1));
        assert_eq!(native_timestamp(i64::MAX, u64::MAX, true), json!(0));
    }

    #[test]
    fn test_sub_unit_time_fits_integer_field() {
        let c = classification(1_000_000);
        let record: Reading = RowReconstructor::new(&c)
            .reconstruct(&row(1_700_000_000_000_500_000, json!({"category": "x"})))
            .unwrap();
        assert_eq!(record.ts, Some(1_700_000_000_000));
    }

    #[test]
    fn test_sub_unit_time_keeps_fraction_for_float_field() {
        let schema = Schema::builder("m")
            .timestamp("at", FieldType::Float)
            .timestamp_scale(1_000_000_000)
            .build()
            .unwrap();
        let c = Classification::classify(&schema).unwrap();
        let obj = RowReconstructor::new(&c).object_for(&row(1_500_000_000, json!({})));
        assert_eq!(obj["at"], json!(1.5));
    }

    #[test]
    fn test_timestamp_field_wins_over_cell() {
        let c = classification(1_000);
        let obj = RowReconstructor::new(&c).object_for(&row(5_000, json!({"ts": 99})));
        assert_eq!(obj["ts"], json!(5));
    }

    #[test]
    fn test_no_timestamp_field() {
        let schema = Schema::builder("m").field("value", FieldType::Float).build().unwrap();
        let c = Classification::classify(&schema).unwrap();
        let obj = RowReconstructor::new(&c).object_for(&row(5_000, json!({"value": 1.0})));
        assert_eq!(obj.len(), 1);
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let c = classification(1_000_000);
        let result: Result<Reading> =
            RowReconstructor::new(&c).reconstruct(&row(0, json!({"value": "not a number"})));
        assert!(result.is_err());
    }
}
