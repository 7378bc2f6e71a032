//! Tabular read results.
//!
//! A [`ResultSet`] is what a [`ReadSink`](crate::sink::ReadSink) returns: the
//! series of an InfluxDB `/query` response, each with a name, optional group
//! tags, column names and value rows. [`ResultSet::rows`] turns it into
//! [`Row`]s keyed by epoch nanoseconds, and [`TimeSeries`] is the ordered,
//! deduplicated result of a time-series read.
//!
//! # Example
//!
//! ```rust
//! use telemodel::result::ResultSet;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let body = r#"{"results":[{"statement_id":0,"series":[{
//!     "name":"cpu",
//!     "tags":{"host":"web1"},
//!     "columns":["time","usage"],
//!     "values":[["2023-11-14T22:13:20Z",85.5]]
//! }]}]}"#;
//!
//! let result = ResultSet::from_response(body)?;
//! let rows = result.rows()?;
//! assert_eq!(rows[0].time, 1_700_000_000_000_000_000);
//! assert_eq!(rows[0].get("host").unwrap(), "web1");
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{QueryError, Result};

/// Name of the time column in InfluxDB results.
pub const TIME_COLUMN: &str = "time";

/// One series of a query result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Measurement name.
    pub name: String,

    /// Group tags, present when the query used `GROUP BY`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    /// Column names, including `time`.
    pub columns: Vec<String>,

    /// Value rows, one cell per column.
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl Series {
    /// Converts the value rows into [`Row`]s.
    ///
    /// Group tags are merged into each row unless the row already has a
    /// non-null cell of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::MalformedSeries`] if there is no `time` column
    /// or a row's width differs from the column count, and
    /// [`QueryError::InvalidTime`] if a time cell cannot be converted.
    pub fn rows(&self) -> Result<Vec<Row>> {
        let time_index = self
            .columns
            .iter()
            .position(|c| c == TIME_COLUMN)
            .ok_or_else(|| QueryError::MalformedSeries {
                series: self.name.clone(),
                reason: "no time column".to_string(),
            })?;

        let mut rows = Vec::with_capacity(self.values.len());
        for cells in &self.values {
            if cells.len() != self.columns.len() {
                return Err(QueryError::MalformedSeries {
                    series: self.name.clone(),
                    reason: format!(
                        "row has {} cells for {} columns",
                        cells.len(),
                        self.columns.len()
                    ),
                }
                .into());
            }

            let time = parse_time(&cells[time_index])?;
            let mut columns: Map<String, Value> = self
                .columns
                .iter()
                .zip(cells)
                .enumerate()
                .filter(|(i, _)| *i != time_index)
                .map(|(_, (name, cell))| (name.clone(), cell.clone()))
                .collect();

            for (key, value) in &self.tags {
                let slot = columns.entry(key.clone()).or_insert(Value::Null);
                if slot.is_null() {
                    *slot = Value::String(value.clone());
                }
            }

            rows.push(Row { time, columns });
        }

        Ok(rows)
    }
}

/// The series returned by a read sink, in sink order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Series in the order the store returned them.
    #[serde(default)]
    pub series: Vec<Series>,
}

/// Top-level shape of an InfluxDB `/query` response document.
#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

impl ResultSet {
    /// Creates a result set from series.
    pub fn new(series: Vec<Series>) -> Self {
        Self { series }
    }

    /// Parses an InfluxDB `/query` response body.
    ///
    /// Chunked responses are a sequence of JSON documents; they are read in
    /// order and their series concatenated.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Parse`] for invalid JSON and
    /// [`QueryError::Response`] if the store reported an error.
    pub fn from_response(body: &str) -> Result<Self> {
        let mut set = Self::default();

        for document in serde_json::Deserializer::from_str(body).into_iter::<Response>() {
            let response = document.map_err(|source| QueryError::Parse { source })?;
            if let Some(message) = response.error {
                return Err(QueryError::Response { message }.into());
            }
            for result in response.results {
                if let Some(message) = result.error {
                    return Err(QueryError::Response { message }.into());
                }
                set.series.extend(result.series);
            }
        }

        Ok(set)
    }

    /// Appends another chunk's series.
    pub fn extend(&mut self, other: ResultSet) {
        self.series.extend(other.series);
    }

    /// Returns `true` if no series were returned.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Flattens all series into rows, in sink order.
    ///
    /// # Errors
    ///
    /// See [`Series::rows`].
    pub fn rows(&self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        for series in &self.series {
            rows.extend(series.rows()?);
        }
        Ok(rows)
    }
}

/// One result row: a timestamp plus named cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    /// Nanoseconds since the Unix epoch.
    pub time: i64,
    /// Every non-time column, group tags included.
    pub columns: Map<String, Value>,
}

impl Row {
    /// Creates a row.
    pub fn new(time: i64, columns: Map<String, Value>) -> Self {
        Self { time, columns }
    }

    /// Returns a cell by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }
}

/// Converts a time cell (RFC 3339 text or epoch nanoseconds) to nanoseconds.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)] // range checked before the cast
fn parse_time(cell: &Value) -> Result<i64> {
    let invalid = |reason: &str| QueryError::InvalidTime {
        value: cell.to_string(),
        reason: reason.to_string(),
    };

    match cell {
        Value::String(s) => {
            let parsed = DateTime::parse_from_rfc3339(s).map_err(|e| invalid(&e.to_string()))?;
            parsed
                .timestamp_nanos_opt()
                .ok_or_else(|| invalid("out of range for nanoseconds").into())
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            let f = n.as_f64().unwrap_or(f64::NAN);
            if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                Ok(f.round() as i64)
            } else {
                Err(invalid("out of range for nanoseconds").into())
            }
        }
        _ => Err(invalid("expected RFC 3339 text or epoch nanoseconds").into()),
    }
}

/// The ordered, deduplicated result of a time-series read.
///
/// Rows are sorted ascending by time with at most one row per timestamp.
/// Also records how many duplicate rows were dropped and whether the result
/// was cut down to the requested limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    rows: Vec<Row>,
    duplicates_dropped: usize,
    truncated: bool,
}

impl TimeSeries {
    pub(crate) fn new(rows: Vec<Row>, duplicates_dropped: usize, truncated: bool) -> Self {
        Self {
            rows,
            duplicates_dropped,
            truncated,
        }
    }

    /// Returns the rows in ascending time order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Consumes the result and returns its rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the row timestamps in order.
    pub fn timestamps(&self) -> impl Iterator<Item = i64> + '_ {
        self.rows.iter().map(|r| r.time)
    }

    /// Returns one column's cells in row order (`None` where a row lacks it).
    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = Option<&'a Value>> + 'a {
        self.rows.iter().map(move |r| r.get(name))
    }

    /// Number of rows dropped because an earlier row had the same timestamp.
    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates_dropped
    }

    /// Whether rows beyond the requested limit were discarded.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl IntoIterator for TimeSeries {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    fn series(columns: &[&str], values: Vec<Vec<Value>>) -> Series {
        Series {
            name: "m".to_string(),
            tags: BTreeMap::new(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            values,
        }
    }

    #[test]
    fn test_rows_from_epoch_and_rfc3339() {
        let s = series(
            &["time", "value"],
            vec![
                vec![json!(1_000), json!(1.0)],
                vec![json!("1970-01-01T00:00:00.000002Z"), json!(2.0)],
            ],
        );

        let rows = s.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].time, 1_000);
        assert_eq!(rows[1].time, 2_000);
        assert_eq!(rows[1].get("value"), Some(&json!(2.0)));
        assert!(rows[0].get("time").is_none());
    }

    #[test]
    fn test_group_tags_merged() {
        let mut s = series(
            &["time", "value", "host"],
            vec![
                vec![json!(1), json!(1.0), Value::Null],
                vec![json!(2), json!(2.0), json!("explicit")],
            ],
        );
        s.tags.insert("host".to_string(), "web1".to_string());
        s.tags.insert("dc".to_string(), "east".to_string());

        let rows = s.rows().unwrap();
        assert_eq!(rows[0].get("host"), Some(&json!("web1")));
        assert_eq!(rows[0].get("dc"), Some(&json!("east")));
        assert_eq!(rows[1].get("host"), Some(&json!("explicit")));
    }

    #[test]
    fn test_malformed_series() {
        let s = series(&["value"], vec![vec![json!(1.0)]]);
        assert!(matches!(
            s.rows(),
            Err(Error::Query(QueryError::MalformedSeries { .. }))
        ));

        let s = series(&["time", "value"], vec![vec![json!(1)]]);
        assert!(matches!(
            s.rows(),
            Err(Error::Query(QueryError::MalformedSeries { .. }))
        ));

        let s = series(&["time", "value"], vec![vec![json!(true), json!(1.0)]]);
        assert!(matches!(
            s.rows(),
            Err(Error::Query(QueryError::InvalidTime { .. }))
        ));
    }

    #[test]
    fn test_from_chunked_response() {
        let body = concat!(
            r#"{"results":[{"statement_id":0,"series":[{"name":"m","columns":["time","v"],"values":[[1,1]]}],"partial":true}]}"#,
            "\n",
            r#"{"results":[{"statement_id":0,"series":[{"name":"m","columns":["time","v"],"values":[[2,2]]}]}]}"#,
        );

        let set = ResultSet::from_response(body).unwrap();
        assert_eq!(set.series.len(), 2);
        let times: Vec<_> = set.rows().unwrap().iter().map(|r| r.time).collect();
        assert_eq!(times, [1, 2]);
    }

    #[test]
    fn test_from_response_errors() {
        let body = r#"{"results":[{"statement_id":0,"error":"measurement not found"}]}"#;
        match ResultSet::from_response(body) {
            Err(Error::Query(QueryError::Response { message })) => {
                assert_eq!(message, "measurement not found");
            }
            other => panic!("expected Response error, got {other:?}"),
        }

        assert!(matches!(
            ResultSet::from_response("not json"),
            Err(Error::Query(QueryError::Parse { .. }))
        ));
    }

    #[test]
    fn test_empty_response() {
        let set = ResultSet::from_response(r#"{"results":[{"statement_id":0}]}"#).unwrap();
        assert!(set.is_empty());
        assert!(set.rows().unwrap().is_empty());
    }
}
