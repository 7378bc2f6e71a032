//! InfluxQL query construction and result post-processing.
//!
//! Two read shapes are supported:
//!
//! - **Latest unique**: the most recent point for every distinct tag
//!   combination matching the filters (`GROUP BY * ... LIMIT 1`), optionally
//!   reduced further to one row per value of a non-tag column.
//! - **Time series**: every point matching the filters inside an optional
//!   time window, newest first and capped by a limit, then sorted ascending
//!   and deduplicated by timestamp.
//!
//! Filter values and the metric name are interpolated into the query text
//! verbatim. Nothing is escaped or parameterized, so callers must not pass
//! untrusted input.
//!
//! # Example
//!
//! ```rust
//! use telemodel::query::{Filters, QueryBuilder};
//!
//! let builder = QueryBuilder::new("test_model", ["category"]);
//! let filters = Filters::new().with("category", "x");
//!
//! assert_eq!(
//!     builder.latest_unique(&filters),
//!     r#"SELECT *,category FROM "test_model" WHERE "category"='x' GROUP BY * ORDER BY time DESC LIMIT 1"#
//! );
//! ```

use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde_json::Value;

use crate::error::{QueryError, Result};
use crate::result::{Row, TimeSeries};

/// Default row cap for time-series reads.
pub const DEFAULT_LIMIT: usize = 10_000;

/// Chunk size requested from the read sink for time-series reads.
pub const CHUNK_SIZE: usize = 10_000;

/// Ordered equality filters (`"field"='value'` terms joined with `AND`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    terms: Vec<(String, String)>,
}

impl Filters {
    /// Creates an empty filter set (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `field = value` term.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Display) -> Self {
        self.push(field, value);
        self
    }

    /// Adds a `field = value` term in place.
    pub fn push(&mut self, field: impl Into<String>, value: impl Display) {
        self.terms.push((field.into(), value.to_string()));
    }

    /// Returns `true` if there are no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Returns the terms in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.terms.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn clauses(&self) -> Vec<String> {
        self.terms
            .iter()
            .map(|(field, value)| format!("\"{field}\"='{value}'"))
            .collect()
    }
}

impl<K: Into<String>, V: Display> FromIterator<(K, V)> for Filters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut filters = Self::new();
        for (k, v) in iter {
            filters.push(k, v);
        }
        filters
    }
}

/// Parameters of a time-series read.
///
/// Defaults to the newest [`DEFAULT_LIMIT`] points with no time window and
/// no filters.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesQuery {
    limit: Option<usize>,
    last: Option<Duration>,
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
    filters: Filters,
}

impl Default for TimeSeriesQuery {
    fn default() -> Self {
        Self {
            limit: Some(DEFAULT_LIMIT),
            last: None,
            after: None,
            before: None,
            filters: Filters::new(),
        }
    }
}

impl TimeSeriesQuery {
    /// Creates a query with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of points. `0` means unbounded.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Removes the point cap.
    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.limit = None;
        self
    }

    /// Restricts to points newer than `now - window`. Takes precedence over
    /// [`TimeSeriesQuery::after`]; a zero window is ignored.
    #[must_use]
    pub fn last(mut self, window: Duration) -> Self {
        self.last = Some(window);
        self
    }

    /// Restricts to points at or after `after`.
    #[must_use]
    pub fn after(mut self, after: DateTime<Utc>) -> Self {
        self.after = Some(after);
        self
    }

    /// Restricts to points strictly before `before`.
    #[must_use]
    pub fn before(mut self, before: DateTime<Utc>) -> Self {
        self.before = Some(before);
        self
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Display) -> Self {
        self.filters.push(field, value);
        self
    }

    /// Replaces the equality filters.
    #[must_use]
    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Returns the effective point cap (`None` when unbounded).
    pub fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|&n| n > 0)
    }

    /// Resolves the `[after, before)` window against `now`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidWindow`] if `now - last` cannot be
    /// represented.
    pub fn window(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let after = match self.last.filter(|d| !d.is_zero()) {
            Some(window) => {
                let delta = TimeDelta::from_std(window).map_err(|e| QueryError::InvalidWindow {
                    reason: e.to_string(),
                })?;
                Some(
                    now.checked_sub_signed(delta)
                        .ok_or_else(|| QueryError::InvalidWindow {
                            reason: format!("{window:?} before {now} is out of range"),
                        })?,
                )
            }
            None => self.after,
        };
        Ok((after, self.before))
    }
}

/// Renders InfluxQL for one metric and its tag columns.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    metric: String,
    tags: Vec<String>,
}

impl QueryBuilder {
    /// Creates a builder for `metric` selecting `tags` explicitly.
    pub fn new<I, S>(metric: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metric: metric.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Query for the newest point of every tag combination matching `filters`.
    pub fn latest_unique(&self, filters: &Filters) -> String {
        format!(
            "{} WHERE {} GROUP BY * ORDER BY time DESC LIMIT 1",
            self.select(),
            where_clause(filters.clauses())
        )
    }

    /// Query for a time series, with the window resolved against `now`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidWindow`] if the window cannot be resolved.
    pub fn time_series(&self, query: &TimeSeriesQuery, now: DateTime<Utc>) -> Result<String> {
        let mut clauses = query.filters.clauses();
        let (after, before) = query.window(now)?;
        if let Some(after) = after {
            clauses.push(format!("time >= '{}'", rfc3339(after)));
        }
        if let Some(before) = before {
            clauses.push(format!("time < '{}'", rfc3339(before)));
        }

        let mut text = format!(
            "{} WHERE {} ORDER BY time DESC",
            self.select(),
            where_clause(clauses)
        );
        if let Some(limit) = query.effective_limit() {
            text.push_str(&format!(" LIMIT {limit}"));
        }
        Ok(text)
    }

    /// Query dropping the whole measurement.
    pub fn drop_measurement(&self) -> String {
        format!("DROP MEASUREMENT \"{}\"", self.metric)
    }

    fn select(&self) -> String {
        let mut columns = String::from("*");
        for tag in &self.tags {
            columns.push(',');
            columns.push_str(tag);
        }
        format!("SELECT {columns} FROM \"{}\"", self.metric)
    }
}

fn where_clause(clauses: Vec<String>) -> String {
    if clauses.is_empty() {
        "1=1".to_string()
    } else {
        clauses.join(" AND ")
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Sorts rows ascending by time, keeps the first row per exact timestamp and
/// caps the result at the newest `limit` rows.
///
/// The sort is stable, so "first" means first in sink order.
pub(crate) fn dedup_by_time(mut rows: Vec<Row>, limit: Option<usize>) -> TimeSeries {
    rows.sort_by_key(|r| r.time);

    let before = rows.len();
    rows.dedup_by_key(|r| r.time);
    let duplicates_dropped = before - rows.len();

    let mut truncated = false;
    if let Some(limit) = limit
        && rows.len() > limit
    {
        rows.drain(..rows.len() - limit);
        truncated = true;
    }

    TimeSeries::new(rows, duplicates_dropped, truncated)
}

/// Keeps, per distinct value of `column`, the row with the latest time.
///
/// Ties go to the row that came later in sink order. Rows without the
/// column (or with `null`) are dropped. The result is ordered by group value.
pub(crate) fn latest_per_group(mut rows: Vec<Row>, column: &str) -> Vec<Row> {
    rows.sort_by_key(|r| r.time);

    let mut groups: BTreeMap<String, Row> = BTreeMap::new();
    for row in rows {
        let Some(key) = row.get(column).and_then(group_key) else {
            continue;
        };
        groups.insert(key, row);
    }
    groups.into_values().collect()
}

fn group_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{Map, json};

    fn row(time: i64, cells: Value) -> Row {
        let columns: Map<String, Value> = match cells {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        Row::new(time, columns)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_latest_unique_without_filters() {
        let builder = QueryBuilder::new("test_model", Vec::<String>::new());
        assert_eq!(
            builder.latest_unique(&Filters::new()),
            r#"SELECT * FROM "test_model" WHERE 1=1 GROUP BY * ORDER BY time DESC LIMIT 1"#
        );
    }

    #[test]
    fn test_latest_unique_with_tags_and_filters() {
        let builder = QueryBuilder::new("m", ["category", "host"]);
        let filters = Filters::new().with("category", "x").with("shard", 3);
        assert_eq!(
            builder.latest_unique(&filters),
            r#"SELECT *,category,host FROM "m" WHERE "category"='x' AND "shard"='3' GROUP BY * ORDER BY time DESC LIMIT 1"#
        );
    }

    #[test]
    fn test_time_series_default() {
        let builder = QueryBuilder::new("m", ["category"]);
        let q = builder.time_series(&TimeSeriesQuery::new(), now()).unwrap();
        assert_eq!(
            q,
            r#"SELECT *,category FROM "m" WHERE 1=1 ORDER BY time DESC LIMIT 10000"#
        );
    }

    #[test]
    fn test_time_series_window_and_unbounded() {
        let builder = QueryBuilder::new("m", Vec::<String>::new());
        let query = TimeSeriesQuery::new()
            .unbounded()
            .filter("category", "x")
            .after(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .before(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());

        assert_eq!(
            builder.time_series(&query, now()).unwrap(),
            r#"SELECT * FROM "m" WHERE "category"='x' AND time >= '2024-01-01T00:00:00Z' AND time < '2024-01-02T00:00:00Z' ORDER BY time DESC"#
        );
    }

    #[test]
    fn test_last_overrides_after() {
        let query = TimeSeriesQuery::new()
            .after(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap())
            .last(Duration::from_secs(3600));

        let (after, before) = query.window(now()).unwrap();
        assert_eq!(after, Some(Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap()));
        assert_eq!(before, None);

        // A zero window is ignored.
        let query = TimeSeriesQuery::new().last(Duration::ZERO);
        assert_eq!(query.window(now()).unwrap(), (None, None));
    }

    #[test]
    fn test_zero_limit_is_unbounded() {
        assert_eq!(TimeSeriesQuery::new().limit(0).effective_limit(), None);
        assert_eq!(TimeSeriesQuery::new().limit(5).effective_limit(), Some(5));
        assert_eq!(
            TimeSeriesQuery::new().effective_limit(),
            Some(DEFAULT_LIMIT)
        );
    }

    #[test]
    fn test_drop_measurement_query() {
        let builder = QueryBuilder::new("m", ["a"]);
        assert_eq!(builder.drop_measurement(), r#"DROP MEASUREMENT "m""#);
    }

    #[test]
    fn test_filters_from_iter() {
        let filters: Filters = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(filters.iter().collect::<Vec<_>>(), [("a", "1"), ("b", "2")]);
    }

    #[test]
    fn test_dedup_keeps_first_and_sorts() {
        let rows = vec![
            row(3, json!({"v": "c"})),
            row(1, json!({"v": "a-first"})),
            row(2, json!({"v": "b"})),
            row(1, json!({"v": "a-second"})),
        ];

        let ts = dedup_by_time(rows, None);
        assert_eq!(ts.timestamps().collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(ts.rows()[0].get("v"), Some(&json!("a-first")));
        assert_eq!(ts.duplicates_dropped(), 1);
        assert!(!ts.truncated());
    }

    #[test]
    fn test_dedup_limit_keeps_newest() {
        let rows = (0..10).map(|i| row(i, json!({"v": i}))).collect();
        let ts = dedup_by_time(rows, Some(3));

        assert_eq!(ts.len(), 3);
        assert_eq!(ts.timestamps().collect::<Vec<_>>(), [7, 8, 9]);
        assert!(ts.truncated());
    }

    #[test]
    fn test_latest_per_group() {
        let rows = vec![
            row(5, json!({"room": "b", "v": 1})),
            row(9, json!({"room": "a", "v": 2})),
            row(7, json!({"room": "b", "v": 3})),
            row(1, json!({"room": "a", "v": 4})),
            row(8, json!({"v": 5})),
            row(7, json!({"room": "b", "v": 6})),
        ];

        let reduced = latest_per_group(rows, "room");
        assert_eq!(reduced.len(), 2);
        assert_eq!(reduced[0].get("room"), Some(&json!("a")));
        assert_eq!(reduced[0].time, 9);
        assert_eq!(reduced[1].get("room"), Some(&json!("b")));
        assert_eq!(reduced[1].time, 7);
        // Tie at t=7: the later row in sink order wins.
        assert_eq!(reduced[1].get("v"), Some(&json!(6)));
    }
}
