//! The adapter between record types and metric points.
//!
//! A [`ModelIo`] is bound to one schema at construction: the schema is
//! classified once, the metric name is fixed, and the sinks are attached.
//! After that it is immutable and can be shared between threads.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde::Serialize;
//! use telemodel::{FieldType, LineProtocolSink, ModelIo, Schema};
//!
//! #[derive(Serialize)]
//! struct Reading {
//!     room: String,
//!     temperature: f64,
//!     ts: i64,
//! }
//!
//! # fn main() -> telemodel::Result<()> {
//! let schema = Schema::builder("readings")
//!     .tag("room", FieldType::String)
//!     .field("temperature", FieldType::Float)
//!     .timestamp("ts", FieldType::Integer)
//!     .build()?;
//!
//! let sink = Arc::new(LineProtocolSink::new(Vec::new()));
//! let io: ModelIo<Reading> = ModelIo::builder(schema).write_sink(sink.clone()).build()?;
//!
//! io.write(&Reading { room: "lab".into(), temperature: 21.5, ts: 1_700_000_000_000 })?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::classify::Classification;
use crate::error::{ConfigError, Result};
use crate::point::{Point, PointBuilder};
use crate::query::{CHUNK_SIZE, Filters, QueryBuilder, TimeSeriesQuery, dedup_by_time, latest_per_group};
use crate::reconstruct::RowReconstructor;
use crate::result::{Row, TimeSeries};
use crate::schema::{Model, Schema};
use crate::settings::{IoMode, Settings};
use crate::sink::{ReadSink, SinkFactory, WriteSink};

/// Writes records of type `R` as metric points and reads them back.
pub struct ModelIo<R> {
    metric_name: String,
    schema: Schema,
    classification: Classification,
    queries: QueryBuilder,
    write_sink: Arc<dyn WriteSink>,
    read_sink: Option<Arc<dyn ReadSink>>,
    _record: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for ModelIo<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelIo")
            .field("metric_name", &self.metric_name)
            .field("classification", &self.classification)
            .field("readable", &self.read_sink.is_some())
            .finish_non_exhaustive()
    }
}

impl<R> ModelIo<R> {
    /// Starts building an adapter for `schema`.
    pub fn builder(schema: Schema) -> ModelIoBuilder<R> {
        ModelIoBuilder::new(schema)
    }

    /// Starts building an adapter for a type that declares its own schema.
    pub fn for_model() -> ModelIoBuilder<R>
    where
        R: Model,
    {
        ModelIoBuilder::new(R::schema())
    }

    /// Returns the metric name points are written under.
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the field classification.
    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    /// Returns `true` if read operations are available.
    pub fn is_readable(&self) -> bool {
        self.read_sink.is_some()
    }

    /// Drops every point stored under the metric.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingReadSink`] without touching any sink
    /// when the adapter is write-only, or the sink's error.
    pub fn drop_all(&self) -> Result<()> {
        let sink = self.reader("drop_all")?;
        debug!(metric = %self.metric_name, "dropping measurement");
        sink.drop_measurement(&self.metric_name)?;
        Ok(())
    }

    /// Fetches a deduplicated, time-ordered series.
    ///
    /// Same as [`ModelIo::time_series_at`] with the current time.
    ///
    /// # Errors
    ///
    /// See [`ModelIo::time_series_at`].
    pub fn time_series(&self, query: &TimeSeriesQuery) -> Result<TimeSeries> {
        self.time_series_at(query, Utc::now())
    }

    /// Fetches a deduplicated, time-ordered series, resolving a relative
    /// window against `now`.
    ///
    /// Rows come back ascending by time with exactly one row per timestamp
    /// (the first the sink returned). At most `limit` rows are kept, the
    /// newest ones.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingReadSink`] when the adapter is
    /// write-only, a [`QueryError`](crate::error::QueryError) if the window
    /// or the result set is invalid, or the sink's error.
    pub fn time_series_at(&self, query: &TimeSeriesQuery, now: DateTime<Utc>) -> Result<TimeSeries> {
        let sink = self.reader("time_series")?;
        let text = self.queries.time_series(query, now)?;
        debug!(metric = %self.metric_name, query = %text, "issuing time series query");

        let rows = sink.query(&text, true, CHUNK_SIZE)?.rows()?;
        let received = rows.len();
        let series = dedup_by_time(rows, query.effective_limit());

        if series.duplicates_dropped() > 0 {
            debug!(
                metric = %self.metric_name,
                dropped = series.duplicates_dropped(),
                "dropped rows with duplicate timestamps"
            );
        }
        debug!(metric = %self.metric_name, received, kept = series.len(), "time series fetched");
        Ok(series)
    }

    fn reader(&self, operation: &'static str) -> Result<&dyn ReadSink> {
        self.read_sink
            .as_deref()
            .ok_or_else(|| ConfigError::MissingReadSink { operation }.into())
    }
}

impl<R: Serialize> ModelIo<R> {
    /// Converts a record to the point [`ModelIo::write`] would emit.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError`](crate::error::WriteError) if the record cannot
    /// be converted.
    pub fn point(&self, record: &R) -> Result<Point> {
        PointBuilder::new(&self.metric_name, &self.schema, &self.classification).build(record)
    }

    /// Converts a record and emits it to the write sink.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError`](crate::error::WriteError) if the record cannot
    /// be converted, or the sink's error unchanged.
    pub fn write(&self, record: &R) -> Result<()> {
        let point = self.point(record)?;
        debug!(
            metric = %self.metric_name,
            tags = point.tags.len(),
            values = point.values.len(),
            timestamp = ?point.timestamp,
            "emitting point"
        );
        self.write_sink.emit(&point)?;
        Ok(())
    }

    /// Writes records in order, stopping at the first failure.
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Same as [`ModelIo::write`]. Records before the failing one have
    /// already been emitted.
    pub fn write_all<'r, I>(&self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'r R>,
        R: 'r,
    {
        let mut written = 0;
        for record in records {
            self.write(record)?;
            written += 1;
        }
        Ok(written)
    }
}

impl<R: DeserializeOwned> ModelIo<R> {
    /// Fetches the newest point of every tag combination matching `filters`.
    ///
    /// With `group_by`, the rows are further reduced to the newest row per
    /// distinct value of that column (rows lacking it are dropped), ordered
    /// by that value. Without it, rows are returned in sink order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingReadSink`] when the adapter is
    /// write-only, a [`QueryError`](crate::error::QueryError) if the result
    /// set is malformed or a row does not fit `R`, or the sink's error.
    pub fn latest_unique(&self, group_by: Option<&str>, filters: &Filters) -> Result<Vec<R>> {
        let sink = self.reader("latest_unique")?;
        let text = self.queries.latest_unique(filters);
        debug!(metric = %self.metric_name, query = %text, "issuing latest unique query");

        let mut rows = sink.query(&text, false, 0)?.rows()?;
        if let Some(column) = group_by {
            rows = latest_per_group(rows, column);
        }
        debug!(metric = %self.metric_name, rows = rows.len(), "reconstructing latest rows");

        rows.iter().map(|row| self.from_row(row)).collect()
    }

    /// Rebuilds every row of `series` as a record.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Reconstruct`](crate::error::QueryError::Reconstruct)
    /// for the first row that does not fit `R`.
    pub fn records(&self, series: &TimeSeries) -> Result<Vec<R>> {
        series.rows().iter().map(|row| self.from_row(row)).collect()
    }

    /// Rebuilds one record from a stored row.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Reconstruct`](crate::error::QueryError::Reconstruct)
    /// if the row does not fit `R`.
    pub fn from_row(&self, row: &Row) -> Result<R> {
        RowReconstructor::new(&self.classification).reconstruct(row)
    }
}

/// Builder for [`ModelIo`].
pub struct ModelIoBuilder<R> {
    schema: Schema,
    metric_name: Option<String>,
    timestamp_scale: u64,
    write_sink: Option<Arc<dyn WriteSink>>,
    read_sink: Option<Arc<dyn ReadSink>>,
    _record: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for ModelIoBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelIoBuilder")
            .field("metric_name", &self.metric_name)
            .field("timestamp_scale", &self.timestamp_scale)
            .field("has_write_sink", &self.write_sink.is_some())
            .field("has_read_sink", &self.read_sink.is_some())
            .finish_non_exhaustive()
    }
}

impl<R> ModelIoBuilder<R> {
    fn new(schema: Schema) -> Self {
        Self {
            schema,
            metric_name: None,
            timestamp_scale: 0,
            write_sink: None,
            read_sink: None,
            _record: PhantomData,
        }
    }

    /// Overrides the schema's metric name.
    #[must_use]
    pub fn metric_name(mut self, name: impl Into<String>) -> Self {
        self.metric_name = Some(name.into());
        self
    }

    /// Overrides the schema's timestamp scale. 0 keeps the schema's.
    #[must_use]
    pub fn timestamp_scale(mut self, scale: u64) -> Self {
        self.timestamp_scale = scale;
        self
    }

    /// Sets the write sink.
    #[must_use]
    pub fn write_sink(mut self, sink: Arc<dyn WriteSink>) -> Self {
        self.write_sink = Some(sink);
        self
    }

    /// Sets the read sink. Without one, the adapter is write-only.
    #[must_use]
    pub fn read_sink(mut self, sink: Arc<dyn ReadSink>) -> Self {
        self.read_sink = Some(sink);
        self
    }

    /// Fills in sinks not injected yet by asking `factory`.
    ///
    /// # Errors
    ///
    /// Returns the factory's error.
    pub fn from_settings(mut self, settings: &Settings, factory: &dyn SinkFactory) -> Result<Self> {
        match settings.io_mode {
            IoMode::Influx => {
                if self.write_sink.is_none() {
                    debug!(endpoint = %settings.telegraf_endpoint().url(), "building write sink");
                    self.write_sink = Some(factory.write_sink(settings)?);
                }
                if self.read_sink.is_none() {
                    debug!(endpoint = %settings.influxdb_endpoint().url(), "building read sink");
                    self.read_sink = factory.read_sink(settings)?;
                }
            }
        }
        Ok(self)
    }

    /// Classifies the schema and builds the adapter.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`](crate::error::SchemaError) if the schema is
    /// invalid, [`ConfigError::MissingMetricName`] if neither the builder nor
    /// the schema names the metric, or [`ConfigError::MissingWriteSink`].
    pub fn build(self) -> Result<ModelIo<R>> {
        let classification =
            Classification::classify(&self.schema)?.with_timestamp_scale(self.timestamp_scale);

        let metric_name = self
            .metric_name
            .filter(|n| !n.is_empty())
            .or_else(|| self.schema.metric_name().map(str::to_string))
            .ok_or(ConfigError::MissingMetricName)?;

        let write_sink = self.write_sink.ok_or(ConfigError::MissingWriteSink)?;
        let queries = QueryBuilder::new(metric_name.clone(), classification.tags());

        debug!(
            metric = %metric_name,
            tags = classification.tags().len(),
            values = classification.values().len(),
            timestamp = ?classification.timestamp_field(),
            "model io ready"
        );

        Ok(ModelIo {
            metric_name,
            schema: self.schema,
            classification,
            queries,
            write_sink,
            read_sink: self.read_sink,
            _record: PhantomData,
        })
    }
}
