//! Collaborator interfaces the adapter delegates all I/O to.
//!
//! The adapter never talks to a network or a database itself. A
//! [`WriteSink`] receives points (a metrics agent client), a [`ReadSink`]
//! answers InfluxQL queries (a time-series store client), and a
//! [`SinkFactory`] builds both from [`Settings`]. Implementations own their
//! transport, retries and thread-safety.

use std::sync::Arc;

use crate::error::{Result, SinkError};
use crate::point::Point;
use crate::result::ResultSet;
use crate::settings::Settings;

/// Receives metric points.
pub trait WriteSink: Send + Sync {
    /// Submits one point.
    ///
    /// # Errors
    ///
    /// Returns the sink's own failure; the adapter passes it through.
    fn emit(&self, point: &Point) -> std::result::Result<(), SinkError>;
}

/// Answers read queries against a time-series store.
pub trait ReadSink: Send + Sync {
    /// Runs `query` and returns its result grouped by series.
    ///
    /// When `chunked` is set the store may stream the answer in pieces of
    /// `chunk_size` points; the sink reassembles them. Overlapping chunks are
    /// tolerated, the adapter deduplicates by timestamp.
    ///
    /// # Errors
    ///
    /// Returns the sink's own failure; the adapter passes it through.
    fn query(
        &self,
        query: &str,
        chunked: bool,
        chunk_size: usize,
    ) -> std::result::Result<ResultSet, SinkError>;

    /// Drops every point stored under `metric`.
    ///
    /// # Errors
    ///
    /// Returns the sink's own failure; the adapter passes it through.
    fn drop_measurement(&self, metric: &str) -> std::result::Result<(), SinkError>;
}

/// Builds sinks from settings.
///
/// Used by [`ModelIoBuilder::from_settings`](crate::model_io::ModelIoBuilder::from_settings)
/// for sinks the caller did not inject.
pub trait SinkFactory {
    /// Builds the write sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be constructed.
    fn write_sink(&self, settings: &Settings) -> Result<Arc<dyn WriteSink>>;

    /// Builds the read sink, or `None` for write-only setups.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be constructed.
    fn read_sink(&self, settings: &Settings) -> Result<Option<Arc<dyn ReadSink>>>;
}
