//! # telemodel
//!
//! Schema-driven adapter between typed records and time-series metric points.
//!
//! telemodel maps a record type, described by a field table, to the metric
//! points a metrics agent accepts, and maps rows read back from a time-series
//! store to records again. The record type stays a plain `serde` struct; the
//! wire format and the transport stay behind sink traits.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - One schema classification per adapter, decided at construction
//! - Sparse writes: unset and default-valued fields are never sent as values
//! - Tags always resolved, falling back to the record and then to defaults
//! - Deterministic reads: ascending time, one row per timestamp, bounded size
//! - No I/O of its own; sinks are injected as `Arc<dyn ...>`
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde::{Deserialize, Serialize};
//! use telemodel::{FieldType, LineProtocolSink, ModelIo, Schema};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Reading {
//!     #[serde(default, skip_serializing_if = "Option::is_none")]
//!     room: Option<String>,
//!     #[serde(default, skip_serializing_if = "Option::is_none")]
//!     temperature: Option<f64>,
//!     #[serde(default, skip_serializing_if = "Option::is_none")]
//!     ts: Option<i64>,
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Timestamps are in milliseconds (the default scale).
//! let schema = Schema::builder("readings")
//!     .tag("room", FieldType::String)
//!     .field("temperature", FieldType::Float)
//!     .timestamp("ts", FieldType::Integer)
//!     .build()?;
//!
//! let sink = Arc::new(LineProtocolSink::new(Vec::new()));
//! let io: ModelIo<Reading> = ModelIo::builder(schema)
//!     .write_sink(sink.clone())
//!     .build()?;
//!
//! io.write(&Reading {
//!     room: Some("lab".into()),
//!     temperature: Some(21.5),
//!     ts: Some(1_700_000_000_000),
//! })?;
//!
//! let point = io.point(&Reading { room: Some("lab".into()), temperature: Some(21.5), ts: None });
//! assert!(point.is_err()); // no timestamp to resolve
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`ModelIo`]: Adapter handle (write, latest-unique, time-series, drop)
//! - [`Schema`]: Field descriptor table (type, tag, timestamp, default)
//! - [`Point`]: One unit submitted to a [`WriteSink`]
//! - [`TimeSeries`]: Ordered, deduplicated read result
//!
//! ## Modules
//!
//! - [`model_io`]: Adapter construction and operations
//! - [`schema`]: Field descriptors and the [`Model`] trait
//! - [`classify`]: Tag / timestamp / value classification
//! - [`flatten`]: Nested-object flattening
//! - [`point`]: Points and record-to-point conversion
//! - [`query`]: InfluxQL rendering and read post-processing
//! - [`result`]: Result sets, rows and time series
//! - [`reconstruct`]: Row-to-record conversion
//! - [`sink`]: Sink traits
//! - [`line_protocol`]: Line protocol encoding and sink
//! - [`table`]: Table-backed persistence
//! - [`settings`]: Connection settings
//! - [`error`]: Error types

pub mod classify;
pub mod error;
pub mod flatten;
pub mod line_protocol;
pub mod model_io;
pub mod point;
pub mod query;
pub mod reconstruct;
pub mod result;
pub mod schema;
pub mod settings;
pub mod sink;
pub mod table;

// Re-export primary API types at crate root for convenience.
pub use classify::Classification;
pub use error::{Error, Result};
pub use line_protocol::LineProtocolSink;
pub use model_io::{ModelIo, ModelIoBuilder};
pub use point::{FieldValue, Point};
pub use query::{Filters, TimeSeriesQuery};
pub use result::{ResultSet, Row, TimeSeries};
pub use schema::{FieldDef, FieldType, Model, Schema};
pub use settings::Settings;
pub use sink::{ReadSink, SinkFactory, WriteSink};
pub use table::{TableModelIo, TableOptions, TableSink};
