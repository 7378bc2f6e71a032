//! InfluxDB line protocol encoding.
//!
//! Line protocol is the text format Telegraf and InfluxDB accept for writes:
//!
//! ```text
//! measurement[,tag_key=tag_value...] field_key=field_value[,...] [timestamp_ns]
//! ```
//!
//! [`LineProtocolSink`] is a [`WriteSink`] that encodes each point as one
//! line and writes it to any [`std::io::Write`]. Where the bytes go (stdout, a
//! file, a socket to an agent) is up to the caller.
//!
//! # Example
//!
//! ```rust
//! use telemodel::line_protocol::encode_line;
//! use telemodel::point::Point;
//!
//! let point = Point::new("cpu")
//!     .tag("host", "web 1")
//!     .value("usage", 85.5)
//!     .value("cores", 4i64)
//!     .timestamp(1_700_000_000_000_000_000);
//!
//! assert_eq!(
//!     encode_line(&point).unwrap(),
//!     r"cpu,host=web\ 1 cores=4i,usage=85.5 1700000000000000000"
//! );
//! ```

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::SinkError;
use crate::point::{FieldValue, Point};
use crate::sink::WriteSink;

/// Encodes a point as a single line (without the trailing newline).
///
/// Tags with empty values are omitted and non-finite floats are skipped, as
/// line protocol cannot carry either.
///
/// # Errors
///
/// Returns [`SinkError::Rejected`] if the metric name is empty or the point
/// has no encodable value field.
pub fn encode_line(point: &Point) -> Result<String, SinkError> {
    if point.metric.is_empty() {
        return Err(SinkError::rejected("metric name is empty"));
    }

    let mut line = escape(&point.metric, &[',', ' ']);

    for (key, value) in &point.tags {
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape(key, &[',', '=', ' ']));
        line.push('=');
        line.push_str(&escape(value, &[',', '=', ' ']));
    }

    let mut fields = Vec::with_capacity(point.values.len());
    for (key, value) in &point.values {
        let Some(encoded) = encode_field_value(value) else {
            debug!(metric = %point.metric, field = %key, "skipping non-finite value");
            continue;
        };
        fields.push(format!("{}={encoded}", escape(key, &[',', '=', ' '])));
    }

    if fields.is_empty() {
        return Err(SinkError::rejected(format!(
            "point for '{}' has no values",
            point.metric
        )));
    }

    line.push(' ');
    line.push_str(&fields.join(","));

    if let Some(ts) = point.timestamp {
        line.push(' ');
        line.push_str(&ts.to_string());
    }

    Ok(line)
}

/// Encodes a field value, or `None` for NaN and infinities.
fn encode_field_value(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Float(v) if !v.is_finite() => None,
        FieldValue::Float(v) => Some(v.to_string()),
        FieldValue::Integer(i) => Some(format!("{i}i")),
        FieldValue::Unsigned(u) => Some(format!("{u}u")),
        FieldValue::Boolean(b) => Some(b.to_string()),
        FieldValue::String(s) => {
            let mut out = String::with_capacity(s.len() + 2);
            out.push('"');
            for c in s.chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
            Some(out)
        }
    }
}

/// Backslash-escapes `special` characters and newlines.
fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\n' {
            out.push_str("\\n");
            continue;
        }
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A [`WriteSink`] writing one line-protocol line per point.
///
/// The writer is guarded by a mutex so the sink can be shared between
/// adapters. Nothing is flushed automatically; wrap the writer in a
/// `BufWriter` and call [`LineProtocolSink::flush`] as needed.
#[derive(Debug)]
pub struct LineProtocolSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> LineProtocolSink<W> {
    /// Creates a sink over `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Flushes the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if flushing fails.
    pub fn flush(&self) -> Result<(), SinkError> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> WriteSink for LineProtocolSink<W> {
    fn emit(&self, point: &Point) -> Result<(), SinkError> {
        let line = encode_line(point)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}
