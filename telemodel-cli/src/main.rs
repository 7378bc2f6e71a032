//! CLI for the telemodel record-to-metric adapter.
//!
//! Provides commands for encoding records as line protocol, rendering the
//! queries the adapter issues, and decoding stored query responses back into
//! records.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use telemodel::error::SinkError;
use telemodel::query::QueryBuilder;
use telemodel::sink::ReadSink;
use telemodel::{
    Classification, Filters, LineProtocolSink, ModelIo, ResultSet, Schema, Settings,
    TimeSeriesQuery,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// telemodel: schema-driven adapter between records and metric points.
#[derive(Parser)]
#[command(name = "telemodel", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Encode JSON-lines records as line protocol on stdout.
    Encode {
        /// Path to the schema JSON file.
        #[arg(long)]
        schema: PathBuf,

        /// Metric name (defaults to the schema's).
        #[arg(long)]
        metric: Option<String>,

        /// JSON-lines input file (defaults to stdin).
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Print the InfluxQL query the adapter would issue.
    Query {
        /// Path to the schema JSON file.
        #[arg(long)]
        schema: PathBuf,

        /// Metric name (defaults to the schema's).
        #[arg(long)]
        metric: Option<String>,

        /// Equality filter, repeatable (e.g. `--where host=web1`).
        #[arg(long = "where", value_name = "FIELD=VALUE")]
        filters: Vec<String>,

        /// Render the latest-unique query instead of a time series.
        #[arg(long)]
        latest: bool,

        /// Maximum number of points (0 = unbounded).
        #[arg(long)]
        limit: Option<usize>,

        /// Only points newer than this (e.g. "1h", "30m", "7d").
        #[arg(long)]
        last: Option<String>,
    },

    /// Decode an InfluxDB `/query` JSON response into records.
    Decode {
        /// Path to the schema JSON file.
        #[arg(long)]
        schema: PathBuf,

        /// Metric name (defaults to the schema's).
        #[arg(long)]
        metric: Option<String>,

        /// Response file (defaults to stdin).
        #[arg(long)]
        input: Option<PathBuf>,

        /// Output format.
        #[arg(long, default_value = "json")]
        format: OutputFormat,

        /// Treat the response as a latest-unique result.
        #[arg(long)]
        latest: bool,

        /// With `--latest`, keep the newest row per value of this column.
        #[arg(long)]
        group_by: Option<String>,

        /// Maximum number of records for time series (0 = unbounded).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the effective settings as JSON.
    Settings {
        /// Settings JSON file, overlaid by the environment.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Output format for decoded records.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// JSON array of objects.
    Json,
    /// Comma-separated values.
    Csv,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Encode {
            schema,
            metric,
            input,
        } => cmd_encode(&schema, metric, input.as_deref()),
        Commands::Query {
            schema,
            metric,
            filters,
            latest,
            limit,
            last,
        } => cmd_query(&schema, metric, &filters, latest, limit, last.as_deref()),
        Commands::Decode {
            schema,
            metric,
            input,
            format,
            latest,
            group_by,
            limit,
        } => cmd_decode(
            &schema,
            metric,
            input.as_deref(),
            &format,
            latest.then_some(group_by.as_deref()),
            limit,
        ),
        Commands::Settings { config } => cmd_settings(config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `telemodel encode`.
fn cmd_encode(schema_path: &Path, metric: Option<String>, input: Option<&Path>) -> CliResult<()> {
    let sink = Arc::new(LineProtocolSink::new(BufWriter::new(io::stdout())));
    let model: ModelIo<Value> = builder(schema_path, metric)?
        .write_sink(sink.clone())
        .build()?;

    let reader = open_input(input)?;
    let mut written = 0usize;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Value =
            serde_json::from_str(&line).map_err(|e| format!("line {}: {e}", n + 1))?;
        model.write(&record).map_err(|e| format!("line {}: {e}", n + 1))?;
        written += 1;
    }
    sink.flush()?;

    info!(metric = model.metric_name(), written, "encoded records");
    Ok(())
}

/// Implements `telemodel query`.
fn cmd_query(
    schema_path: &Path,
    metric: Option<String>,
    filters: &[String],
    latest: bool,
    limit: Option<usize>,
    last: Option<&str>,
) -> CliResult<()> {
    let schema = load_schema(schema_path)?;
    let classification = Classification::classify(&schema)?;
    let metric = metric
        .filter(|m| !m.is_empty())
        .or_else(|| schema.metric_name().map(str::to_string))
        .ok_or("a metric name is required (--metric or the schema's metric_name)")?;

    let filters = parse_filters(filters)?;
    let builder = QueryBuilder::new(metric, classification.tags());

    let text = if latest {
        builder.latest_unique(&filters)
    } else {
        let mut query = TimeSeriesQuery::new().filters(filters);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        if let Some(last) = last {
            query = query.last(parse_duration(last)?);
        }
        builder.time_series(&query, Utc::now())?
    };

    println!("{text}");
    Ok(())
}

/// Implements `telemodel decode`.
///
/// `latest` is `Some(group_by)` for latest-unique post-processing and `None`
/// for time-series post-processing.
fn cmd_decode(
    schema_path: &Path,
    metric: Option<String>,
    input: Option<&Path>,
    format: &OutputFormat,
    latest: Option<Option<&str>>,
    limit: Option<usize>,
) -> CliResult<()> {
    let mut body = String::new();
    open_input(input)?.read_to_string(&mut body)?;
    let result = ResultSet::from_response(&body)?;
    debug!(series = result.series.len(), "parsed response");

    let model: ModelIo<Value> = builder(schema_path, metric)?
        .write_sink(Arc::new(LineProtocolSink::new(io::sink())))
        .read_sink(Arc::new(Replay(result)))
        .build()?;

    let records = match latest {
        Some(group_by) => model.latest_unique(group_by, &Filters::new())?,
        None => {
            let mut query = TimeSeriesQuery::new().unbounded();
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            let series = model.time_series(&query)?;
            if series.duplicates_dropped() > 0 {
                info!(dropped = series.duplicates_dropped(), "dropped duplicate timestamps");
            }
            model.records(&series)?
        }
    };

    let mut out = BufWriter::new(io::stdout());
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &records)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => write_csv(&mut out, &records)?,
    }
    out.flush()?;
    Ok(())
}

/// Implements `telemodel settings`.
fn cmd_settings(config: Option<&Path>) -> CliResult<()> {
    let settings = match config {
        Some(path) => Settings::load(path)?,
        None => Settings::from_env()?,
    };
    println!("{}", serde_json::to_string_pretty(&settings.redacted())?);
    Ok(())
}

/// A read sink answering every query with one stored response.
struct Replay(ResultSet);

impl ReadSink for Replay {
    fn query(&self, query: &str, _chunked: bool, _chunk_size: usize) -> Result<ResultSet, SinkError> {
        debug!(query, "replaying stored response");
        Ok(self.0.clone())
    }

    fn drop_measurement(&self, _metric: &str) -> Result<(), SinkError> {
        Err(SinkError::rejected("stored responses cannot be modified"))
    }
}

fn builder(schema_path: &Path, metric: Option<String>) -> CliResult<telemodel::ModelIoBuilder<Value>> {
    let mut builder = ModelIo::builder(load_schema(schema_path)?);
    if let Some(metric) = metric {
        builder = builder.metric_name(metric);
    }
    Ok(builder)
}

fn load_schema(path: &Path) -> CliResult<Schema> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read schema '{}': {e}", path.display()))?;
    let schema: Schema = serde_json::from_str(&text)
        .map_err(|e| format!("failed to parse schema '{}': {e}", path.display()))?;
    schema.validate()?;
    Ok(schema)
}

fn open_input(path: Option<&Path>) -> CliResult<Box<dyn BufRead>> {
    Ok(match path {
        Some(path) => Box::new(BufReader::new(File::open(path).map_err(|e| {
            format!("failed to open '{}': {e}", path.display())
        })?)),
        None => Box::new(BufReader::new(io::stdin())),
    })
}

/// Parses `FIELD=VALUE` terms.
fn parse_filters(terms: &[String]) -> CliResult<Filters> {
    let mut filters = Filters::new();
    for term in terms {
        let (field, value) = term
            .split_once('=')
            .filter(|(field, _)| !field.is_empty())
            .ok_or_else(|| format!("invalid filter '{term}', expected FIELD=VALUE"))?;
        filters.push(field, value);
    }
    Ok(filters)
}

/// Parses a human-readable duration string (e.g., "1h", "30m", "7d").
fn parse_duration(s: &str) -> CliResult<Duration> {
    let s = s.trim();
    let Some((split, unit)) = s.char_indices().last() else {
        return Err("empty duration".into());
    };

    let per_unit: u64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        _ => return Err(format!("unknown duration unit '{unit}' (use s, m, h or d)").into()),
    };
    let count: u64 = s[..split].parse()?;
    let secs = count
        .checked_mul(per_unit)
        .ok_or_else(|| format!("duration '{s}' is too large"))?;

    Ok(Duration::from_secs(secs))
}

/// Writes records as CSV with one column per key seen in any record.
fn write_csv(out: &mut impl Write, records: &[Value]) -> io::Result<()> {
    let columns: BTreeSet<&str> = records
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|r| r.keys().map(String::as_str))
        .collect();

    let header: Vec<String> = columns.iter().map(|c| csv_cell(c)).collect();
    writeln!(out, "{}", header.join(","))?;

    for record in records {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| match record.get(c) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => csv_cell(s),
                Some(other) => csv_cell(&other.to_string()),
            })
            .collect();
        writeln!(out, "{}", cells.join(","))?;
    }
    Ok(())
}

fn csv_cell(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604_800));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5w").is_err());
        assert!(parse_duration("h").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_multibyte_unit() {
        let err = parse_duration("5µ").unwrap_err();
        assert!(err.to_string().contains('µ'), "{err}");
        assert!(parse_duration("µ").is_err());
    }

    #[test]
    fn test_parse_duration_overflow() {
        let err = parse_duration("99999999999999999d").unwrap_err();
        assert!(err.to_string().contains("too large"), "{err}");
        assert_eq!(
            parse_duration(&format!("{}s", u64::MAX)).unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn test_parse_filters() {
        let filters = parse_filters(&["host=web1".to_string(), "expr=a=b".to_string()]).unwrap();
        let terms: Vec<_> = filters.iter().collect();
        assert_eq!(terms, vec![("host", "web1"), ("expr", "a=b")]);

        assert!(parse_filters(&["novalue".to_string()]).is_err());
        assert!(parse_filters(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_write_csv() {
        let records = vec![
            json!({"category": "x", "value": 1.5, "ts": 1}),
            json!({"category": "a,b", "ts": 2}),
        ];
        let mut out = Vec::new();
        write_csv(&mut out, &records).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "category,ts,value\nx,1,1.5\n\"a,b\",2,\n"
        );
    }

    #[test]
    fn test_load_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(
            &path,
            r#"{"metric_name": "m", "fields": [
                {"name": "category", "type": "string", "tag": true},
                {"name": "value", "type": "float"},
                {"name": "ts", "type": "integer", "timestamp": true}
            ]}"#,
        )
        .unwrap();

        let schema = load_schema(&path).unwrap();
        assert_eq!(schema.metric_name(), Some("m"));
        assert_eq!(schema.fields().len(), 3);

        std::fs::write(
            &path,
            r#"{"fields": [
                {"name": "a", "type": "integer", "timestamp": true},
                {"name": "b", "type": "integer", "timestamp": true}
            ]}"#,
        )
        .unwrap();
        assert!(load_schema(&path).is_err());
    }
}
