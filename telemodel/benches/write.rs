//! Microbenchmarks for the record-to-point path and read post-processing.
//!
//! Run with: `cargo bench -p telemodel -- point`

#![allow(missing_docs, clippy::cast_precision_loss)]

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use serde_json::{Map, Value, json};
use telemodel::error::SinkError;
use telemodel::line_protocol::encode_line;
use telemodel::result::Series;
use telemodel::schema::{FieldType, Schema};
use telemodel::sink::{ReadSink, WriteSink};
use telemodel::{ModelIo, Point, ResultSet, TimeSeriesQuery};

struct Discard;

impl WriteSink for Discard {
    fn emit(&self, point: &Point) -> Result<(), SinkError> {
        black_box(point);
        Ok(())
    }
}

struct Canned(ResultSet);

impl ReadSink for Canned {
    fn query(&self, _: &str, _: bool, _: usize) -> Result<ResultSet, SinkError> {
        Ok(self.0.clone())
    }

    fn drop_measurement(&self, _: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A schema with two tags, `values` float fields and a millisecond timestamp.
fn schema(values: usize) -> Schema {
    let mut builder = Schema::builder("bench")
        .tag("host", FieldType::String)
        .tag("region", FieldType::String)
        .timestamp("ts", FieldType::Integer);
    for i in 0..values {
        builder = builder.field(format!("v{i}"), FieldType::Float);
    }
    builder.build().unwrap()
}

fn record(values: usize, ts: i64) -> Value {
    let mut map = Map::new();
    map.insert("host".to_string(), json!("web1"));
    map.insert("region".to_string(), json!("eu"));
    map.insert("ts".to_string(), json!(ts));
    for i in 0..values {
        map.insert(format!("v{i}"), json!(i as f64 * 0.5));
    }
    Value::Object(map)
}

fn bench_point_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("point/value_count");

    for count in [1, 10, 50] {
        let io: ModelIo<Value> = ModelIo::builder(schema(count))
            .write_sink(Arc::new(Discard))
            .build()
            .unwrap();
        let rec = record(count, 1_700_000_000_000);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| io.write(black_box(&rec)).unwrap());
        });
    }

    group.finish();
}

fn bench_encode_line(c: &mut Criterion) {
    let point = Point::new("cpu")
        .tag("host", "web 1")
        .tag("region", "eu")
        .value("usage", 85.5)
        .value("cores", 4i64)
        .value("state", "running")
        .timestamp(1_700_000_000_000_000_000);

    c.bench_function("point/encode_line", |b| {
        b.iter(|| encode_line(black_box(&point)).unwrap());
    });
}

fn bench_time_series(c: &mut Criterion) {
    let mut group = c.benchmark_group("time_series/rows");

    for count in [100i64, 1_000, 10_000] {
        // Every timestamp twice, newest first, the way a store answers.
        let values = (0..count)
            .rev()
            .flat_map(|i| {
                let t = json!(i * 1_000_000);
                [
                    vec![t.clone(), json!("web1"), json!(i)],
                    vec![t, json!("web1"), json!(-i)],
                ]
            })
            .collect();
        let result = ResultSet::new(vec![Series {
            name: "bench".to_string(),
            columns: vec!["time".to_string(), "host".to_string(), "v0".to_string()],
            values,
            ..Series::default()
        }]);

        let io: ModelIo<Value> = ModelIo::builder(schema(1))
            .write_sink(Arc::new(Discard))
            .read_sink(Arc::new(Canned(result)))
            .build()
            .unwrap();
        let query = TimeSeriesQuery::new().unbounded();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| io.time_series(black_box(&query)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_point_build, bench_encode_line, bench_time_series);
criterion_main!(benches);
