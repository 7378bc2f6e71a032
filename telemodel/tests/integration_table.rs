//! Integration tests for table-backed persistence.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Map, Value, json};
use telemodel::error::{ConfigError, Error, SinkError};
use telemodel::schema::{FieldType, Schema};
use telemodel::table::{ColumnType, SURROGATE_KEY_COLUMN, TableDef};
use telemodel::{TableModelIo, TableOptions, TableSink};

#[derive(Serialize)]
struct Job {
    name: String,
    attempts: Option<i64>,
    meta: Option<Value>,
}

fn schema() -> Schema {
    Schema::builder("jobs")
        .tag("name", FieldType::String)
        .field("attempts", FieldType::Integer)
        .field("meta", FieldType::Nested)
        .build()
        .unwrap()
}

#[derive(Default)]
struct FakeDb {
    tables: Mutex<Vec<TableDef>>,
    rows: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl TableSink for FakeDb {
    fn create_table(&self, table: &TableDef) -> Result<(), SinkError> {
        self.tables.lock().unwrap().push(table.clone());
        Ok(())
    }

    fn insert(&self, table: &str, row: &Map<String, Value>) -> Result<(), SinkError> {
        self.rows
            .lock()
            .unwrap()
            .push((table.to_string(), row.clone()));
        Ok(())
    }
}

struct ReadOnlyDb;

impl TableSink for ReadOnlyDb {
    fn create_table(&self, _table: &TableDef) -> Result<(), SinkError> {
        Err(SinkError::rejected("read-only database"))
    }

    fn insert(&self, _table: &str, _row: &Map<String, Value>) -> Result<(), SinkError> {
        Err(SinkError::rejected("read-only database"))
    }
}

#[test]
fn test_create_with_surrogate_key() {
    let db = Arc::new(FakeDb::default());
    let io: TableModelIo<Job> = TableModelIo::create(
        db.clone(),
        &schema(),
        TableOptions {
            surrogate_key: true,
            ..TableOptions::default()
        },
    )
    .unwrap();

    let tables = db.tables.lock().unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0], *io.table());
    assert_eq!(tables[0].name, "jobs");

    let names: Vec<&str> = tables[0].columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec![SURROGATE_KEY_COLUMN, "name", "attempts", "meta"]);
    assert_eq!(tables[0].columns[3].column_type, ColumnType::Json);
    assert!(io.classification().is_tag("name"));
}

#[test]
fn test_create_without_surrogate_key() {
    let db = Arc::new(FakeDb::default());
    let io: TableModelIo<Job> = TableModelIo::create(
        db,
        &schema(),
        TableOptions {
            table_name: Some("job_runs".to_string()),
            ..TableOptions::default()
        },
    )
    .unwrap();

    assert_eq!(io.table().name, "job_runs");
    assert!(io.table().column(SURROGATE_KEY_COLUMN).is_none());
    assert!(io.table().columns.iter().all(|c| !c.primary_key));
}

#[test]
fn test_write_inserts_set_fields() {
    let db = Arc::new(FakeDb::default());
    let io: TableModelIo<Job> =
        TableModelIo::create(db.clone(), &schema(), TableOptions::default()).unwrap();

    io.write(&Job {
        name: "backup".to_string(),
        attempts: None,
        meta: Some(json!({"host": "db1"})),
    })
    .unwrap();

    let rows = db.rows.lock().unwrap();
    let (table, row) = &rows[0];
    assert_eq!(table, "jobs");
    assert_eq!(row.len(), 2);
    assert_eq!(row["name"], "backup");
    assert_eq!(row["meta"], json!({"host": "db1"}));
}

#[test]
fn test_table_name_required() {
    let nameless = Schema::from_fields(schema().fields().to_vec()).unwrap();
    let err = TableModelIo::<Job>::create(
        Arc::new(FakeDb::default()),
        &nameless,
        TableOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::MissingMetricName)));
}

#[test]
fn test_sink_failure_on_create() {
    let err = TableModelIo::<Job>::create(Arc::new(ReadOnlyDb), &schema(), TableOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::Sink(SinkError::Rejected { .. })));
}
