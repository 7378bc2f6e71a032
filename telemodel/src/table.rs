//! Table-backed persistence for records.
//!
//! The relational counterpart of [`ModelIo`](crate::model_io::ModelIo): the
//! same schema is classified the same way, but records go to a table instead
//! of a metrics agent. The table is described once as a [`TableDef`] and
//! handed to a [`TableSink`] at construction; every write is a single
//! `insert`. DDL, sessions and transactions are the sink's business.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::classify::Classification;
use crate::error::{ConfigError, Result, SinkError, WriteError};
use crate::schema::{FieldType, Schema};

/// Name of the surrogate primary key column.
pub const SURROGATE_KEY_COLUMN: &str = "__id__";

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Variable-length text.
    Text,
    /// Double precision float.
    Double,
    /// 64-bit integer.
    BigInt,
    /// Boolean.
    Boolean,
    /// Structured JSON document.
    Json,
}

impl From<FieldType> for ColumnType {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::String => Self::Text,
            FieldType::Float => Self::Double,
            FieldType::Integer | FieldType::Unsigned | FieldType::Timestamp => Self::BigInt,
            FieldType::Boolean => Self::Boolean,
            FieldType::Nested => Self::Json,
        }
    }
}

/// One column of a table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Storage type.
    pub column_type: ColumnType,
    /// Whether this column is the primary key.
    pub primary_key: bool,
}

/// A table definition derived from a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<Column>,
}

impl TableDef {
    /// Derives a table definition from `schema`, one column per field.
    ///
    /// With `surrogate_key`, an integer primary key column named
    /// [`SURROGATE_KEY_COLUMN`] is put first.
    pub fn from_schema(name: impl Into<String>, schema: &Schema, surrogate_key: bool) -> Self {
        let mut columns = Vec::with_capacity(schema.fields().len() + 1);
        if surrogate_key {
            columns.push(Column {
                name: SURROGATE_KEY_COLUMN.to_string(),
                column_type: ColumnType::BigInt,
                primary_key: true,
            });
        }
        columns.extend(schema.fields().iter().map(|field| Column {
            name: field.name.clone(),
            column_type: field.field_type.into(),
            primary_key: false,
        }));

        Self {
            name: name.into(),
            columns,
        }
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A persistence engine that stores records in tables.
pub trait TableSink: Send + Sync {
    /// Materializes `table`.
    ///
    /// # Errors
    ///
    /// Returns the engine's own failure.
    fn create_table(&self, table: &TableDef) -> std::result::Result<(), SinkError>;

    /// Persists one row into `table`.
    ///
    /// # Errors
    ///
    /// Returns the engine's own failure.
    fn insert(&self, table: &str, row: &Map<String, Value>) -> std::result::Result<(), SinkError>;
}

/// Options for [`TableModelIo::create`].
#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    /// Table name; defaults to the schema's metric name.
    pub table_name: Option<String>,
    /// Prepend an integer primary key column.
    pub surrogate_key: bool,
}

/// Writes records of one schema to a table.
pub struct TableModelIo<R> {
    table: TableDef,
    classification: Classification,
    sink: Arc<dyn TableSink>,
    _record: PhantomData<fn(&R)>,
}

impl<R> std::fmt::Debug for TableModelIo<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableModelIo")
            .field("table", &self.table)
            .field("classification", &self.classification)
            .finish_non_exhaustive()
    }
}

impl<R: Serialize> TableModelIo<R> {
    /// Classifies `schema`, derives its table and creates it through `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingMetricName`] if no table name can be
    /// resolved, a [`SchemaError`](crate::error::SchemaError) if the schema
    /// is invalid, or the sink's error if table creation fails.
    pub fn create(sink: Arc<dyn TableSink>, schema: &Schema, options: TableOptions) -> Result<Self> {
        let classification = Classification::classify(schema)?;

        let name = options
            .table_name
            .filter(|n| !n.is_empty())
            .or_else(|| schema.metric_name().map(str::to_string))
            .ok_or(ConfigError::MissingMetricName)?;

        let table = TableDef::from_schema(name, schema, options.surrogate_key);
        sink.create_table(&table)?;
        debug!(table = %table.name, columns = table.columns.len(), "created table");

        Ok(Self {
            table,
            classification,
            sink,
            _record: PhantomData,
        })
    }

    /// Returns the table definition.
    pub fn table(&self) -> &TableDef {
        &self.table
    }

    /// Returns the schema classification.
    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    /// Persists one record (all set fields, `null`s dropped).
    ///
    /// # Errors
    ///
    /// Returns [`WriteError`] if the record does not serialize to an object,
    /// or the sink's error if the insert fails.
    pub fn write(&self, record: &R) -> Result<()> {
        let row = match serde_json::to_value(record)
            .map_err(|source| WriteError::Serialize { source })?
        {
            Value::Object(map) => map
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .collect::<Map<String, Value>>(),
            _ => return Err(WriteError::NotAnObject { kind: "a non-object" }.into()),
        };

        self.sink.insert(&self.table.name, &row)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDef;

    #[test]
    fn test_table_def_from_schema() {
        let schema = Schema::builder("readings")
            .tag("room", FieldType::String)
            .field("temperature", FieldType::Float)
            .field("samples", FieldType::Unsigned)
            .field("ok", FieldType::Boolean)
            .field_def(FieldDef::new("meta", FieldType::Nested))
            .timestamp("ts", FieldType::Timestamp)
            .build()
            .unwrap();

        let plain = TableDef::from_schema("readings", &schema, false);
        assert_eq!(plain.columns.len(), 6);
        assert!(plain.columns.iter().all(|c| !c.primary_key));
        assert_eq!(plain.column("room").unwrap().column_type, ColumnType::Text);
        assert_eq!(plain.column("temperature").unwrap().column_type, ColumnType::Double);
        assert_eq!(plain.column("samples").unwrap().column_type, ColumnType::BigInt);
        assert_eq!(plain.column("ok").unwrap().column_type, ColumnType::Boolean);
        assert_eq!(plain.column("meta").unwrap().column_type, ColumnType::Json);
        assert_eq!(plain.column("ts").unwrap().column_type, ColumnType::BigInt);

        let keyed = TableDef::from_schema("readings", &schema, true);
        assert_eq!(keyed.columns.len(), 7);
        assert_eq!(keyed.columns[0].name, SURROGATE_KEY_COLUMN);
        assert!(keyed.columns[0].primary_key);
    }
}
