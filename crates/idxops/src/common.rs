//! 📦 Common data structures — the building blocks of idxops
//!
//! 🎬 COLD OPEN — INT. OPS ROOM — 4:12 PM
//!
//! Someone asked for "just a copy of that table, in Mongo, by end of day".
//! The rows came out of MariaDB. They were put in a `TabularBatch`. The batch
//! became a file. The file became a collection. Nobody asked how. Nobody ever asks how.
//!
//! This module holds the request-scoped values that ferry rows and task
//! descriptions between the extractor, the staging writer and the importer.
//! None of them outlive one operation. 🦆

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================
//  📊 TabularBatch — rows with named, typed columns
// ============================================================

/// 🏷️ What kind of values a column holds, inferred from the driver's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Bool,
    Int,
    Float,
    Text,
}

impl ColumnKind {
    /// 🔄 The mongoimport type tag this kind maps onto when nobody supplied a schema.
    pub fn default_type_tag(self) -> &'static str {
        match self {
            ColumnKind::Bool => "boolean",
            ColumnKind::Int => "int64",
            ColumnKind::Float => "double",
            ColumnKind::Text => "string",
        }
    }
}

/// 📋 A named column. The name is what the document key will be called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// 🧱 A single cell. NULL stays NULL all the way into the document store.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// 📦 JSON rendition for the document (array) staging format.
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Bool(b) => Value::Bool(*b),
            CellValue::Int(i) => Value::from(*i),
            // -- ⚠️ NaN and friends have no JSON form. null is the least-bad lie.
            CellValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CellValue::Text(s) => Value::String(s.clone()),
        }
    }

    /// 📄 Text rendition for the delimited staging format. NULL becomes an empty field.
    pub fn to_field(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }
}

/// 📊 An in-memory table: the output of extraction, the input of staging.
///
/// Every row has exactly `columns.len()` cells. [`TabularBatch::push_row`] enforces it,
/// because a ragged table turns into a CSV that mongoimport rejects wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularBatch {
    pub columns: Vec<Column>,
    rows: Vec<Vec<CellValue>>,
}

impl TabularBatch {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// ➕ Append a row, refusing rows whose width does not match the header.
    pub fn push_row(&mut self, row: Vec<CellValue>) -> anyhow::Result<()> {
        if row.len() != self.columns.len() {
            anyhow::bail!(
                "💀 row has {} cells but the batch has {} columns. Ragged tables are not a vibe.",
                row.len(),
                self.columns.len()
            );
        }
        self.rows.push(row);
        Ok(())
    }

    /// 📋 The rows, read-only. Writes go through [`TabularBatch::push_row`].
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// 🧪 Skips the width check, so tests can build the table `push_row` refuses.
    #[cfg(test)]
    pub(crate) fn from_rows(columns: Vec<Column>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// 🔄 One row as a compact JSON object, keys in column order.
    ///
    /// Framed by hand: serde_json's `Map` would sort the keys and the operator
    /// expects the document to read like the table did.
    pub fn row_json(&self, row: &[CellValue]) -> String {
        let mut doc = String::with_capacity(16 * self.columns.len() + 2);
        doc.push('{');
        for (i, (column, cell)) in self.columns.iter().zip(row).enumerate() {
            if i > 0 {
                doc.push(',');
            }
            // -- 🏷️ Value::String's Display is a properly escaped JSON string literal
            doc.push_str(&Value::String(column.name.clone()).to_string());
            doc.push(':');
            doc.push_str(&cell.to_json().to_string());
        }
        doc.push('}');
        doc
    }
}

// ============================================================
//  🏷️ ColumnSchema — the typed header the importer insists on
// ============================================================

/// 🏷️ One schema entry: `id` is an `int32`, `name` is a `string`, and so on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnType {
    pub column: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ColumnType {
    pub fn new(column: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            type_name: type_name.into(),
        }
    }

    /// 📝 `id.int32()`, the header-cell annotation mongoimport's typed mode reads.
    pub fn annotation(&self) -> String {
        format!("{}.{}()", self.column, self.type_name)
    }
}

/// 📋 Ordered column → type list. Order is file order, and file order is law.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSchema {
    pub columns: Vec<ColumnType>,
}

impl ColumnSchema {
    pub fn new(columns: Vec<ColumnType>) -> Self {
        Self { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// 📝 Comma-joined annotations in file order: `id.int32(),name.string()`.
    pub fn field_list(&self) -> String {
        self.columns
            .iter()
            .map(ColumnType::annotation)
            .collect::<Vec<_>>()
            .join(",")
    }
}

// ============================================================
//  🗂️ Post-import index specs
// ============================================================

/// 🔑 One key of a compound index. `order` is 1 or -1, like Mongo wants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    #[serde(default = "default_index_order")]
    pub order: i32,
}

fn default_index_order() -> i32 {
    1
}

/// 🗂️ An index to create on the destination collection after the import lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub keys: Vec<IndexKey>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub name: Option<String>,
}

// ============================================================
//  🚚 MigrationTask — one relational-to-document job
// ============================================================

/// 🚰 Where the rows come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSource {
    /// 🐬 Run this SQL against the relational source.
    Query(String),
    /// 📎 A file the operator already has (CSV or JSON array). Extraction is skipped.
    File(PathBuf),
}

/// 🚚 One job: rows in, collection out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTask {
    pub name: String,
    pub source: TaskSource,
    pub database: String,
    pub collection: String,
    pub schema: Option<ColumnSchema>,
    pub indexes: Vec<IndexSpec>,
}

impl MigrationTask {
    /// 🚀 A query-sourced task with no schema and no indexes. Builders below add the rest.
    pub fn from_query(
        name: impl Into<String>,
        query: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: TaskSource::Query(query.into()),
            database: database.into(),
            collection: collection.into(),
            schema: None,
            indexes: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: ColumnSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_indexes(mut self, indexes: Vec<IndexSpec>) -> Self {
        self.indexes = indexes;
        self
    }

    pub fn target(&self) -> ImportTarget {
        ImportTarget {
            database: self.database.clone(),
            collection: self.collection.clone(),
        }
    }
}

/// 🎯 Destination database + collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportTarget {
    pub database: String,
    pub collection: String,
}

impl fmt::Display for ImportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

// ============================================================
//  📁 StagedFile — the batch, serialized, waiting for the importer
// ============================================================

/// 📁 Which exchange format a staged file is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingFormat {
    /// `[{...},{...}]`, consumed by the importer's array mode
    Document,
    /// CSV with a header row, optionally type-annotated
    Delimited,
}

/// 📁 A path plus what's in it. Owned by the orchestrator for one task only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub format: StagingFormat,
    pub rows: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_a_ragged_row_is_turned_away_at_the_door() {
        let mut batch = TabularBatch::new(vec![
            Column::new("id", ColumnKind::Int),
            Column::new("name", ColumnKind::Text),
        ]);
        assert!(batch.push_row(vec![CellValue::Int(1)]).is_err());
        assert!(batch
            .push_row(vec![CellValue::Int(1), CellValue::Text("one".into())])
            .is_ok());
        assert_eq!(batch.row_count(), 1);
    }

    #[test]
    fn the_one_where_the_schema_speaks_fluent_mongoimport() {
        let schema = ColumnSchema::new(vec![
            ColumnType::new("id", "int32"),
            ColumnType::new("name", "string"),
        ]);
        assert_eq!(schema.field_list(), "id.int32(),name.string()");
    }

    #[test]
    fn the_one_where_a_row_becomes_a_document_in_column_order() {
        let batch = TabularBatch::new(vec![
            Column::new("z", ColumnKind::Int),
            Column::new("a \"quoted\"", ColumnKind::Text),
        ]);
        let doc = batch.row_json(&[CellValue::Int(7), CellValue::Null]);
        assert_eq!(doc, r#"{"z":7,"a \"quoted\"":null}"#);
        let parsed: Value = serde_json::from_str(&doc).expect("💀 hand-framed JSON should parse");
        assert_eq!(parsed["z"], Value::from(7));
    }

    #[test]
    fn the_one_where_nan_refuses_to_be_json() {
        assert_eq!(CellValue::Float(f64::NAN).to_json(), Value::Null);
        assert_eq!(CellValue::Float(1.5).to_field(), "1.5");
        assert_eq!(CellValue::Null.to_field(), "");
    }
}
