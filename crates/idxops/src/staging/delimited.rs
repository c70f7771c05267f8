//! 📄 Delimited staging format: CSV with a header row.
//!
//! 🧠 Knowledge graph:
//! - no schema → header is the plain column names, batch order
//! - schema → header cells are `column.type()` in schema order, and the schema
//!   has to name exactly the batch's columns or nothing gets written
//! - the reader strips the `.type()` suffix back off and hands every cell back as text
//!
//! Everything here is pure: bytes in, bytes out. The writer in `staging.rs`
//! owns the disk.

use std::io;

use csv::{ByteRecord, ReaderBuilder, StringRecord, WriterBuilder};

use crate::common::{CellValue, Column, ColumnKind, ColumnSchema, ColumnType, TabularBatch};

/// 📝 Render `batch` as CSV bytes.
///
/// Schema problems come back as `InvalidInput` so the caller can wrap them in the
/// same staging error as a full disk.
pub fn render(batch: &TabularBatch, schema: Option<&ColumnSchema>) -> io::Result<Vec<u8>> {
    let (header, order) = match schema {
        Some(schema) => typed_layout(batch, schema)?,
        None => (
            batch.columns.iter().map(|c| c.name.clone()).collect(),
            (0..batch.columns.len()).collect(),
        ),
    };

    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(&header).map_err(csv_to_io)?;
    for (line, row) in batch.rows().iter().enumerate() {
        if row.len() != batch.columns.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "row {} has {} cells but the batch has {} columns",
                    line + 1,
                    row.len(),
                    batch.columns.len()
                ),
            ));
        }
        writer
            .write_record(order.iter().map(|&ordinal| row[ordinal].to_field()))
            .map_err(csv_to_io)?;
    }
    writer
        .into_inner()
        .map_err(|err| io::Error::other(err.to_string()))
}

/// 🏷️ Header cells plus, for each output position, which batch column feeds it.
fn typed_layout(batch: &TabularBatch, schema: &ColumnSchema) -> io::Result<(Vec<String>, Vec<usize>)> {
    let mut header = Vec::with_capacity(schema.columns.len());
    let mut order = Vec::with_capacity(schema.columns.len());
    for entry in &schema.columns {
        let ordinal = batch.column_index(&entry.column).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("schema names column '{}' but the batch has no such column", entry.column),
            )
        })?;
        header.push(entry.annotation());
        order.push(ordinal);
    }
    if let Some(stray) = batch
        .columns
        .iter()
        .find(|c| !schema.columns.iter().any(|entry| entry.column == c.name))
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("batch column '{}' is missing from the schema", stray.name),
        ));
    }
    Ok((header, order))
}

/// 🔍 Read CSV bytes back into a batch. Header annotations are stripped,
/// every cell is `Text`, empty cells are `Null`.
pub fn parse(bytes: &[u8]) -> io::Result<TabularBatch> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(bytes);
    let columns = reader
        .headers()
        .map_err(csv_to_io)?
        .iter()
        .map(|cell| Column::new(strip_annotation(cell), ColumnKind::Text))
        .collect();

    let mut batch = TabularBatch::new(columns);
    for record in reader.records() {
        let record = record.map_err(csv_to_io)?;
        let cells = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    CellValue::Null
                } else {
                    CellValue::Text(field.to_string())
                }
            })
            .collect();
        batch
            .push_row(cells)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
    }
    Ok(batch)
}

/// 🔢 Data records after the header. Quoted fields may span lines and still count once.
pub fn count_records(bytes: &[u8]) -> io::Result<usize> {
    let mut reader = ReaderBuilder::new().has_headers(true).flexible(true).from_reader(bytes);
    let mut record = ByteRecord::new();
    let mut count = 0;
    while reader.read_byte_record(&mut record).map_err(csv_to_io)? {
        count += 1;
    }
    Ok(count)
}

/// 🏷️ Make the first row the schema's typed header.
///
/// A plain header (`id,name`) or an annotated one (`id.int64(),name.string()`) is
/// accepted when its column names are the schema's, in schema order. It is
/// rewritten to the schema's annotations and the body is kept byte for byte.
/// Anything else is `InvalidInput`.
pub fn annotate_header(bytes: &[u8], schema: &ColumnSchema) -> io::Result<Vec<u8>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut header = StringRecord::new();
    if !reader.read_record(&mut header).map_err(csv_to_io)? {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "file has no header row"));
    }
    let body_start = usize::try_from(reader.position().byte())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;

    let found: Vec<&str> = header.iter().map(strip_annotation).collect();
    let wanted: Vec<&str> = schema.columns.iter().map(|entry| entry.column.as_str()).collect();
    if found != wanted {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "header '{}' does not match the schema field list '{}'",
                header.iter().collect::<Vec<_>>().join(","),
                schema.field_list()
            ),
        ));
    }

    let mut writer = WriterBuilder::new().from_writer(Vec::with_capacity(bytes.len() + 16));
    writer
        .write_record(schema.columns.iter().map(ColumnType::annotation))
        .map_err(csv_to_io)?;
    let mut out = writer
        .into_inner()
        .map_err(|err| io::Error::other(err.to_string()))?;
    out.extend_from_slice(bytes.get(body_start..).unwrap_or_default());
    Ok(out)
}

/// ✂️ `id.int32()` → `id`. Plain names pass through. Names with dots but no
/// trailing `()` are left alone; only the annotation shape is stripped.
pub fn strip_annotation(cell: &str) -> &str {
    match cell.strip_suffix("()").and_then(|rest| rest.rsplit_once('.')) {
        Some((column, _type_name)) => column,
        None => cell,
    }
}

fn csv_to_io(err: csv::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> TabularBatch {
        let mut batch = TabularBatch::new(vec![
            Column::new("id", ColumnKind::Int),
            Column::new("name", ColumnKind::Text),
            Column::new("score", ColumnKind::Float),
        ]);
        batch
            .push_row(vec![
                CellValue::Int(1),
                CellValue::Text("ann, the first".into()),
                CellValue::Float(9.5),
            ])
            .expect("row fits");
        batch
            .push_row(vec![CellValue::Int(2), CellValue::Null, CellValue::Float(7.0)])
            .expect("row fits");
        batch
    }

    #[test]
    fn the_one_where_the_typed_header_round_trips_with_order_intact() {
        let batch = people();
        let schema = ColumnSchema::new(vec![
            ColumnType::new("id", "int32"),
            ColumnType::new("name", "string"),
            ColumnType::new("score", "double"),
        ]);
        let bytes = render(&batch, Some(&schema)).expect("schema matches");
        let text = String::from_utf8(bytes.clone()).expect("utf8");
        assert_eq!(text.lines().next(), Some("id.int32(),name.string(),score.double()"));

        let back = parse(&bytes).expect("reads back");
        assert_eq!(back.row_count(), batch.row_count());
        assert_eq!(back.column_names(), batch.column_names());
        assert_eq!(back.rows()[0][1], CellValue::Text("ann, the first".into()));
        assert_eq!(back.rows()[1][1], CellValue::Null);
    }

    #[test]
    fn the_one_where_the_schema_gets_to_pick_the_column_order() {
        let schema = ColumnSchema::new(vec![
            ColumnType::new("score", "double"),
            ColumnType::new("id", "int64"),
            ColumnType::new("name", "string"),
        ]);
        let bytes = render(&people(), Some(&schema)).expect("schema matches");
        let text = String::from_utf8(bytes).expect("utf8");
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("score.double(),id.int64(),name.string()"));
        assert_eq!(lines.next(), Some("9.5,1,\"ann, the first\""));
    }

    #[test]
    fn the_one_where_a_schema_that_names_a_ghost_column_is_refused() {
        let schema = ColumnSchema::new(vec![
            ColumnType::new("id", "int32"),
            ColumnType::new("email", "string"),
        ]);
        let err = render(&people(), Some(&schema)).expect_err("email is not a column");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let partial = ColumnSchema::new(vec![ColumnType::new("id", "int32")]);
        assert!(render(&people(), Some(&partial)).is_err());
    }

    #[test]
    fn the_one_where_an_empty_batch_is_all_header_no_body() {
        let batch = TabularBatch::new(vec![
            Column::new("id", ColumnKind::Int),
            Column::new("name", ColumnKind::Text),
        ]);
        let text = String::from_utf8(render(&batch, None).expect("renders")).expect("utf8");
        assert_eq!(text, "id,name\n");
    }

    #[test]
    fn the_one_where_a_ragged_batch_is_an_error_not_a_panic() {
        let batch = TabularBatch::from_rows(
            vec![Column::new("id", ColumnKind::Int), Column::new("name", ColumnKind::Text)],
            vec![vec![CellValue::Int(1)]],
        );
        let err = render(&batch, None).expect_err("one cell short");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn the_one_where_a_multi_line_note_is_still_one_record() {
        let bytes = b"id,note\n1,\"two\nlines\"\n2,plain\n";
        assert_eq!(count_records(bytes).expect("valid csv"), 2);
        assert_eq!(count_records(b"id,note\n").expect("header only"), 0);
        assert_eq!(count_records(b"").expect("empty"), 0);
    }

    #[test]
    fn the_one_where_a_plain_upload_header_learns_its_types() {
        let schema = ColumnSchema::new(vec![
            ColumnType::new("id", "int32"),
            ColumnType::new("name", "string"),
        ]);
        let plain = annotate_header(b"id,name\n1,\"a\nb\"\n2,c", &schema).expect("names match");
        assert_eq!(plain, b"id.int32(),name.string()\n1,\"a\nb\"\n2,c".to_vec());

        let retyped = annotate_header(b"id.int64(),name.string()\n1,a\n", &schema).expect("names match");
        assert_eq!(retyped, b"id.int32(),name.string()\n1,a\n".to_vec());

        let swapped = annotate_header(b"name,id\na,1\n", &schema).expect_err("order matters");
        assert_eq!(swapped.kind(), io::ErrorKind::InvalidInput);
        assert!(annotate_header(b"", &schema).is_err());
    }

    #[test]
    fn the_one_where_annotations_come_off_cleanly() {
        assert_eq!(strip_annotation("id.int32()"), "id");
        assert_eq!(strip_annotation("created.date(2006-01-02)"), "created.date(2006-01-02)");
        assert_eq!(strip_annotation("address.city.string()"), "address.city");
        assert_eq!(strip_annotation("plain"), "plain");
    }
}
