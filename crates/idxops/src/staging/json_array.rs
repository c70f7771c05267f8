//! 📦 Document staging format: one JSON array, one compact object per row.
//!
//! The importer's `--jsonArray` mode reads this in a single pass. Rows are
//! framed by hand so key order matches column order.

use crate::common::TabularBatch;

/// 🔄 Render the whole batch as `[{..},{..}]`. An empty batch is `[]`.
pub fn render(batch: &TabularBatch) -> String {
    let mut out = String::with_capacity(2 + batch.row_count() * 32);
    out.push('[');
    for (i, row) in batch.rows().iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&batch.row_json(row));
    }
    out.push(']');
    out
}

/// 🔢 How many documents an operator-supplied array holds.
///
/// Only used for the row count on an uploaded file; a file that isn't a JSON
/// array is reported as `None` and the caller falls back to counting lines.
pub fn count_documents(bytes: &[u8]) -> Option<usize> {
    match serde_json::from_slice::<serde_json::Value>(bytes).ok()? {
        serde_json::Value::Array(docs) => Some(docs.len()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CellValue, Column, ColumnKind};

    #[test]
    fn the_one_where_three_rows_become_a_three_element_array() {
        let mut batch = TabularBatch::new(vec![
            Column::new("id", ColumnKind::Int),
            Column::new("name", ColumnKind::Text),
        ]);
        for (id, name) in [(1, "ann"), (2, "bob"), (3, "cy")] {
            batch
                .push_row(vec![CellValue::Int(id), CellValue::Text(name.into())])
                .expect("row fits");
        }
        let rendered = render(&batch);
        assert!(rendered.starts_with(r#"[{"id":1,"name":"ann"},"#));
        assert_eq!(count_documents(rendered.as_bytes()), Some(3));
    }

    #[test]
    fn the_one_where_nothing_renders_as_an_empty_array() {
        let batch = TabularBatch::new(vec![Column::new("id", ColumnKind::Int)]);
        assert_eq!(render(&batch), "[]");
        assert_eq!(count_documents(b"[]"), Some(0));
        assert_eq!(count_documents(b"{\"not\":\"an array\"}"), None);
    }
}
