//! Row-shape normalization for schema-bearing tables.

use fakedb_registry::FieldMapping;
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::record::Record;

/// Fit `row` to the declared columns.
///
/// Fails with [`CoreError::Validation`] if the row carries a key that is not
/// a declared column. Every declared column missing from the row is filled
/// with an explicit `null`. Declared type names are not checked.
pub fn normalize(mut row: Record, columns: &FieldMapping) -> CoreResult<Record> {
    let unknown: Vec<&str> = row
        .keys()
        .filter(|key| !columns.contains_key(key.as_str()))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(CoreError::Validation(format!(
            "unknown column(s): {}",
            unknown.join(", ")
        )));
    }

    for column in columns.keys() {
        if !row.contains_key(column) {
            row.insert(column.clone(), Value::Null);
        }
    }
    Ok(row)
}
