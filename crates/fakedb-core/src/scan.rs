//! Full scans over a namespace directory.

use fakedb_store::path::join;
use fakedb_store::{ObjectStore, StoreError};
use serde_json::Value;
use tracing::debug;

use crate::error::CoreResult;
use crate::record::Record;

/// Decode a stored object as a record. Anything that is not a JSON object is
/// rejected.
pub fn parse_record(bytes: &[u8]) -> Option<Record> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Read every record in `dir`, keeping those that satisfy `filter`.
///
/// Objects that do not parse as records, or that vanish between listing and
/// reading, are skipped. Survivors come back in listing order.
pub async fn scan_dir<F>(store: &dyn ObjectStore, dir: &str, filter: F) -> CoreResult<Vec<Record>>
where
    F: Fn(&Record) -> bool + Send + Sync,
{
    let names = store.list(dir).await?;
    let mut records = Vec::with_capacity(names.len());
    let mut skipped = 0usize;

    for name in names {
        let bytes = match store.read(&join(dir, &name)).await {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => {
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let Some(record) = parse_record(&bytes) else {
            debug!(dir, name = %name, "skipping unparsable record object");
            skipped += 1;
            continue;
        };
        if filter(&record) {
            records.push(record);
        }
    }

    debug!(dir, matched = records.len(), skipped, "scan complete");
    Ok(records)
}
