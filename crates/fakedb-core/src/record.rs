//! Records and their on-storage layout.
//!
//! Each record is one immutable object inside its namespace directory, named
//! `<timestamp>_<identity>_<opId>`. The timestamp is UTC with microsecond
//! precision (`%Y%m%dT%H%M%S%6f`), so a plain listing comes back in write
//! order for records written by one process.

use std::time::Duration;

use chrono::{DateTime, Utc};
use fakedb_store::path::join;
use fakedb_store::{ObjectStore, StoreError};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::model::RecordModel;

/// A document or row: a JSON object.
pub type Record = serde_json::Map<String, Value>;

/// Timestamp layout used in record object names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%6f";

/// Longest identity component kept in an object name.
const MAX_IDENTITY_LEN: usize = 64;

/// Re-stamps allowed when a record name is already taken.
const MAX_NAME_ATTEMPTS: usize = 16;

/// A value offered for insertion, before it is resolved to a [`Record`].
#[derive(Clone, Debug, PartialEq)]
pub enum RecordInput {
    /// An already-built mapping.
    Mapping(Record),
    /// Any JSON value; must turn out to be an object.
    Object(Value),
    /// An instance of a typed model, already serialized.
    Model {
        /// The model's name.
        name: String,
        /// The serialized instance.
        value: Value,
    },
}

impl RecordInput {
    /// Serialize any value; it must serialize to a JSON object.
    pub fn object<T: Serialize + ?Sized>(value: &T) -> CoreResult<Self> {
        serde_json::to_value(value)
            .map(Self::Object)
            .map_err(|e| CoreError::Type(e.to_string()))
    }

    /// Serialize a model instance after running its own validation.
    pub fn model<T: RecordModel>(value: &T) -> CoreResult<Self> {
        value.validate().map_err(|reason| {
            CoreError::Validation(format!("{}: {reason}", T::model_name()))
        })?;
        let value = serde_json::to_value(value).map_err(|e| CoreError::Type(e.to_string()))?;
        Ok(Self::Model {
            name: T::model_name().to_string(),
            value,
        })
    }

    /// Name of the model this input came from, if any.
    pub fn model_name(&self) -> Option<&str> {
        match self {
            Self::Model { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Resolve to a mapping.
    pub fn into_mapping(self) -> CoreResult<Record> {
        match self {
            Self::Mapping(map) => Ok(map),
            Self::Object(Value::Object(map)) => Ok(map),
            Self::Model {
                value: Value::Object(map),
                ..
            } => Ok(map),
            Self::Object(other) => Err(CoreError::Type(format!(
                "expected an object, got {}",
                json_type_name(&other)
            ))),
            Self::Model { name, value } => Err(CoreError::Type(format!(
                "model {name} serialized to {}, not an object",
                json_type_name(&value)
            ))),
        }
    }
}

impl From<Record> for RecordInput {
    fn from(map: Record) -> Self {
        Self::Mapping(map)
    }
}

impl From<Value> for RecordInput {
    fn from(value: Value) -> Self {
        Self::Object(value)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Identity component for `record`'s object name.
///
/// Uses `record[field]` when present and non-null, otherwise a fresh UUID.
/// The result is path-safe: anything outside `[A-Za-z0-9._-]` becomes `-`.
pub fn record_identity(record: &Record, field: &str) -> String {
    let raw = match record.get(field) {
        None | Some(Value::Null) => Uuid::new_v4().to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    sanitize_identity(&raw)
}

fn sanitize_identity(raw: &str) -> String {
    raw.chars()
        .take(MAX_IDENTITY_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Object name for a record written at `at`.
pub fn object_name(at: DateTime<Utc>, identity: &str, operation_id: &str) -> String {
    format!("{}_{identity}_{operation_id}", at.format(TIMESTAMP_FORMAT))
}

/// Write `record` into directory `dir` with a create-if-absent write.
///
/// A name collision re-stamps the timestamp and retries. Returns the object
/// name that was written.
pub async fn write_record(
    store: &dyn ObjectStore,
    dir: &str,
    record: &Record,
    identity: &str,
    operation_id: &str,
) -> CoreResult<String> {
    let bytes = serde_json::to_vec(record).map_err(|e| CoreError::Serialization(e.to_string()))?;
    for _ in 0..MAX_NAME_ATTEMPTS {
        let name = object_name(Utc::now(), identity, operation_id);
        match store.create(&join(dir, &name), &bytes).await {
            Ok(()) => return Ok(name),
            Err(StoreError::AlreadyExists(_)) => {
                debug!(dir, name = %name, "record name taken; re-stamping");
                tokio::time::sleep(Duration::from_micros(1)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(StoreError::AlreadyExists(format!(
        "{dir}: no free record name for {identity} after {MAX_NAME_ATTEMPTS} attempts"
    ))
    .into())
}
