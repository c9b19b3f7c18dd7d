//! Typed records.
//!
//! A [`RecordModel`] is a Rust type that can stand in for a raw mapping on
//! insert and be rebuilt from stored records on query. The model declares its
//! own column mapping; [`infer_schema`] turns that into a table schema plus a
//! [`ModelAdapter`] for conversions.
//!
//! ```
//! use fakedb_core::model::{infer_schema, RecordModel};
//! use fakedb_registry::FieldMapping;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct LogEntry {
//!     id: i64,
//!     message: String,
//! }
//!
//! impl RecordModel for LogEntry {
//!     fn field_mapping() -> FieldMapping {
//!         [("id", "int"), ("message", "str")]
//!             .into_iter()
//!             .map(|(k, v)| (k.to_string(), v.to_string()))
//!             .collect()
//!     }
//! }
//!
//! let (columns, adapter) = infer_schema::<LogEntry>().unwrap();
//! assert_eq!(columns.len(), 2);
//! let record = adapter
//!     .to_record(&LogEntry { id: 1, message: "boot".into() })
//!     .unwrap();
//! assert_eq!(adapter.from_record(record).unwrap().message, "boot");
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use fakedb_registry::FieldMapping;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::record::Record;

/// A typed record.
pub trait RecordModel: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name recorded in the registry when the model is bound.
    fn model_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Column name to type name. An empty mapping marks the type as unusable
    /// for records.
    fn field_mapping() -> FieldMapping;

    /// Constraints beyond what deserialization checks.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Converts between a model type and stored records.
pub struct ModelAdapter<T> {
    _model: PhantomData<fn() -> T>,
}

impl<T: RecordModel> ModelAdapter<T> {
    fn new() -> Self {
        Self {
            _model: PhantomData,
        }
    }

    /// Serialize an instance into a record.
    pub fn to_record(&self, value: &T) -> CoreResult<Record> {
        match serde_json::to_value(value) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(CoreError::Type(format!(
                "{} does not serialize to an object",
                T::model_name()
            ))),
            Err(e) => Err(CoreError::Type(format!("{}: {e}", T::model_name()))),
        }
    }

    /// Rebuild an instance from a record, then run the model's validation.
    pub fn from_record(&self, record: Record) -> CoreResult<T> {
        let value: T = serde_json::from_value(Value::Object(record))
            .map_err(|e| CoreError::Validation(format!("{}: {e}", T::model_name())))?;
        value
            .validate()
            .map_err(|reason| CoreError::Validation(format!("{}: {reason}", T::model_name())))?;
        Ok(value)
    }
}

impl<T> Clone for ModelAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            _model: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ModelAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("model", &std::any::type_name::<T>())
            .finish()
    }
}

/// Derive the column mapping and adapter for `T`.
pub fn infer_schema<T: RecordModel>() -> CoreResult<(FieldMapping, ModelAdapter<T>)> {
    let fields = T::field_mapping();
    if fields.is_empty() {
        return Err(CoreError::Type(format!(
            "{} declares no fields",
            T::model_name()
        )));
    }
    Ok((fields, ModelAdapter::new()))
}

type Validator = dyn Fn(&Record) -> CoreResult<()> + Send + Sync;

/// A model bound to a namespace, with its type erased.
///
/// Every record inserted into the namespace is checked by rebuilding the
/// model from it.
#[derive(Clone)]
pub struct ModelBinding {
    name: &'static str,
    fields: FieldMapping,
    validator: Arc<Validator>,
}

impl ModelBinding {
    /// Bind model `T`.
    pub fn of<T: RecordModel>() -> CoreResult<Self> {
        let (fields, adapter) = infer_schema::<T>()?;
        Ok(Self {
            name: T::model_name(),
            fields,
            validator: Arc::new(move |record: &Record| {
                adapter.from_record(record.clone()).map(drop)
            }),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &FieldMapping {
        &self.fields
    }

    /// Check that `record` is a valid instance of the bound model.
    pub fn validate(&self, record: &Record) -> CoreResult<()> {
        (self.validator)(record)
    }
}

impl fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBinding")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}
