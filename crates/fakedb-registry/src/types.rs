//! Registry document types.
//!
//! One [`Metadata`] document exists per database. It is the authority on which
//! namespaces exist and which insert batches are currently being written.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Column name to declared type name (e.g. `"id" -> "int"`).
pub type FieldMapping = BTreeMap<String, String>;

/// Registration of a collection or table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NamespaceDescriptor {
    /// A schemaless document collection.
    Collection {
        /// Name of the typed model bound to this collection, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },

    /// A table with a declared column schema.
    ///
    /// The schema is immutable except through an explicit model rebind.
    Table {
        /// Declared columns.
        columns: FieldMapping,
        /// Name of the typed model the schema was inferred from, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
}

impl NamespaceDescriptor {
    /// A collection with no bound model.
    pub fn collection() -> Self {
        Self::Collection { model: None }
    }

    /// A table with the given columns and no bound model.
    pub fn table(columns: FieldMapping) -> Self {
        Self::Table {
            columns,
            model: None,
        }
    }

    /// Returns `true` if this is a collection.
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection { .. })
    }

    /// Returns `true` if this is a table.
    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table { .. })
    }

    /// Declared columns, for tables.
    pub fn columns(&self) -> Option<&FieldMapping> {
        match self {
            Self::Table { columns, .. } => Some(columns),
            Self::Collection { .. } => None,
        }
    }

    /// Name of the bound model, if any.
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Collection { model } | Self::Table { model, .. } => model.as_deref(),
        }
    }

    /// Human-readable kind, used in messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Collection { .. } => "collection",
            Self::Table { .. } => "table",
        }
    }
}

/// The registry document of one database.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Registered namespaces by name.
    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespaceDescriptor>,
    /// Ids of insert batches currently being written.
    #[serde(default)]
    pub operations: BTreeSet<String>,
}

impl Metadata {
    /// Look up a namespace descriptor.
    pub fn namespace(&self, name: &str) -> Option<&NamespaceDescriptor> {
        self.namespaces.get(name)
    }

    /// Returns `true` if the namespace is registered.
    pub fn has_namespace(&self, name: &str) -> bool {
        self.namespaces.contains_key(name)
    }

    /// Returns `true` if any insert batch is in flight.
    pub fn has_pending_operations(&self) -> bool {
        !self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_json_shape() {
        let mut columns = FieldMapping::new();
        columns.insert("id".into(), "int".into());
        let json = serde_json::to_value(NamespaceDescriptor::table(columns)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "table", "columns": {"id": "int"}})
        );

        let json = serde_json::to_value(NamespaceDescriptor::collection()).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "collection"}));
    }

    #[test]
    fn descriptor_accessors() {
        let table = NamespaceDescriptor::Table {
            columns: FieldMapping::new(),
            model: Some("LogEntry".into()),
        };
        assert!(table.is_table());
        assert_eq!(table.model(), Some("LogEntry"));
        assert_eq!(table.kind_name(), "table");
        assert!(NamespaceDescriptor::collection().columns().is_none());
    }

    #[test]
    fn metadata_tolerates_missing_fields() {
        let meta: Metadata = serde_json::from_str("{}").unwrap();
        assert_eq!(meta, Metadata::default());
        assert!(!meta.has_pending_operations());
    }

    #[test]
    fn metadata_lookup() {
        let mut meta = Metadata::default();
        meta.namespaces
            .insert("docs".into(), NamespaceDescriptor::collection());
        meta.operations.insert("op-1".into());
        assert!(meta.has_namespace("docs"));
        assert!(meta.namespace("missing").is_none());
        assert!(meta.has_pending_operations());
    }
}
