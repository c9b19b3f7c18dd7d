//! Document database façade.
//!
//! Collections are schemaless namespaces. Every document carries an `_id`
//! (generated as a UUID v4 string when absent) which names its object.

use std::collections::BTreeSet;

use fakedb_core::{
    infer_schema, validate_namespace_name, Backend, BarrierPolicy, CoreError, ModelBinding,
    NamespaceCoordinator, NamespaceDescriptor, Record, RecordInput, RecordModel, Registration,
};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::bindings::Bindings;
use crate::error::SdkResult;

/// Field holding a document's identity.
pub const ID_FIELD: &str = "_id";

/// A document database stored under one directory of a backend.
#[derive(Clone, Debug)]
pub struct DocumentDb {
    coordinator: NamespaceCoordinator,
    bindings: Bindings,
}

impl DocumentDb {
    /// Open database `db_name` with the default barrier policy.
    pub fn new(backend: Backend, db_name: &str) -> SdkResult<Self> {
        Self::with_policy(backend, db_name, BarrierPolicy::default())
    }

    pub fn with_policy(backend: Backend, db_name: &str, policy: BarrierPolicy) -> SdkResult<Self> {
        Ok(Self {
            coordinator: NamespaceCoordinator::new(backend, db_name, policy)?,
            bindings: Bindings::default(),
        })
    }

    pub fn db_name(&self) -> &str {
        self.coordinator.db_name()
    }

    pub fn coordinator(&self) -> &NamespaceCoordinator {
        &self.coordinator
    }

    /// Get collection `name`, creating it if needed.
    pub async fn get_collection(&self, name: &str) -> SdkResult<Collection> {
        match self
            .coordinator
            .register_namespace(name, NamespaceDescriptor::collection())
            .await?
        {
            Registration::Created => {}
            Registration::Existing(descriptor) if descriptor.is_collection() => {}
            Registration::Existing(descriptor) => {
                return Err(CoreError::AlreadyExists(format!(
                    "{}/{name} is a {}, not a collection",
                    self.db_name(),
                    descriptor.kind_name()
                ))
                .into())
            }
        }
        self.collection(name)
    }

    /// Get collection `name`, creating it if needed, and bind model `T` to it.
    pub async fn get_collection_with_model<T: RecordModel>(&self, name: &str) -> SdkResult<Collection> {
        let collection = self.get_collection(name).await?;
        collection.bind_model::<T>().await?;
        Ok(collection)
    }

    /// A handle on collection `name` without checking that it exists.
    ///
    /// The name is validated up front (`InvalidName`); inserts and finds
    /// through the handle fail with `NotFound` until the collection is
    /// created.
    pub fn collection(&self, name: &str) -> SdkResult<Collection> {
        validate_namespace_name(name).map_err(CoreError::from)?;
        Ok(Collection {
            db: self.clone(),
            name: name.to_string(),
        })
    }

    /// Names of all collections.
    pub async fn collection_names(&self) -> SdkResult<Vec<String>> {
        Ok(self
            .coordinator
            .namespaces()
            .await?
            .into_iter()
            .filter(|(_, d)| d.is_collection())
            .map(|(name, _)| name)
            .collect())
    }

    // ---- Administration ----

    /// Operation ids currently marked as in flight.
    pub async fn pending_operations(&self) -> SdkResult<BTreeSet<String>> {
        Ok(self.coordinator.pending_operations().await?)
    }

    /// Forget every in-flight operation id. Only for recovering from a
    /// writer that crashed mid-batch.
    pub async fn clear_pending_operations(&self) -> SdkResult<BTreeSet<String>> {
        Ok(self.coordinator.clear_pending_operations().await?)
    }
}

/// Handle on one collection.
#[derive(Clone, Debug)]
pub struct Collection {
    db: DocumentDb,
    name: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate every future insert through this handle against model `T`.
    pub async fn bind_model<T: RecordModel>(&self) -> SdkResult<()> {
        let binding = ModelBinding::of::<T>()?;
        let model = binding.name().to_string();
        self.db
            .coordinator
            .update_namespace(&self.name, |current| match current {
                NamespaceDescriptor::Collection { .. } => Ok(NamespaceDescriptor::Collection {
                    model: Some(model),
                }),
                other => Err(CoreError::Type(format!(
                    "cannot bind a model to a {}",
                    other.kind_name()
                ))),
            })
            .await?;
        self.db.bindings.bind(&self.name, binding).await;
        debug!(db = %self.db.db_name(), collection = %self.name, model = T::model_name(), "model bound");
        Ok(())
    }

    /// Insert one document; returns it with its `_id`.
    pub async fn insert_one(&self, document: impl Into<RecordInput>) -> SdkResult<Record> {
        let mut inserted = self.insert_many([document]).await?;
        Ok(inserted.remove(0))
    }

    /// Insert documents as one batch; returns them with their `_id`s.
    pub async fn insert_many<I, D>(&self, documents: I) -> SdkResult<Vec<Record>>
    where
        I: IntoIterator<Item = D>,
        D: Into<RecordInput>,
    {
        let mut records = Vec::new();
        for document in documents {
            let input: RecordInput = document.into();
            let mut record = input.into_mapping()?;
            if !record.contains_key(ID_FIELD) {
                record.insert(ID_FIELD.to_string(), Value::String(Uuid::new_v4().to_string()));
            }
            records.push(record);
        }
        if records.is_empty() {
            return Ok(records);
        }

        self.db.bindings.validate_all(&self.name, &records).await?;
        self.db
            .coordinator
            .insert_batch(&self.name, &records, ID_FIELD)
            .await?;
        Ok(records)
    }

    /// All documents satisfying `filter`.
    pub async fn find<F>(&self, filter: F) -> SdkResult<Vec<Record>>
    where
        F: Fn(&Record) -> bool + Send + Sync,
    {
        Ok(self.db.coordinator.scan(&self.name, filter).await?)
    }

    /// All documents.
    pub async fn find_all(&self) -> SdkResult<Vec<Record>> {
        self.find(|_| true).await
    }

    /// The first document satisfying `filter`.
    pub async fn find_one<F>(&self, filter: F) -> SdkResult<Option<Record>>
    where
        F: Fn(&Record) -> bool + Send + Sync,
    {
        Ok(self.find(filter).await?.into_iter().next())
    }

    /// The first document whose `_id` equals `id`.
    pub async fn find_by_id(&self, id: impl Into<Value>) -> SdkResult<Option<Record>> {
        let id = id.into();
        self.find_one(move |doc| doc.get(ID_FIELD) == Some(&id)).await
    }

    /// Documents satisfying `filter`, converted to `T`.
    pub async fn find_as<T, F>(&self, filter: F) -> SdkResult<Vec<T>>
    where
        T: RecordModel,
        F: Fn(&Record) -> bool + Send + Sync,
    {
        let (_, adapter) = infer_schema::<T>()?;
        self.find(filter)
            .await?
            .into_iter()
            .map(|doc| adapter.from_record(doc).map_err(Into::into))
            .collect()
    }

    /// The first document satisfying `filter`, converted to `T`.
    pub async fn find_one_as<T, F>(&self, filter: F) -> SdkResult<Option<T>>
    where
        T: RecordModel,
        F: Fn(&Record) -> bool + Send + Sync,
    {
        let (_, adapter) = infer_schema::<T>()?;
        match self.find_one(filter).await? {
            Some(doc) => Ok(Some(adapter.from_record(doc)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SdkError;
    use fakedb_core::{ErrorKind, FieldMapping, LeaseConfig};
    use fakedb_store::{ObjectStore, WriteMode};
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    async fn local_db(dir: &TempDir, name: &str) -> DocumentDb {
        let backend = Backend::local(dir.path().join("storage"), LeaseConfig::default())
            .await
            .unwrap();
        DocumentDb::new(backend, name).unwrap()
    }

    fn fields(pairs: &[(&str, &str)]) -> FieldMapping {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: String,
        name: String,
        #[serde(default = "yes")]
        active: bool,
    }

    fn yes() -> bool {
        true
    }

    impl RecordModel for Profile {
        fn field_mapping() -> FieldMapping {
            fields(&[("id", "str"), ("name", "str"), ("active", "bool")])
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct AuditEvent {
        event_id: String,
        payload: BTreeMap<String, String>,
    }

    impl RecordModel for AuditEvent {
        fn field_mapping() -> FieldMapping {
            fields(&[("event_id", "str"), ("payload", "map")])
        }
    }

    #[test]
    fn requires_db_name() {
        let backend = Backend::in_memory(LeaseConfig::default());
        let err = DocumentDb::new(backend, "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidName);
    }

    #[tokio::test]
    async fn plain_documents() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "plain_mongo").await;
        let coll = db.get_collection("docs").await.unwrap();
        coll.insert_many([json!({"_id": "a", "value": 1}), json!({"_id": "b", "value": 2})])
            .await
            .unwrap();

        let docs = coll.find_all().await.unwrap();
        let ids: BTreeSet<&str> = docs.iter().filter_map(|d| d[ID_FIELD].as_str()).collect();
        assert_eq!(ids, BTreeSet::from(["a", "b"]));
        assert_eq!(db.collection_names().await.unwrap(), vec!["docs"]);
    }

    #[tokio::test]
    async fn insert_one_generates_id() {
        let db = DocumentDb::new(Backend::in_memory(LeaseConfig::default()), "db").unwrap();
        let coll = db.get_collection("docs").await.unwrap();
        let doc = coll.insert_one(json!({"name": "foo"})).await.unwrap();
        let id = doc[ID_FIELD].as_str().unwrap().to_string();
        assert!(Uuid::parse_str(&id).is_ok());

        let found = coll.find_by_id(id.as_str()).await.unwrap().unwrap();
        assert_eq!(found["name"], json!("foo"));
        assert!(coll.find_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_with_filter() {
        let db = DocumentDb::new(Backend::in_memory(LeaseConfig::default()), "db").unwrap();
        let coll = db.get_collection("nums").await.unwrap();
        coll.insert_many((0..6).map(|i| json!({"_id": i, "n": i})))
            .await
            .unwrap();
        let even = coll
            .find(|d| d["n"].as_i64().is_some_and(|n| n % 2 == 0))
            .await
            .unwrap();
        assert_eq!(even.len(), 3);
        let none = coll.find_one(|d| d["n"] == json!(99)).await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn typed_round_trip() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "typed_mongo").await;
        let coll = db.get_collection_with_model::<Profile>("profiles").await.unwrap();
        coll.insert_one(
            RecordInput::model(&Profile {
                id: "p1".into(),
                name: "Alice".into(),
                active: true,
            })
            .unwrap(),
        )
        .await
        .unwrap();
        coll.insert_many([json!({"id": "p2", "name": "Bob", "active": false})])
            .await
            .unwrap();

        let profiles: Vec<Profile> = coll.find_as(|_| true).await.unwrap();
        let ids: BTreeSet<&str> = profiles.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, BTreeSet::from(["p1", "p2"]));

        let descriptor = db.coordinator().descriptor("profiles").await.unwrap();
        assert_eq!(descriptor.model(), Some("Profile"));
    }

    #[tokio::test]
    async fn bind_model_after_creation() {
        let db = DocumentDb::new(Backend::in_memory(LeaseConfig::default()), "bind_mongo").unwrap();
        let coll = db.get_collection("events").await.unwrap();
        coll.bind_model::<AuditEvent>().await.unwrap();
        let event = AuditEvent {
            event_id: "evt-1".into(),
            payload: BTreeMap::from([("k".to_string(), "v".to_string())]),
        };
        coll.insert_one(RecordInput::model(&event).unwrap())
            .await
            .unwrap();

        let events: Vec<AuditEvent> = coll.find_as(|_| true).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, "evt-1");
    }

    #[tokio::test]
    async fn find_as_without_binding() {
        let db = DocumentDb::new(Backend::in_memory(LeaseConfig::default()), "db").unwrap();
        let coll = db.get_collection("profiles").await.unwrap();
        coll.insert_one(json!({"id": "p1", "name": "Alice"}))
            .await
            .unwrap();
        let first: Option<Profile> = coll.find_one_as(|_| true).await.unwrap();
        assert_eq!(first.unwrap().name, "Alice");
    }

    #[tokio::test]
    async fn bound_model_rejects_invalid_documents() {
        let db = DocumentDb::new(Backend::in_memory(LeaseConfig::default()), "db").unwrap();
        let coll = db.get_collection_with_model::<Profile>("profiles").await.unwrap();
        let err = coll.insert_one(json!({"id": "p1"})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(coll.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_json_is_skipped() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "db").await;
        let coll = db.get_collection("docs").await.unwrap();
        std::fs::write(
            dir.path().join("storage").join("db").join("docs").join("bad.json"),
            "not-json",
        )
        .unwrap();
        assert!(coll.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recovers_from_bad_metadata() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "broken").await;
        db.coordinator()
            .backend()
            .store()
            .write("broken/__METADATA__", b"not json", WriteMode::Overwrite)
            .await
            .unwrap();

        let coll = db.get_collection("docs").await.unwrap();
        coll.insert_one(json!({"_id": "a", "value": 1})).await.unwrap();
        assert_eq!(coll.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_collection_is_not_found() {
        let db = DocumentDb::new(Backend::in_memory(LeaseConfig::default()), "db").unwrap();
        let coll = db.collection("missing").unwrap();
        let err = coll.insert_many([json!({"name": "foo"})]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = coll.find_all().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn unchecked_handle_still_validates_its_name() {
        let db = DocumentDb::new(Backend::in_memory(LeaseConfig::default()), "db").unwrap();
        for bad in ["a/b", "", "../up"] {
            let err = db.collection(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidName, "{bad:?}");
        }
    }

    #[tokio::test]
    async fn non_object_documents_are_type_errors() {
        let db = DocumentDb::new(Backend::in_memory(LeaseConfig::default()), "db").unwrap();
        let coll = db.get_collection("docs").await.unwrap();
        let err = coll.insert_one(json!(["not", "a", "document"])).await.unwrap_err();
        assert!(matches!(err, SdkError::Core(CoreError::Type(_))));
    }

    #[tokio::test]
    async fn empty_insert_is_a_no_op() {
        let db = DocumentDb::new(Backend::in_memory(LeaseConfig::default()), "db").unwrap();
        let coll = db.collection("never-created").unwrap();
        let inserted = coll.insert_many(Vec::<Value>::new()).await.unwrap();
        assert!(inserted.is_empty());
    }

    #[tokio::test]
    async fn admin_clears_orphaned_operations() {
        let db = DocumentDb::new(Backend::in_memory(LeaseConfig::default()), "db").unwrap();
        db.get_collection("docs").await.unwrap();
        db.coordinator()
            .registry()
            .update_locked(|meta| {
                meta.operations.insert("orphan".into());
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(db.pending_operations().await.unwrap().len(), 1);
        let cleared = db.clear_pending_operations().await.unwrap();
        assert_eq!(cleared, BTreeSet::from(["orphan".to_string()]));
        assert!(db.pending_operations().await.unwrap().is_empty());
    }
}
