//! Table database façade.
//!
//! Tables carry a declared column mapping. Every inserted row is converted to
//! a mapping, checked against the bound model (if any), then normalized to
//! exactly the declared columns. A row's object is named after its `id`
//! column when that is non-null.

use std::collections::BTreeSet;

use fakedb_core::{
    infer_schema, normalize, Backend, BarrierPolicy, CoreError, FieldMapping, ModelBinding,
    NamespaceCoordinator, NamespaceDescriptor, Record, RecordInput, RecordModel, Registration,
};
use fakedb_sql::{Projection, Select, Statement};
use serde::Serialize;
use tracing::{debug, info};

use crate::bindings::Bindings;
use crate::error::SdkResult;

/// Column used as a row's identity.
pub const ID_COLUMN: &str = "id";

/// Result of [`TableDb::execute`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlOutcome {
    /// Number of rows written by an `INSERT`.
    Inserted(usize),
    /// Rows returned by a `SELECT`.
    Rows(Vec<Record>),
}

/// A table database stored under one directory of a backend.
#[derive(Clone, Debug)]
pub struct TableDb {
    coordinator: NamespaceCoordinator,
    bindings: Bindings,
}

impl TableDb {
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

    // ---- Schema ----

    /// Create table `name` with the given columns.
    pub async fn create_table(&self, name: &str, columns: FieldMapping) -> SdkResult<()> {
        if columns.is_empty() {
            return Err(
                CoreError::Validation(format!("table {name} needs at least one column")).into(),
            );
        }
        self.register(name, NamespaceDescriptor::table(columns)).await
    }

    /// Create table `name` with the columns of model `T`, and bind `T` to it.
    pub async fn create_table_from_model<T: RecordModel>(&self, name: &str) -> SdkResult<()> {
        let binding = ModelBinding::of::<T>()?;
        let descriptor = NamespaceDescriptor::Table {
            columns: binding.fields().clone(),
            model: Some(binding.name().to_string()),
        };
        self.register(name, descriptor).await?;
        self.bindings.bind(name, binding).await;
        Ok(())
    }

    async fn register(&self, name: &str, descriptor: NamespaceDescriptor) -> SdkResult<()> {
        match self.coordinator.register_namespace(name, descriptor).await? {
            Registration::Created => {
                info!(db = %self.db_name(), table = name, "table created");
                Ok(())
            }
            Registration::Existing(existing) => Err(CoreError::AlreadyExists(format!(
                "{}/{name} ({})",
                self.db_name(),
                existing.kind_name()
            ))
            .into()),
        }
    }

    /// Bind model `T` to an existing table, replacing its declared columns
    /// with the model's.
    pub async fn bind_table_model<T: RecordModel>(&self, name: &str) -> SdkResult<()> {
        let binding = ModelBinding::of::<T>()?;
        let columns = binding.fields().clone();
        let model = binding.name().to_string();
        self.coordinator
            .update_namespace(name, |current| match current {
                NamespaceDescriptor::Table { .. } => Ok(NamespaceDescriptor::Table {
                    columns,
                    model: Some(model),
                }),
                other => Err(CoreError::Type(format!(
                    "{name} is a {}, not a table",
                    other.kind_name()
                ))),
            })
            .await?;
        self.bindings.bind(name, binding).await;
        debug!(db = %self.db_name(), table = name, model = T::model_name(), "table model bound");
        Ok(())
    }

    /// Names of all tables.
    pub async fn table_names(&self) -> SdkResult<Vec<String>> {
        Ok(self
            .coordinator
            .namespaces()
            .await?
            .into_iter()
            .filter(|(_, d)| d.is_table())
            .map(|(name, _)| name)
            .collect())
    }

    /// Declared columns of table `name`, freshly read so a rebind made
    /// through another handle is seen.
    pub async fn table_schema(&self, name: &str) -> SdkResult<FieldMapping> {
        let descriptor = self.coordinator.current_descriptor(name).await?;
        match descriptor.columns() {
            Some(columns) => Ok(columns.clone()),
            None => Err(CoreError::Type(format!(
                "{name} is a {}, not a table",
                descriptor.kind_name()
            ))
            .into()),
        }
    }

    // ---- Rows ----

    /// Insert rows as one batch; returns the normalized rows.
    pub async fn insert<I, R>(&self, name: &str, rows: I) -> SdkResult<Vec<Record>>
    where
        I: IntoIterator<Item = R>,
        R: Into<RecordInput>,
    {
        let mut mappings = Vec::new();
        for row in rows {
            let input: RecordInput = row.into();
            mappings.push(input.into_mapping()?);
        }
        if mappings.is_empty() {
            return Ok(mappings);
        }

        let columns = self.table_schema(name).await?;
        self.bindings.validate_all(name, &mappings).await?;
        let normalized = mappings
            .into_iter()
            .map(|row| normalize(row, &columns))
            .collect::<Result<Vec<_>, _>>()?;

        self.coordinator
            .insert_batch(name, &normalized, ID_COLUMN)
            .await?;
        Ok(normalized)
    }

    /// Rows of table `name` satisfying `filter`.
    pub async fn query<F>(&self, name: &str, filter: F) -> SdkResult<Vec<Record>>
    where
        F: Fn(&Record) -> bool + Send + Sync,
    {
        Ok(self.coordinator.scan(name, filter).await?)
    }

    /// All rows of table `name`.
    pub async fn query_all(&self, name: &str) -> SdkResult<Vec<Record>> {
        self.query(name, |_| true).await
    }

    /// Rows satisfying `filter`, converted to `T`.
    pub async fn query_as<T, F>(&self, name: &str, filter: F) -> SdkResult<Vec<T>>
    where
        T: RecordModel,
        F: Fn(&Record) -> bool + Send + Sync,
    {
        let (_, adapter) = infer_schema::<T>()?;
        self.query(name, filter)
            .await?
            .into_iter()
            .map(|row| adapter.from_record(row).map_err(Into::into))
            .collect()
    }

    // ---- SQL ----

    /// Run one `INSERT` or `SELECT` statement.
    pub async fn execute(&self, sql: &str) -> SdkResult<SqlOutcome> {
        match fakedb_sql::parse(sql)? {
            Statement::Insert(insert) => {
                let rows = insert.records();
                let written = self.insert(&insert.table, rows).await?;
                Ok(SqlOutcome::Inserted(written.len()))
            }
            Statement::Select(select) => {
                let columns = self.table_schema(&select.table).await?;
                check_columns(&select, &columns)?;
                let rows = self.query_all(&select.table).await?;
                Ok(SqlOutcome::Rows(select.apply(rows)))
            }
        }
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

/// Every column a `SELECT` names must be declared.
fn check_columns(select: &Select, columns: &FieldMapping) -> SdkResult<()> {
    let projected = match &select.projection {
        Projection::All => Vec::new(),
        Projection::Columns(names) => names.iter().collect(),
    };
    let filtered = select.conditions.iter().map(|c| &c.column);
    for column in projected.into_iter().chain(filtered) {
        if !columns.contains_key(column) {
            return Err(CoreError::Validation(format!(
                "unknown column {column} in table {}",
                select.table
            ))
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SdkError;
    use fakedb_core::{ErrorKind, LeaseConfig};
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    async fn local_db(dir: &TempDir, name: &str) -> TableDb {
        let backend = Backend::local(dir.path().join("storage"), LeaseConfig::default())
            .await
            .unwrap();
        TableDb::new(backend, name).unwrap()
    }

    fn fields(pairs: &[(&str, &str)]) -> FieldMapping {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn row(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: Option<i64>,
        name: String,
        email: Option<String>,
    }

    impl RecordModel for User {
        fn field_mapping() -> FieldMapping {
            fields(&[("id", "int"), ("name", "str"), ("email", "str")])
        }

        fn validate(&self) -> Result<(), String> {
            if self.name.is_empty() {
                return Err("name must not be empty".into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn plain_rows_are_normalized() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "plain").await;
        db.create_table("users", fields(&[("id", "int"), ("name", "str"), ("age", "int")]))
            .await
            .unwrap();

        let written = db
            .insert("users", [row(json!({"id": 1, "name": "Alice"}))])
            .await
            .unwrap();
        assert_eq!(written[0]["age"], json!(null));

        let rows = db.query_all("users").await.unwrap();
        assert_eq!(rows, vec![row(json!({"id": 1, "name": "Alice", "age": null}))]);
        assert_eq!(db.table_names().await.unwrap(), vec!["users".to_string()]);
    }

    #[tokio::test]
    async fn model_round_trip() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "models").await;
        db.create_table_from_model::<User>("users").await.unwrap();
        assert_eq!(
            db.table_schema("users").await.unwrap(),
            fields(&[("id", "int"), ("name", "str"), ("email", "str")])
        );

        let user = User {
            id: Some(7),
            name: "Grace".into(),
            email: None,
        };
        db.insert("users", [RecordInput::model(&user).unwrap()])
            .await
            .unwrap();
        db.insert("users", [row(json!({"name": "Ada"}))])
            .await
            .unwrap();

        let mut users: Vec<User> = db.query_as("users", |_| true).await.unwrap();
        users.sort_by_key(|u| u.id);
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, None);
        assert_eq!(users[1], user);
    }

    #[tokio::test]
    async fn bound_model_rejects_invalid_rows() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "strict").await;
        db.create_table_from_model::<User>("users").await.unwrap();

        let err = db
            .insert("users", [row(json!({"id": 1, "name": ""}))])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(db.query_all("users").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bind_after_schema_replaces_columns() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "late").await;
        db.create_table("users", fields(&[("id", "int"), ("legacy", "str")]))
            .await
            .unwrap();
        db.bind_table_model::<User>("users").await.unwrap();

        assert!(!db.table_schema("users").await.unwrap().contains_key("legacy"));
        let descriptor = db.coordinator().descriptor("users").await.unwrap();
        assert_eq!(descriptor.model(), Some("User"));

        let err = db
            .insert("users", [row(json!({"id": 1, "name": "x", "legacy": "y"}))])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn insert_sees_rebind_from_another_handle() {
        let dir = TempDir::new().unwrap();
        let backend = Backend::local(dir.path().join("storage"), LeaseConfig::default())
            .await
            .unwrap();
        let admin = TableDb::new(backend.clone(), "shared").unwrap();
        let writer = TableDb::new(backend, "shared").unwrap();

        admin
            .create_table("users", fields(&[("id", "int"), ("legacy", "str")]))
            .await
            .unwrap();
        writer
            .insert("users", [row(json!({"id": 1, "legacy": "old"}))])
            .await
            .unwrap();

        admin.bind_table_model::<User>("users").await.unwrap();

        let err = writer
            .insert("users", [row(json!({"id": 2, "legacy": "stale"}))])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let written = writer
            .insert("users", [row(json!({"id": 3, "name": "Lin"}))])
            .await
            .unwrap();
        assert_eq!(written[0], row(json!({"id": 3, "name": "Lin", "email": null})));
    }

    #[tokio::test]
    async fn unknown_column_is_rejected() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "unknown").await;
        db.create_table("t", fields(&[("id", "int")])).await.unwrap();

        let err = db
            .insert("t", [row(json!({"id": 1, "color": "red"}))])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SdkError::Core(CoreError::Validation(ref m)) if m.contains("color")
        ));
    }

    #[tokio::test]
    async fn insert_accepts_plain_structs() {
        #[derive(Serialize)]
        struct Point {
            id: i64,
            x: f64,
        }

        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "structs").await;
        db.create_table("points", fields(&[("id", "int"), ("x", "float")]))
            .await
            .unwrap();
        db.insert("points", [RecordInput::object(&Point { id: 1, x: 0.5 }).unwrap()])
            .await
            .unwrap();

        let rows = db.query("points", |r| r["x"] == json!(0.5)).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn non_object_rows_are_type_errors() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "types").await;
        db.create_table("t", fields(&[("id", "int")])).await.unwrap();

        let err = db.insert("t", [json!([1, 2, 3])]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[tokio::test]
    async fn binding_missing_table_is_not_found() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "missing").await;
        let err = db.bind_table_model::<User>("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn collections_are_not_tables() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "mixed").await;
        db.coordinator()
            .register_namespace("docs", NamespaceDescriptor::collection())
            .await
            .unwrap();

        assert_eq!(
            db.bind_table_model::<User>("docs").await.unwrap_err().kind(),
            ErrorKind::Type
        );
        assert_eq!(db.table_schema("docs").await.unwrap_err().kind(), ErrorKind::Type);
        assert!(db.table_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_twice_and_empty_columns() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "dupes").await;
        db.create_table("t", fields(&[("id", "int")])).await.unwrap();

        let err = db.create_table("t", fields(&[("id", "int")])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = db.create_table("u", FieldMapping::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn execute_insert_and_select() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "sql").await;
        db.create_table("users", fields(&[("id", "int"), ("name", "str"), ("age", "int")]))
            .await
            .unwrap();

        let outcome = db
            .execute(
                "INSERT INTO users (id, name, age) VALUES (1, 'Alice', 30), (2, 'Bob', 25), (3, 'Cleo', NULL)",
            )
            .await
            .unwrap();
        assert_eq!(outcome, SqlOutcome::Inserted(3));

        let SqlOutcome::Rows(rows) = db
            .execute("SELECT name FROM users WHERE age >= 25 AND age < 30")
            .await
            .unwrap()
        else {
            panic!("expected rows");
        };
        assert_eq!(rows, vec![row(json!({"name": "Bob"}))]);

        let SqlOutcome::Rows(rows) = db
            .execute("SELECT * FROM users WHERE age IS NULL")
            .await
            .unwrap()
        else {
            panic!("expected rows");
        };
        assert_eq!(rows, vec![row(json!({"id": 3, "name": "Cleo", "age": null}))]);

        let SqlOutcome::Rows(rows) = db.execute("SELECT id FROM users LIMIT 2").await.unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn execute_reports_errors() {
        let dir = TempDir::new().unwrap();
        let db = local_db(&dir, "sqlerr").await;
        db.create_table("users", fields(&[("id", "int")])).await.unwrap();

        let err = db.execute("DELETE FROM users").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        let err = db.execute("SELECT nope FROM users").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = db.execute("SELECT * FROM users WHERE nope = 1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = db.execute("SELECT * FROM ghosts").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = db
            .execute("INSERT INTO users (id, extra) VALUES (1, 2)")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn outcome_serializes_for_json_output() {
        let outcome = SqlOutcome::Inserted(2);
        assert_eq!(serde_json::to_value(&outcome).unwrap(), json!({"inserted": 2}));
    }
}
