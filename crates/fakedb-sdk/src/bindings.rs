//! Model bindings held by a database handle.
//!
//! The registry only records a bound model's name; the Rust type behind it
//! lives here, so a binding applies to inserts made through this handle (and
//! its clones) only.

use std::collections::HashMap;
use std::sync::Arc;

use fakedb_core::{CoreResult, ModelBinding, Record};
use tokio::sync::RwLock;

#[derive(Clone, Debug, Default)]
pub(crate) struct Bindings {
    inner: Arc<RwLock<HashMap<String, ModelBinding>>>,
}

impl Bindings {
    pub(crate) async fn bind(&self, namespace: &str, binding: ModelBinding) {
        self.inner
            .write()
            .await
            .insert(namespace.to_string(), binding);
    }

    pub(crate) async fn get(&self, namespace: &str) -> Option<ModelBinding> {
        self.inner.read().await.get(namespace).cloned()
    }

    /// Validate every record against the namespace's binding, if it has one.
    pub(crate) async fn validate_all(&self, namespace: &str, records: &[Record]) -> CoreResult<()> {
        if let Some(binding) = self.get(namespace).await {
            for record in records {
                binding.validate(record)?;
            }
        }
        Ok(())
    }
}
