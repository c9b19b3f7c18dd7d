use std::path::{Path, PathBuf};

use fakedb_core::BarrierPolicy;
use fakedb_store::{Backend, LeaseConfig};
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Where objects live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// A directory on the local filesystem.
    Local { root: PathBuf },
    /// A Google Cloud Storage bucket (requires the `gcp` feature).
    Gcs { bucket: String },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Local {
            root: PathBuf::from("./fakedb-data"),
        }
    }
}

/// Top-level configuration, normally read from `fakedb.toml`.
///
/// ```toml
/// [storage]
/// backend = "local"
/// root = "./data"
///
/// [lease]
/// ttl_ms = 30000
/// retry_interval_ms = 50
///
/// [barrier]
/// poll_interval_ms = 50
/// max_wait_ms = 10000
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FakeDbConfig {
    pub storage: StorageConfig,
    pub lease: LeaseConfig,
    pub barrier: BarrierPolicy,
}

impl FakeDbConfig {
    /// Configuration for a local root with default lease and barrier settings.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig::Local { root: root.into() },
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SdkError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> SdkResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| SdkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// Reject settings that would make leases or the barrier spin.
    pub fn validate(&self) -> SdkResult<()> {
        if self.lease.ttl_ms == 0 {
            return Err(SdkError::Config("lease.ttl_ms must be positive".into()));
        }
        if self.lease.retry_interval_ms == 0 {
            return Err(SdkError::Config(
                "lease.retry_interval_ms must be positive".into(),
            ));
        }
        if self.barrier.poll_interval_ms == 0 {
            return Err(SdkError::Config(
                "barrier.poll_interval_ms must be positive".into(),
            ));
        }
        if self.lease.lease_dir.is_empty() {
            return Err(SdkError::Config("lease.lease_dir must not be empty".into()));
        }
        Ok(())
    }

    /// Build the configured backend.
    pub async fn open_backend(&self) -> SdkResult<Backend> {
        match &self.storage {
            StorageConfig::Local { root } => Ok(Backend::local(root, self.lease.clone()).await?),
            StorageConfig::Gcs { bucket } => self.open_gcs(bucket),
        }
    }

    #[cfg(feature = "gcp")]
    fn open_gcs(&self, bucket: &str) -> SdkResult<Backend> {
        Ok(Backend::gcs(bucket, self.lease.clone())?)
    }

    #[cfg(not(feature = "gcp"))]
    fn open_gcs(&self, bucket: &str) -> SdkResult<Backend> {
        Err(SdkError::Config(format!(
            "bucket {bucket}: built without the `gcp` feature"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakedb_store::ObjectStore;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = FakeDbConfig::default();
        assert_eq!(config.lease.ttl_ms, 30_000);
        assert_eq!(config.lease.lease_dir, "__LEASES__");
        assert_eq!(config.barrier.poll_interval_ms, 50);
        assert!(config.barrier.max_wait_ms.is_none());
        assert!(matches!(config.storage, StorageConfig::Local { .. }));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = FakeDbConfig::from_toml_str(
            r#"
            [storage]
            backend = "gcs"
            bucket = "dev-bucket"

            [barrier]
            max_wait_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::Gcs {
                bucket: "dev-bucket".into()
            }
        );
        assert_eq!(config.barrier.max_wait_ms, Some(5000));
        assert_eq!(config.barrier.poll_interval_ms, 50);
        assert_eq!(config.lease, LeaseConfig::default());
    }

    #[test]
    fn toml_round_trip() {
        let config = FakeDbConfig::local("/tmp/data");
        let text = config.to_toml_string().unwrap();
        assert_eq!(FakeDbConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn rejects_zero_intervals() {
        let err = FakeDbConfig::from_toml_str("[lease]\nretry_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
        assert!(FakeDbConfig::from_toml_str("not = [valid").is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = FakeDbConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, SdkError::Config(ref m) if m.contains("here.toml")));
    }

    #[tokio::test]
    async fn opens_local_backend() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fakedb.toml");
        let root = dir.path().join("data");
        std::fs::write(
            &path,
            format!("[storage]\nbackend = \"local\"\nroot = {:?}\n", root.display().to_string()),
        )
        .unwrap();

        let backend = FakeDbConfig::load(&path).unwrap().open_backend().await.unwrap();
        assert_eq!(backend.store().backend_name(), "local");
        assert!(root.is_dir());
    }

    #[cfg(not(feature = "gcp"))]
    #[tokio::test]
    async fn gcs_needs_feature() {
        let config = FakeDbConfig {
            storage: StorageConfig::Gcs {
                bucket: "b".into(),
            },
            ..FakeDbConfig::default()
        };
        assert!(matches!(
            config.open_backend().await.unwrap_err(),
            SdkError::Config(_)
        ));
    }
}
