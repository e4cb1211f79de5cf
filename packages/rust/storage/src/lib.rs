//! Persistence backends for built collections.
//!
//! The writer hands every finished [`Collection`] to each configured
//! [`Storage`] concurrently. Storages are constructed by name through a
//! [`StorageRegistry`] supplied by the host; the built-in `disk` storage
//! writes the collection's resolved file atomically.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use bundlekit_shared::{BundleError, Collection, EngineEnv, Result};

/// A destination for built collections.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Registry name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Persist one collection. `collection.file` is already resolved.
    async fn persist(&self, env: &EngineEnv, collection: &Collection) -> Result<()>;
}

/// Constructs a storage instance.
pub type StorageFactory = Arc<dyn Fn() -> Arc<dyn Storage> + Send + Sync>;

/// Name → storage factory.
#[derive(Clone)]
pub struct StorageRegistry {
    factories: BTreeMap<String, StorageFactory>,
}

impl StorageRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding the built-in storages (`disk`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(DiskStorage::NAME, Arc::new(|| Arc::new(DiskStorage)));
        registry
    }

    /// Register (or replace) a factory under `name`.
    pub fn register(&mut self, name: impl Into<String>, factory: StorageFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Build the named storages, in the order given.
    pub fn create(&self, names: &[String]) -> Result<Vec<Arc<dyn Storage>>> {
        names
            .iter()
            .map(|name| {
                self.factories
                    .get(name)
                    .map(|factory| factory())
                    .ok_or_else(|| {
                        BundleError::plugin(format!(
                            "unknown storage `{name}` (available: {})",
                            self.names().join(", ")
                        ))
                    })
            })
            .collect()
    }

    /// Registered storage names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// Writes each collection to its resolved `file` on the local disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskStorage;

impl DiskStorage {
    pub const NAME: &'static str = "disk";
}

#[async_trait]
impl Storage for DiskStorage {
    fn name(&self) -> &str {
        Self::NAME
    }

    #[instrument(skip_all, fields(storage = Self::NAME))]
    async fn persist(&self, env: &EngineEnv, collection: &Collection) -> Result<()> {
        let file = collection
            .file
            .as_ref()
            .ok_or_else(|| BundleError::write("collection has no resolved file"))?;
        let target = if file.is_absolute() {
            file.clone()
        } else {
            env.cwd.join(file)
        };

        write_atomic(&target, &collection.content).await?;
        debug!(file = %target.display(), bytes = collection.content.len(), "collection written");
        Ok(())
    }
}

/// Write `content` to a temp sibling of `target`, then rename it into place.
async fn write_atomic(target: &Path, content: &str) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| BundleError::write(format!("{} has no parent", target.display())))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| BundleError::io(parent, e))?;

    let filename = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{filename}.tmp"));

    tokio::fs::write(&temp, content)
        .await
        .map_err(|e| BundleError::io(&temp, e))?;
    tokio::fs::rename(&temp, target)
        .await
        .map_err(|e| BundleError::io(target, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "bundlekit-storage-test-{}",
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn collection(file: Option<PathBuf>) -> Collection {
        Collection {
            file,
            ..Collection::new("body { }", "css", "default", "dev")
        }
    }

    #[tokio::test]
    async fn disk_storage_creates_parents_and_writes() {
        let tmp = temp_dir();
        let target = tmp.join("dist/nested/app.css");
        let env = EngineEnv::new(&tmp);

        DiskStorage
            .persist(&env, &collection(Some(target.clone())))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "body { }");
        assert!(!tmp.join("dist/nested/.app.css.tmp").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn relative_files_resolve_against_cwd() {
        let tmp = temp_dir();
        let env = EngineEnv::new(&tmp);

        DiskStorage
            .persist(&env, &collection(Some(PathBuf::from("out/app.css"))))
            .await
            .unwrap();

        assert!(tmp.join("out/app.css").is_file());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn untagged_collection_is_rejected() {
        let env = EngineEnv::new(std::env::temp_dir());
        let err = DiskStorage.persist(&env, &collection(None)).await.unwrap_err();
        assert!(matches!(err, BundleError::Write { .. }));
    }

    #[test]
    fn registry_builds_known_storages() {
        let registry = StorageRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["disk"]);

        let storages = registry.create(&["disk".to_string()]).unwrap();
        assert_eq!(storages.len(), 1);
        assert_eq!(storages[0].name(), "disk");
    }

    #[test]
    fn registry_rejects_unknown_storage() {
        let registry = StorageRegistry::with_builtins();
        let err = registry.create(&["s3".to_string()]).err().unwrap();
        assert!(err.to_string().contains("unknown storage `s3`"));
        assert!(err.to_string().contains("disk"));
    }
}
