use std::collections::BTreeMap;

use async_trait::async_trait;
use rolegate_application::{DynamicConfigCache, DynamicConfigRepository, StoredDynamicConfig};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::DYNAMIC_CONFIG_MASTER_ID;
use tokio::sync::RwLock;

/// In-memory dynamic configuration table.
#[derive(Default)]
pub struct InMemoryDynamicConfigRepository {
    versions: RwLock<BTreeMap<String, StoredDynamicConfig>>,
}

impl InMemoryDynamicConfigRepository {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DynamicConfigRepository for InMemoryDynamicConfigRepository {
    async fn find_version(&self, id: &str) -> AppResult<Option<StoredDynamicConfig>> {
        Ok(self.versions.read().await.get(id).cloned())
    }

    async fn insert_archive(&self, version: StoredDynamicConfig) -> AppResult<()> {
        let mut versions = self.versions.write().await;
        if versions.contains_key(version.id.as_str()) {
            return Err(AppError::Conflict(format!(
                "archived dynamic configuration '{}' already exists",
                version.id
            )));
        }
        versions.insert(version.id.clone(), version);
        Ok(())
    }

    async fn compare_and_swap_master(
        &self,
        expected_checksum: Option<&str>,
        version: StoredDynamicConfig,
    ) -> AppResult<bool> {
        let mut versions = self.versions.write().await;
        let stored = versions
            .get(DYNAMIC_CONFIG_MASTER_ID)
            .map(|master| master.checksum.as_str());
        if stored != expected_checksum {
            return Ok(false);
        }

        versions.insert(DYNAMIC_CONFIG_MASTER_ID.to_owned(), version);
        Ok(true)
    }

    async fn list_archive_ids(&self, limit: usize) -> AppResult<Vec<String>> {
        Ok(self
            .versions
            .read()
            .await
            .keys()
            .filter(|id| id.as_str() != DYNAMIC_CONFIG_MASTER_ID)
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

/// In-memory fast tier for the dynamic configuration.
#[derive(Default)]
pub struct InMemoryDynamicConfigCache {
    current: RwLock<Option<StoredDynamicConfig>>,
}

impl InMemoryDynamicConfigCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DynamicConfigCache for InMemoryDynamicConfigCache {
    async fn get_current(&self) -> AppResult<Option<StoredDynamicConfig>> {
        Ok(self.current.read().await.clone())
    }

    async fn put_current(&self, version: &StoredDynamicConfig) -> AppResult<()> {
        *self.current.write().await = Some(version.clone());
        Ok(())
    }
}
