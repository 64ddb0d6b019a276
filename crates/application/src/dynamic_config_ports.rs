use async_trait::async_trait;
use rolegate_core::AppResult;
use rolegate_domain::DynamicConfigDocument;

/// One stored version of the dynamic configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDynamicConfig {
    /// `master` for the current version, a timestamp id for archived ones.
    pub id: String,
    /// Configuration document.
    pub document: DynamicConfigDocument,
    /// Checksum of the canonical document.
    pub checksum: String,
    /// Author of the version.
    pub updated_by: String,
    /// Epoch seconds of the write.
    pub updated_at: i64,
}

/// Durable storage of the dynamic configuration and its history.
#[async_trait]
pub trait DynamicConfigRepository: Send + Sync {
    /// Loads one version by id.
    async fn find_version(&self, id: &str) -> AppResult<Option<StoredDynamicConfig>>;

    /// Stores an archived version; fails with `AppError::Conflict` if the id is taken.
    async fn insert_archive(&self, version: StoredDynamicConfig) -> AppResult<()>;

    /// Replaces the master version when its stored checksum still equals
    /// `expected_checksum` (`None` means no master exists yet).
    ///
    /// Returns `false` when another writer got there first.
    async fn compare_and_swap_master(
        &self,
        expected_checksum: Option<&str>,
        version: StoredDynamicConfig,
    ) -> AppResult<bool>;

    /// Lists archived version ids, newest first.
    async fn list_archive_ids(&self, limit: usize) -> AppResult<Vec<String>>;
}

/// Fast-tier copy of the current configuration.
#[async_trait]
pub trait DynamicConfigCache: Send + Sync {
    /// Returns the cached current version.
    async fn get_current(&self) -> AppResult<Option<StoredDynamicConfig>>;

    /// Replaces the cached current version.
    async fn put_current(&self, version: &StoredDynamicConfig) -> AppResult<()>;
}
