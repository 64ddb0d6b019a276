use std::sync::Arc;

use rolegate_core::{AppError, AppResult, Clock, NonEmptyString};
use rolegate_domain::{DYNAMIC_CONFIG_MASTER_ID, DynamicConfigDocument};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dynamic_config_ports::{
    DynamicConfigCache, DynamicConfigRepository, StoredDynamicConfig,
};
use crate::run_periodic;

mod history;

/// Current configuration as seen by config-dependent components.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSnapshot {
    /// Configuration document; empty until a version has been stored.
    pub document: DynamicConfigDocument,
    /// Checksum of the stored version, `None` when nothing is stored yet.
    pub checksum: Option<String>,
    /// Author of the stored version.
    pub updated_by: Option<String>,
    /// Epoch seconds of the stored version.
    pub updated_at: Option<i64>,
}

impl From<StoredDynamicConfig> for ConfigSnapshot {
    fn from(value: StoredDynamicConfig) -> Self {
        Self {
            document: value.document,
            checksum: Some(value.checksum),
            updated_by: Some(value.updated_by),
            updated_at: Some(value.updated_at),
        }
    }
}

/// Read handle on the propagated configuration.
///
/// Values lag the store by at most one poll interval.
#[derive(Clone)]
pub struct DynamicConfigHandle {
    receiver: watch::Receiver<ConfigSnapshot>,
}

impl DynamicConfigHandle {
    /// Returns the latest propagated snapshot.
    #[must_use]
    pub fn current(&self) -> ConfigSnapshot {
        self.receiver.borrow().clone()
    }

    /// Waits until a newer snapshot is propagated.
    pub async fn changed(&mut self) -> AppResult<()> {
        self.receiver.changed().await.map_err(|error| {
            AppError::Internal(format!("dynamic configuration publisher dropped: {error}"))
        })
    }
}

/// Versioned, checksum-guarded store of the dynamic configuration.
#[derive(Clone)]
pub struct DynamicConfigService {
    repository: Arc<dyn DynamicConfigRepository>,
    cache: Arc<dyn DynamicConfigCache>,
    clock: Arc<dyn Clock>,
    publisher: Arc<watch::Sender<ConfigSnapshot>>,
}

impl DynamicConfigService {
    /// Creates the service with an empty propagated snapshot.
    #[must_use]
    pub fn new(
        repository: Arc<dyn DynamicConfigRepository>,
        cache: Arc<dyn DynamicConfigCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (publisher, _) = watch::channel(ConfigSnapshot::default());
        Self {
            repository,
            cache,
            clock,
            publisher: Arc::new(publisher),
        }
    }

    /// Returns a handle on the propagated configuration.
    #[must_use]
    pub fn handle(&self) -> DynamicConfigHandle {
        DynamicConfigHandle {
            receiver: self.publisher.subscribe(),
        }
    }

    /// Reads the current version from the durable tier.
    ///
    /// This is the force-read path; it also propagates the value it saw.
    pub async fn read(&self) -> AppResult<ConfigSnapshot> {
        let snapshot = self
            .repository
            .find_version(DYNAMIC_CONFIG_MASTER_ID)
            .await?
            .map(ConfigSnapshot::from)
            .unwrap_or_default();

        self.publish(&snapshot);
        Ok(snapshot)
    }

    /// Replaces the configuration when `expected_checksum` matches the stored version.
    ///
    /// `expected_checksum` is `None` only for the very first write. The
    /// previous version is archived before the new one is committed.
    pub async fn write(
        &self,
        document: DynamicConfigDocument,
        expected_checksum: Option<&str>,
        author: &str,
    ) -> AppResult<ConfigSnapshot> {
        let author = NonEmptyString::new(author)?;
        let current = self
            .repository
            .find_version(DYNAMIC_CONFIG_MASTER_ID)
            .await?;
        let current_checksum = current.as_ref().map(|version| version.checksum.as_str());

        if current_checksum != expected_checksum {
            return Err(AppError::Conflict(format!(
                "dynamic configuration '{DYNAMIC_CONFIG_MASTER_ID}' was modified concurrently: expected checksum '{}', stored checksum '{}'",
                expected_checksum.unwrap_or("<none>"),
                current_checksum.unwrap_or("<none>")
            )));
        }

        if let Some(current) = current.as_ref()
            && current.document == document
        {
            return Err(AppError::Conflict(format!(
                "dynamic configuration is unchanged from checksum '{}'",
                current.checksum
            )));
        }

        let now = self.clock.now();
        if let Some(current) = current.clone() {
            let archive_id = now.timestamp_micros().to_string();
            self.repository
                .insert_archive(StoredDynamicConfig {
                    id: archive_id.clone(),
                    ..current
                })
                .await?;
            info!(archive_id = %archive_id, "archived previous dynamic configuration");
        }

        let version = StoredDynamicConfig {
            id: DYNAMIC_CONFIG_MASTER_ID.to_owned(),
            checksum: document.checksum()?,
            document,
            updated_by: author.into(),
            updated_at: now.timestamp(),
        };

        let swapped = self
            .repository
            .compare_and_swap_master(expected_checksum, version.clone())
            .await?;
        if !swapped {
            return Err(AppError::Conflict(format!(
                "dynamic configuration '{DYNAMIC_CONFIG_MASTER_ID}' was modified concurrently"
            )));
        }

        info!(
            checksum = %version.checksum,
            updated_by = %version.updated_by,
            "dynamic configuration updated"
        );

        self.write_cache(&version).await;
        let snapshot = ConfigSnapshot::from(version);
        self.publish(&snapshot);
        Ok(snapshot)
    }

    /// Re-reads the durable tier and propagates a changed version to every tier.
    ///
    /// Returns whether the checksum changed.
    pub async fn refresh(&self) -> AppResult<bool> {
        let Some(version) = self
            .repository
            .find_version(DYNAMIC_CONFIG_MASTER_ID)
            .await?
        else {
            return Ok(false);
        };

        let known = self.publisher.borrow().checksum.clone();
        if known.as_deref() == Some(version.checksum.as_str()) {
            return Ok(false);
        }

        info!(
            checksum = %version.checksum,
            previous_checksum = known.as_deref().unwrap_or("<none>"),
            "dynamic configuration change detected"
        );
        self.write_cache(&version).await;
        self.publish(&ConfigSnapshot::from(version));
        Ok(true)
    }

    /// Seeds the propagated snapshot from the fast tier.
    ///
    /// Used at start-up before the first poll; fast-tier failures are ignored.
    pub async fn load_cached(&self) -> bool {
        match self.cache.get_current().await {
            Ok(Some(version)) => {
                self.publish(&ConfigSnapshot::from(version));
                true
            }
            Ok(None) => false,
            Err(error) => {
                warn!(error = %error, cache_tier = "fast", "failed to read cached dynamic configuration");
                false
            }
        }
    }

    /// Polls the durable tier every `interval` until `shutdown` fires.
    pub async fn run_poller(&self, interval: std::time::Duration, shutdown: CancellationToken) {
        run_periodic("dynamic config poller", interval, shutdown, move || async move {
            self.refresh().await.map(|_| ())
        })
        .await;
    }

    async fn write_cache(&self, version: &StoredDynamicConfig) {
        if let Err(error) = self.cache.put_current(version).await {
            warn!(error = %error, cache_tier = "fast", "failed to write cached dynamic configuration");
        }
    }

    fn publish(&self, snapshot: &ConfigSnapshot) {
        self.publisher.send_if_modified(|current| {
            if current.checksum == snapshot.checksum {
                return false;
            }
            *current = snapshot.clone();
            true
        });
    }
}
