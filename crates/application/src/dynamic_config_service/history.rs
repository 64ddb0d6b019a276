use super::*;

impl DynamicConfigService {
    /// Returns one archived version by its timestamp id.
    pub async fn read_archived(&self, archive_id: &str) -> AppResult<StoredDynamicConfig> {
        if archive_id == DYNAMIC_CONFIG_MASTER_ID {
            return Err(AppError::Validation(format!(
                "'{DYNAMIC_CONFIG_MASTER_ID}' is not an archived version id"
            )));
        }

        self.repository
            .find_version(archive_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "archived dynamic configuration '{archive_id}' does not exist"
                ))
            })
    }

    /// Lists archived version ids, newest first.
    pub async fn list_archive_ids(&self, limit: usize) -> AppResult<Vec<String>> {
        if limit == 0 {
            return Err(AppError::Validation(
                "archive listing limit must be positive".to_owned(),
            ));
        }

        self.repository.list_archive_ids(limit.min(500)).await
    }
}
