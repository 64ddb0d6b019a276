use std::io::{Read, Write};

use async_trait::async_trait;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use rolegate_application::{DynamicConfigRepository, StoredDynamicConfig};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::{DYNAMIC_CONFIG_MASTER_ID, DynamicConfigDocument};
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed dynamic configuration table.
///
/// Documents are stored zlib-compressed. The row with id `master` holds the
/// current version; every other row is an archived version.
#[derive(Clone)]
pub struct PostgresDynamicConfigRepository {
    pool: PgPool,
}

impl PostgresDynamicConfigRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct DynamicConfigRow {
    id: String,
    config: Vec<u8>,
    checksum: String,
    updated_by: String,
    updated_at: i64,
}

impl TryFrom<DynamicConfigRow> for StoredDynamicConfig {
    type Error = AppError;

    fn try_from(row: DynamicConfigRow) -> Result<Self, Self::Error> {
        let document = decompress_document(row.config.as_slice()).map_err(|error| {
            AppError::Internal(format!(
                "stored dynamic configuration '{}' is unreadable: {error}",
                row.id
            ))
        })?;

        Ok(Self {
            id: row.id,
            document,
            checksum: row.checksum,
            updated_by: row.updated_by,
            updated_at: row.updated_at,
        })
    }
}

fn compress_document(document: &DynamicConfigDocument) -> AppResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(document.canonical_bytes()?.as_slice())
        .and_then(|()| encoder.finish())
        .map_err(|error| {
            AppError::Internal(format!("failed to compress dynamic configuration: {error}"))
        })
}

fn decompress_document(bytes: &[u8]) -> AppResult<DynamicConfigDocument> {
    let mut text = String::new();
    ZlibDecoder::new(bytes)
        .read_to_string(&mut text)
        .map_err(|error| {
            AppError::Internal(format!("failed to decompress dynamic configuration: {error}"))
        })?;
    DynamicConfigDocument::parse(text.as_str())
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(database_error)
        if database_error.code().as_deref() == Some("23505"))
}

#[async_trait]
impl DynamicConfigRepository for PostgresDynamicConfigRepository {
    async fn find_version(&self, id: &str) -> AppResult<Option<StoredDynamicConfig>> {
        let row = sqlx::query_as::<_, DynamicConfigRow>(
            r#"
            SELECT id, config, checksum, updated_by, updated_at
            FROM dynamic_config
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load dynamic configuration '{id}': {error}"
            ))
        })?;

        row.map(StoredDynamicConfig::try_from).transpose()
    }

    async fn insert_archive(&self, version: StoredDynamicConfig) -> AppResult<()> {
        if version.id == DYNAMIC_CONFIG_MASTER_ID {
            return Err(AppError::Validation(
                "the master version cannot be archived under its own id".to_owned(),
            ));
        }

        let config = compress_document(&version.document)?;
        let result = sqlx::query(
            r#"
            INSERT INTO dynamic_config (id, config, checksum, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(version.id.as_str())
        .bind(config)
        .bind(version.checksum.as_str())
        .bind(version.updated_by.as_str())
        .bind(version.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(AppError::Conflict(format!(
                "archived dynamic configuration '{}' already exists",
                version.id
            ))),
            Err(error) => Err(AppError::Internal(format!(
                "failed to archive dynamic configuration '{}': {error}",
                version.id
            ))),
        }
    }

    async fn compare_and_swap_master(
        &self,
        expected_checksum: Option<&str>,
        version: StoredDynamicConfig,
    ) -> AppResult<bool> {
        let config = compress_document(&version.document)?;

        let result = match expected_checksum {
            Some(expected_checksum) => {
                sqlx::query(
                    r#"
                    UPDATE dynamic_config
                    SET config = $2, checksum = $3, updated_by = $4, updated_at = $5
                    WHERE id = $1 AND checksum = $6
                    "#,
                )
                .bind(DYNAMIC_CONFIG_MASTER_ID)
                .bind(config)
                .bind(version.checksum.as_str())
                .bind(version.updated_by.as_str())
                .bind(version.updated_at)
                .bind(expected_checksum)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO dynamic_config (id, config, checksum, updated_by, updated_at)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (id) DO NOTHING
                    "#,
                )
                .bind(DYNAMIC_CONFIG_MASTER_ID)
                .bind(config)
                .bind(version.checksum.as_str())
                .bind(version.updated_by.as_str())
                .bind(version.updated_at)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to write dynamic configuration master: {error}"
            ))
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_archive_ids(&self, limit: usize) -> AppResult<Vec<String>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT id
            FROM dynamic_config
            WHERE id <> $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(DYNAMIC_CONFIG_MASTER_ID)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list archived dynamic configurations: {error}"
            ))
        })
    }
}

#[cfg(test)]
mod tests;
