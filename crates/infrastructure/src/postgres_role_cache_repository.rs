use async_trait::async_trait;
use rolegate_application::{DurableRoleRecord, DurableRoleRepository};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::RoleKey;
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed durable role tier.
#[derive(Clone)]
pub struct PostgresRoleCacheRepository {
    pool: PgPool,
}

impl PostgresRoleCacheRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleCacheRow {
    arn: String,
    account_id: String,
    policy: String,
    templated: Option<String>,
    ttl: i64,
}

impl From<RoleCacheRow> for DurableRoleRecord {
    fn from(row: RoleCacheRow) -> Self {
        Self {
            arn: row.arn,
            account_id: row.account_id,
            policy: row.policy,
            templated: row.templated,
            ttl: row.ttl,
        }
    }
}

#[async_trait]
impl DurableRoleRepository for PostgresRoleCacheRepository {
    async fn find_role(&self, key: &RoleKey) -> AppResult<Option<DurableRoleRecord>> {
        let row = sqlx::query_as::<_, RoleCacheRow>(
            r#"
            SELECT arn, account_id, policy, templated, ttl
            FROM role_cache
            WHERE arn = $1 AND account_id = $2
            "#,
        )
        .bind(key.arn())
        .bind(key.account_id())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load cached role '{}': {error}",
                key.arn()
            ))
        })?;

        Ok(row.map(DurableRoleRecord::from))
    }

    async fn save_role(&self, record: DurableRoleRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO role_cache (arn, account_id, policy, templated, ttl)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (arn, account_id)
            DO UPDATE SET
                policy = EXCLUDED.policy,
                templated = EXCLUDED.templated,
                ttl = EXCLUDED.ttl
            "#,
        )
        .bind(record.arn.as_str())
        .bind(record.account_id.as_str())
        .bind(record.policy.as_str())
        .bind(record.templated.as_deref())
        .bind(record.ttl)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to save cached role '{}': {error}",
                record.arn
            ))
        })?;

        Ok(())
    }

    async fn delete_expired(&self, now: i64) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM role_cache
            WHERE ttl <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to purge expired cached roles: {error}"))
        })?;

        Ok(result.rows_affected())
    }
}
