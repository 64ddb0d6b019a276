use async_trait::async_trait;
use rolegate_application::{AccessRequestRepository, ExpiryCursor};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::{AccessRequest, RequestStatus, RequestTarget};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed access request repository.
///
/// A partial unique index keeps at most one pending request per requester
/// and target.
#[derive(Clone)]
pub struct PostgresAccessRequestRepository {
    pool: PgPool,
}

impl PostgresAccessRequestRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        request_id,
        requester,
        target,
        justification,
        status,
        updated_by,
        request_time,
        last_updated,
        reviewer_comments,
        expires_at,
        policy_snapshot
    FROM access_requests
"#;

#[derive(Debug, FromRow)]
struct AccessRequestRow {
    request_id: String,
    requester: String,
    target: Json<RequestTarget>,
    justification: String,
    status: String,
    updated_by: String,
    request_time: i64,
    last_updated: i64,
    reviewer_comments: Option<String>,
    expires_at: Option<i64>,
    policy_snapshot: Option<Json<Value>>,
}

impl TryFrom<AccessRequestRow> for AccessRequest {
    type Error = AppError;

    fn try_from(row: AccessRequestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            request_id: row.request_id,
            requester: row.requester,
            target: row.target.0,
            justification: row.justification,
            status: RequestStatus::parse(row.status.as_str())?,
            updated_by: row.updated_by,
            request_time: row.request_time,
            last_updated: row.last_updated,
            reviewer_comments: row.reviewer_comments,
            expires_at: row.expires_at,
            policy_snapshot: row.policy_snapshot.map(|snapshot| snapshot.0),
        })
    }
}

fn map_rows(rows: Vec<AccessRequestRow>) -> AppResult<Vec<AccessRequest>> {
    rows.into_iter().map(AccessRequest::try_from).collect()
}

fn bounded_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl AccessRequestRepository for PostgresAccessRequestRepository {
    async fn insert_request(&self, request: &AccessRequest) -> AppResult<()> {
        let target_key = request.target.target_key();
        let result = sqlx::query(
            r#"
            INSERT INTO access_requests (
                request_id,
                requester,
                target_key,
                target,
                justification,
                status,
                updated_by,
                request_time,
                last_updated,
                reviewer_comments,
                expires_at,
                policy_snapshot
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(request.request_id.as_str())
        .bind(request.requester.as_str())
        .bind(target_key.as_str())
        .bind(Json(&request.target))
        .bind(request.justification.as_str())
        .bind(request.status.as_str())
        .bind(request.updated_by.as_str())
        .bind(request.request_time)
        .bind(request.last_updated)
        .bind(request.reviewer_comments.as_deref())
        .bind(request.expires_at)
        .bind(request.policy_snapshot.as_ref().map(Json))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) => {
                if let sqlx::Error::Database(database_error) = &error
                    && database_error.code().as_deref() == Some("23505")
                {
                    let existing = self
                        .find_pending_for(request.requester.as_str(), target_key.as_str())
                        .await?
                        .map_or_else(|| "unknown".to_owned(), |pending| pending.request_id);
                    return Err(AppError::Conflict(format!(
                        "access request '{existing}' for '{target_key}' by '{}' is already pending",
                        request.requester
                    )));
                }

                Err(AppError::Internal(format!(
                    "failed to insert access request '{}': {error}",
                    request.request_id
                )))
            }
        }
    }

    async fn save_request(&self, request: &AccessRequest) -> AppResult<()> {
        let target_key = request.target.target_key();
        let result = sqlx::query(
            r#"
            UPDATE access_requests
            SET
                target_key = $2,
                target = $3,
                justification = $4,
                status = $5,
                updated_by = $6,
                last_updated = $7,
                reviewer_comments = $8,
                expires_at = $9,
                policy_snapshot = $10
            WHERE request_id = $1
            "#,
        )
        .bind(request.request_id.as_str())
        .bind(target_key.as_str())
        .bind(Json(&request.target))
        .bind(request.justification.as_str())
        .bind(request.status.as_str())
        .bind(request.updated_by.as_str())
        .bind(request.last_updated)
        .bind(request.reviewer_comments.as_deref())
        .bind(request.expires_at)
        .bind(request.policy_snapshot.as_ref().map(Json))
        .execute(&self.pool)
        .await;

        match result {
            Ok(result) if result.rows_affected() == 0 => Err(AppError::NotFound(format!(
                "access request '{}' does not exist",
                request.request_id
            ))),
            Ok(_) => Ok(()),
            Err(error) => {
                if let sqlx::Error::Database(database_error) = &error
                    && database_error.code().as_deref() == Some("23505")
                {
                    return Err(AppError::Conflict(format!(
                        "another access request for '{target_key}' by '{}' is already pending",
                        request.requester
                    )));
                }

                Err(AppError::Internal(format!(
                    "failed to save access request '{}': {error}",
                    request.request_id
                )))
            }
        }
    }

    async fn find_request(&self, request_id: &str) -> AppResult<Option<AccessRequest>> {
        let row = sqlx::query_as::<_, AccessRequestRow>(
            format!("{SELECT_COLUMNS} WHERE request_id = $1").as_str(),
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load access request '{request_id}': {error}"
            ))
        })?;

        row.map(AccessRequest::try_from).transpose()
    }

    async fn find_pending_for(
        &self,
        requester: &str,
        target_key: &str,
    ) -> AppResult<Option<AccessRequest>> {
        let row = sqlx::query_as::<_, AccessRequestRow>(
            format!(
                "{SELECT_COLUMNS} WHERE requester = $1 AND target_key = $2 AND status = 'pending'"
            )
            .as_str(),
        )
        .bind(requester)
        .bind(target_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find pending access request for '{target_key}': {error}"
            ))
        })?;

        row.map(AccessRequest::try_from).transpose()
    }

    async fn find_requests(&self, request_ids: &[String]) -> AppResult<Vec<AccessRequest>> {
        if request_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, AccessRequestRow>(
            format!("{SELECT_COLUMNS} WHERE request_id = ANY($1)").as_str(),
        )
        .bind(request_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load access requests: {error}"))
        })?;

        map_rows(rows)
    }

    async fn list_pending(&self, limit: usize) -> AppResult<Vec<AccessRequest>> {
        let rows = sqlx::query_as::<_, AccessRequestRow>(
            format!(
                "{SELECT_COLUMNS} WHERE status = 'pending' ORDER BY request_time ASC, request_id ASC LIMIT $1"
            )
            .as_str(),
        )
        .bind(bounded_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list pending access requests: {error}"))
        })?;

        map_rows(rows)
    }

    async fn list_expired_approvals(
        &self,
        now: i64,
        after: Option<ExpiryCursor<'_>>,
        limit: usize,
    ) -> AppResult<Vec<AccessRequest>> {
        let rows = sqlx::query_as::<_, AccessRequestRow>(
            format!(
                r#"{SELECT_COLUMNS}
                WHERE status = 'approved'
                  AND expires_at IS NOT NULL
                  AND expires_at <= $1
                  AND ($2::BIGINT IS NULL OR (expires_at, request_id) > ($2::BIGINT, $3::TEXT))
                ORDER BY expires_at ASC, request_id ASC
                LIMIT $4"#
            )
            .as_str(),
        )
        .bind(now)
        .bind(after.map(|cursor| cursor.expires_at))
        .bind(after.map(|cursor| cursor.request_id))
        .bind(bounded_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list expired access requests: {error}"
            ))
        })?;

        map_rows(rows)
    }

    async fn append_user_request(&self, user: &str, request_id: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO access_request_users (user_name, request_ids)
            VALUES ($1, ARRAY[$2])
            ON CONFLICT (user_name)
            DO UPDATE SET request_ids = array_append(access_request_users.request_ids, $2)
            "#,
        )
        .bind(user)
        .bind(request_id)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to record access request '{request_id}' for '{user}': {error}"
            ))
        })?;

        Ok(())
    }

    async fn list_user_request_ids(&self, user: &str) -> AppResult<Vec<String>> {
        let request_ids = sqlx::query_scalar::<_, Vec<String>>(
            r#"
            SELECT request_ids
            FROM access_request_users
            WHERE user_name = $1
            "#,
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list access requests for '{user}': {error}"
            ))
        })?;

        Ok(request_ids.unwrap_or_default())
    }
}
