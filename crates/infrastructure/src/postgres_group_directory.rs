use async_trait::async_trait;
use rolegate_application::{GroupAttributes, GroupDirectory, MembershipChange, MembershipRemoval};
use rolegate_core::{AppError, AppResult};
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed group directory shared by every rolegate process.
///
/// Group names and members are stored lowercase. Adding a member to an
/// unknown group is refused by the foreign key on the membership table.
#[derive(Clone)]
pub struct PostgresGroupDirectory {
    pool: PgPool,
}

impl PostgresGroupDirectory {
    /// Creates a directory with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the current members of a group, sorted.
    pub async fn members(&self, group_name: &str) -> AppResult<Vec<String>> {
        let group_name = normalize(group_name);
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT member
            FROM directory_group_members
            WHERE group_name = $1
            ORDER BY member ASC
            "#,
        )
        .bind(group_name.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list members of group '{group_name}': {error}"
            ))
        })
    }
}

#[derive(Debug, FromRow)]
struct DirectoryGroupRow {
    secondary_approvers: Vec<String>,
    self_approval_groups: Vec<String>,
    restricted: bool,
    requestable: bool,
}

impl From<DirectoryGroupRow> for GroupAttributes {
    fn from(row: DirectoryGroupRow) -> Self {
        Self {
            secondary_approvers: row.secondary_approvers,
            self_approval_groups: row.self_approval_groups,
            restricted: row.restricted,
            requestable: row.requestable,
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(database_error)
        if database_error.code().as_deref() == Some("23503"))
}

#[async_trait]
impl GroupDirectory for PostgresGroupDirectory {
    async fn group_attributes(&self, group_name: &str) -> AppResult<Option<GroupAttributes>> {
        let group_name = normalize(group_name);
        let row = sqlx::query_as::<_, DirectoryGroupRow>(
            r#"
            SELECT secondary_approvers, self_approval_groups, restricted, requestable
            FROM directory_groups
            WHERE group_name = $1
            "#,
        )
        .bind(group_name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load group '{group_name}': {error}"))
        })?;

        Ok(row.map(GroupAttributes::from))
    }

    async fn put_group_attributes(
        &self,
        group_name: &str,
        attributes: &GroupAttributes,
    ) -> AppResult<()> {
        let group_name = normalize(group_name);
        sqlx::query(
            r#"
            INSERT INTO directory_groups (
                group_name,
                secondary_approvers,
                self_approval_groups,
                restricted,
                requestable,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (group_name)
            DO UPDATE SET
                secondary_approvers = EXCLUDED.secondary_approvers,
                self_approval_groups = EXCLUDED.self_approval_groups,
                restricted = EXCLUDED.restricted,
                requestable = EXCLUDED.requestable,
                updated_at = now()
            "#,
        )
        .bind(group_name.as_str())
        .bind(attributes.secondary_approvers.as_slice())
        .bind(attributes.self_approval_groups.as_slice())
        .bind(attributes.restricted)
        .bind(attributes.requestable)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to save group '{group_name}': {error}"))
        })?;

        Ok(())
    }

    async fn add_member(&self, group_name: &str, user: &str) -> AppResult<MembershipChange> {
        let group_name = normalize(group_name);
        let result = sqlx::query(
            r#"
            INSERT INTO directory_group_members (group_name, member)
            VALUES ($1, $2)
            ON CONFLICT (group_name, member) DO NOTHING
            "#,
        )
        .bind(group_name.as_str())
        .bind(normalize(user))
        .execute(&self.pool)
        .await;

        match result {
            Ok(result) if result.rows_affected() == 0 => Ok(MembershipChange::AlreadyMember),
            Ok(_) => Ok(MembershipChange::Added),
            Err(error) if is_foreign_key_violation(&error) => Ok(MembershipChange::Denied(
                format!("group '{group_name}' does not exist"),
            )),
            Err(error) => Err(AppError::Internal(format!(
                "failed to add '{user}' to group '{group_name}': {error}"
            ))),
        }
    }

    async fn remove_member(&self, group_name: &str, user: &str) -> AppResult<MembershipRemoval> {
        let group_name = normalize(group_name);
        let result = sqlx::query(
            r#"
            DELETE FROM directory_group_members
            WHERE group_name = $1 AND member = $2
            "#,
        )
        .bind(group_name.as_str())
        .bind(normalize(user))
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to remove '{user}' from group '{group_name}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            Ok(MembershipRemoval::NotMember)
        } else {
            Ok(MembershipRemoval::Removed)
        }
    }
}

#[cfg(test)]
mod tests;
