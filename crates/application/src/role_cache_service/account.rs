use tracing::warn;

use super::*;

/// Counters reported by an account-wide refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountRefreshSummary {
    /// Roles re-read from the cloud and written through.
    pub refreshed: u64,
    /// Roles listed but gone by the time they were read.
    pub missing: u64,
    /// Roles whose refresh failed.
    pub failed: u64,
}

impl RoleCacheService {
    /// Force-refreshes every role of one account.
    ///
    /// A failure on a single role is logged and counted; listing failures abort.
    pub async fn refresh_account(&self, account_id: &str) -> AppResult<AccountRefreshSummary> {
        let arns = call_with_retry(&self.settings.retry, "iam list_roles", || {
            self.cloud.list_role_arns(account_id)
        })
        .await?;

        let mut summary = AccountRefreshSummary::default();
        for arn in arns {
            let key = match RoleKey::new(account_id, arn.as_str()) {
                Ok(key) => key,
                Err(error) => {
                    warn!(account_id = account_id, arn = %arn, error = %error, "skipping unparsable role arn");
                    summary.failed = summary.failed.saturating_add(1);
                    continue;
                }
            };

            match self.fetch_role(&key, true).await {
                Ok(RoleLookup::Found(_)) => summary.refreshed = summary.refreshed.saturating_add(1),
                Ok(RoleLookup::Missing) => summary.missing = summary.missing.saturating_add(1),
                Err(error) => {
                    warn!(account_id = account_id, arn = %arn, error = %error, "role refresh failed");
                    summary.failed = summary.failed.saturating_add(1);
                }
            }
        }

        info!(
            account_id = account_id,
            refreshed = summary.refreshed,
            missing = summary.missing,
            failed = summary.failed,
            "account role refresh finished"
        );

        Ok(summary)
    }
}
