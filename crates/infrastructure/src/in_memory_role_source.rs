use std::collections::HashMap;

use async_trait::async_trait;
use rolegate_application::{CloudRoleSource, RolePolicyWriter};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::{ManagedPolicyAttachment, RoleDocument, RoleKey};
use serde_json::Value;
use tokio::sync::RwLock;

/// In-memory stand-in for the cloud IAM API.
///
/// Used when the process runs without cloud credentials.
#[derive(Default)]
pub struct InMemoryRoleSource {
    roles: RwLock<HashMap<RoleKey, RoleDocument>>,
}

impl InMemoryRoleSource {
    /// Creates a source seeded with roles.
    pub fn with_roles(roles: impl IntoIterator<Item = RoleDocument>) -> AppResult<Self> {
        let roles = roles
            .into_iter()
            .map(|role| role.key().map(|key| (key, role)))
            .collect::<AppResult<HashMap<_, _>>>()?;

        Ok(Self {
            roles: RwLock::new(roles),
        })
    }

    /// Inserts or replaces a role.
    pub async fn upsert_role(&self, role: RoleDocument) -> AppResult<()> {
        let key = role.key()?;
        self.roles.write().await.insert(key, role);
        Ok(())
    }

    /// Deletes a role.
    pub async fn delete_role(&self, key: &RoleKey) {
        self.roles.write().await.remove(key);
    }
}

#[async_trait]
impl CloudRoleSource for InMemoryRoleSource {
    async fn fetch_role(&self, key: &RoleKey) -> AppResult<Option<RoleDocument>> {
        Ok(self.roles.read().await.get(key).cloned())
    }

    async fn list_role_arns(&self, account_id: &str) -> AppResult<Vec<String>> {
        let mut arns: Vec<String> = self
            .roles
            .read()
            .await
            .keys()
            .filter(|key| key.account_id() == account_id)
            .map(|key| key.arn().to_owned())
            .collect();
        arns.sort();
        Ok(arns)
    }
}

#[async_trait]
impl RolePolicyWriter for InMemoryRoleSource {
    async fn put_inline_policy(
        &self,
        key: &RoleKey,
        policy_name: &str,
        document: &Value,
    ) -> AppResult<()> {
        let mut roles = self.roles.write().await;
        let role = roles
            .get_mut(key)
            .ok_or_else(|| AppError::NotFound(format!("role '{}' does not exist", key.arn())))?;
        role.inline_policies
            .insert(policy_name.to_owned(), document.clone());
        Ok(())
    }

    async fn attach_managed_policy(&self, key: &RoleKey, policy_arn: &str) -> AppResult<()> {
        let mut roles = self.roles.write().await;
        let role = roles
            .get_mut(key)
            .ok_or_else(|| AppError::NotFound(format!("role '{}' does not exist", key.arn())))?;

        if !role.has_managed_policy(policy_arn) {
            role.managed_policies.push(ManagedPolicyAttachment {
                policy_name: policy_arn
                    .rsplit('/')
                    .next()
                    .unwrap_or(policy_arn)
                    .to_owned(),
                policy_arn: policy_arn.to_owned(),
            });
        }
        Ok(())
    }
}
