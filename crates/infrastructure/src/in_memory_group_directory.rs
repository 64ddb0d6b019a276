use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use rolegate_application::{GroupAttributes, GroupDirectory, MembershipChange, MembershipRemoval};
use rolegate_core::AppResult;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct DirectoryGroup {
    attributes: GroupAttributes,
    members: BTreeSet<String>,
}

/// In-memory group directory.
///
/// Single-process directory for tests and local runs. Deployed binaries use
/// the Postgres directory so every process sees the same groups.
#[derive(Default)]
pub struct InMemoryGroupDirectory {
    groups: RwLock<HashMap<String, DirectoryGroup>>,
}

impl InMemoryGroupDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current members of a group.
    pub async fn members(&self, group_name: &str) -> Vec<String> {
        self.groups
            .read()
            .await
            .get(normalize(group_name).as_str())
            .map(|group| group.members.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

#[async_trait]
impl GroupDirectory for InMemoryGroupDirectory {
    async fn group_attributes(&self, group_name: &str) -> AppResult<Option<GroupAttributes>> {
        Ok(self
            .groups
            .read()
            .await
            .get(normalize(group_name).as_str())
            .map(|group| group.attributes.clone()))
    }

    async fn put_group_attributes(
        &self,
        group_name: &str,
        attributes: &GroupAttributes,
    ) -> AppResult<()> {
        self.groups
            .write()
            .await
            .entry(normalize(group_name))
            .or_default()
            .attributes = attributes.clone();
        Ok(())
    }

    async fn add_member(&self, group_name: &str, user: &str) -> AppResult<MembershipChange> {
        let mut groups = self.groups.write().await;
        let Some(group) = groups.get_mut(normalize(group_name).as_str()) else {
            return Ok(MembershipChange::Denied(format!(
                "group '{group_name}' does not exist"
            )));
        };

        if group.members.insert(normalize(user)) {
            Ok(MembershipChange::Added)
        } else {
            Ok(MembershipChange::AlreadyMember)
        }
    }

    async fn remove_member(&self, group_name: &str, user: &str) -> AppResult<MembershipRemoval> {
        let mut groups = self.groups.write().await;
        let Some(group) = groups.get_mut(normalize(group_name).as_str()) else {
            return Ok(MembershipRemoval::NotMember);
        };

        if group.members.remove(normalize(user).as_str()) {
            Ok(MembershipRemoval::Removed)
        } else {
            Ok(MembershipRemoval::NotMember)
        }
    }
}

#[cfg(test)]
mod tests {
    use rolegate_application::{
        GroupAttributes, GroupDirectory, MembershipChange, MembershipRemoval,
    };

    use super::InMemoryGroupDirectory;

    #[tokio::test]
    async fn repeated_adds_report_existing_membership() {
        let directory = InMemoryGroupDirectory::new();
        let created = directory
            .put_group_attributes("G1@example.com", &GroupAttributes::default())
            .await;
        assert!(created.is_ok());

        let first = directory.add_member("g1@example.com", "U1@example.com").await;
        let second = directory.add_member("g1@example.com", "u1@example.com").await;

        assert_eq!(first.ok(), Some(MembershipChange::Added));
        assert_eq!(second.ok(), Some(MembershipChange::AlreadyMember));
        assert_eq!(
            directory.members("g1@example.com").await,
            vec!["u1@example.com".to_owned()]
        );
    }

    #[tokio::test]
    async fn attribute_updates_keep_members() {
        let directory = InMemoryGroupDirectory::new();
        let attributes = GroupAttributes {
            requestable: true,
            ..GroupAttributes::default()
        };
        assert!(directory.put_group_attributes("g1@example.com", &attributes).await.is_ok());
        assert!(directory.add_member("g1@example.com", "u1@example.com").await.is_ok());

        let restricted = GroupAttributes {
            restricted: true,
            ..attributes
        };
        assert!(directory.put_group_attributes("G1@example.com", &restricted).await.is_ok());

        assert_eq!(
            directory.group_attributes("g1@example.com").await.ok().flatten(),
            Some(restricted)
        );
        assert_eq!(directory.members("g1@example.com").await.len(), 1);
        assert_eq!(
            directory.remove_member("g1@example.com", "u1@example.com").await.ok(),
            Some(MembershipRemoval::Removed)
        );
    }

    #[tokio::test]
    async fn unknown_groups_deny_additions() {
        let directory = InMemoryGroupDirectory::new();
        let result = directory.add_member("missing@example.com", "u1").await;
        assert!(matches!(result, Ok(MembershipChange::Denied(_))));
    }
}
