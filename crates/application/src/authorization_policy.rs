//! Pure authorization decisions.
//!
//! Every function here is a deterministic function of the caller identity,
//! the merged allow-lists and the target flags. Nothing performs I/O.

use std::collections::{BTreeSet, HashMap};

use rolegate_core::PrincipalIdentity;
use rolegate_domain::{Capability, DynamicConfigDocument};

use crate::StaticAuthorizationConfig;

/// Allow-lists after merging static and dynamic configuration.
///
/// Dynamic entries are added to the static ones, never substituted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationLists {
    admins: BTreeSet<String>,
    capabilities: HashMap<Capability, BTreeSet<String>>,
    self_approval_groups: BTreeSet<String>,
}

impl AuthorizationLists {
    /// Unions static and dynamic configuration.
    #[must_use]
    pub fn merge(static_config: &StaticAuthorizationConfig, dynamic: &DynamicConfigDocument) -> Self {
        let admins = normalized(static_config.admins.iter().chain(dynamic.admins().iter()));
        let capabilities = Capability::all()
            .iter()
            .map(|capability| {
                let dynamic_list = dynamic.capability_allow_list(*capability);
                let merged = normalized(
                    static_config
                        .allow_list(*capability)
                        .iter()
                        .chain(dynamic_list.iter()),
                );
                (*capability, merged)
            })
            .collect();
        let self_approval_groups = normalized(
            static_config
                .self_approval_groups
                .iter()
                .chain(dynamic.self_approval_groups().iter()),
        );

        Self {
            admins,
            capabilities,
            self_approval_groups,
        }
    }

    /// Returns the merged admin list.
    #[must_use]
    pub fn admins(&self) -> &BTreeSet<String> {
        &self.admins
    }

    /// Returns the merged allow-list of one capability.
    #[must_use]
    pub fn allow_list(&self, capability: Capability) -> Option<&BTreeSet<String>> {
        self.capabilities.get(&capability)
    }

    /// Returns the merged global self-approval groups.
    #[must_use]
    pub fn self_approval_groups(&self) -> &BTreeSet<String> {
        &self.self_approval_groups
    }
}

/// Returns whether the identity or one of its groups is a global admin.
#[must_use]
pub fn is_admin(lists: &AuthorizationLists, identity: &PrincipalIdentity) -> bool {
    identity.intersects(lists.admins.iter())
}

/// Computes one capability.
///
/// Restricted targets deny member modification to everyone, admins included.
#[must_use]
pub fn has_capability(
    lists: &AuthorizationLists,
    identity: &PrincipalIdentity,
    capability: Capability,
    target_restricted: bool,
) -> bool {
    if target_restricted && capability.modifies_members() {
        return false;
    }

    if is_admin(lists, identity) {
        return true;
    }

    lists
        .allow_list(capability)
        .is_some_and(|allowed| identity.intersects(allowed.iter()))
}

/// Decides whether a new request starts out approved.
///
/// True when the requester belongs to a self-approval group or is one of the
/// approvers. An empty approver list approves only when `open_when_unowned`
/// is set; otherwise the request waits for an admin.
#[must_use]
pub fn should_auto_approve(
    requester: &PrincipalIdentity,
    approvers: &[String],
    self_approval_groups: &[String],
    open_when_unowned: bool,
) -> bool {
    (open_when_unowned && approvers.is_empty())
        || requester.intersects(self_approval_groups.iter())
        || requester.intersects(approvers.iter())
}

/// Can approve or reject: admin, configured approver, or the target identity itself.
#[must_use]
pub fn can_approve(
    lists: &AuthorizationLists,
    identity: &PrincipalIdentity,
    approvers: &[String],
    target_name: &str,
) -> bool {
    is_admin(lists, identity) || identity.intersects(approvers.iter()) || identity.matches(target_name)
}

/// Can cancel: the original requester or an admin.
#[must_use]
pub fn can_cancel(lists: &AuthorizationLists, identity: &PrincipalIdentity, requester: &str) -> bool {
    identity.user().eq_ignore_ascii_case(requester) || is_admin(lists, identity)
}

/// Can reopen a rejected or cancelled request.
///
/// The reopen window is enforced separately by the caller.
#[must_use]
pub fn can_reopen(
    lists: &AuthorizationLists,
    identity: &PrincipalIdentity,
    requester: &str,
    approvers: &[String],
) -> bool {
    can_cancel(lists, identity, requester) || identity.intersects(approvers.iter())
}

/// Can edit a pending proposal: the requester, or an approver allowed to edit policies.
#[must_use]
pub fn can_edit_proposal(
    lists: &AuthorizationLists,
    identity: &PrincipalIdentity,
    requester: &str,
    approvers: &[String],
) -> bool {
    if identity.user().eq_ignore_ascii_case(requester) {
        return true;
    }

    let is_approver = is_admin(lists, identity) || identity.intersects(approvers.iter());
    is_approver && has_capability(lists, identity, Capability::EditPolicies, false)
}

fn normalized<'a, I>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    names
        .into_iter()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rolegate_core::PrincipalIdentity;
    use rolegate_domain::{Capability, DynamicConfigDocument};
    use serde_json::json;

    use super::{
        AuthorizationLists, can_approve, can_cancel, can_edit_proposal, can_reopen,
        has_capability, is_admin, should_auto_approve,
    };
    use crate::StaticAuthorizationConfig;

    fn static_config() -> StaticAuthorizationConfig {
        StaticAuthorizationConfig {
            admins: vec!["admins@example.com".to_owned()],
            capability_allow_lists: HashMap::from([(
                Capability::EditAttributes,
                vec!["Attr-Editors@example.com".to_owned()],
            )]),
            self_approval_groups: Vec::new(),
        }
    }

    fn dynamic_config() -> DynamicConfigDocument {
        DynamicConfigDocument::from_value(json!({
            "admins": ["root@example.com"],
            "capabilities": { "edit_attributes": ["contractors@example.com"] },
            "self_approval_groups": ["sre@example.com"]
        }))
        .unwrap_or_default()
    }

    fn lists() -> AuthorizationLists {
        AuthorizationLists::merge(&static_config(), &dynamic_config())
    }

    fn admin() -> PrincipalIdentity {
        PrincipalIdentity::new("boss@example.com", ["admins@example.com"])
    }

    fn user(name: &str, groups: &[&str]) -> PrincipalIdentity {
        PrincipalIdentity::new(name, groups.iter().copied())
    }

    #[test]
    fn dynamic_lists_augment_static_lists() {
        let lists = lists();

        assert!(is_admin(&lists, &admin()));
        assert!(is_admin(&lists, &user("root@example.com", &[])));
        assert!(has_capability(
            &lists,
            &user("a@example.com", &["attr-editors@example.com"]),
            Capability::EditAttributes,
            false
        ));
        assert!(has_capability(
            &lists,
            &user("b@example.com", &["contractors@example.com"]),
            Capability::EditAttributes,
            false
        ));
        assert!(!has_capability(
            &lists,
            &user("b@example.com", &["contractors@example.com"]),
            Capability::DeletePrincipal,
            false
        ));
    }

    #[test]
    fn restricted_target_denies_member_changes_to_admins() {
        let lists = lists();

        assert!(!has_capability(&lists, &admin(), Capability::ModifyMembers, true));
        assert!(has_capability(&lists, &admin(), Capability::ModifyMembers, false));
        assert!(has_capability(&lists, &admin(), Capability::EditAttributes, true));
    }

    #[test]
    fn auto_approval_rules() {
        let requester = user("u1@example.com", &["team@example.com"]);

        assert!(should_auto_approve(&requester, &[], &[], true));
        assert!(should_auto_approve(
            &requester,
            &["leads@example.com".to_owned()],
            &["team@example.com".to_owned()],
            false
        ));
        assert!(should_auto_approve(
            &requester,
            &["TEAM@example.com".to_owned()],
            &[],
            false
        ));
        assert!(!should_auto_approve(
            &requester,
            &["leads@example.com".to_owned()],
            &[],
            true
        ));
    }

    #[test]
    fn unowned_targets_stay_closed_unless_opted_in() {
        let requester = user("u1@example.com", &["team@example.com"]);

        assert!(!should_auto_approve(&requester, &[], &[], false));
        assert!(should_auto_approve(
            &requester,
            &[],
            &["team@example.com".to_owned()],
            false
        ));
    }

    #[test]
    fn approval_by_admin_approver_or_target_identity() {
        let lists = lists();
        let approvers = vec!["leads@example.com".to_owned()];

        assert!(can_approve(&lists, &admin(), &approvers, "g1@example.com"));
        assert!(can_approve(
            &lists,
            &user("lead@example.com", &["leads@example.com"]),
            &approvers,
            "g1@example.com"
        ));
        assert!(can_approve(
            &lists,
            &user("owner@example.com", &["g1@example.com"]),
            &approvers,
            "g1@example.com"
        ));
        assert!(!can_approve(
            &lists,
            &user("u1@example.com", &[]),
            &approvers,
            "g1@example.com"
        ));
    }

    #[test]
    fn cancel_reopen_and_edit_rights() {
        let lists = lists();
        let approvers = vec!["leads@example.com".to_owned()];
        let requester = user("u1@example.com", &[]);
        let lead = user("lead@example.com", &["leads@example.com"]);

        assert!(can_cancel(&lists, &requester, "U1@example.com"));
        assert!(can_cancel(&lists, &admin(), "u1@example.com"));
        assert!(!can_cancel(&lists, &lead, "u1@example.com"));

        assert!(can_reopen(&lists, &lead, "u1@example.com", &approvers));
        assert!(!can_reopen(&lists, &user("x@example.com", &[]), "u1@example.com", &approvers));

        assert!(can_edit_proposal(&lists, &requester, "u1@example.com", &approvers));
        assert!(!can_edit_proposal(&lists, &lead, "u1@example.com", &approvers));
        assert!(can_edit_proposal(&lists, &admin(), "u1@example.com", &approvers));
    }
}
