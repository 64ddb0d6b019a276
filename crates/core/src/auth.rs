use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Principal identity handed over by the upstream identity provider.
///
/// Login protocols are handled outside this service; only the resulting
/// subject and group memberships are consumed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalIdentity {
    user: String,
    groups: BTreeSet<String>,
}

impl PrincipalIdentity {
    /// Creates an identity from a user name and its group memberships.
    ///
    /// Names are normalised to lowercase so comparisons against allow-lists
    /// are case-insensitive.
    #[must_use]
    pub fn new<I, S>(user: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user: normalize(user.into()),
            groups: groups
                .into_iter()
                .map(|group| normalize(group.into()))
                .filter(|group| !group.is_empty())
                .collect(),
        }
    }

    /// Returns the stable user identifier (usually an email address).
    #[must_use]
    pub fn user(&self) -> &str {
        self.user.as_str()
    }

    /// Returns the groups the identity belongs to.
    #[must_use]
    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    /// Returns whether the identity is the given name or belongs to it as a group.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        let name = normalize(name.to_owned());
        self.user == name || self.groups.contains(&name)
    }

    /// Returns whether the identity or any of its groups appear in the list.
    #[must_use]
    pub fn intersects<'a, I>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        names.into_iter().any(|name| self.matches(name))
    }
}

fn normalize(value: String) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::PrincipalIdentity;

    #[test]
    fn identity_matching_is_case_insensitive() {
        let identity = PrincipalIdentity::new("Alice@Example.com", ["Ops@Example.com"]);

        assert!(identity.matches("alice@example.com"));
        assert!(identity.matches("OPS@example.com"));
        assert!(!identity.matches("bob@example.com"));
    }

    #[test]
    fn empty_groups_are_dropped() {
        let identity = PrincipalIdentity::new("alice", ["", "  ", "eng"]);
        assert_eq!(identity.groups().len(), 1);
    }
}
