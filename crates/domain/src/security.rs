use std::str::FromStr;

use rolegate_core::AppError;
use serde::{Deserialize, Serialize};

/// Capabilities enforced by authorization policy checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Allows approving or rejecting access requests.
    ApproveRequests,
    /// Allows editing role policies and pending policy proposals.
    EditPolicies,
    /// Allows editing group attributes.
    EditAttributes,
    /// Allows deleting IAM principals.
    DeletePrincipal,
    /// Allows adding and removing group members.
    ModifyMembers,
    /// Allows writing the dynamic configuration.
    EditConfig,
}

impl Capability {
    /// Returns a stable storage value for this capability.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApproveRequests => "approve_requests",
            Self::EditPolicies => "edit_policies",
            Self::EditAttributes => "edit_attributes",
            Self::DeletePrincipal => "delete_principal",
            Self::ModifyMembers => "modify_members",
            Self::EditConfig => "edit_config",
        }
    }

    /// Returns all known capabilities.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[Capability] = &[
            Capability::ApproveRequests,
            Capability::EditPolicies,
            Capability::EditAttributes,
            Capability::DeletePrincipal,
            Capability::ModifyMembers,
            Capability::EditConfig,
        ];

        ALL
    }

    /// Returns whether the capability mutates target membership.
    ///
    /// Restricted targets deny these unconditionally.
    #[must_use]
    pub fn modifies_members(&self) -> bool {
        matches!(self, Self::ModifyMembers)
    }
}

impl FromStr for Capability {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|capability| capability.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown capability value '{value}'")))
    }
}
