//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod access_request;
mod dynamic_config;
mod role;
mod security;

pub use access_request::{
    AccessRequest, PolicyChange, RequestStatus, RequestTarget, REOPEN_WINDOW_SECONDS,
};
pub use dynamic_config::{DynamicConfigDocument, RoleMapping, DYNAMIC_CONFIG_MASTER_ID};
pub use role::{ManagedPolicyAttachment, RoleDocument, RoleKey};
pub use security::Capability;
