//! Application services and ports.

#![forbid(unsafe_code)]

mod access_request_ports;
mod access_request_service;
pub mod authorization_policy;
mod authorization_service;
mod dynamic_config_ports;
mod dynamic_config_service;
mod maintenance;
mod retry;
mod role_cache_ports;
mod role_cache_service;
mod settings;

pub use access_request_ports::{
    AccessRequestEvent, AccessRequestNotifier, AccessRequestRepository, ExpiryCursor,
    GroupAttributes, GroupDirectory, MembershipChange, MembershipRemoval,
    SubmitAccessRequestInput, UpdateRequestStatusInput,
};
pub use access_request_service::{AccessRequestService, SYSTEM_ACTOR};
pub use authorization_service::{ApprovalRoute, AuthorizationCache, AuthorizationService};
pub use dynamic_config_ports::{DynamicConfigCache, DynamicConfigRepository, StoredDynamicConfig};
pub use dynamic_config_service::{ConfigSnapshot, DynamicConfigHandle, DynamicConfigService};
pub use maintenance::run_periodic;
pub use retry::call_with_retry;
pub use role_cache_ports::{
    CloudRoleSource, DurableRoleRecord, DurableRoleRepository, FastRoleCache, FastTierRole,
    PolicyApplyOutcome, RoleLookup, RolePolicyWriter,
};
pub use role_cache_service::{AccountRefreshSummary, RoleCacheService};
pub use settings::{RetryPolicy, RoleGateSettings, StaticAuthorizationConfig};
