//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod aws_iam_role_source;
mod in_memory_access_request_repository;
mod in_memory_authorization_cache;
mod in_memory_dynamic_config;
mod in_memory_group_directory;
mod in_memory_role_source;
mod in_memory_role_tiers;
mod logging_access_request_notifier;
mod postgres_access_request_repository;
mod postgres_dynamic_config_repository;
mod postgres_group_directory;
mod postgres_role_cache_repository;
mod redis_authorization_cache;
mod redis_dynamic_config_cache;
mod redis_role_cache;
mod runtime_config;
mod runtime_services;
mod webhook_access_request_notifier;

pub use aws_iam_role_source::AwsIamRoleSource;
pub use in_memory_access_request_repository::InMemoryAccessRequestRepository;
pub use in_memory_authorization_cache::InMemoryAuthorizationCache;
pub use in_memory_dynamic_config::{InMemoryDynamicConfigCache, InMemoryDynamicConfigRepository};
pub use in_memory_group_directory::InMemoryGroupDirectory;
pub use in_memory_role_source::InMemoryRoleSource;
pub use in_memory_role_tiers::{InMemoryDurableRoleRepository, InMemoryRoleCache};
pub use logging_access_request_notifier::LoggingAccessRequestNotifier;
pub use postgres_access_request_repository::PostgresAccessRequestRepository;
pub use postgres_dynamic_config_repository::PostgresDynamicConfigRepository;
pub use postgres_group_directory::PostgresGroupDirectory;
pub use postgres_role_cache_repository::PostgresRoleCacheRepository;
pub use redis_authorization_cache::RedisAuthorizationCache;
pub use redis_dynamic_config_cache::RedisDynamicConfigCache;
pub use redis_role_cache::RedisRoleCache;
pub use runtime_config::{RoleSourceKind, RuntimeConfig, parse_or};
pub use runtime_services::{RoleGateServices, RuntimeAdapters};
pub use webhook_access_request_notifier::WebhookAccessRequestNotifier;
