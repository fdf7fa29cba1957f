//! Application services and ports for permission propagation and access control.

#![forbid(unsafe_code)]

mod access_service;
mod guest_token_service;
mod permission_sync_service;
mod role_sync_service;
mod security_config;
/// Ports implemented by persistence, signing and audit adapters.
pub mod security_ports;

pub use access_service::{AccessService, AccessTarget};
pub use guest_token_service::{
    GRANT_GUEST_TOKEN_PERMISSION, GUEST_TOKEN_VIEW_MENU, GuestTokenService,
};
pub use permission_sync_service::{MissingPermsSummary, PermissionSyncService};
pub use role_sync_service::RoleSyncService;
pub use security_config::{GuestTokenConfig, SecurityConfig};
pub use security_ports::{
    DashboardRepository, EnsureOutcome, GrantEvent, GrantEventSink, GuestTokenCodec,
    PermissionRegistry, RenameOutcome, RlsRuleRepository, RoleRepository,
    SecurityMetadataRepository,
};
