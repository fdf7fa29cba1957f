mod dashboards;
mod events;
mod guest_token;
mod metadata;
mod registry;
mod rls;
mod roles;

pub use dashboards::DashboardRepository;
pub use events::{GrantEvent, GrantEventSink};
pub use guest_token::GuestTokenCodec;
pub use metadata::SecurityMetadataRepository;
pub use registry::{EnsureOutcome, PermissionRegistry, RenameOutcome};
pub use rls::RlsRuleRepository;
pub use roles::RoleRepository;
