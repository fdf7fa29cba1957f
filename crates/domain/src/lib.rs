//! Domain entities, permission-string derivation and classification rules.

#![forbid(unsafe_code)]

mod change;
mod guest;
mod ids;
mod perm_string;
mod permission;
mod principal;
mod resource;
mod rls;
mod role;

pub use change::EntityChange;
pub use guest::{
    GUEST_TOKEN_TYPE, GuestResource, GuestResourceType, GuestRlsRule, GuestTokenClaims, GuestUser,
};
pub use ids::{ChartId, DashboardId, DatabaseId, DatasetId, GrantId, RlsRuleId, RoleId, UserId};
pub use perm_string::{
    database_perm, dataset_perm, schema_perm, schema_perm_prefix, unpack_schema_perm,
};
pub use permission::{Grant, GrantKey, PermissionKind};
pub use principal::{GuestPrincipal, Principal, RegisteredUser};
pub use resource::{
    ChartRecord, DashboardRecord, DatabaseRecord, DatasetRecord, DatasourceType,
    EmbeddedDashboard, TableRef,
};
pub use rls::{RlsFilter, RlsFilterType, RowLevelSecurityRule, combine_rls_clauses};
pub use role::{BuiltinRole, CatalogPredicate, PermissionCatalogRules, Role, RoleClassifier};
