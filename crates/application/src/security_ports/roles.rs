use std::collections::BTreeSet;

use async_trait::async_trait;

use vizgate_core::AppResult;
use vizgate_domain::{Grant, GrantId, GrantKey, Role, RoleId};

/// Repository port for roles and their grant sets.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Looks up a role by name.
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>>;

    /// Returns the named role, creating it when missing.
    async fn add_role(&self, name: &str) -> AppResult<Role>;

    /// Lists roles by identifier, skipping unknown ids.
    async fn list_roles_by_ids(&self, role_ids: &BTreeSet<RoleId>) -> AppResult<Vec<Role>>;

    /// Lists the grants currently attached to a role.
    async fn list_role_grants(&self, role_id: RoleId) -> AppResult<Vec<Grant>>;

    /// Replaces a role's grant set.
    async fn replace_role_grants(
        &self,
        role_id: RoleId,
        grant_ids: &BTreeSet<GrantId>,
    ) -> AppResult<()>;

    /// Lists the distinct grant keys held through any of `role_ids`.
    async fn list_grant_keys_for_roles(
        &self,
        role_ids: &BTreeSet<RoleId>,
    ) -> AppResult<Vec<GrantKey>>;
}
