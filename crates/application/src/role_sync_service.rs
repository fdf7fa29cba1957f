use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use vizgate_core::{AppError, AppResult};
use vizgate_domain::{BuiltinRole, Grant, GrantId, GrantKey, PermissionKind, RoleClassifier};

use crate::security_ports::{PermissionRegistry, RoleRepository};
use crate::{PermissionSyncService, SecurityConfig};

/// Rebuilds built-in roles from the grant catalog.
///
/// Every rebuild replaces the role's full grant set so that grants removed
/// from the catalog disappear from roles on the next sync.
#[derive(Clone)]
pub struct RoleSyncService {
    registry: Arc<dyn PermissionRegistry>,
    roles: Arc<dyn RoleRepository>,
    permission_sync: PermissionSyncService,
    config: SecurityConfig,
}

impl RoleSyncService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        registry: Arc<dyn PermissionRegistry>,
        roles: Arc<dyn RoleRepository>,
        permission_sync: PermissionSyncService,
        config: SecurityConfig,
    ) -> Self {
        Self {
            registry,
            roles,
            permission_sync,
            config,
        }
    }

    /// Registers wildcards, rebuilds every built-in role, refreshes `Public`
    /// and backfills missing data grants.
    pub async fn sync_role_definitions(&self) -> AppResult<()> {
        info!("syncing role definitions");
        self.create_custom_permissions().await?;

        for role in BuiltinRole::synced() {
            if let Some(classifier) = role.classifier() {
                self.rebuild_role(role.name(), classifier).await?;
            }
        }

        if let Some(public_role_like) = self.config.public_role_like.as_deref() {
            self.copy_role(public_role_like, BuiltinRole::Public.name(), true)
                .await?;
        }

        self.permission_sync.create_missing_perms().await?;
        Ok(())
    }

    /// Ensures the `all_*` wildcard grants exist.
    pub async fn create_custom_permissions(&self) -> AppResult<()> {
        for kind in PermissionKind::wildcards() {
            let key = GrantKey::for_kind(*kind, kind.as_str())?;
            if self.registry.ensure_grant(&key).await?.was_created() {
                info!(permission = kind.as_str(), "created wildcard grant");
            }
        }

        Ok(())
    }

    /// Replaces the named role's grants with every catalog grant accepted by
    /// `classifier`, creating the role when missing.
    pub async fn rebuild_role(
        &self,
        role_name: &str,
        classifier: RoleClassifier,
    ) -> AppResult<BTreeSet<GrantId>> {
        let role = self.roles.add_role(role_name).await?;
        let grant_ids: BTreeSet<GrantId> = self
            .registry
            .list_grants()
            .await?
            .iter()
            .filter(|grant| classifier.matches(&self.config.catalog_rules, grant.key()))
            .map(Grant::id)
            .collect();

        self.roles
            .replace_role_grants(role.id(), &grant_ids)
            .await?;
        info!(role = role_name, grants = grant_ids.len(), "rebuilt role");

        Ok(grant_ids)
    }

    /// Copies `source`'s grants into `target`.
    ///
    /// With `merge_data_access`, data-access grants `target` already holds
    /// survive the copy.
    pub async fn copy_role(
        &self,
        source: &str,
        target: &str,
        merge_data_access: bool,
    ) -> AppResult<BTreeSet<GrantId>> {
        let source_role = self
            .roles
            .find_role_by_name(source)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{source}' does not exist")))?;
        let target_role = self.roles.add_role(target).await?;

        let mut grant_ids: BTreeSet<GrantId> = self
            .roles
            .list_role_grants(source_role.id())
            .await?
            .iter()
            .map(Grant::id)
            .collect();

        if merge_data_access {
            grant_ids.extend(
                self.roles
                    .list_role_grants(target_role.id())
                    .await?
                    .iter()
                    .filter(|grant| grant.key().is_data_access())
                    .map(Grant::id),
            );
        }

        self.roles
            .replace_role_grants(target_role.id(), &grant_ids)
            .await?;
        info!(
            source,
            target,
            grants = grant_ids.len(),
            "copied role grants"
        );

        Ok(grant_ids)
    }
}

#[cfg(test)]
mod tests;
