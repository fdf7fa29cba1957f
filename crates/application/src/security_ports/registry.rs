use async_trait::async_trait;

use vizgate_core::AppResult;
use vizgate_domain::{Grant, GrantKey};

/// Result of an idempotent grant insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The grant did not exist and was created.
    Created(Grant),
    /// The grant already existed.
    Existing(Grant),
}

impl EnsureOutcome {
    /// Returns the grant regardless of whether it was created.
    #[must_use]
    pub fn grant(&self) -> &Grant {
        match self {
            Self::Created(grant) | Self::Existing(grant) => grant,
        }
    }

    /// Consumes the outcome and returns the grant.
    #[must_use]
    pub fn into_grant(self) -> Grant {
        match self {
            Self::Created(grant) | Self::Existing(grant) => grant,
        }
    }

    /// Returns whether this call created the grant.
    #[must_use]
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Result of renaming a grant's view menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The grant was renamed in place; role associations are preserved.
    Renamed(Grant),
    /// A grant already existed at the target name; the source was deleted.
    MergedIntoExisting(Grant),
    /// No grant existed at the source name; nothing changed.
    SourceMissing,
}

/// Backing store of `(permission, view menu)` grants.
#[async_trait]
pub trait PermissionRegistry: Send + Sync {
    /// Looks up one grant.
    async fn find_grant(&self, key: &GrantKey) -> AppResult<Option<Grant>>;

    /// Inserts the grant unless it exists.
    async fn ensure_grant(&self, key: &GrantKey) -> AppResult<EnsureOutcome>;

    /// Deletes a grant and its role associations. Returns whether a row was
    /// removed.
    async fn delete_grant(&self, key: &GrantKey) -> AppResult<bool>;

    /// Moves a grant to a new view-menu name.
    ///
    /// When a grant already exists at `new_view_menu`, the source grant is
    /// deleted instead and the existing target wins.
    async fn rename_grant(
        &self,
        permission: &str,
        old_view_menu: &str,
        new_view_menu: &str,
    ) -> AppResult<RenameOutcome>;

    /// Deletes every grant of `permission` whose view-menu name starts with
    /// `view_menu_prefix`, returning the removed keys.
    async fn delete_grants_by_prefix(
        &self,
        permission: &str,
        view_menu_prefix: &str,
    ) -> AppResult<Vec<GrantKey>>;

    /// Lists the grants of `permission` under `view_menu_prefix`, sorted.
    async fn list_grants_by_prefix(
        &self,
        permission: &str,
        view_menu_prefix: &str,
    ) -> AppResult<Vec<GrantKey>>;

    /// Lists the full grant catalog.
    async fn list_grants(&self) -> AppResult<Vec<Grant>>;
}
