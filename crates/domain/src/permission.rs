use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vizgate_core::{AppError, AppResult, NonEmptyString};

use crate::GrantId;

/// Permission kinds that guard data access.
///
/// The registry also stores arbitrary view permissions such as `can_list`;
/// those are carried as plain strings in [`GrantKey`]. The kinds below are the
/// ones the access evaluator and the synchronizer reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    /// Access to every dataset of one database.
    DatabaseAccess,
    /// Access to every dataset of one schema.
    SchemaAccess,
    /// Access to one dataset.
    DatasourceAccess,
    /// Access to one metric.
    MetricAccess,
    /// Wildcard access to every database.
    AllDatabaseAccess,
    /// Wildcard access to every dataset.
    AllDatasourceAccess,
    /// Wildcard access to every saved query.
    AllQueryAccess,
}

impl PermissionKind {
    /// Returns the stable permission name stored in the registry.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DatabaseAccess => "database_access",
            Self::SchemaAccess => "schema_access",
            Self::DatasourceAccess => "datasource_access",
            Self::MetricAccess => "metric_access",
            Self::AllDatabaseAccess => "all_database_access",
            Self::AllDatasourceAccess => "all_datasource_access",
            Self::AllQueryAccess => "all_query_access",
        }
    }

    /// Returns all known kinds.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[PermissionKind] = &[
            PermissionKind::DatabaseAccess,
            PermissionKind::SchemaAccess,
            PermissionKind::DatasourceAccess,
            PermissionKind::MetricAccess,
            PermissionKind::AllDatabaseAccess,
            PermissionKind::AllDatasourceAccess,
            PermissionKind::AllQueryAccess,
        ];

        ALL
    }

    /// Wildcard kinds whose view-menu name equals the permission name.
    #[must_use]
    pub fn wildcards() -> &'static [Self] {
        const WILDCARDS: &[PermissionKind] = &[
            PermissionKind::AllDatasourceAccess,
            PermissionKind::AllDatabaseAccess,
            PermissionKind::AllQueryAccess,
        ];

        WILDCARDS
    }

    /// Kinds granted per object (database, schema, dataset, metric).
    ///
    /// These are never handed out by the built-in roles; administrators
    /// attach them to custom roles.
    #[must_use]
    pub fn is_object_spec(&self) -> bool {
        matches!(
            self,
            Self::DatabaseAccess | Self::SchemaAccess | Self::DatasourceAccess | Self::MetricAccess
        )
    }

    /// Kinds that survive a public-role resync.
    #[must_use]
    pub fn is_data_access(&self) -> bool {
        !matches!(self, Self::MetricAccess)
    }
}

impl Display for PermissionKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for PermissionKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "database_access" => Ok(Self::DatabaseAccess),
            "schema_access" => Ok(Self::SchemaAccess),
            "datasource_access" => Ok(Self::DatasourceAccess),
            "metric_access" => Ok(Self::MetricAccess),
            "all_database_access" => Ok(Self::AllDatabaseAccess),
            "all_datasource_access" => Ok(Self::AllDatasourceAccess),
            "all_query_access" => Ok(Self::AllQueryAccess),
            _ => Err(AppError::Validation(format!(
                "unknown permission kind '{value}'"
            ))),
        }
    }
}

/// A `(permission, view menu)` pair identifying one capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantKey {
    permission: NonEmptyString,
    view_menu: NonEmptyString,
}

impl GrantKey {
    /// Creates a validated grant key.
    pub fn new(permission: impl Into<String>, view_menu: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            permission: NonEmptyString::new(permission)?,
            view_menu: NonEmptyString::new(view_menu)?,
        })
    }

    /// Creates a grant key for a data-access kind.
    pub fn for_kind(kind: PermissionKind, view_menu: impl Into<String>) -> AppResult<Self> {
        Self::new(kind.as_str(), view_menu)
    }

    /// Returns the permission name.
    #[must_use]
    pub fn permission(&self) -> &str {
        self.permission.as_str()
    }

    /// Returns the view-menu (resource) name.
    #[must_use]
    pub fn view_menu(&self) -> &str {
        self.view_menu.as_str()
    }

    /// Returns the data-access kind, when the permission is one.
    #[must_use]
    pub fn kind(&self) -> Option<PermissionKind> {
        PermissionKind::from_str(self.permission()).ok()
    }

    /// Returns whether this key is an object-spec data permission.
    #[must_use]
    pub fn is_object_spec(&self) -> bool {
        self.kind().is_some_and(|kind| kind.is_object_spec())
    }

    /// Returns whether this key is a data-access permission.
    #[must_use]
    pub fn is_data_access(&self) -> bool {
        self.kind().is_some_and(|kind| kind.is_data_access())
    }
}

impl Display for GrantKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} on {}", self.permission, self.view_menu)
    }
}

/// A persisted grant row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    id: GrantId,
    key: GrantKey,
}

impl Grant {
    /// Creates a grant from persisted parts.
    #[must_use]
    pub fn new(id: GrantId, key: GrantKey) -> Self {
        Self { id, key }
    }

    /// Returns the grant identifier.
    #[must_use]
    pub fn id(&self) -> GrantId {
        self.id
    }

    /// Returns the grant key.
    #[must_use]
    pub fn key(&self) -> &GrantKey {
        &self.key
    }

    /// Returns the permission name.
    #[must_use]
    pub fn permission(&self) -> &str {
        self.key.permission()
    }

    /// Returns the view-menu name.
    #[must_use]
    pub fn view_menu(&self) -> &str {
        self.key.view_menu()
    }
}
