use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vizgate_core::{AppError, AppResult, NonEmptyString};

use crate::{GrantKey, RoleId};

/// A named role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    name: NonEmptyString,
}

impl Role {
    /// Creates a validated role.
    pub fn new(id: RoleId, name: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            id,
            name: NonEmptyString::new(name)?,
        })
    }

    /// Returns the role identifier.
    #[must_use]
    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Returns the role name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns whether this is the built-in administrator role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.name() == BuiltinRole::Admin.name()
    }
}

/// Roles whose grant sets are derived from the grant catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinRole {
    /// Full administrator.
    Admin,
    /// Power user: everything except administration.
    Alpha,
    /// Consumer: read-mostly access, data access granted separately.
    Gamma,
    /// May grant role permissions and approve access requests.
    Granter,
    /// SQL editor access.
    SqlLab,
    /// Anonymous access, copied from a configured role.
    Public,
}

impl BuiltinRole {
    /// Returns the stored role name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Alpha => "Alpha",
            Self::Gamma => "Gamma",
            Self::Granter => "granter",
            Self::SqlLab => "sql_lab",
            Self::Public => "Public",
        }
    }

    /// Roles rebuilt on every sync, in rebuild order.
    #[must_use]
    pub fn synced() -> &'static [Self] {
        const SYNCED: &[BuiltinRole] = &[
            BuiltinRole::Admin,
            BuiltinRole::Alpha,
            BuiltinRole::Gamma,
            BuiltinRole::Granter,
            BuiltinRole::SqlLab,
        ];

        SYNCED
    }

    /// Returns the catalog classifier, or `None` for [`BuiltinRole::Public`].
    #[must_use]
    pub fn classifier(&self) -> Option<RoleClassifier> {
        match self {
            Self::Admin => Some(RoleClassifier::Admin),
            Self::Alpha => Some(RoleClassifier::Alpha),
            Self::Gamma => Some(RoleClassifier::Gamma),
            Self::Granter => Some(RoleClassifier::Granter),
            Self::SqlLab => Some(RoleClassifier::SqlLab),
            Self::Public => None,
        }
    }
}

impl FromStr for BuiltinRole {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Admin" => Ok(Self::Admin),
            "Alpha" => Ok(Self::Alpha),
            "Gamma" => Ok(Self::Gamma),
            "granter" => Ok(Self::Granter),
            "sql_lab" => Ok(Self::SqlLab),
            "Public" => Ok(Self::Public),
            _ => Err(AppError::Validation(format!(
                "'{value}' is not a built-in role"
            ))),
        }
    }
}

/// Boolean predicates over catalog grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogPredicate {
    /// Per-object data permissions (`database_access`, `schema_access`, ...).
    ObjectSpec,
    /// Mutations on admin read-only views and explicitly admin-only entries.
    AdminOnly,
    /// Mutations on gamma read-only views and explicitly alpha-only entries.
    AlphaOnly,
    /// Exact pairs reserved for SQL editor features.
    SqlLabOnly,
    /// Permissions every role receives.
    AccessibleToAll,
}

impl CatalogPredicate {
    /// Evaluates the predicate for one grant.
    #[must_use]
    pub fn matches(&self, rules: &PermissionCatalogRules, key: &GrantKey) -> bool {
        let permission = key.permission();
        let view_menu = key.view_menu();

        match self {
            Self::ObjectSpec => key.is_object_spec(),
            Self::AdminOnly => {
                (rules.read_only_model_views.contains(view_menu)
                    && !rules.read_only_permissions.contains(permission))
                    || rules.admin_only_view_menus.contains(view_menu)
                    || rules.admin_only_permissions.contains(permission)
            }
            Self::AlphaOnly => {
                (rules.gamma_read_only_model_views.contains(view_menu)
                    && !rules.read_only_permissions.contains(permission))
                    || rules.alpha_only_view_menus.contains(view_menu)
                    || rules.alpha_only_permissions.contains(permission)
            }
            Self::SqlLabOnly => rules
                .sql_lab_only_pairs
                .contains(&(permission.to_owned(), view_menu.to_owned())),
            Self::AccessibleToAll => rules.accessible_permissions.contains(permission),
        }
    }
}

/// Classifiers deciding which catalog grants a built-in role receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleClassifier {
    /// Everything except per-object data permissions.
    Admin,
    /// Everything except per-object, admin-only and SQL-editor-only grants.
    Alpha,
    /// Alpha minus alpha-only grants.
    Gamma,
    /// SQL editor views and permissions.
    SqlLab,
    /// Role-permission overrides and access-request approval.
    Granter,
}

impl RoleClassifier {
    /// Returns whether the role built by this classifier holds `key`.
    #[must_use]
    pub fn matches(&self, rules: &PermissionCatalogRules, key: &GrantKey) -> bool {
        let any = |predicates: &[CatalogPredicate]| {
            predicates
                .iter()
                .any(|predicate| predicate.matches(rules, key))
        };

        match self {
            Self::Admin => !CatalogPredicate::ObjectSpec.matches(rules, key),
            Self::Alpha => {
                !any(&[
                    CatalogPredicate::ObjectSpec,
                    CatalogPredicate::AdminOnly,
                    CatalogPredicate::SqlLabOnly,
                ]) || CatalogPredicate::AccessibleToAll.matches(rules, key)
            }
            Self::Gamma => {
                !any(&[
                    CatalogPredicate::ObjectSpec,
                    CatalogPredicate::AdminOnly,
                    CatalogPredicate::AlphaOnly,
                    CatalogPredicate::SqlLabOnly,
                ]) || CatalogPredicate::AccessibleToAll.matches(rules, key)
            }
            Self::SqlLab => {
                let permission = key.permission();
                let view_menu = key.view_menu();
                CatalogPredicate::SqlLabOnly.matches(rules, key)
                    || rules.sql_lab_view_menus.contains(view_menu)
                    || rules.sql_lab_permissions.contains(permission)
                    || (rules.user_model_views.contains(view_menu) && permission == "can_list")
            }
            Self::Granter => rules.granter_permissions.contains(key.permission()),
        }
    }
}

/// Classification sets consulted by [`CatalogPredicate`] and [`RoleClassifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCatalogRules {
    /// Views that only admins may mutate.
    pub read_only_model_views: BTreeSet<String>,
    /// User management views.
    pub user_model_views: BTreeSet<String>,
    /// Views that only alphas may mutate.
    pub gamma_read_only_model_views: BTreeSet<String>,
    /// Menus reserved to admins.
    pub admin_only_view_menus: BTreeSet<String>,
    /// Menus reserved to alphas and admins.
    pub alpha_only_view_menus: BTreeSet<String>,
    /// Permissions reserved to admins.
    pub admin_only_permissions: BTreeSet<String>,
    /// Non-mutating permissions.
    pub read_only_permissions: BTreeSet<String>,
    /// Permissions reserved to alphas and admins.
    pub alpha_only_permissions: BTreeSet<String>,
    /// Permissions granted to every built-in role.
    pub accessible_permissions: BTreeSet<String>,
    /// Exact `(permission, view menu)` pairs reserved to the SQL editor role.
    pub sql_lab_only_pairs: BTreeSet<(String, String)>,
    /// Menus belonging to the SQL editor.
    pub sql_lab_view_menus: BTreeSet<String>,
    /// Permissions belonging to the SQL editor.
    pub sql_lab_permissions: BTreeSet<String>,
    /// Permissions held by the granter role.
    pub granter_permissions: BTreeSet<String>,
}

fn string_set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

impl Default for PermissionCatalogRules {
    fn default() -> Self {
        let read_only_model_views = string_set(&["Database", "DatabaseView", "DynamicPlugin"]);
        let user_model_views = string_set(&[
            "UserDBModelView",
            "UserLDAPModelView",
            "UserOAuthModelView",
            "UserOIDModelView",
            "UserRemoteUserModelView",
        ]);

        let mut gamma_read_only_model_views = string_set(&[
            "Dataset",
            "Datasource",
            "SqlMetricInlineView",
            "TableColumnInlineView",
            "TableModelView",
        ]);
        gamma_read_only_model_views.extend(read_only_model_views.iter().cloned());

        let mut admin_only_view_menus = string_set(&[
            "AccessRequestsModelView",
            "SQL Lab",
            "Refresh Druid Metadata",
            "ResetPasswordView",
            "RoleModelView",
            "Log",
            "List Users",
            "List Roles",
            "Row Level Security",
            "Row Level Security Filters",
            "RowLevelSecurityFiltersModelView",
            "Security",
            "SQL Editor",
            "Query Search",
            "Saved Queries",
        ]);
        admin_only_view_menus.extend(user_model_views.iter().cloned());

        let sql_lab_only_pairs = [
            ("can_my_queries", "SqlLab"),
            ("can_read", "SavedQuery"),
            ("can_write", "SavedQuery"),
            ("can_export", "SavedQuery"),
            ("can_read", "Query"),
            ("can_export_csv", "Query"),
            ("can_get_results", "SQLLab"),
            ("can_execute_sql_query", "SQLLab"),
            ("can_estimate_query_cost", "SQL Lab"),
            ("can_export_csv", "SQLLab"),
            ("can_sqllab_history", "Superset"),
            ("can_sqllab_viz", "Superset"),
            ("can_sqllab_table_viz", "Superset"),
            ("can_sqllab", "Superset"),
            ("can_activate", "TabStateView"),
            ("can_get", "TabStateView"),
            ("can_delete_query", "TabStateView"),
            ("can_post", "TabStateView"),
            ("can_delete", "TabStateView"),
            ("can_put", "TabStateView"),
            ("can_migrate_query", "TabStateView"),
            ("menu_access", "SQL Lab"),
            ("menu_access", "SQL Editor"),
            ("menu_access", "Saved Queries"),
            ("menu_access", "Query Search"),
        ]
        .iter()
        .map(|(permission, view_menu)| ((*permission).to_owned(), (*view_menu).to_owned()))
        .collect();

        Self {
            read_only_model_views,
            user_model_views,
            gamma_read_only_model_views,
            admin_only_view_menus,
            alpha_only_view_menus: string_set(&["Manage", "CSS Templates", "Annotation Layers"]),
            admin_only_permissions: string_set(&[
                "can_update_role",
                "all_query_access",
                "can_grant_guest_token",
                "can_set_embedded",
                "can_warm_up_cache",
                "can_override_role_permissions",
                "can_approve",
            ]),
            read_only_permissions: string_set(&[
                "can_show",
                "can_list",
                "can_get",
                "can_external_metadata",
                "can_external_metadata_by_name",
                "can_read",
            ]),
            alpha_only_permissions: string_set(&[
                "muldelete",
                "all_database_access",
                "all_datasource_access",
            ]),
            accessible_permissions: string_set(&["can_userinfo", "resetmypassword", "can_recent_activity"]),
            sql_lab_only_pairs,
            sql_lab_view_menus: string_set(&["SQL Lab", "SQL Editor", "Query Search", "Saved Queries"]),
            sql_lab_permissions: string_set(&[
                "can_sql_json",
                "can_csv",
                "can_search_queries",
                "can_sqllab_viz",
                "can_sqllab",
            ]),
            granter_permissions: string_set(&["can_override_role_permissions", "can_approve"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BuiltinRole, CatalogPredicate, PermissionCatalogRules, RoleClassifier};
    use crate::{GrantKey, PermissionKind};

    fn key(permission: &str, view_menu: &str) -> GrantKey {
        GrantKey::new(permission, view_menu).unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn admin_holds_everything_but_object_permissions() {
        let rules = PermissionCatalogRules::default();
        assert!(RoleClassifier::Admin.matches(&rules, &key("can_write", "RoleModelView")));
        assert!(RoleClassifier::Admin.matches(
            &rules,
            &key("all_datasource_access", "all_datasource_access")
        ));
        assert!(!RoleClassifier::Admin.matches(
            &rules,
            &key(PermissionKind::DatabaseAccess.as_str(), "[sales].(id:1)")
        ));
    }

    #[test]
    fn alpha_excludes_admin_and_sql_lab_only_grants() {
        let rules = PermissionCatalogRules::default();
        assert!(RoleClassifier::Alpha.matches(&rules, &key("can_write", "Dataset")));
        assert!(RoleClassifier::Alpha.matches(
            &rules,
            &key("all_database_access", "all_database_access")
        ));
        assert!(!RoleClassifier::Alpha.matches(&rules, &key("can_write", "RoleModelView")));
        assert!(!RoleClassifier::Alpha.matches(&rules, &key("can_read", "SavedQuery")));
    }

    #[test]
    fn gamma_only_reads_gamma_read_only_views() {
        let rules = PermissionCatalogRules::default();
        assert!(RoleClassifier::Gamma.matches(&rules, &key("can_read", "Dataset")));
        assert!(!RoleClassifier::Gamma.matches(&rules, &key("can_write", "Dataset")));
        assert!(!RoleClassifier::Gamma.matches(
            &rules,
            &key("all_datasource_access", "all_datasource_access")
        ));
        assert!(RoleClassifier::Gamma.matches(&rules, &key("can_userinfo", "UserDBModelView")));
    }

    #[test]
    fn sql_lab_and_granter_are_narrow() {
        let rules = PermissionCatalogRules::default();
        assert!(RoleClassifier::SqlLab.matches(&rules, &key("can_read", "SavedQuery")));
        assert!(RoleClassifier::SqlLab.matches(&rules, &key("can_list", "UserDBModelView")));
        assert!(!RoleClassifier::SqlLab.matches(&rules, &key("can_read", "Dashboard")));

        assert!(RoleClassifier::Granter.matches(&rules, &key("can_approve", "Superset")));
        assert!(!RoleClassifier::Granter.matches(&rules, &key("can_read", "Dashboard")));
    }

    #[test]
    fn admin_only_covers_mutations_on_read_only_views() {
        let rules = PermissionCatalogRules::default();
        assert!(CatalogPredicate::AdminOnly.matches(&rules, &key("can_write", "Database")));
        assert!(!CatalogPredicate::AdminOnly.matches(&rules, &key("can_read", "Database")));
    }

    #[test]
    fn public_role_has_no_classifier() {
        assert!(BuiltinRole::Public.classifier().is_none());
        assert!(
            BuiltinRole::synced()
                .iter()
                .all(|role| role.classifier().is_some())
        );
    }
}
