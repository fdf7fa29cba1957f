use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use vizgate_core::{AccessDenial, AppError, AppResult, DenialKind};
use vizgate_domain::{
    BuiltinRole, ChartRecord, DashboardRecord, DatabaseRecord, DatasetRecord, PermissionKind,
    Principal, Role, RoleId, TableRef, UserId, database_perm, dataset_perm, schema_perm,
};

use crate::SecurityConfig;
use crate::security_ports::{
    DashboardRepository, RlsRuleRepository, RoleRepository, SecurityMetadataRepository,
};

mod listing;
mod rls;

/// A resource an access check is evaluated against.
#[derive(Debug, Clone, Copy)]
pub enum AccessTarget<'a> {
    /// A registered database.
    Database(&'a DatabaseRecord),
    /// A registered dataset.
    Dataset(&'a DatasetRecord),
    /// A chart; accessible when its dataset is.
    Chart(&'a ChartRecord),
    /// A dashboard.
    Dashboard(&'a DashboardRecord),
    /// Physical tables referenced by free-form SQL.
    Query {
        /// Database the SQL runs against.
        database: &'a DatabaseRecord,
        /// Schema applied to unqualified table references.
        default_schema: Option<&'a str>,
        /// Referenced tables.
        tables: &'a [TableRef],
    },
}

/// Request-time authorization evaluator.
///
/// The principal is passed explicitly to every call; nothing is cached
/// between calls.
#[derive(Clone)]
pub struct AccessService {
    roles: Arc<dyn RoleRepository>,
    metadata: Arc<dyn SecurityMetadataRepository>,
    dashboards: Arc<dyn DashboardRepository>,
    rls_rules: Arc<dyn RlsRuleRepository>,
    config: SecurityConfig,
}

/// Grants and roles resolved for one principal.
struct EffectiveAccess {
    role_ids: BTreeSet<RoleId>,
    is_admin: bool,
    grants: BTreeMap<String, BTreeSet<String>>,
}

impl EffectiveAccess {
    fn holds(&self, permission: &str, view_menu: &str) -> bool {
        self.grants
            .get(permission)
            .is_some_and(|view_menus| view_menus.contains(view_menu))
    }

    fn holds_kind(&self, kind: PermissionKind, view_menu: &str) -> bool {
        self.holds(kind.as_str(), view_menu)
    }

    fn holds_wildcard(&self, kind: PermissionKind) -> bool {
        self.holds(kind.as_str(), kind.as_str())
    }

    fn all_data_access(&self) -> bool {
        self.holds_wildcard(PermissionKind::AllDatasourceAccess)
            || self.holds_wildcard(PermissionKind::AllDatabaseAccess)
    }

    fn database_access(&self, database: &DatabaseRecord) -> bool {
        self.all_data_access()
            || self.holds_kind(
                PermissionKind::DatabaseAccess,
                &database_perm(database.id(), database.name()),
            )
    }

    fn view_menus(&self, permission: &str) -> BTreeSet<String> {
        self.grants.get(permission).cloned().unwrap_or_default()
    }
}

impl AccessService {
    /// Creates a new evaluator from required dependencies.
    #[must_use]
    pub fn new(
        roles: Arc<dyn RoleRepository>,
        metadata: Arc<dyn SecurityMetadataRepository>,
        dashboards: Arc<dyn DashboardRepository>,
        rls_rules: Arc<dyn RlsRuleRepository>,
        config: SecurityConfig,
    ) -> Self {
        Self {
            roles,
            metadata,
            dashboards,
            rls_rules,
            config,
        }
    }

    /// Returns `Ok(())` when the principal may access `target`, or an
    /// [`AppError::AccessDenied`] naming every denied resource.
    pub async fn raise_for_access(
        &self,
        principal: &Principal,
        target: AccessTarget<'_>,
    ) -> AppResult<()> {
        let access = self.resolve_access(principal).await?;

        match target {
            AccessTarget::Database(database) => {
                if access.database_access(database) {
                    return Ok(());
                }

                Err(self.denial(
                    DenialKind::Database,
                    format!(
                        "This endpoint requires the database {}, `all_database_access` or `all_datasource_access` permission",
                        database.name()
                    ),
                    vec![database.name().to_owned()],
                ))
            }
            AccessTarget::Dataset(dataset) => {
                if self.dataset_accessible(principal, &access, dataset).await? {
                    return Ok(());
                }

                Err(self.dataset_denial(dataset))
            }
            AccessTarget::Chart(chart) => {
                if access.is_admin {
                    return Ok(());
                }

                let Some(dataset) = self.metadata.find_dataset(chart.datasource_id()).await?
                else {
                    return Err(self.denial(
                        DenialKind::Chart,
                        format!(
                            "Chart {} reads from a datasource that no longer exists",
                            chart.id()
                        ),
                        vec![chart.id().to_string()],
                    ));
                };

                if self.dataset_accessible(principal, &access, &dataset).await? {
                    return Ok(());
                }

                Err(self.denial(
                    DenialKind::Chart,
                    format!(
                        "This endpoint requires the datasource {} of chart {}, database or `all_datasource_access` permission",
                        dataset.table_name(),
                        chart.id()
                    ),
                    vec![chart.id().to_string()],
                ))
            }
            AccessTarget::Dashboard(dashboard) => {
                if self
                    .dashboard_viewable(principal, &access, dashboard)
                    .await?
                {
                    return Ok(());
                }

                Err(self.denial(
                    DenialKind::Dashboard,
                    format!("You don't have access to the dashboard {}", dashboard.title()),
                    vec![dashboard.id().to_string()],
                ))
            }
            AccessTarget::Query {
                database,
                default_schema,
                tables,
            } => {
                let denied = self
                    .denied_tables(principal, &access, database, tables, default_schema)
                    .await?;
                if denied.is_empty() {
                    return Ok(());
                }

                let names: Vec<String> = denied.iter().map(ToString::to_string).collect();
                let quoted = names
                    .iter()
                    .map(|name| format!("`{name}`"))
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(self.denial(
                    DenialKind::Table,
                    format!(
                        "You need access to the following tables: {quoted}, `all_database_access` or `all_datasource_access` permission"
                    ),
                    names,
                ))
            }
        }
    }

    /// Returns whether [`AccessService::raise_for_access`] would allow.
    pub async fn has_access(
        &self,
        principal: &Principal,
        target: AccessTarget<'_>,
    ) -> AppResult<bool> {
        match self.raise_for_access(principal, target).await {
            Ok(()) => Ok(true),
            Err(AppError::AccessDenied(_)) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Returns whether the principal holds one exact grant.
    pub async fn can_access(
        &self,
        principal: &Principal,
        permission: &str,
        view_menu: &str,
    ) -> AppResult<bool> {
        Ok(self
            .resolve_access(principal)
            .await?
            .holds(permission, view_menu))
    }

    /// Returns whether the principal holds `all_datasource_access`.
    pub async fn all_datasource_access(&self, principal: &Principal) -> AppResult<bool> {
        self.holds_wildcard(principal, PermissionKind::AllDatasourceAccess)
            .await
    }

    /// Returns whether the principal holds `all_database_access`.
    pub async fn all_database_access(&self, principal: &Principal) -> AppResult<bool> {
        self.holds_wildcard(principal, PermissionKind::AllDatabaseAccess)
            .await
    }

    /// Returns whether the principal may see every saved query.
    pub async fn can_access_all_queries(&self, principal: &Principal) -> AppResult<bool> {
        self.holds_wildcard(principal, PermissionKind::AllQueryAccess)
            .await
    }

    /// Returns whether the principal holds the built-in admin role.
    pub async fn is_admin(&self, principal: &Principal) -> AppResult<bool> {
        Ok(self.resolve_access(principal).await?.is_admin)
    }

    /// Requires the principal to be an admin or one of `owners`.
    pub async fn raise_for_ownership(
        &self,
        principal: &Principal,
        owners: &[UserId],
    ) -> AppResult<()> {
        if principal.is_owner(owners) || self.is_admin(principal).await? {
            return Ok(());
        }

        Err(self.denial(
            DenialKind::Ownership,
            "You don't have the rights to alter this resource".to_owned(),
            Vec::new(),
        ))
    }

    /// Requires the principal to be allowed to read `user_id`'s activity.
    pub async fn raise_for_activity_access(
        &self,
        principal: &Principal,
        user_id: UserId,
    ) -> AppResult<()> {
        let Some(actor) = principal.user_id() else {
            return Err(self.activity_denial());
        };

        if actor == user_id || self.config.enable_broad_activity_access {
            return Ok(());
        }

        if self.is_admin(principal).await? {
            return Ok(());
        }

        Err(self.activity_denial())
    }

    async fn holds_wildcard(&self, principal: &Principal, kind: PermissionKind) -> AppResult<bool> {
        Ok(self
            .resolve_access(principal)
            .await?
            .holds_wildcard(kind))
    }

    /// Steps one to six of the dataset decision.
    async fn dataset_accessible(
        &self,
        principal: &Principal,
        access: &EffectiveAccess,
        dataset: &DatasetRecord,
    ) -> AppResult<bool> {
        if self.dataset_granted(principal, access, dataset).await? {
            return Ok(true);
        }

        if !self.config.dashboard_rbac && principal.as_guest().is_none() {
            return Ok(false);
        }

        for dashboard in self
            .dashboards
            .list_dashboards_for_dataset(dataset.id())
            .await?
        {
            if self
                .dashboard_viewable(principal, access, &dashboard)
                .await?
            {
                debug!(
                    dataset_id = %dataset.id(),
                    dashboard_id = %dashboard.id(),
                    principal = principal.display_name(),
                    "dataset reachable through dashboard"
                );
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Wildcards, database, schema and datasource grants, then ownership.
    async fn dataset_granted(
        &self,
        principal: &Principal,
        access: &EffectiveAccess,
        dataset: &DatasetRecord,
    ) -> AppResult<bool> {
        if access.all_data_access() {
            return Ok(true);
        }

        let database = self.metadata.find_database(dataset.database_id()).await?;
        if database
            .as_ref()
            .is_some_and(|database| access.database_access(database))
        {
            return Ok(true);
        }

        let schema_perm = dataset.schema_perm().map(str::to_owned).or_else(|| {
            database
                .as_ref()
                .and_then(|database| schema_perm(database.name(), dataset.schema()))
        });
        if schema_perm
            .as_deref()
            .is_some_and(|view_menu| access.holds_kind(PermissionKind::SchemaAccess, view_menu))
        {
            return Ok(true);
        }

        let perm = dataset.perm().map(str::to_owned).or_else(|| {
            database.as_ref().map(|database| {
                dataset_perm(dataset.id(), dataset.table_name(), database.name())
            })
        });
        if perm
            .as_deref()
            .is_some_and(|view_menu| access.holds_kind(PermissionKind::DatasourceAccess, view_menu))
        {
            return Ok(true);
        }

        Ok(principal.is_owner(dataset.owners()))
    }

    async fn dashboard_viewable(
        &self,
        principal: &Principal,
        access: &EffectiveAccess,
        dashboard: &DashboardRecord,
    ) -> AppResult<bool> {
        if let Some(guest) = principal.as_guest() {
            let embed_ids: Vec<String> = self
                .dashboards
                .list_embedded_for_dashboard(dashboard.id())
                .await?
                .iter()
                .map(|embedded| embedded.uuid().to_string())
                .collect();
            return Ok(guest.has_dashboard_resource(dashboard.id(), &embed_ids));
        }

        if access.is_admin || principal.is_owner(dashboard.owners()) {
            return Ok(true);
        }

        if self.config.dashboard_rbac && !dashboard.roles().is_empty() {
            return Ok(dashboard.published()
                && dashboard
                    .roles()
                    .iter()
                    .any(|role_id| access.role_ids.contains(role_id)));
        }

        if dashboard.datasets().is_empty() {
            return Ok(true);
        }

        for dataset_id in dashboard.datasets() {
            let Some(dataset) = self.metadata.find_dataset(*dataset_id).await? else {
                continue;
            };
            if self.dataset_granted(principal, access, &dataset).await? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn denied_tables(
        &self,
        principal: &Principal,
        access: &EffectiveAccess,
        database: &DatabaseRecord,
        tables: &[TableRef],
        default_schema: Option<&str>,
    ) -> AppResult<Vec<TableRef>> {
        if access.database_access(database) {
            return Ok(Vec::new());
        }

        let mut denied = Vec::new();
        for table in tables {
            let resolved = table.with_default_schema(default_schema);
            if !self
                .table_accessible(principal, access, database, &resolved)
                .await?
            {
                denied.push(table.clone());
            }
        }

        Ok(denied)
    }

    async fn table_accessible(
        &self,
        principal: &Principal,
        access: &EffectiveAccess,
        database: &DatabaseRecord,
        table: &TableRef,
    ) -> AppResult<bool> {
        if schema_perm(database.name(), table.schema())
            .is_some_and(|view_menu| access.holds_kind(PermissionKind::SchemaAccess, &view_menu))
        {
            return Ok(true);
        }

        // One accessible dataset over the table is enough.
        for dataset in self
            .metadata
            .find_datasets_by_table(database.id(), table.schema(), table.table())
            .await?
        {
            let perm = dataset.perm().map(str::to_owned).unwrap_or_else(|| {
                dataset_perm(dataset.id(), dataset.table_name(), database.name())
            });
            if access.holds_kind(PermissionKind::DatasourceAccess, &perm)
                || principal.is_owner(dataset.owners())
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn resolve_access(&self, principal: &Principal) -> AppResult<EffectiveAccess> {
        let roles = match principal {
            Principal::Registered(user) => self.roles.list_roles_by_ids(user.roles()).await?,
            Principal::Guest(_) => self.roles_named(&self.config.guest_role_name).await?,
            Principal::Anonymous => self.roles_named(BuiltinRole::Public.name()).await?,
        };

        let role_ids: BTreeSet<RoleId> = roles.iter().map(Role::id).collect();
        let is_admin = principal.as_guest().is_none() && roles.iter().any(Role::is_admin);

        let mut grants: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        if !role_ids.is_empty() {
            for key in self.roles.list_grant_keys_for_roles(&role_ids).await? {
                grants
                    .entry(key.permission().to_owned())
                    .or_default()
                    .insert(key.view_menu().to_owned());
            }
        }

        Ok(EffectiveAccess {
            role_ids,
            is_admin,
            grants,
        })
    }

    async fn roles_named(&self, name: &str) -> AppResult<Vec<Role>> {
        Ok(self
            .roles
            .find_role_by_name(name)
            .await?
            .into_iter()
            .collect())
    }

    fn dataset_denial(&self, dataset: &DatasetRecord) -> AppError {
        self.denial(
            DenialKind::Datasource,
            format!(
                "This endpoint requires the datasource {}, database or `all_datasource_access` permission",
                dataset.table_name()
            ),
            vec![dataset.qualified_name()],
        )
    }

    fn activity_denial(&self) -> AppError {
        self.denial(
            DenialKind::Activity,
            "Access to user's activity data is restricted".to_owned(),
            Vec::new(),
        )
    }

    fn denial(&self, kind: DenialKind, message: String, resources: Vec<String>) -> AppError {
        AppError::AccessDenied(AccessDenial::new(
            kind,
            message,
            resources,
            self.config.permission_instructions_link.clone(),
        ))
    }
}
