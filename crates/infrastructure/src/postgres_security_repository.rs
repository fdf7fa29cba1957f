use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{FromRow, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use vizgate_application::{
    DashboardRepository, EnsureOutcome, PermissionRegistry, RenameOutcome, RlsRuleRepository,
    RoleRepository, SecurityMetadataRepository,
};
use vizgate_core::{AppError, AppResult};
use vizgate_domain::{
    DashboardId, DashboardRecord, DatabaseId, DatabaseRecord, DatasetId, DatasetRecord,
    DatasourceType, EmbeddedDashboard, Grant, GrantId, GrantKey, RlsFilterType, RlsRuleId, Role,
    RoleId, RowLevelSecurityRule, UserId,
};

mod dashboards;
mod metadata;
mod registry;
mod roles;
mod unit_of_work;

pub use unit_of_work::PostgresSecurityUnitOfWork;

#[cfg(test)]
mod tests;

/// PostgreSQL-backed store for grants, roles and the security-relevant
/// slice of BI metadata.
///
/// Every fan-out write is a single conditional `UPDATE` keyed by the old
/// value, so the synchronizer can retry any step.
#[derive(Clone)]
pub struct PostgresSecurityRepository {
    pool: PgPool,
}

impl PostgresSecurityRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a transaction exposing the registry and metadata ports.
    ///
    /// Entity writes issued through
    /// [`PostgresSecurityUnitOfWork::connection`] and the synchronizer
    /// writes made through the ports commit or roll back together.
    pub async fn begin(&self) -> AppResult<PostgresSecurityUnitOfWork> {
        let transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin transaction: {error}"))
        })?;

        Ok(PostgresSecurityUnitOfWork::new(transaction))
    }

    async fn connection(&self) -> AppResult<PoolConnection<Postgres>> {
        self.pool.acquire().await.map_err(|error| {
            AppError::Internal(format!("failed to acquire database connection: {error}"))
        })
    }
}

#[derive(Debug, FromRow)]
struct GrantRow {
    id: i64,
    permission: String,
    view_menu: String,
}

impl GrantRow {
    fn into_grant(self) -> AppResult<Grant> {
        Ok(Grant::new(GrantId::new(self.id), decode_key(self.permission, self.view_menu)?))
    }
}

#[derive(Debug, FromRow)]
struct GrantKeyRow {
    permission: String,
    view_menu: String,
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: i64,
    name: String,
}

impl RoleRow {
    fn into_role(self) -> AppResult<Role> {
        Role::new(RoleId::new(self.id), self.name.as_str()).map_err(|error| {
            AppError::Internal(format!("failed to decode role '{}': {error}", self.id))
        })
    }
}

#[derive(Debug, FromRow)]
struct DatabaseRow {
    id: i64,
    database_name: String,
}

impl DatabaseRow {
    fn into_record(self) -> AppResult<DatabaseRecord> {
        DatabaseRecord::new(DatabaseId::new(self.id), self.database_name).map_err(|error| {
            AppError::Internal(format!("failed to decode database '{}': {error}", self.id))
        })
    }
}

#[derive(Debug, FromRow)]
struct DatasetRow {
    id: i64,
    table_name: String,
    database_id: i64,
    schema_name: Option<String>,
    owners: Vec<i64>,
    perm: Option<String>,
    schema_perm: Option<String>,
}

impl DatasetRow {
    fn into_record(self) -> AppResult<DatasetRecord> {
        let dataset = DatasetRecord::new(
            DatasetId::new(self.id),
            self.table_name,
            DatabaseId::new(self.database_id),
            self.schema_name,
            self.owners.into_iter().map(UserId::new).collect(),
        )
        .map_err(|error| {
            AppError::Internal(format!("failed to decode dataset '{}': {error}", self.id))
        })?;

        Ok(dataset.with_stored_perms(self.perm, self.schema_perm))
    }
}

#[derive(Debug, FromRow)]
struct DashboardRow {
    id: i64,
    title: String,
    published: bool,
    owners: Vec<i64>,
    role_ids: Vec<i64>,
    dataset_ids: Vec<i64>,
}

impl DashboardRow {
    fn into_record(self) -> AppResult<DashboardRecord> {
        DashboardRecord::new(
            DashboardId::new(self.id),
            self.title,
            self.published,
            self.owners.into_iter().map(UserId::new).collect(),
            self.role_ids.into_iter().map(RoleId::new).collect(),
            self.dataset_ids.into_iter().map(DatasetId::new).collect(),
        )
        .map_err(|error| {
            AppError::Internal(format!("failed to decode dashboard '{}': {error}", self.id))
        })
    }
}

#[derive(Debug, FromRow)]
struct EmbeddedDashboardRow {
    uuid: Uuid,
    dashboard_id: i64,
    allowed_domains: Vec<String>,
}

impl EmbeddedDashboardRow {
    fn into_record(self) -> EmbeddedDashboard {
        EmbeddedDashboard::new(
            self.uuid,
            DashboardId::new(self.dashboard_id),
            self.allowed_domains,
        )
    }
}

#[derive(Debug, FromRow)]
struct RlsFilterRow {
    id: i64,
    filter_type: String,
    clause: String,
    group_key: Option<String>,
    role_ids: Vec<i64>,
    dataset_ids: Vec<i64>,
}

impl RlsFilterRow {
    fn into_rule(self) -> AppResult<RowLevelSecurityRule> {
        let filter_type = RlsFilterType::from_str(self.filter_type.as_str()).map_err(|error| {
            AppError::Internal(format!(
                "failed to decode filter type of rls rule '{}': {error}",
                self.id
            ))
        })?;

        RowLevelSecurityRule::new(
            RlsRuleId::new(self.id),
            filter_type,
            self.clause,
            self.group_key,
            self.role_ids.into_iter().map(RoleId::new).collect(),
            self.dataset_ids.into_iter().map(DatasetId::new).collect(),
        )
        .map_err(|error| AppError::Internal(format!("failed to decode rls rule '{}': {error}", self.id)))
    }
}

fn decode_key(permission: String, view_menu: String) -> AppResult<GrantKey> {
    GrantKey::new(permission.as_str(), view_menu.as_str()).map_err(|error| {
        AppError::Internal(format!(
            "failed to decode grant '{permission} on {view_menu}': {error}"
        ))
    })
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(database_error) = error
        && database_error.code().as_deref() == Some("23505")
    {
        return true;
    }

    false
}

#[async_trait]
impl PermissionRegistry for PostgresSecurityRepository {
    async fn find_grant(&self, key: &GrantKey) -> AppResult<Option<Grant>> {
        let mut connection = self.connection().await?;
        registry::find_grant(&mut connection, key).await
    }

    async fn ensure_grant(&self, key: &GrantKey) -> AppResult<EnsureOutcome> {
        let mut connection = self.connection().await?;
        registry::ensure_grant(&mut connection, key).await
    }

    async fn delete_grant(&self, key: &GrantKey) -> AppResult<bool> {
        let mut connection = self.connection().await?;
        registry::delete_grant(&mut connection, key).await
    }

    async fn rename_grant(
        &self,
        permission: &str,
        old_view_menu: &str,
        new_view_menu: &str,
    ) -> AppResult<RenameOutcome> {
        let mut connection = self.connection().await?;
        registry::rename_grant(&mut connection, permission, old_view_menu, new_view_menu).await
    }

    async fn delete_grants_by_prefix(
        &self,
        permission: &str,
        view_menu_prefix: &str,
    ) -> AppResult<Vec<GrantKey>> {
        let mut connection = self.connection().await?;
        registry::delete_grants_by_prefix(&mut connection, permission, view_menu_prefix).await
    }

    async fn list_grants_by_prefix(
        &self,
        permission: &str,
        view_menu_prefix: &str,
    ) -> AppResult<Vec<GrantKey>> {
        let mut connection = self.connection().await?;
        registry::list_grants_by_prefix(&mut connection, permission, view_menu_prefix).await
    }

    async fn list_grants(&self) -> AppResult<Vec<Grant>> {
        let mut connection = self.connection().await?;
        registry::list_grants(&mut connection).await
    }
}

#[async_trait]
impl RoleRepository for PostgresSecurityRepository {
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        self.find_role_by_name_impl(name).await
    }

    async fn add_role(&self, name: &str) -> AppResult<Role> {
        self.add_role_impl(name).await
    }

    async fn list_roles_by_ids(&self, role_ids: &BTreeSet<RoleId>) -> AppResult<Vec<Role>> {
        self.list_roles_by_ids_impl(role_ids).await
    }

    async fn list_role_grants(&self, role_id: RoleId) -> AppResult<Vec<Grant>> {
        self.list_role_grants_impl(role_id).await
    }

    async fn replace_role_grants(
        &self,
        role_id: RoleId,
        grant_ids: &BTreeSet<GrantId>,
    ) -> AppResult<()> {
        self.replace_role_grants_impl(role_id, grant_ids).await
    }

    async fn list_grant_keys_for_roles(
        &self,
        role_ids: &BTreeSet<RoleId>,
    ) -> AppResult<Vec<GrantKey>> {
        self.list_grant_keys_for_roles_impl(role_ids).await
    }
}

#[async_trait]
impl SecurityMetadataRepository for PostgresSecurityRepository {
    async fn find_database(&self, database_id: DatabaseId) -> AppResult<Option<DatabaseRecord>> {
        let mut connection = self.connection().await?;
        metadata::find_database(&mut connection, database_id).await
    }

    async fn list_databases(&self) -> AppResult<Vec<DatabaseRecord>> {
        let mut connection = self.connection().await?;
        metadata::list_databases(&mut connection).await
    }

    async fn find_dataset(&self, dataset_id: DatasetId) -> AppResult<Option<DatasetRecord>> {
        let mut connection = self.connection().await?;
        metadata::find_dataset(&mut connection, dataset_id).await
    }

    async fn list_datasets(&self) -> AppResult<Vec<DatasetRecord>> {
        let mut connection = self.connection().await?;
        metadata::list_datasets(&mut connection, None).await
    }

    async fn list_datasets_for_database(
        &self,
        database_id: DatabaseId,
    ) -> AppResult<Vec<DatasetRecord>> {
        let mut connection = self.connection().await?;
        metadata::list_datasets(&mut connection, Some(database_id)).await
    }

    async fn find_datasets_by_table(
        &self,
        database_id: DatabaseId,
        schema: Option<&str>,
        table_name: &str,
    ) -> AppResult<Vec<DatasetRecord>> {
        let mut connection = self.connection().await?;
        metadata::find_datasets_by_table(&mut connection, database_id, schema, table_name).await
    }

    async fn update_dataset_perms(
        &self,
        dataset_id: DatasetId,
        perm: &str,
        schema_perm: Option<&str>,
    ) -> AppResult<()> {
        let mut connection = self.connection().await?;
        metadata::update_dataset_perms(&mut connection, dataset_id, perm, schema_perm).await
    }

    async fn update_chart_perms(&self, old_perm: &str, new_perm: &str) -> AppResult<u64> {
        let mut connection = self.connection().await?;
        metadata::update_chart_perms(&mut connection, old_perm, new_perm).await
    }

    async fn update_chart_schema_perms(
        &self,
        datasource_id: DatasetId,
        datasource_type: DatasourceType,
        schema_perm: Option<&str>,
    ) -> AppResult<u64> {
        let mut connection = self.connection().await?;
        metadata::update_chart_schema_perms(
            &mut connection,
            datasource_id,
            datasource_type,
            schema_perm,
        )
        .await
    }
}

#[async_trait]
impl DashboardRepository for PostgresSecurityRepository {
    async fn find_dashboard(
        &self,
        dashboard_id: DashboardId,
    ) -> AppResult<Option<DashboardRecord>> {
        self.find_dashboard_impl(dashboard_id).await
    }

    async fn list_dashboards_for_dataset(
        &self,
        dataset_id: DatasetId,
    ) -> AppResult<Vec<DashboardRecord>> {
        self.list_dashboards_for_dataset_impl(dataset_id).await
    }

    async fn find_embedded_dashboard(&self, uuid: Uuid) -> AppResult<Option<EmbeddedDashboard>> {
        self.find_embedded_dashboard_impl(uuid).await
    }

    async fn list_embedded_for_dashboard(
        &self,
        dashboard_id: DashboardId,
    ) -> AppResult<Vec<EmbeddedDashboard>> {
        self.list_embedded_for_dashboard_impl(dashboard_id).await
    }
}

#[async_trait]
impl RlsRuleRepository for PostgresSecurityRepository {
    async fn list_rules_for_dataset(
        &self,
        dataset_id: DatasetId,
    ) -> AppResult<Vec<RowLevelSecurityRule>> {
        let rows = sqlx::query_as::<_, RlsFilterRow>(
            r#"
            SELECT id, filter_type, clause, group_key, role_ids, dataset_ids
            FROM rls_filters
            WHERE $1 = ANY(dataset_ids)
            ORDER BY id
            "#,
        )
        .bind(dataset_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list rls rules: {error}")))?;

        rows.into_iter().map(RlsFilterRow::into_rule).collect()
    }
}
