use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use vizgate_application::{
    DashboardRepository, EnsureOutcome, GrantEvent, GrantEventSink, PermissionRegistry,
    RenameOutcome, RlsRuleRepository, RoleRepository, SecurityMetadataRepository,
};
use vizgate_core::{AppError, AppResult};
use vizgate_domain::{
    ChartId, ChartRecord, DashboardId, DashboardRecord, DatabaseId, DatabaseRecord, DatasetId,
    DatasetRecord, DatasourceType, EmbeddedDashboard, EntityChange, Grant, GrantId, GrantKey,
    RlsRuleId, Role, RoleId, RowLevelSecurityRule,
};

#[derive(Debug, Default)]
struct SecurityState {
    next_grant_id: i64,
    next_role_id: i64,
    grants: BTreeMap<GrantId, GrantKey>,
    roles: BTreeMap<RoleId, Role>,
    role_grants: BTreeMap<RoleId, BTreeSet<GrantId>>,
    databases: BTreeMap<DatabaseId, DatabaseRecord>,
    datasets: BTreeMap<DatasetId, DatasetRecord>,
    charts: BTreeMap<ChartId, ChartRecord>,
    dashboards: BTreeMap<DashboardId, DashboardRecord>,
    embedded: BTreeMap<Uuid, EmbeddedDashboard>,
    rls_rules: BTreeMap<RlsRuleId, RowLevelSecurityRule>,
    events: Vec<GrantEvent>,
}

impl SecurityState {
    fn grant_id(&self, key: &GrantKey) -> Option<GrantId> {
        self.grants
            .iter()
            .find_map(|(grant_id, stored)| (stored == key).then_some(*grant_id))
    }

    fn insert_grant(&mut self, key: GrantKey) -> Grant {
        self.next_grant_id += 1;
        let grant_id = GrantId::new(self.next_grant_id);
        self.grants.insert(grant_id, key.clone());
        Grant::new(grant_id, key)
    }

    fn remove_grant(&mut self, grant_id: GrantId) {
        self.grants.remove(&grant_id);
        for grant_ids in self.role_grants.values_mut() {
            grant_ids.remove(&grant_id);
        }
    }
}

/// In-memory security store implementing every persistence port.
///
/// One lock guards all tables, so each port call is atomic with respect to
/// the others.
#[derive(Debug, Default)]
pub struct InMemorySecurityRepository {
    state: RwLock<SecurityState>,
}

impl InMemorySecurityRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a database and returns the change to hand to the synchronizer.
    pub async fn save_database(&self, database: DatabaseRecord) -> EntityChange<DatabaseRecord> {
        let mut state = self.state.write().await;
        match state.databases.insert(database.id(), database.clone()) {
            Some(old) => EntityChange::updated(old, database),
            None => EntityChange::created(database),
        }
    }

    /// Removes a database row, returning it when it existed.
    pub async fn remove_database(&self, database_id: DatabaseId) -> Option<DatabaseRecord> {
        self.state.write().await.databases.remove(&database_id)
    }

    /// Stores a dataset and returns the change to hand to the synchronizer.
    ///
    /// Derived fields of an existing row are carried over; only the
    /// synchronizer rewrites them.
    pub async fn save_dataset(&self, dataset: DatasetRecord) -> EntityChange<DatasetRecord> {
        let mut state = self.state.write().await;
        let old = state.datasets.get(&dataset.id()).cloned();
        let dataset = match old.as_ref() {
            Some(old) => dataset.with_stored_perms(
                old.perm().map(str::to_owned),
                old.schema_perm().map(str::to_owned),
            ),
            None => dataset,
        };
        state.datasets.insert(dataset.id(), dataset.clone());

        match old {
            Some(old) => EntityChange::updated(old, dataset),
            None => EntityChange::created(dataset),
        }
    }

    /// Removes a dataset row, returning it when it existed.
    pub async fn remove_dataset(&self, dataset_id: DatasetId) -> Option<DatasetRecord> {
        self.state.write().await.datasets.remove(&dataset_id)
    }

    /// Stores a chart, copying the derived fields of its dataset.
    pub async fn save_chart(&self, chart: ChartRecord) {
        let mut state = self.state.write().await;
        let chart = match (
            chart.datasource_type(),
            state.datasets.get(&chart.datasource_id()),
        ) {
            (DatasourceType::Table, Some(dataset)) => chart.with_stored_perms(
                dataset.perm().map(str::to_owned),
                dataset.schema_perm().map(str::to_owned),
            ),
            _ => chart,
        };
        state.charts.insert(chart.id(), chart);
    }

    /// Returns a stored chart.
    pub async fn find_chart(&self, chart_id: ChartId) -> Option<ChartRecord> {
        self.state.read().await.charts.get(&chart_id).cloned()
    }

    /// Stores a dashboard.
    pub async fn save_dashboard(&self, dashboard: DashboardRecord) {
        self.state
            .write()
            .await
            .dashboards
            .insert(dashboard.id(), dashboard);
    }

    /// Stores an embedding configuration.
    pub async fn save_embedded_dashboard(&self, embedded: EmbeddedDashboard) {
        self.state
            .write()
            .await
            .embedded
            .insert(embedded.uuid(), embedded);
    }

    /// Stores a row-level-security rule.
    pub async fn save_rls_rule(&self, rule: RowLevelSecurityRule) {
        self.state.write().await.rls_rules.insert(rule.id(), rule);
    }

    /// Returns every grant event recorded so far, oldest first.
    pub async fn recorded_events(&self) -> Vec<GrantEvent> {
        self.state.read().await.events.clone()
    }
}

#[async_trait]
impl PermissionRegistry for InMemorySecurityRepository {
    async fn find_grant(&self, key: &GrantKey) -> AppResult<Option<Grant>> {
        let state = self.state.read().await;
        Ok(state
            .grant_id(key)
            .map(|grant_id| Grant::new(grant_id, key.clone())))
    }

    async fn ensure_grant(&self, key: &GrantKey) -> AppResult<EnsureOutcome> {
        let mut state = self.state.write().await;
        if let Some(grant_id) = state.grant_id(key) {
            return Ok(EnsureOutcome::Existing(Grant::new(grant_id, key.clone())));
        }

        Ok(EnsureOutcome::Created(state.insert_grant(key.clone())))
    }

    async fn delete_grant(&self, key: &GrantKey) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let Some(grant_id) = state.grant_id(key) else {
            return Ok(false);
        };

        state.remove_grant(grant_id);
        Ok(true)
    }

    async fn rename_grant(
        &self,
        permission: &str,
        old_view_menu: &str,
        new_view_menu: &str,
    ) -> AppResult<RenameOutcome> {
        let old_key = GrantKey::new(permission, old_view_menu)?;
        let new_key = GrantKey::new(permission, new_view_menu)?;

        let mut state = self.state.write().await;
        let Some(source_id) = state.grant_id(&old_key) else {
            return Ok(RenameOutcome::SourceMissing);
        };

        if let Some(target_id) = state.grant_id(&new_key) {
            state.remove_grant(source_id);
            return Ok(RenameOutcome::MergedIntoExisting(Grant::new(
                target_id, new_key,
            )));
        }

        state.grants.insert(source_id, new_key.clone());
        Ok(RenameOutcome::Renamed(Grant::new(source_id, new_key)))
    }

    async fn delete_grants_by_prefix(
        &self,
        permission: &str,
        view_menu_prefix: &str,
    ) -> AppResult<Vec<GrantKey>> {
        let mut state = self.state.write().await;
        let matching: Vec<(GrantId, GrantKey)> = state
            .grants
            .iter()
            .filter(|(_, key)| {
                key.permission() == permission && key.view_menu().starts_with(view_menu_prefix)
            })
            .map(|(grant_id, key)| (*grant_id, key.clone()))
            .collect();

        for (grant_id, _) in &matching {
            state.remove_grant(*grant_id);
        }

        Ok(matching.into_iter().map(|(_, key)| key).collect())
    }

    async fn list_grants_by_prefix(
        &self,
        permission: &str,
        view_menu_prefix: &str,
    ) -> AppResult<Vec<GrantKey>> {
        let state = self.state.read().await;
        let mut keys: Vec<GrantKey> = state
            .grants
            .values()
            .filter(|key| {
                key.permission() == permission && key.view_menu().starts_with(view_menu_prefix)
            })
            .cloned()
            .collect();
        keys.sort();

        Ok(keys)
    }

    async fn list_grants(&self) -> AppResult<Vec<Grant>> {
        let state = self.state.read().await;
        let mut grants: Vec<Grant> = state
            .grants
            .iter()
            .map(|(grant_id, key)| Grant::new(*grant_id, key.clone()))
            .collect();
        grants.sort_by(|left, right| left.key().cmp(right.key()));

        Ok(grants)
    }
}

#[async_trait]
impl RoleRepository for InMemorySecurityRepository {
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.values().find(|role| role.name() == name).cloned())
    }

    async fn add_role(&self, name: &str) -> AppResult<Role> {
        let mut state = self.state.write().await;
        if let Some(role) = state.roles.values().find(|role| role.name() == name) {
            return Ok(role.clone());
        }

        state.next_role_id += 1;
        let role = Role::new(RoleId::new(state.next_role_id), name)?;
        state.roles.insert(role.id(), role.clone());
        Ok(role)
    }

    async fn list_roles_by_ids(&self, role_ids: &BTreeSet<RoleId>) -> AppResult<Vec<Role>> {
        let state = self.state.read().await;
        Ok(role_ids
            .iter()
            .filter_map(|role_id| state.roles.get(role_id).cloned())
            .collect())
    }

    async fn list_role_grants(&self, role_id: RoleId) -> AppResult<Vec<Grant>> {
        let state = self.state.read().await;
        let Some(grant_ids) = state.role_grants.get(&role_id) else {
            return Ok(Vec::new());
        };

        Ok(grant_ids
            .iter()
            .filter_map(|grant_id| {
                state
                    .grants
                    .get(grant_id)
                    .map(|key| Grant::new(*grant_id, key.clone()))
            })
            .collect())
    }

    async fn replace_role_grants(
        &self,
        role_id: RoleId,
        grant_ids: &BTreeSet<GrantId>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        if !state.roles.contains_key(&role_id) {
            return Err(AppError::NotFound(format!("role '{role_id}' does not exist")));
        }
        if let Some(unknown) = grant_ids
            .iter()
            .find(|grant_id| !state.grants.contains_key(grant_id))
        {
            return Err(AppError::NotFound(format!(
                "grant '{unknown}' does not exist"
            )));
        }

        state.role_grants.insert(role_id, grant_ids.clone());
        Ok(())
    }

    async fn list_grant_keys_for_roles(
        &self,
        role_ids: &BTreeSet<RoleId>,
    ) -> AppResult<Vec<GrantKey>> {
        let state = self.state.read().await;
        let keys: BTreeSet<GrantKey> = role_ids
            .iter()
            .filter_map(|role_id| state.role_grants.get(role_id))
            .flatten()
            .filter_map(|grant_id| state.grants.get(grant_id).cloned())
            .collect();

        Ok(keys.into_iter().collect())
    }
}

#[async_trait]
impl SecurityMetadataRepository for InMemorySecurityRepository {
    async fn find_database(&self, database_id: DatabaseId) -> AppResult<Option<DatabaseRecord>> {
        Ok(self.state.read().await.databases.get(&database_id).cloned())
    }

    async fn list_databases(&self) -> AppResult<Vec<DatabaseRecord>> {
        Ok(self.state.read().await.databases.values().cloned().collect())
    }

    async fn find_dataset(&self, dataset_id: DatasetId) -> AppResult<Option<DatasetRecord>> {
        Ok(self.state.read().await.datasets.get(&dataset_id).cloned())
    }

    async fn list_datasets(&self) -> AppResult<Vec<DatasetRecord>> {
        Ok(self.state.read().await.datasets.values().cloned().collect())
    }

    async fn list_datasets_for_database(
        &self,
        database_id: DatabaseId,
    ) -> AppResult<Vec<DatasetRecord>> {
        let state = self.state.read().await;
        Ok(state
            .datasets
            .values()
            .filter(|dataset| dataset.database_id() == database_id)
            .cloned()
            .collect())
    }

    async fn find_datasets_by_table(
        &self,
        database_id: DatabaseId,
        schema: Option<&str>,
        table_name: &str,
    ) -> AppResult<Vec<DatasetRecord>> {
        let state = self.state.read().await;
        Ok(state
            .datasets
            .values()
            .filter(|dataset| {
                dataset.database_id() == database_id && dataset.wraps_table(schema, table_name)
            })
            .cloned()
            .collect())
    }

    async fn update_dataset_perms(
        &self,
        dataset_id: DatasetId,
        perm: &str,
        schema_perm: Option<&str>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let dataset = state
            .datasets
            .get_mut(&dataset_id)
            .ok_or_else(|| AppError::NotFound(format!("dataset '{dataset_id}' does not exist")))?;

        *dataset = dataset
            .clone()
            .with_stored_perms(Some(perm.to_owned()), schema_perm.map(str::to_owned));
        Ok(())
    }

    async fn update_chart_perms(&self, old_perm: &str, new_perm: &str) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for chart in state.charts.values_mut() {
            if chart.perm() != Some(old_perm) {
                continue;
            }

            let schema_perm = chart.schema_perm().map(str::to_owned);
            *chart = chart
                .clone()
                .with_stored_perms(Some(new_perm.to_owned()), schema_perm);
            updated += 1;
        }

        Ok(updated)
    }

    async fn update_chart_schema_perms(
        &self,
        datasource_id: DatasetId,
        datasource_type: DatasourceType,
        schema_perm: Option<&str>,
    ) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for chart in state.charts.values_mut() {
            if chart.datasource_id() != datasource_id
                || chart.datasource_type() != datasource_type
            {
                continue;
            }

            let perm = chart.perm().map(str::to_owned);
            *chart = chart
                .clone()
                .with_stored_perms(perm, schema_perm.map(str::to_owned));
            updated += 1;
        }

        Ok(updated)
    }
}

#[async_trait]
impl DashboardRepository for InMemorySecurityRepository {
    async fn find_dashboard(
        &self,
        dashboard_id: DashboardId,
    ) -> AppResult<Option<DashboardRecord>> {
        Ok(self.state.read().await.dashboards.get(&dashboard_id).cloned())
    }

    async fn list_dashboards_for_dataset(
        &self,
        dataset_id: DatasetId,
    ) -> AppResult<Vec<DashboardRecord>> {
        let state = self.state.read().await;
        Ok(state
            .dashboards
            .values()
            .filter(|dashboard| dashboard.datasets().contains(&dataset_id))
            .cloned()
            .collect())
    }

    async fn find_embedded_dashboard(&self, uuid: Uuid) -> AppResult<Option<EmbeddedDashboard>> {
        Ok(self.state.read().await.embedded.get(&uuid).cloned())
    }

    async fn list_embedded_for_dashboard(
        &self,
        dashboard_id: DashboardId,
    ) -> AppResult<Vec<EmbeddedDashboard>> {
        let state = self.state.read().await;
        Ok(state
            .embedded
            .values()
            .filter(|embedded| embedded.dashboard_id() == dashboard_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RlsRuleRepository for InMemorySecurityRepository {
    async fn list_rules_for_dataset(
        &self,
        dataset_id: DatasetId,
    ) -> AppResult<Vec<RowLevelSecurityRule>> {
        let state = self.state.read().await;
        Ok(state
            .rls_rules
            .values()
            .filter(|rule| rule.datasets().contains(&dataset_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl GrantEventSink for InMemorySecurityRepository {
    async fn record(&self, event: GrantEvent) -> AppResult<()> {
        self.state.write().await.events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests;
