use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use vizgate_core::{AppError, AppResult};
use vizgate_domain::{
    BuiltinRole, DatabaseId, DatabaseRecord, DatasetId, DatasetRecord, DatasourceType, Grant,
    GrantId, GrantKey, Role, RoleClassifier, RoleId,
};

use super::RoleSyncService;
use crate::security_ports::{
    EnsureOutcome, GrantEvent, GrantEventSink, PermissionRegistry, RenameOutcome,
    RoleRepository, SecurityMetadataRepository,
};
use crate::{PermissionSyncService, SecurityConfig};

#[derive(Default)]
struct FakeState {
    grants: Vec<Grant>,
    roles: Vec<Role>,
    role_grants: BTreeMap<RoleId, BTreeSet<GrantId>>,
}

#[derive(Default)]
struct FakeRoleStore {
    state: Mutex<FakeState>,
}

impl FakeRoleStore {
    async fn role_grant_keys(&self, name: &str) -> BTreeSet<String> {
        let state = self.state.lock().await;
        let Some(role) = state.roles.iter().find(|role| role.name() == name) else {
            return BTreeSet::new();
        };
        let grant_ids = state.role_grants.get(&role.id()).cloned().unwrap_or_default();
        state
            .grants
            .iter()
            .filter(|grant| grant_ids.contains(&grant.id()))
            .map(|grant| grant.key().to_string())
            .collect()
    }
}

#[async_trait]
impl PermissionRegistry for FakeRoleStore {
    async fn find_grant(&self, key: &GrantKey) -> AppResult<Option<Grant>> {
        let state = self.state.lock().await;
        Ok(state.grants.iter().find(|grant| grant.key() == key).cloned())
    }

    async fn ensure_grant(&self, key: &GrantKey) -> AppResult<EnsureOutcome> {
        let mut state = self.state.lock().await;
        if let Some(grant) = state.grants.iter().find(|grant| grant.key() == key) {
            return Ok(EnsureOutcome::Existing(grant.clone()));
        }
        let grant = Grant::new(GrantId::new(state.grants.len() as i64 + 1), key.clone());
        state.grants.push(grant.clone());
        Ok(EnsureOutcome::Created(grant))
    }

    async fn delete_grant(&self, key: &GrantKey) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.grants.len();
        state.grants.retain(|grant| grant.key() != key);
        Ok(state.grants.len() != before)
    }

    async fn rename_grant(
        &self,
        _permission: &str,
        _old_view_menu: &str,
        _new_view_menu: &str,
    ) -> AppResult<RenameOutcome> {
        Ok(RenameOutcome::SourceMissing)
    }

    async fn delete_grants_by_prefix(
        &self,
        _permission: &str,
        _view_menu_prefix: &str,
    ) -> AppResult<Vec<GrantKey>> {
        Ok(Vec::new())
    }

    async fn list_grants_by_prefix(
        &self,
        _permission: &str,
        _view_menu_prefix: &str,
    ) -> AppResult<Vec<GrantKey>> {
        Ok(Vec::new())
    }

    async fn list_grants(&self) -> AppResult<Vec<Grant>> {
        Ok(self.state.lock().await.grants.clone())
    }
}

#[async_trait]
impl RoleRepository for FakeRoleStore {
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        let state = self.state.lock().await;
        Ok(state.roles.iter().find(|role| role.name() == name).cloned())
    }

    async fn add_role(&self, name: &str) -> AppResult<Role> {
        let mut state = self.state.lock().await;
        if let Some(role) = state.roles.iter().find(|role| role.name() == name) {
            return Ok(role.clone());
        }
        let role = Role::new(RoleId::new(state.roles.len() as i64 + 1), name)?;
        state.roles.push(role.clone());
        Ok(role)
    }

    async fn list_roles_by_ids(&self, role_ids: &BTreeSet<RoleId>) -> AppResult<Vec<Role>> {
        let state = self.state.lock().await;
        Ok(state
            .roles
            .iter()
            .filter(|role| role_ids.contains(&role.id()))
            .cloned()
            .collect())
    }

    async fn list_role_grants(&self, role_id: RoleId) -> AppResult<Vec<Grant>> {
        let state = self.state.lock().await;
        let grant_ids = state.role_grants.get(&role_id).cloned().unwrap_or_default();
        Ok(state
            .grants
            .iter()
            .filter(|grant| grant_ids.contains(&grant.id()))
            .cloned()
            .collect())
    }

    async fn replace_role_grants(
        &self,
        role_id: RoleId,
        grant_ids: &BTreeSet<GrantId>,
    ) -> AppResult<()> {
        self.state
            .lock()
            .await
            .role_grants
            .insert(role_id, grant_ids.clone());
        Ok(())
    }

    async fn list_grant_keys_for_roles(
        &self,
        _role_ids: &BTreeSet<RoleId>,
    ) -> AppResult<Vec<GrantKey>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl SecurityMetadataRepository for FakeRoleStore {
    async fn find_database(&self, _database_id: DatabaseId) -> AppResult<Option<DatabaseRecord>> {
        Ok(None)
    }

    async fn list_databases(&self) -> AppResult<Vec<DatabaseRecord>> {
        Ok(Vec::new())
    }

    async fn find_dataset(&self, _dataset_id: DatasetId) -> AppResult<Option<DatasetRecord>> {
        Ok(None)
    }

    async fn list_datasets(&self) -> AppResult<Vec<DatasetRecord>> {
        Ok(Vec::new())
    }

    async fn list_datasets_for_database(
        &self,
        _database_id: DatabaseId,
    ) -> AppResult<Vec<DatasetRecord>> {
        Ok(Vec::new())
    }

    async fn find_datasets_by_table(
        &self,
        _database_id: DatabaseId,
        _schema: Option<&str>,
        _table_name: &str,
    ) -> AppResult<Vec<DatasetRecord>> {
        Ok(Vec::new())
    }

    async fn update_dataset_perms(
        &self,
        _dataset_id: DatasetId,
        _perm: &str,
        _schema_perm: Option<&str>,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn update_chart_perms(&self, _old_perm: &str, _new_perm: &str) -> AppResult<u64> {
        Ok(0)
    }

    async fn update_chart_schema_perms(
        &self,
        _datasource_id: DatasetId,
        _datasource_type: DatasourceType,
        _schema_perm: Option<&str>,
    ) -> AppResult<u64> {
        Ok(0)
    }
}

#[async_trait]
impl GrantEventSink for FakeRoleStore {
    async fn record(&self, _event: GrantEvent) -> AppResult<()> {
        Ok(())
    }
}

async fn seeded_store(grants: &[(&str, &str)]) -> Arc<FakeRoleStore> {
    let store = Arc::new(FakeRoleStore::default());
    for (permission, view_menu) in grants {
        let key = GrantKey::new(*permission, *view_menu).unwrap_or_else(|_| unreachable!());
        assert!(store.ensure_grant(&key).await.is_ok());
    }
    store
}

fn build_service(store: &Arc<FakeRoleStore>, config: SecurityConfig) -> RoleSyncService {
    let permission_sync = PermissionSyncService::new(store.clone(), store.clone(), store.clone());
    RoleSyncService::new(store.clone(), store.clone(), permission_sync, config)
}

const CATALOG: &[(&str, &str)] = &[
    ("can_read", "Dashboard"),
    ("can_write", "Dashboard"),
    ("can_read", "Dataset"),
    ("can_write", "Dataset"),
    ("can_write", "RoleModelView"),
    ("can_read", "SavedQuery"),
    ("can_approve", "Superset"),
    ("database_access", "[sales].(id:1)"),
];

#[tokio::test]
async fn sync_builds_every_builtin_role_from_catalog() {
    let store = seeded_store(CATALOG).await;
    let service = build_service(&store, SecurityConfig::default());

    assert!(service.sync_role_definitions().await.is_ok());

    let admin = store.role_grant_keys("Admin").await;
    assert!(admin.contains("can_write on RoleModelView"));
    assert!(admin.contains("all_datasource_access on all_datasource_access"));
    assert!(!admin.contains("database_access on [sales].(id:1)"));

    let alpha = store.role_grant_keys("Alpha").await;
    assert!(alpha.contains("can_write on Dataset"));
    assert!(!alpha.contains("can_write on RoleModelView"));
    assert!(!alpha.contains("can_read on SavedQuery"));

    let gamma = store.role_grant_keys("Gamma").await;
    assert!(gamma.contains("can_read on Dataset"));
    assert!(!gamma.contains("can_write on Dataset"));

    assert_eq!(
        store.role_grant_keys("granter").await,
        BTreeSet::from(["can_approve on Superset".to_owned()])
    );
    assert!(
        store
            .role_grant_keys("sql_lab")
            .await
            .contains("can_read on SavedQuery")
    );
    assert!(
        store
            .find_role_by_name(BuiltinRole::Public.name())
            .await
            .unwrap_or_default()
            .is_none()
    );
}

#[tokio::test]
async fn rebuilding_twice_yields_identical_grant_sets() {
    let store = seeded_store(CATALOG).await;
    let service = build_service(&store, SecurityConfig::default());

    let first = service.rebuild_role("Gamma", RoleClassifier::Gamma).await;
    let second = service.rebuild_role("Gamma", RoleClassifier::Gamma).await;
    assert!(first.is_ok());
    assert_eq!(first.ok(), second.ok());
}

#[tokio::test]
async fn rebuild_drops_grants_removed_from_catalog() {
    let store = seeded_store(CATALOG).await;
    let service = build_service(&store, SecurityConfig::default());
    assert!(service.rebuild_role("Alpha", RoleClassifier::Alpha).await.is_ok());

    let key = GrantKey::new("can_write", "Dashboard").unwrap_or_else(|_| unreachable!());
    assert!(matches!(store.delete_grant(&key).await, Ok(true)));
    assert!(service.rebuild_role("Alpha", RoleClassifier::Alpha).await.is_ok());

    assert!(
        !store
            .role_grant_keys("Alpha")
            .await
            .contains("can_write on Dashboard")
    );
}

#[tokio::test]
async fn public_copy_keeps_existing_data_access_grants() {
    let store = seeded_store(CATALOG).await;
    let public = store
        .add_role("Public")
        .await
        .unwrap_or_else(|_| unreachable!());
    let manual = store
        .list_grants()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|grant| {
            grant.permission() == "database_access" || grant.view_menu() == "RoleModelView"
        })
        .map(|grant| grant.id())
        .collect();
    assert!(store.replace_role_grants(public.id(), &manual).await.is_ok());

    let config = SecurityConfig {
        public_role_like: Some("Gamma".to_owned()),
        ..SecurityConfig::default()
    };
    let service = build_service(&store, config);
    assert!(service.sync_role_definitions().await.is_ok());

    let public_grants = store.role_grant_keys("Public").await;
    assert!(public_grants.contains("database_access on [sales].(id:1)"));
    assert!(public_grants.contains("can_read on Dashboard"));
    assert!(!public_grants.contains("can_write on RoleModelView"));
}

#[tokio::test]
async fn copying_from_unknown_role_fails() {
    let store = seeded_store(CATALOG).await;
    let service = build_service(&store, SecurityConfig::default());

    let result = service.copy_role("Missing", "Public", true).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}
