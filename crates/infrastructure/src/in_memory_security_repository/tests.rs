use std::collections::BTreeSet;
use std::sync::Arc;

use vizgate_application::{
    AccessService, AccessTarget, GrantEvent, PermissionRegistry, PermissionSyncService,
    RoleRepository, RoleSyncService, SecurityConfig, SecurityMetadataRepository,
};
use vizgate_core::{AppError, DenialKind};
use vizgate_domain::{
    ChartId, ChartRecord, DatabaseId, DatabaseRecord, DatasetId, DatasetRecord, DatasourceType,
    GrantKey, Principal, RegisteredUser, RoleId, TableRef, UserId,
};

use super::InMemorySecurityRepository;

fn permission_sync(repository: &Arc<InMemorySecurityRepository>) -> PermissionSyncService {
    PermissionSyncService::new(repository.clone(), repository.clone(), repository.clone())
}

fn access_service(repository: &Arc<InMemorySecurityRepository>) -> AccessService {
    AccessService::new(
        repository.clone(),
        repository.clone(),
        repository.clone(),
        repository.clone(),
        SecurityConfig::default(),
    )
}

fn database(name: &str) -> DatabaseRecord {
    DatabaseRecord::new(DatabaseId::new(1), name).unwrap_or_else(|_| unreachable!())
}

fn dataset(id: i64, table: &str, schema: Option<&str>, owners: Vec<UserId>) -> DatasetRecord {
    DatasetRecord::new(
        DatasetId::new(id),
        table,
        DatabaseId::new(1),
        schema.map(str::to_owned),
        owners,
    )
    .unwrap_or_else(|_| unreachable!())
}

async fn grant_view_menus(repository: &InMemorySecurityRepository, permission: &str) -> Vec<String> {
    repository
        .list_grants()
        .await
        .unwrap_or_else(|_| unreachable!())
        .into_iter()
        .filter(|grant| grant.permission() == permission)
        .map(|grant| grant.view_menu().to_owned())
        .collect()
}

/// Seeds database `sales` with dataset 10 `orders` and chart 100 on it.
async fn seed_sales(repository: &Arc<InMemorySecurityRepository>, sync: &PermissionSyncService) {
    let change = repository.save_database(database("sales")).await;
    assert!(sync.on_database_updated(&change).await.is_ok());

    let change = repository
        .save_dataset(dataset(10, "orders", None, Vec::new()))
        .await;
    assert!(sync.on_dataset_updated(&change).await.is_ok());

    repository
        .save_chart(ChartRecord::new(
            ChartId::new(100),
            DatasetId::new(10),
            DatasourceType::Table,
            Vec::new(),
        ))
        .await;
}

#[tokio::test]
async fn database_rename_cascades_to_datasets_and_charts() {
    let repository = Arc::new(InMemorySecurityRepository::new());
    let sync = permission_sync(&repository);
    seed_sales(&repository, &sync).await;

    let change = repository.save_database(database("sales_eu")).await;
    assert!(sync.on_database_updated(&change).await.is_ok());

    assert_eq!(
        grant_view_menus(&repository, "database_access").await,
        vec!["[sales_eu].(id:1)".to_owned()]
    );
    let dataset = repository
        .find_dataset(DatasetId::new(10))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(
        dataset.as_ref().and_then(DatasetRecord::perm),
        Some("[sales_eu].[orders](id:10)")
    );
    let chart = repository.find_chart(ChartId::new(100)).await;
    assert_eq!(
        chart.as_ref().and_then(ChartRecord::perm),
        Some("[sales_eu].[orders](id:10)")
    );
    assert_eq!(
        grant_view_menus(&repository, "datasource_access").await,
        vec!["[sales_eu].[orders](id:10)".to_owned()]
    );
}

#[tokio::test]
async fn renaming_back_restores_the_original_grant() {
    let repository = Arc::new(InMemorySecurityRepository::new());
    let sync = permission_sync(&repository);
    seed_sales(&repository, &sync).await;

    let original_key =
        GrantKey::new("database_access", "[sales].(id:1)").unwrap_or_else(|_| unreachable!());
    let original = repository
        .find_grant(&original_key)
        .await
        .unwrap_or_else(|_| unreachable!());

    for name in ["sales_eu", "sales"] {
        let change = repository.save_database(database(name)).await;
        assert!(sync.on_database_updated(&change).await.is_ok());
    }

    let restored = repository
        .find_grant(&original_key)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(original.is_some());
    assert_eq!(restored, original);

    let chart = repository.find_chart(ChartId::new(100)).await;
    assert_eq!(
        chart.as_ref().and_then(ChartRecord::perm),
        Some("[sales].[orders](id:10)")
    );
}

#[tokio::test]
async fn concurrent_renames_converge_on_one_grant() {
    let repository = Arc::new(InMemorySecurityRepository::new());
    let sync = permission_sync(&repository);
    seed_sales(&repository, &sync).await;

    let renamed = database("sales_eu");
    repository.save_database(renamed.clone()).await;
    let (first, second) = tokio::join!(
        sync.on_database_renamed(&renamed, "sales"),
        sync.on_database_renamed(&renamed, "sales"),
    );
    assert!(first.is_ok());
    assert!(second.is_ok());

    assert_eq!(
        grant_view_menus(&repository, "database_access").await,
        vec!["[sales_eu].(id:1)".to_owned()]
    );
    assert_eq!(
        grant_view_menus(&repository, "datasource_access").await,
        vec!["[sales_eu].[orders](id:10)".to_owned()]
    );
}

#[tokio::test]
async fn rename_onto_registered_target_drops_source() {
    let repository = Arc::new(InMemorySecurityRepository::new());
    let sync = permission_sync(&repository);
    seed_sales(&repository, &sync).await;

    let target =
        GrantKey::new("database_access", "[sales_eu].(id:1)").unwrap_or_else(|_| unreachable!());
    let kept = repository
        .ensure_grant(&target)
        .await
        .unwrap_or_else(|_| unreachable!())
        .into_grant();

    let change = repository.save_database(database("sales_eu")).await;
    assert!(sync.on_database_updated(&change).await.is_ok());

    assert_eq!(
        grant_view_menus(&repository, "database_access").await,
        vec!["[sales_eu].(id:1)".to_owned()]
    );
    assert!(
        repository
            .recorded_events()
            .await
            .contains(&GrantEvent::Merged {
                removed: GrantKey::new("database_access", "[sales].(id:1)")
                    .unwrap_or_else(|_| unreachable!()),
                kept: kept.key().clone(),
            })
    );
}

#[tokio::test]
async fn ensure_grant_is_idempotent() {
    let repository = InMemorySecurityRepository::new();
    let key = GrantKey::new("schema_access", "[sales].[public]").unwrap_or_else(|_| unreachable!());

    let first = repository.ensure_grant(&key).await;
    let second = repository.ensure_grant(&key).await;

    let (Ok(first), Ok(second)) = (first, second) else {
        unreachable!();
    };
    assert!(first.was_created());
    assert!(!second.was_created());
    assert_eq!(first.grant(), second.grant());
    assert_eq!(
        grant_view_menus(&repository, "schema_access").await,
        vec!["[sales].[public]".to_owned()]
    );
}

#[tokio::test]
async fn rebuilding_roles_twice_yields_identical_grants() {
    let repository = Arc::new(InMemorySecurityRepository::new());
    let sync = permission_sync(&repository);
    seed_sales(&repository, &sync).await;
    let role_sync = RoleSyncService::new(
        repository.clone(),
        repository.clone(),
        sync,
        SecurityConfig::default(),
    );

    assert!(role_sync.sync_role_definitions().await.is_ok());
    let alpha = repository
        .find_role_by_name("Alpha")
        .await
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|| unreachable!());
    let first = repository
        .list_role_grants(alpha.id())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(role_sync.sync_role_definitions().await.is_ok());
    let second = repository
        .list_role_grants(alpha.id())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
async fn owning_any_dataset_over_a_table_allows_sql_access() {
    let repository = Arc::new(InMemorySecurityRepository::new());
    let sync = permission_sync(&repository);
    let owner = UserId::new(7);

    let change = repository.save_database(database("db")).await;
    assert!(sync.on_database_updated(&change).await.is_ok());
    for dataset in [
        dataset(20, "t", Some("s"), Vec::new()),
        dataset(21, "t", Some("s"), vec![owner]),
    ] {
        let change = repository.save_dataset(dataset).await;
        assert!(sync.on_dataset_updated(&change).await.is_ok());
    }
    let gamma = repository
        .add_role("Gamma")
        .await
        .unwrap_or_else(|_| unreachable!());

    let principal = Principal::Registered(
        RegisteredUser::new(owner, "analyst", BTreeSet::from([gamma.id()]))
            .unwrap_or_else(|_| unreachable!()),
    );
    let database = database("db");
    let tables = [TableRef::new(Some("s".to_owned()), "t").unwrap_or_else(|_| unreachable!())];

    let result = access_service(&repository)
        .raise_for_access(
            &principal,
            AccessTarget::Query {
                database: &database,
                default_schema: None,
                tables: &tables,
            },
        )
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn denied_tables_are_reported_in_one_denial() {
    let repository = Arc::new(InMemorySecurityRepository::new());
    let database = database("db");
    repository.save_database(database.clone()).await;

    let principal = Principal::Registered(
        RegisteredUser::new(UserId::new(8), "viewer", BTreeSet::from([RoleId::new(99)]))
            .unwrap_or_else(|_| unreachable!()),
    );
    let tables = [
        TableRef::new(None, "t1").unwrap_or_else(|_| unreachable!()),
        TableRef::new(None, "t2").unwrap_or_else(|_| unreachable!()),
    ];

    let result = access_service(&repository)
        .raise_for_access(
            &principal,
            AccessTarget::Query {
                database: &database,
                default_schema: None,
                tables: &tables,
            },
        )
        .await;

    let Err(AppError::AccessDenied(denial)) = result else {
        unreachable!();
    };
    assert_eq!(denial.kind(), DenialKind::Table);
    assert_eq!(denial.resources(), ["t1".to_owned(), "t2".to_owned()]);
}

#[tokio::test]
async fn schema_grant_without_datasets_follows_rename_and_delete() {
    let repository = Arc::new(InMemorySecurityRepository::new());
    let sync = permission_sync(&repository);
    let change = repository.save_database(database("sales")).await;
    assert!(sync.on_database_updated(&change).await.is_ok());
    let change = repository
        .save_dataset(dataset(11, "refunds", Some("eu"), Vec::new()))
        .await;
    assert!(sync.on_dataset_updated(&change).await.is_ok());

    let removed = repository.remove_dataset(DatasetId::new(11)).await;
    let Some(removed) = removed else {
        unreachable!();
    };
    assert!(sync.on_dataset_deleted(&removed).await.is_ok());

    let change = repository.save_database(database("sales_eu")).await;
    assert!(sync.on_database_updated(&change).await.is_ok());
    assert_eq!(
        grant_view_menus(&repository, "schema_access").await,
        vec!["[sales_eu].[eu]".to_owned()]
    );

    let Some(deleted) = repository.remove_database(DatabaseId::new(1)).await else {
        unreachable!();
    };
    assert!(sync.on_database_deleted(&deleted).await.is_ok());
    assert!(grant_view_menus(&repository, "schema_access").await.is_empty());
}

#[tokio::test]
async fn database_deletion_drops_grants_of_its_datasets() {
    let repository = Arc::new(InMemorySecurityRepository::new());
    let sync = permission_sync(&repository);
    seed_sales(&repository, &sync).await;

    let Some(deleted) = repository.remove_database(DatabaseId::new(1)).await else {
        unreachable!();
    };
    assert!(sync.on_database_deleted(&deleted).await.is_ok());

    assert!(grant_view_menus(&repository, "database_access").await.is_empty());
    assert!(grant_view_menus(&repository, "datasource_access").await.is_empty());
    let deleted_events = repository
        .recorded_events()
        .await
        .into_iter()
        .filter(|event| matches!(event, GrantEvent::Deleted(_)))
        .count();
    assert_eq!(deleted_events, 2);
}
