use std::collections::BTreeSet;
use std::sync::Arc;

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use vizgate_application::{
    EnsureOutcome, PermissionRegistry, PermissionSyncService, RenameOutcome, RoleRepository,
    SecurityMetadataRepository,
};
use vizgate_core::AppError;
use vizgate_domain::{DatabaseId, DatabaseRecord, DatasetId, GrantKey, RoleId};

use super::PostgresSecurityRepository;
use crate::TracingGrantEventSink;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres security tests: {error}");
    }

    Some(pool)
}

fn unique_id() -> i64 {
    i64::from_le_bytes(Uuid::new_v4().as_bytes()[..8].try_into().unwrap_or([1; 8])) & i64::MAX
}

fn unique_name(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

fn key(permission: &str, view_menu: &str) -> GrantKey {
    GrantKey::new(permission, view_menu).unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn ensure_grant_returns_existing_row_on_second_call() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let repository = PostgresSecurityRepository::new(pool);
    let key = key("schema_access", &format!("[{}].[public]", unique_name("db")));

    let first = repository.ensure_grant(&key).await;
    let second = repository.ensure_grant(&key).await;

    let (Ok(EnsureOutcome::Created(created)), Ok(EnsureOutcome::Existing(existing))) =
        (first, second)
    else {
        panic!("expected create then reuse");
    };
    assert_eq!(created, existing);
}

#[tokio::test]
async fn rename_onto_existing_target_merges_into_it() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let repository = PostgresSecurityRepository::new(pool);
    let source = unique_name("source");
    let target = unique_name("target");

    let source_grant = repository
        .ensure_grant(&key("database_access", &source))
        .await
        .unwrap_or_else(|_| unreachable!())
        .into_grant();
    let renamed = repository
        .rename_grant("database_access", &source, &target)
        .await;
    assert!(matches!(
        renamed,
        Ok(RenameOutcome::Renamed(ref grant)) if grant.id() == source_grant.id()
    ));

    let stale = repository
        .ensure_grant(&key("database_access", &source))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(stale.was_created());

    let merged = repository
        .rename_grant("database_access", &source, &target)
        .await;
    assert!(matches!(
        merged,
        Ok(RenameOutcome::MergedIntoExisting(ref grant)) if grant.id() == source_grant.id()
    ));

    let missing = repository
        .rename_grant("database_access", &source, &target)
        .await;
    assert!(matches!(missing, Ok(RenameOutcome::SourceMissing)));
    let remaining = repository
        .find_grant(&key("database_access", &source))
        .await;
    assert!(matches!(remaining, Ok(None)));
}

#[tokio::test]
async fn delete_by_prefix_only_removes_schema_grants_of_that_database() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let repository = PostgresSecurityRepository::new(pool);
    let database = unique_name("db");
    let other = unique_name("db");

    for view_menu in [
        format!("[{database}].[a]"),
        format!("[{database}].[b]"),
        format!("[{other}].[a]"),
    ] {
        assert!(
            repository
                .ensure_grant(&key("schema_access", &view_menu))
                .await
                .is_ok()
        );
    }
    assert!(
        repository
            .ensure_grant(&key("datasource_access", &format!("[{database}].[t](id:1)")))
            .await
            .is_ok()
    );

    let removed = repository
        .delete_grants_by_prefix("schema_access", &format!("[{database}].["))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(
        removed,
        vec![
            key("schema_access", &format!("[{database}].[a]")),
            key("schema_access", &format!("[{database}].[b]")),
        ]
    );
    let survivor = repository
        .find_grant(&key("datasource_access", &format!("[{database}].[t](id:1)")))
        .await;
    assert!(matches!(survivor, Ok(Some(_))));
}

#[tokio::test]
async fn replace_role_grants_is_a_full_replace() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let repository = PostgresSecurityRepository::new(pool);
    let role = repository
        .add_role(&unique_name("role"))
        .await
        .unwrap_or_else(|_| unreachable!());
    let again = repository
        .add_role(role.name())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(role, again);

    let first = repository
        .ensure_grant(&key("database_access", &unique_name("first")))
        .await
        .unwrap_or_else(|_| unreachable!())
        .into_grant();
    let second = repository
        .ensure_grant(&key("database_access", &unique_name("second")))
        .await
        .unwrap_or_else(|_| unreachable!())
        .into_grant();

    for grant_ids in [
        BTreeSet::from([first.id(), second.id()]),
        BTreeSet::from([second.id()]),
    ] {
        assert!(
            repository
                .replace_role_grants(role.id(), &grant_ids)
                .await
                .is_ok()
        );
    }

    let keys = repository
        .list_grant_keys_for_roles(&BTreeSet::from([role.id()]))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(keys, vec![second.key().clone()]);

    let unknown_role = repository
        .replace_role_grants(RoleId::new(-1), &BTreeSet::new())
        .await;
    assert!(matches!(unknown_role, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn database_rename_cascades_through_postgres_rows() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let repository = Arc::new(PostgresSecurityRepository::new(pool.clone()));
    let sync = PermissionSyncService::new(
        repository.clone(),
        repository.clone(),
        Arc::new(TracingGrantEventSink),
    );

    let database_id = unique_id();
    let dataset_id = unique_id();
    let chart_id = unique_id();
    let old_name = unique_name("sales");
    let new_name = unique_name("sales_eu");

    let seeded = sqlx::query("INSERT INTO databases (id, database_name) VALUES ($1, $2)")
        .bind(database_id)
        .bind(old_name.as_str())
        .execute(&pool)
        .await;
    assert!(seeded.is_ok());
    let seeded = sqlx::query(
        "INSERT INTO datasets (id, table_name, database_id) VALUES ($1, 'orders', $2)",
    )
    .bind(dataset_id)
    .bind(database_id)
    .execute(&pool)
    .await;
    assert!(seeded.is_ok());

    let database = DatabaseRecord::new(DatabaseId::new(database_id), old_name.as_str())
        .unwrap_or_else(|_| unreachable!());
    assert!(sync.on_database_created(&database).await.is_ok());
    let dataset = repository
        .find_dataset(DatasetId::new(dataset_id))
        .await
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|| unreachable!());
    assert!(sync.on_dataset_created(&dataset, Some(&database)).await.is_ok());

    let seeded = sqlx::query(
        r#"
        INSERT INTO charts (id, datasource_id, datasource_type, perm)
        SELECT $1, id, 'table', perm FROM datasets WHERE id = $2
        "#,
    )
    .bind(chart_id)
    .bind(dataset_id)
    .execute(&pool)
    .await;
    assert!(seeded.is_ok());

    let renamed = sqlx::query("UPDATE databases SET database_name = $2 WHERE id = $1")
        .bind(database_id)
        .bind(new_name.as_str())
        .execute(&pool)
        .await;
    assert!(renamed.is_ok());
    let renamed_database = database
        .renamed(new_name.as_str())
        .unwrap_or_else(|_| unreachable!());
    assert!(
        sync.on_database_renamed(&renamed_database, old_name.as_str())
            .await
            .is_ok()
    );

    let expected = format!("[{new_name}].[orders](id:{dataset_id})");
    let chart_perm = sqlx::query_scalar::<_, Option<String>>("SELECT perm FROM charts WHERE id = $1")
        .bind(chart_id)
        .fetch_one(&pool)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(chart_perm.as_deref(), Some(expected.as_str()));

    let dataset = repository
        .find_dataset(DatasetId::new(dataset_id))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(
        dataset.as_ref().and_then(|dataset| dataset.perm()),
        Some(expected.as_str())
    );
    let old_grant = repository
        .find_grant(&key(
            "database_access",
            &format!("[{old_name}].(id:{database_id})"),
        ))
        .await;
    assert!(matches!(old_grant, Ok(None)));
}

#[tokio::test]
async fn rolled_back_unit_of_work_keeps_registry_and_rows_unchanged() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let repository = Arc::new(PostgresSecurityRepository::new(pool.clone()));
    let database_id = unique_id();
    let old_name = unique_name("sales");
    let new_name = unique_name("sales_eu");

    let seeded = sqlx::query("INSERT INTO databases (id, database_name) VALUES ($1, $2)")
        .bind(database_id)
        .bind(old_name.as_str())
        .execute(&pool)
        .await;
    assert!(seeded.is_ok());
    let database = DatabaseRecord::new(DatabaseId::new(database_id), old_name.as_str())
        .unwrap_or_else(|_| unreachable!());
    let sync = PermissionSyncService::new(
        repository.clone(),
        repository.clone(),
        Arc::new(TracingGrantEventSink),
    );
    assert!(sync.on_database_created(&database).await.is_ok());
    let schema_key = key("schema_access", &format!("[{old_name}].[eu]"));
    assert!(repository.ensure_grant(&schema_key).await.is_ok());

    let unit = Arc::new(repository.begin().await.unwrap_or_else(|_| unreachable!()));
    {
        let mut connection = unit.connection().await.unwrap_or_else(|_| unreachable!());
        let renamed = sqlx::query("UPDATE databases SET database_name = $2 WHERE id = $1")
            .bind(database_id)
            .bind(new_name.as_str())
            .execute(&mut *connection)
            .await;
        assert!(renamed.is_ok());
    }

    let scoped_sync =
        PermissionSyncService::new(unit.clone(), unit.clone(), Arc::new(TracingGrantEventSink));
    let renamed_database = database
        .renamed(new_name.as_str())
        .unwrap_or_else(|_| unreachable!());
    assert!(
        scoped_sync
            .on_database_renamed(&renamed_database, old_name.as_str())
            .await
            .is_ok()
    );
    let inside = unit
        .find_grant(&key("schema_access", &format!("[{new_name}].[eu]")))
        .await;
    assert!(matches!(inside, Ok(Some(_))));

    assert!(unit.rollback().await.is_ok());
    assert!(matches!(unit.rollback().await, Err(AppError::Conflict(_))));
    assert!(matches!(
        unit.find_grant(&schema_key).await,
        Err(AppError::Conflict(_))
    ));

    let stored_name =
        sqlx::query_scalar::<_, String>("SELECT database_name FROM databases WHERE id = $1")
            .bind(database_id)
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored_name, old_name);

    let old_database_grant = repository
        .find_grant(&key(
            "database_access",
            &format!("[{old_name}].(id:{database_id})"),
        ))
        .await;
    assert!(matches!(old_database_grant, Ok(Some(_))));
    assert!(matches!(repository.find_grant(&schema_key).await, Ok(Some(_))));
    let new_schema_grant = repository
        .find_grant(&key("schema_access", &format!("[{new_name}].[eu]")))
        .await;
    assert!(matches!(new_schema_grant, Ok(None)));
}

#[tokio::test]
async fn committed_unit_of_work_publishes_synchronizer_writes() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let repository = PostgresSecurityRepository::new(pool);
    let database = unique_name("db");
    let source = key("schema_access", &format!("[{database}].[a]"));
    let target = key("schema_access", &format!("[{database}_v2].[a]"));
    assert!(repository.ensure_grant(&source).await.is_ok());

    let unit = repository.begin().await.unwrap_or_else(|_| unreachable!());
    let listed = unit
        .list_grants_by_prefix("schema_access", &format!("[{database}].["))
        .await;
    assert_eq!(listed.ok(), Some(vec![source.clone()]));
    let renamed = unit
        .rename_grant("schema_access", source.view_menu(), target.view_menu())
        .await;
    assert!(matches!(renamed, Ok(RenameOutcome::Renamed(_))));
    assert!(matches!(repository.find_grant(&target).await, Ok(None)));

    assert!(unit.commit().await.is_ok());
    assert!(matches!(repository.find_grant(&target).await, Ok(Some(_))));
    assert!(matches!(repository.find_grant(&source).await, Ok(None)));
}
