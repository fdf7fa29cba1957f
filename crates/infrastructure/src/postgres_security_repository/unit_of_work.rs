use sqlx::Transaction;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use super::*;

/// One open transaction serving the registry and metadata ports.
///
/// Finish it with [`PostgresSecurityUnitOfWork::commit`] or
/// [`PostgresSecurityUnitOfWork::rollback`]; dropping it unfinished rolls
/// back. Port calls after either return `AppError::Conflict`.
pub struct PostgresSecurityUnitOfWork {
    transaction: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl PostgresSecurityUnitOfWork {
    pub(super) fn new(transaction: Transaction<'static, Postgres>) -> Self {
        Self {
            transaction: Mutex::new(Some(transaction)),
        }
    }

    /// Locks the transaction's connection for statements issued by the
    /// caller, such as the entity write that triggers a synchronizer hook.
    ///
    /// Release the guard before calling a port on this unit of work.
    pub async fn connection(&self) -> AppResult<MappedMutexGuard<'_, PgConnection>> {
        MutexGuard::try_map(self.transaction.lock().await, |transaction| {
            transaction.as_mut().map(|transaction| &mut **transaction)
        })
        .map_err(|_| finished())
    }

    /// Commits every write made through this unit of work.
    pub async fn commit(&self) -> AppResult<()> {
        let transaction = self.transaction.lock().await.take().ok_or_else(finished)?;

        transaction
            .commit()
            .await
            .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))
    }

    /// Discards every write made through this unit of work.
    pub async fn rollback(&self) -> AppResult<()> {
        let transaction = self.transaction.lock().await.take().ok_or_else(finished)?;

        transaction.rollback().await.map_err(|error| {
            AppError::Internal(format!("failed to roll back transaction: {error}"))
        })
    }
}

fn finished() -> AppError {
    AppError::Conflict("security unit of work was already committed or rolled back".to_owned())
}

#[async_trait]
impl PermissionRegistry for PostgresSecurityUnitOfWork {
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
impl SecurityMetadataRepository for PostgresSecurityUnitOfWork {
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
