use async_trait::async_trait;

use vizgate_core::AppResult;
use vizgate_domain::{DatabaseId, DatabaseRecord, DatasetId, DatasetRecord, DatasourceType};

/// Metadata-store port for the entities that carry derived permission
/// strings.
///
/// The `update_*` methods are the only way derived `perm`/`schema_perm`
/// fields change. Fan-out updates are single conditional writes keyed by
/// the old value so they stay correct when retried.
#[async_trait]
pub trait SecurityMetadataRepository: Send + Sync {
    /// Looks up a database.
    async fn find_database(&self, database_id: DatabaseId) -> AppResult<Option<DatabaseRecord>>;

    /// Lists every database.
    async fn list_databases(&self) -> AppResult<Vec<DatabaseRecord>>;

    /// Looks up a dataset.
    async fn find_dataset(&self, dataset_id: DatasetId) -> AppResult<Option<DatasetRecord>>;

    /// Lists every dataset.
    async fn list_datasets(&self) -> AppResult<Vec<DatasetRecord>>;

    /// Lists datasets of one database.
    async fn list_datasets_for_database(
        &self,
        database_id: DatabaseId,
    ) -> AppResult<Vec<DatasetRecord>>;

    /// Lists datasets wrapping one physical table.
    async fn find_datasets_by_table(
        &self,
        database_id: DatabaseId,
        schema: Option<&str>,
        table_name: &str,
    ) -> AppResult<Vec<DatasetRecord>>;

    /// Writes a dataset's derived fields.
    async fn update_dataset_perms(
        &self,
        dataset_id: DatasetId,
        perm: &str,
        schema_perm: Option<&str>,
    ) -> AppResult<()>;

    /// Rewrites `perm` on every chart currently holding `old_perm`.
    async fn update_chart_perms(&self, old_perm: &str, new_perm: &str) -> AppResult<u64>;

    /// Rewrites `schema_perm` on every chart reading from one datasource.
    async fn update_chart_schema_perms(
        &self,
        datasource_id: DatasetId,
        datasource_type: DatasourceType,
        schema_perm: Option<&str>,
    ) -> AppResult<u64>;
}
