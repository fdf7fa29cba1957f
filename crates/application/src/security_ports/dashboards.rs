use async_trait::async_trait;
use uuid::Uuid;

use vizgate_core::AppResult;
use vizgate_domain::{DashboardId, DashboardRecord, DatasetId, EmbeddedDashboard};

/// Read port onto the dashboard and embedding layer.
#[async_trait]
pub trait DashboardRepository: Send + Sync {
    /// Looks up a dashboard.
    async fn find_dashboard(&self, dashboard_id: DashboardId)
    -> AppResult<Option<DashboardRecord>>;

    /// Lists dashboards whose charts read from `dataset_id`.
    async fn list_dashboards_for_dataset(
        &self,
        dataset_id: DatasetId,
    ) -> AppResult<Vec<DashboardRecord>>;

    /// Looks up an embedding configuration by its public UUID.
    async fn find_embedded_dashboard(&self, uuid: Uuid) -> AppResult<Option<EmbeddedDashboard>>;

    /// Lists embedding configurations of one dashboard.
    async fn list_embedded_for_dashboard(
        &self,
        dashboard_id: DashboardId,
    ) -> AppResult<Vec<EmbeddedDashboard>>;
}
