use super::*;

impl PostgresSecurityRepository {
    pub(super) async fn find_dashboard_impl(
        &self,
        dashboard_id: DashboardId,
    ) -> AppResult<Option<DashboardRecord>> {
        sqlx::query_as::<_, DashboardRow>(
            r#"
            SELECT
                dashboards.id,
                dashboards.title,
                dashboards.published,
                dashboards.owners,
                dashboards.role_ids,
                COALESCE(
                    ARRAY_AGG(links.dataset_id ORDER BY links.dataset_id)
                        FILTER (WHERE links.dataset_id IS NOT NULL),
                    '{}'
                ) AS dataset_ids
            FROM dashboards
            LEFT JOIN dashboard_datasets AS links
                ON links.dashboard_id = dashboards.id
            WHERE dashboards.id = $1
            GROUP BY dashboards.id
            "#,
        )
        .bind(dashboard_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find dashboard '{dashboard_id}': {error}"))
        })?
        .map(DashboardRow::into_record)
        .transpose()
    }

    pub(super) async fn list_dashboards_for_dataset_impl(
        &self,
        dataset_id: DatasetId,
    ) -> AppResult<Vec<DashboardRecord>> {
        let rows = sqlx::query_as::<_, DashboardRow>(
            r#"
            SELECT
                dashboards.id,
                dashboards.title,
                dashboards.published,
                dashboards.owners,
                dashboards.role_ids,
                ARRAY_AGG(links.dataset_id ORDER BY links.dataset_id) AS dataset_ids
            FROM dashboards
            INNER JOIN dashboard_datasets AS links
                ON links.dashboard_id = dashboards.id
            WHERE dashboards.id IN (
                SELECT dashboard_id
                FROM dashboard_datasets
                WHERE dataset_id = $1
            )
            GROUP BY dashboards.id
            ORDER BY dashboards.id
            "#,
        )
        .bind(dataset_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list dashboards of dataset '{dataset_id}': {error}"
            ))
        })?;

        rows.into_iter().map(DashboardRow::into_record).collect()
    }

    pub(super) async fn find_embedded_dashboard_impl(
        &self,
        uuid: Uuid,
    ) -> AppResult<Option<EmbeddedDashboard>> {
        let row = sqlx::query_as::<_, EmbeddedDashboardRow>(
            r#"
            SELECT uuid, dashboard_id, allowed_domains
            FROM embedded_dashboards
            WHERE uuid = $1
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find embedded dashboard '{uuid}': {error}"))
        })?;

        Ok(row.map(EmbeddedDashboardRow::into_record))
    }

    pub(super) async fn list_embedded_for_dashboard_impl(
        &self,
        dashboard_id: DashboardId,
    ) -> AppResult<Vec<EmbeddedDashboard>> {
        let rows = sqlx::query_as::<_, EmbeddedDashboardRow>(
            r#"
            SELECT uuid, dashboard_id, allowed_domains
            FROM embedded_dashboards
            WHERE dashboard_id = $1
            ORDER BY uuid
            "#,
        )
        .bind(dashboard_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list embeddings of dashboard '{dashboard_id}': {error}"
            ))
        })?;

        Ok(rows
            .into_iter()
            .map(EmbeddedDashboardRow::into_record)
            .collect())
    }
}
