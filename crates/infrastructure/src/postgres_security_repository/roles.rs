use super::*;

impl PostgresSecurityRepository {
    pub(super) async fn find_role_by_name_impl(&self, name: &str) -> AppResult<Option<Role>> {
        sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name
            FROM security_roles
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find role '{name}': {error}")))?
        .map(RoleRow::into_role)
        .transpose()
    }

    pub(super) async fn add_role_impl(&self, name: &str) -> AppResult<Role> {
        sqlx::query_as::<_, RoleRow>(
            r#"
            INSERT INTO security_roles (name)
            VALUES ($1)
            ON CONFLICT (name) DO UPDATE
            SET name = EXCLUDED.name
            RETURNING id, name
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to add role '{name}': {error}")))?
        .into_role()
    }

    pub(super) async fn list_roles_by_ids_impl(
        &self,
        role_ids: &BTreeSet<RoleId>,
    ) -> AppResult<Vec<Role>> {
        let role_ids: Vec<i64> = role_ids.iter().map(|role_id| role_id.get()).collect();
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name
            FROM security_roles
            WHERE id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list roles: {error}")))?;

        rows.into_iter().map(RoleRow::into_role).collect()
    }

    pub(super) async fn list_role_grants_impl(&self, role_id: RoleId) -> AppResult<Vec<Grant>> {
        let rows = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT grants.id, grants.permission, grants.view_menu
            FROM security_role_grants AS role_grants
            INNER JOIN security_grants AS grants
                ON grants.id = role_grants.grant_id
            WHERE role_grants.role_id = $1
            ORDER BY grants.id
            "#,
        )
        .bind(role_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list grants of role '{role_id}': {error}"))
        })?;

        rows.into_iter().map(GrantRow::into_grant).collect()
    }

    pub(super) async fn replace_role_grants_impl(
        &self,
        role_id: RoleId,
        grant_ids: &BTreeSet<GrantId>,
    ) -> AppResult<()> {
        let grant_ids: Vec<i64> = grant_ids.iter().map(|grant_id| grant_id.get()).collect();
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        let role_exists = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id
            FROM security_roles
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(role_id.get())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to lock role: {error}")))?;
        if role_exists.is_none() {
            return Err(AppError::NotFound(format!("role '{role_id}' does not exist")));
        }

        sqlx::query("DELETE FROM security_role_grants WHERE role_id = $1")
            .bind(role_id.get())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to clear grants of role '{role_id}': {error}"))
            })?;

        sqlx::query(
            r#"
            INSERT INTO security_role_grants (role_id, grant_id)
            SELECT $1, grant_id
            FROM UNNEST($2::BIGINT[]) AS grant_id
            "#,
        )
        .bind(role_id.get())
        .bind(grant_ids)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            if let sqlx::Error::Database(database_error) = &error
                && database_error.code().as_deref() == Some("23503")
            {
                return AppError::NotFound(format!(
                    "role '{role_id}' references a grant that does not exist"
                ));
            }

            AppError::Internal(format!("failed to persist grants of role '{role_id}': {error}"))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(())
    }

    pub(super) async fn list_grant_keys_for_roles_impl(
        &self,
        role_ids: &BTreeSet<RoleId>,
    ) -> AppResult<Vec<GrantKey>> {
        let role_ids: Vec<i64> = role_ids.iter().map(|role_id| role_id.get()).collect();
        let rows = sqlx::query_as::<_, GrantKeyRow>(
            r#"
            SELECT DISTINCT grants.permission, grants.view_menu
            FROM security_role_grants AS role_grants
            INNER JOIN security_grants AS grants
                ON grants.id = role_grants.grant_id
            WHERE role_grants.role_id = ANY($1)
            ORDER BY grants.permission, grants.view_menu
            "#,
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role grants: {error}")))?;

        rows.into_iter()
            .map(|row| decode_key(row.permission, row.view_menu))
            .collect()
    }
}
