use sqlx::Connection;

use super::*;

pub(super) async fn find_grant(
    connection: &mut PgConnection,
    key: &GrantKey,
) -> AppResult<Option<Grant>> {
    sqlx::query_as::<_, GrantRow>(
        r#"
        SELECT id, permission, view_menu
        FROM security_grants
        WHERE permission = $1 AND view_menu = $2
        "#,
    )
    .bind(key.permission())
    .bind(key.view_menu())
    .fetch_optional(&mut *connection)
    .await
    .map_err(|error| AppError::Internal(format!("failed to find grant '{key}': {error}")))?
    .map(GrantRow::into_grant)
    .transpose()
}

pub(super) async fn ensure_grant(
    connection: &mut PgConnection,
    key: &GrantKey,
) -> AppResult<EnsureOutcome> {
    let inserted = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO security_grants (permission, view_menu)
        VALUES ($1, $2)
        ON CONFLICT (permission, view_menu) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(key.permission())
    .bind(key.view_menu())
    .fetch_optional(&mut *connection)
    .await
    .map_err(|error| AppError::Internal(format!("failed to ensure grant '{key}': {error}")))?;

    if let Some(grant_id) = inserted {
        return Ok(EnsureOutcome::Created(Grant::new(
            GrantId::new(grant_id),
            key.clone(),
        )));
    }

    find_grant(connection, key)
        .await?
        .map(EnsureOutcome::Existing)
        .ok_or_else(|| {
            AppError::Internal(format!(
                "grant '{key}' was removed while it was being ensured"
            ))
        })
}

pub(super) async fn delete_grant(connection: &mut PgConnection, key: &GrantKey) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM security_grants
        WHERE permission = $1 AND view_menu = $2
        "#,
    )
    .bind(key.permission())
    .bind(key.view_menu())
    .execute(&mut *connection)
    .await
    .map_err(|error| AppError::Internal(format!("failed to delete grant '{key}': {error}")))?;

    Ok(result.rows_affected() > 0)
}

/// Runs in its own transaction, or in a savepoint when `connection` is
/// already inside one.
pub(super) async fn rename_grant(
    connection: &mut PgConnection,
    permission: &str,
    old_view_menu: &str,
    new_view_menu: &str,
) -> AppResult<RenameOutcome> {
    let new_key = decode_key(permission.to_owned(), new_view_menu.to_owned())?;

    let mut transaction = connection
        .begin()
        .await
        .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))?;

    let source_id = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT id
        FROM security_grants
        WHERE permission = $1 AND view_menu = $2
        FOR UPDATE
        "#,
    )
    .bind(permission)
    .bind(old_view_menu)
    .fetch_optional(&mut *transaction)
    .await
    .map_err(|error| AppError::Internal(format!("failed to lock source grant: {error}")))?;

    let Some(source_id) = source_id else {
        transaction.rollback().await.map_err(|error| {
            AppError::Internal(format!("failed to roll back transaction: {error}"))
        })?;
        return Ok(RenameOutcome::SourceMissing);
    };

    let target_id = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT id
        FROM security_grants
        WHERE permission = $1 AND view_menu = $2
        "#,
    )
    .bind(permission)
    .bind(new_view_menu)
    .fetch_optional(&mut *transaction)
    .await
    .map_err(|error| AppError::Internal(format!("failed to resolve target grant: {error}")))?;

    if let Some(target_id) = target_id {
        sqlx::query("DELETE FROM security_grants WHERE id = $1")
            .bind(source_id)
            .execute(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to drop source grant: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        return Ok(RenameOutcome::MergedIntoExisting(Grant::new(
            GrantId::new(target_id),
            new_key,
        )));
    }

    let renamed = sqlx::query("UPDATE security_grants SET view_menu = $2 WHERE id = $1")
        .bind(source_id)
        .bind(new_view_menu)
        .execute(&mut *transaction)
        .await;

    match renamed {
        Ok(_) => {
            transaction.commit().await.map_err(|error| {
                AppError::Internal(format!("failed to commit transaction: {error}"))
            })?;

            Ok(RenameOutcome::Renamed(Grant::new(
                GrantId::new(source_id),
                new_key,
            )))
        }
        // A concurrent writer registered the target after our lookup.
        Err(error) if is_unique_violation(&error) => {
            transaction.rollback().await.map_err(|error| {
                AppError::Internal(format!("failed to roll back transaction: {error}"))
            })?;
            merge_into_target(connection, source_id, new_key).await
        }
        Err(error) => Err(AppError::Internal(format!(
            "failed to rename grant '{permission} on {old_view_menu}': {error}"
        ))),
    }
}

async fn merge_into_target(
    connection: &mut PgConnection,
    source_id: i64,
    target: GrantKey,
) -> AppResult<RenameOutcome> {
    sqlx::query("DELETE FROM security_grants WHERE id = $1")
        .bind(source_id)
        .execute(&mut *connection)
        .await
        .map_err(|error| AppError::Internal(format!("failed to drop source grant: {error}")))?;

    match find_grant(connection, &target).await? {
        Some(grant) => Ok(RenameOutcome::MergedIntoExisting(grant)),
        None => Err(AppError::Internal(format!(
            "rename target '{target}' vanished during conflict resolution"
        ))),
    }
}

pub(super) async fn delete_grants_by_prefix(
    connection: &mut PgConnection,
    permission: &str,
    view_menu_prefix: &str,
) -> AppResult<Vec<GrantKey>> {
    let rows = sqlx::query_as::<_, GrantKeyRow>(
        r#"
        DELETE FROM security_grants
        WHERE permission = $1 AND starts_with(view_menu, $2)
        RETURNING permission, view_menu
        "#,
    )
    .bind(permission)
    .bind(view_menu_prefix)
    .fetch_all(&mut *connection)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to delete grants under '{view_menu_prefix}': {error}"
        ))
    })?;

    decode_sorted_keys(rows)
}

pub(super) async fn list_grants_by_prefix(
    connection: &mut PgConnection,
    permission: &str,
    view_menu_prefix: &str,
) -> AppResult<Vec<GrantKey>> {
    let rows = sqlx::query_as::<_, GrantKeyRow>(
        r#"
        SELECT permission, view_menu
        FROM security_grants
        WHERE permission = $1 AND starts_with(view_menu, $2)
        "#,
    )
    .bind(permission)
    .bind(view_menu_prefix)
    .fetch_all(&mut *connection)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to list grants under '{view_menu_prefix}': {error}"
        ))
    })?;

    decode_sorted_keys(rows)
}

pub(super) async fn list_grants(connection: &mut PgConnection) -> AppResult<Vec<Grant>> {
    let rows = sqlx::query_as::<_, GrantRow>(
        r#"
        SELECT id, permission, view_menu
        FROM security_grants
        ORDER BY permission, view_menu
        "#,
    )
    .fetch_all(&mut *connection)
    .await
    .map_err(|error| AppError::Internal(format!("failed to list grants: {error}")))?;

    rows.into_iter().map(GrantRow::into_grant).collect()
}

fn decode_sorted_keys(rows: Vec<GrantKeyRow>) -> AppResult<Vec<GrantKey>> {
    let mut keys = rows
        .into_iter()
        .map(|row| decode_key(row.permission, row.view_menu))
        .collect::<AppResult<Vec<_>>>()?;
    keys.sort();

    Ok(keys)
}
