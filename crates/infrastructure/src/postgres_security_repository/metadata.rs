use super::*;

pub(super) async fn find_database(
    connection: &mut PgConnection,
    database_id: DatabaseId,
) -> AppResult<Option<DatabaseRecord>> {
    sqlx::query_as::<_, DatabaseRow>(
        r#"
        SELECT id, database_name
        FROM databases
        WHERE id = $1
        "#,
    )
    .bind(database_id.get())
    .fetch_optional(&mut *connection)
    .await
    .map_err(|error| {
        AppError::Internal(format!("failed to find database '{database_id}': {error}"))
    })?
    .map(DatabaseRow::into_record)
    .transpose()
}

pub(super) async fn list_databases(connection: &mut PgConnection) -> AppResult<Vec<DatabaseRecord>> {
    let rows = sqlx::query_as::<_, DatabaseRow>(
        r#"
        SELECT id, database_name
        FROM databases
        ORDER BY id
        "#,
    )
    .fetch_all(&mut *connection)
    .await
    .map_err(|error| AppError::Internal(format!("failed to list databases: {error}")))?;

    rows.into_iter().map(DatabaseRow::into_record).collect()
}

pub(super) async fn find_dataset(
    connection: &mut PgConnection,
    dataset_id: DatasetId,
) -> AppResult<Option<DatasetRecord>> {
    sqlx::query_as::<_, DatasetRow>(
        r#"
        SELECT id, table_name, database_id, schema_name, owners, perm, schema_perm
        FROM datasets
        WHERE id = $1
        "#,
    )
    .bind(dataset_id.get())
    .fetch_optional(&mut *connection)
    .await
    .map_err(|error| {
        AppError::Internal(format!("failed to find dataset '{dataset_id}': {error}"))
    })?
    .map(DatasetRow::into_record)
    .transpose()
}

pub(super) async fn list_datasets(
    connection: &mut PgConnection,
    database_id: Option<DatabaseId>,
) -> AppResult<Vec<DatasetRecord>> {
    let rows = sqlx::query_as::<_, DatasetRow>(
        r#"
        SELECT id, table_name, database_id, schema_name, owners, perm, schema_perm
        FROM datasets
        WHERE $1::BIGINT IS NULL OR database_id = $1
        ORDER BY id
        "#,
    )
    .bind(database_id.map(DatabaseId::get))
    .fetch_all(&mut *connection)
    .await
    .map_err(|error| AppError::Internal(format!("failed to list datasets: {error}")))?;

    rows.into_iter().map(DatasetRow::into_record).collect()
}

pub(super) async fn find_datasets_by_table(
    connection: &mut PgConnection,
    database_id: DatabaseId,
    schema: Option<&str>,
    table_name: &str,
) -> AppResult<Vec<DatasetRecord>> {
    let rows = sqlx::query_as::<_, DatasetRow>(
        r#"
        SELECT id, table_name, database_id, schema_name, owners, perm, schema_perm
        FROM datasets
        WHERE database_id = $1
            AND NULLIF(schema_name, '') IS NOT DISTINCT FROM $2
            AND table_name = $3
        ORDER BY id
        "#,
    )
    .bind(database_id.get())
    .bind(schema.filter(|value| !value.is_empty()))
    .bind(table_name)
    .fetch_all(&mut *connection)
    .await
    .map_err(|error| {
        AppError::Internal(format!("failed to find datasets of table '{table_name}': {error}"))
    })?;

    rows.into_iter().map(DatasetRow::into_record).collect()
}

pub(super) async fn update_dataset_perms(
    connection: &mut PgConnection,
    dataset_id: DatasetId,
    perm: &str,
    schema_perm: Option<&str>,
) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE datasets
        SET perm = $2, schema_perm = $3
        WHERE id = $1
        "#,
    )
    .bind(dataset_id.get())
    .bind(perm)
    .bind(schema_perm)
    .execute(&mut *connection)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to update permissions of dataset '{dataset_id}': {error}"
        ))
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "dataset '{dataset_id}' does not exist"
        )));
    }

    Ok(())
}

pub(super) async fn update_chart_perms(
    connection: &mut PgConnection,
    old_perm: &str,
    new_perm: &str,
) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE charts
        SET perm = $2
        WHERE perm = $1
        "#,
    )
    .bind(old_perm)
    .bind(new_perm)
    .execute(&mut *connection)
    .await
    .map_err(|error| {
        AppError::Internal(format!("failed to propagate chart permissions: {error}"))
    })?;

    Ok(result.rows_affected())
}

pub(super) async fn update_chart_schema_perms(
    connection: &mut PgConnection,
    datasource_id: DatasetId,
    datasource_type: DatasourceType,
    schema_perm: Option<&str>,
) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE charts
        SET schema_perm = $3
        WHERE datasource_id = $1
            AND datasource_type = $2
            AND schema_perm IS DISTINCT FROM $3
        "#,
    )
    .bind(datasource_id.get())
    .bind(datasource_type.as_str())
    .bind(schema_perm)
    .execute(&mut *connection)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to propagate chart schema permissions: {error}"
        ))
    })?;

    Ok(result.rows_affected())
}
