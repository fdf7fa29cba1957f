use std::collections::BTreeSet;

use vizgate_core::AppResult;
use vizgate_domain::{
    DatabaseRecord, PermissionKind, Principal, TableRef, schema_perm, schema_perm_prefix,
    unpack_schema_perm,
};

use super::AccessService;

impl AccessService {
    /// Returns the view-menu names the principal holds `permission` on.
    pub async fn user_view_menu_names(
        &self,
        principal: &Principal,
        permission: &str,
    ) -> AppResult<BTreeSet<String>> {
        Ok(self
            .resolve_access(principal)
            .await?
            .view_menus(permission))
    }

    /// Filters `schemas` down to those the principal may browse in
    /// `database`, preserving input order.
    pub async fn schemas_accessible_by_user(
        &self,
        principal: &Principal,
        database: &DatabaseRecord,
        schemas: &[String],
    ) -> AppResult<Vec<String>> {
        let access = self.resolve_access(principal).await?;
        if access.database_access(database) {
            return Ok(schemas.to_vec());
        }

        let prefix = schema_perm_prefix(database.name());
        let mut accessible: BTreeSet<String> = access
            .view_menus(PermissionKind::SchemaAccess.as_str())
            .iter()
            .filter(|view_menu| view_menu.starts_with(prefix.as_str()))
            .filter_map(|view_menu| unpack_schema_perm(view_menu))
            .map(|(_, schema)| schema)
            .collect();

        let datasource_perms = access.view_menus(PermissionKind::DatasourceAccess.as_str());
        if !datasource_perms.is_empty() {
            for dataset in self
                .metadata
                .list_datasets_for_database(database.id())
                .await?
            {
                let granted = dataset
                    .perm()
                    .is_some_and(|perm| datasource_perms.contains(perm));
                if let Some(schema) = dataset.schema().filter(|_| granted) {
                    accessible.insert(schema.to_owned());
                }
            }
        }

        Ok(schemas
            .iter()
            .filter(|schema| accessible.contains(schema.as_str()))
            .cloned()
            .collect())
    }

    /// Filters `tables` down to those the principal may query in `database`.
    ///
    /// `schema` is applied to unqualified references.
    pub async fn datasources_accessible_by_user(
        &self,
        principal: &Principal,
        database: &DatabaseRecord,
        tables: &[TableRef],
        schema: Option<&str>,
    ) -> AppResult<Vec<TableRef>> {
        let access = self.resolve_access(principal).await?;
        if access.database_access(database) {
            return Ok(tables.to_vec());
        }

        if schema_perm(database.name(), schema)
            .is_some_and(|view_menu| access.holds_kind(PermissionKind::SchemaAccess, &view_menu))
        {
            return Ok(tables.to_vec());
        }

        let datasource_perms = access.view_menus(PermissionKind::DatasourceAccess.as_str());
        let schema_perms = access.view_menus(PermissionKind::SchemaAccess.as_str());
        let granted: Vec<TableRef> = self
            .metadata
            .list_datasets_for_database(database.id())
            .await?
            .into_iter()
            .filter(|dataset| {
                dataset
                    .perm()
                    .is_some_and(|perm| datasource_perms.contains(perm))
                    || dataset
                        .schema_perm()
                        .is_some_and(|perm| schema_perms.contains(perm))
            })
            .filter_map(|dataset| {
                TableRef::new(
                    dataset.schema().map(str::to_owned),
                    dataset.table_name(),
                )
                .ok()
            })
            .collect();

        Ok(tables
            .iter()
            .filter(|table| granted.contains(&table.with_default_schema(schema)))
            .cloned()
            .collect())
    }

    /// Returns the referenced tables the principal may not query, without
    /// raising.
    pub async fn rejected_tables(
        &self,
        principal: &Principal,
        database: &DatabaseRecord,
        tables: &[TableRef],
        default_schema: Option<&str>,
    ) -> AppResult<Vec<TableRef>> {
        let access = self.resolve_access(principal).await?;
        self.denied_tables(principal, &access, database, tables, default_schema)
            .await
    }
}
