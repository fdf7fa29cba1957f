use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{info, warn};

use vizgate_core::{AppError, AppResult};
use vizgate_domain::{
    DatabaseId, DatabaseRecord, DatasetRecord, DatasourceType, EntityChange, Grant, GrantKey,
    PermissionKind, database_perm, dataset_perm, schema_perm, schema_perm_prefix,
};

use crate::security_ports::{
    EnsureOutcome, GrantEvent, GrantEventSink, PermissionRegistry, RenameOutcome,
    SecurityMetadataRepository,
};

/// Counters reported by [`PermissionSyncService::create_missing_perms`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MissingPermsSummary {
    /// Grants inserted because they were absent.
    pub grants_created: usize,
    /// Datasets whose stored `perm`/`schema_perm` were stale and rewritten.
    pub datasets_repaired: usize,
}

/// Keeps derived view-menu names consistent across databases, datasets,
/// charts and the permission registry.
///
/// This service is the only writer of the denormalized `perm` and
/// `schema_perm` fields. Metadata adapters call the `on_*` hooks once per
/// committed mutation, inside the same transaction.
#[derive(Clone)]
pub struct PermissionSyncService {
    registry: Arc<dyn PermissionRegistry>,
    metadata: Arc<dyn SecurityMetadataRepository>,
    events: Arc<dyn GrantEventSink>,
}

impl PermissionSyncService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        registry: Arc<dyn PermissionRegistry>,
        metadata: Arc<dyn SecurityMetadataRepository>,
        events: Arc<dyn GrantEventSink>,
    ) -> Self {
        Self {
            registry,
            metadata,
            events,
        }
    }

    /// Registers the `database_access` grant of a new database.
    pub async fn on_database_created(&self, database: &DatabaseRecord) -> AppResult<Grant> {
        self.ensure(
            PermissionKind::DatabaseAccess,
            &database_perm(database.id(), database.name()),
        )
        .await
        .map(EnsureOutcome::into_grant)
    }

    /// Dispatches a database insert or update to the matching handler.
    pub async fn on_database_updated(&self, change: &EntityChange<DatabaseRecord>) -> AppResult<()> {
        match &change.old {
            None => self.on_database_created(&change.new).await.map(|_| ()),
            Some(old) if change.changed(|database| database.name().to_owned()) => {
                self.on_database_renamed(&change.new, old.name()).await
            }
            Some(_) => Ok(()),
        }
    }

    /// Migrates the database grant to the new name and cascades to every
    /// dataset and chart of the database.
    ///
    /// When the new grant already exists the rename has been applied before
    /// and only the stale source grant is dropped.
    pub async fn on_database_renamed(
        &self,
        database: &DatabaseRecord,
        old_name: &str,
    ) -> AppResult<()> {
        let new_name = database.name();
        if old_name == new_name {
            return Ok(());
        }

        let kind = PermissionKind::DatabaseAccess;
        let old_view_menu = database_perm(database.id(), old_name);
        let new_view_menu = database_perm(database.id(), new_name);

        match self
            .registry
            .rename_grant(kind.as_str(), &old_view_menu, &new_view_menu)
            .await?
        {
            RenameOutcome::MergedIntoExisting(kept) => {
                warn!(
                    database_id = %database.id(),
                    view_menu = %new_view_menu,
                    "database grant already migrated, dropped stale source"
                );
                self.events
                    .record(GrantEvent::Merged {
                        removed: GrantKey::for_kind(kind, old_view_menu)?,
                        kept: kept.key().clone(),
                    })
                    .await?;
                return Ok(());
            }
            RenameOutcome::Renamed(grant) => {
                info!(
                    database_id = %database.id(),
                    from = %old_view_menu,
                    to = %new_view_menu,
                    "renamed database grant"
                );
                self.events
                    .record(GrantEvent::Renamed {
                        from: GrantKey::for_kind(kind, old_view_menu)?,
                        to: grant.key().clone(),
                    })
                    .await?;
            }
            RenameOutcome::SourceMissing => {
                warn!(
                    database_id = %database.id(),
                    view_menu = %old_view_menu,
                    "database grant missing before rename, recreating"
                );
                self.ensure(kind, &new_view_menu).await?;
            }
        }

        self.cascade_database_rename(database, old_name).await
    }

    /// Removes the database grant and every schema and dataset grant under
    /// it.
    ///
    /// Dataset rows may already be gone through the foreign-key cascade, so
    /// their grants are matched by name prefix rather than by listing
    /// datasets.
    pub async fn on_database_deleted(&self, database: &DatabaseRecord) -> AppResult<()> {
        self.delete(
            PermissionKind::DatabaseAccess,
            &database_perm(database.id(), database.name()),
        )
        .await?;

        // Schema and dataset view menus share the `[database].[` prefix.
        let prefix = schema_perm_prefix(database.name());
        for kind in [PermissionKind::SchemaAccess, PermissionKind::DatasourceAccess] {
            let removed = self
                .registry
                .delete_grants_by_prefix(kind.as_str(), &prefix)
                .await?;

            for key in removed {
                info!(
                    permission = kind.as_str(),
                    view_menu = %key.view_menu(),
                    "deleted grant of removed database"
                );
                self.events.record(GrantEvent::Deleted(key)).await?;
            }
        }

        Ok(())
    }

    /// Registers the grants of a new dataset and writes its derived fields
    /// back.
    ///
    /// `database` may be omitted when the relationship was not loaded; the
    /// parent is then fetched by id.
    pub async fn on_dataset_created(
        &self,
        dataset: &DatasetRecord,
        database: Option<&DatabaseRecord>,
    ) -> AppResult<()> {
        let database = match database {
            Some(database) => database.clone(),
            None => self.load_database(dataset.database_id()).await?,
        };

        let perm = dataset_perm(dataset.id(), dataset.table_name(), database.name());
        self.ensure(PermissionKind::DatasourceAccess, &perm).await?;

        let schema_perm = schema_perm(database.name(), dataset.schema());
        if let Some(schema_perm) = schema_perm.as_deref() {
            self.ensure(PermissionKind::SchemaAccess, schema_perm)
                .await?;
        }

        self.metadata
            .update_dataset_perms(dataset.id(), &perm, schema_perm.as_deref())
            .await
    }

    /// Reacts to the fields of a dataset that actually changed.
    pub async fn on_dataset_updated(&self, change: &EntityChange<DatasetRecord>) -> AppResult<()> {
        let Some(old) = change.old.as_ref() else {
            return self.on_dataset_created(&change.new, None).await;
        };
        let new = &change.new;

        let database_changed = change.changed(DatasetRecord::database_id);
        let table_changed = change.changed(|dataset| dataset.table_name().to_owned());
        let schema_changed = change.changed(|dataset| dataset.schema().map(str::to_owned));
        if !database_changed && !table_changed && !schema_changed {
            return Ok(());
        }

        let database = self.load_database(new.database_id()).await?;
        let new_perm = dataset_perm(new.id(), new.table_name(), database.name());
        let new_schema_perm = schema_perm(database.name(), new.schema());

        if database_changed || table_changed {
            let old_perm = match old.perm() {
                Some(perm) => perm.to_owned(),
                None => self.derive_dataset_perm(old).await?,
            };

            self.migrate(PermissionKind::DatasourceAccess, &old_perm, &new_perm)
                .await?;
            let charts = self.metadata.update_chart_perms(&old_perm, &new_perm).await?;
            info!(
                dataset_id = %new.id(),
                charts,
                perm = %new_perm,
                "propagated dataset permission to charts"
            );
        }

        if let Some(schema_perm) = new_schema_perm.as_deref() {
            self.ensure(PermissionKind::SchemaAccess, schema_perm)
                .await?;
        }

        self.metadata
            .update_dataset_perms(new.id(), &new_perm, new_schema_perm.as_deref())
            .await?;

        if database_changed || schema_changed {
            self.metadata
                .update_chart_schema_perms(
                    new.id(),
                    DatasourceType::Table,
                    new_schema_perm.as_deref(),
                )
                .await?;
        }

        Ok(())
    }

    /// Removes the `datasource_access` grant of a deleted dataset.
    pub async fn on_dataset_deleted(&self, dataset: &DatasetRecord) -> AppResult<()> {
        let perm = match dataset.perm() {
            Some(perm) => perm.to_owned(),
            None => self.derive_dataset_perm(dataset).await?,
        };

        self.delete(PermissionKind::DatasourceAccess, &perm).await
    }

    /// Ensures every database and dataset has its grants and that stored
    /// derived fields match their canonical strings.
    pub async fn create_missing_perms(&self) -> AppResult<MissingPermsSummary> {
        let mut summary = MissingPermsSummary::default();
        let mut database_names = HashMap::new();

        for database in self.metadata.list_databases().await? {
            let created = self
                .ensure(
                    PermissionKind::DatabaseAccess,
                    &database_perm(database.id(), database.name()),
                )
                .await?
                .was_created();
            summary.grants_created += usize::from(created);
            database_names.insert(database.id(), database.name().to_owned());
        }

        for dataset in self.metadata.list_datasets().await? {
            let Some(database_name) = database_names.get(&dataset.database_id()) else {
                warn!(
                    dataset_id = %dataset.id(),
                    database_id = %dataset.database_id(),
                    "dataset references an unknown database, skipping"
                );
                continue;
            };

            let perm = dataset_perm(dataset.id(), dataset.table_name(), database_name);
            let created = self
                .ensure(PermissionKind::DatasourceAccess, &perm)
                .await?
                .was_created();
            summary.grants_created += usize::from(created);

            let schema_perm = schema_perm(database_name, dataset.schema());
            if let Some(schema_perm) = schema_perm.as_deref() {
                let created = self
                    .ensure(PermissionKind::SchemaAccess, schema_perm)
                    .await?
                    .was_created();
                summary.grants_created += usize::from(created);
            }

            if dataset.perm() == Some(perm.as_str())
                && dataset.schema_perm() == schema_perm.as_deref()
            {
                continue;
            }

            self.metadata
                .update_dataset_perms(dataset.id(), &perm, schema_perm.as_deref())
                .await?;
            if let Some(stale) = dataset.perm().filter(|stale| *stale != perm) {
                self.metadata.update_chart_perms(stale, &perm).await?;
            }
            self.metadata
                .update_chart_schema_perms(
                    dataset.id(),
                    DatasourceType::Table,
                    schema_perm.as_deref(),
                )
                .await?;
            summary.datasets_repaired += 1;
        }

        info!(
            grants_created = summary.grants_created,
            datasets_repaired = summary.datasets_repaired,
            "created missing permissions"
        );

        Ok(summary)
    }

    async fn cascade_database_rename(
        &self,
        database: &DatabaseRecord,
        old_name: &str,
    ) -> AppResult<()> {
        let new_name = database.name();
        let mut migrated_schemas = BTreeSet::new();

        for dataset in self
            .metadata
            .list_datasets_for_database(database.id())
            .await?
        {
            let old_perm = dataset_perm(dataset.id(), dataset.table_name(), old_name);
            let new_perm = dataset_perm(dataset.id(), dataset.table_name(), new_name);
            self.migrate(PermissionKind::DatasourceAccess, &old_perm, &new_perm)
                .await?;

            let new_schema_perm = schema_perm(new_name, dataset.schema());
            if let (Some(old_schema_perm), Some(new_schema_perm)) = (
                schema_perm(old_name, dataset.schema()),
                new_schema_perm.as_deref(),
            ) {
                // Several datasets share one schema grant.
                if migrated_schemas.insert(old_schema_perm.clone()) {
                    self.migrate(
                        PermissionKind::SchemaAccess,
                        &old_schema_perm,
                        new_schema_perm,
                    )
                    .await?;
                }
            }

            self.metadata
                .update_dataset_perms(dataset.id(), &new_perm, new_schema_perm.as_deref())
                .await?;

            let stale_perm = dataset.perm().unwrap_or(old_perm.as_str());
            let mut charts = self.metadata.update_chart_perms(stale_perm, &new_perm).await?;
            if stale_perm != old_perm {
                charts += self.metadata.update_chart_perms(&old_perm, &new_perm).await?;
            }
            self.metadata
                .update_chart_schema_perms(
                    dataset.id(),
                    DatasourceType::Table,
                    new_schema_perm.as_deref(),
                )
                .await?;

            info!(
                dataset_id = %dataset.id(),
                charts,
                perm = %new_perm,
                "cascaded database rename to dataset"
            );
        }

        self.migrate_unbacked_schema_grants(old_name, new_name)
            .await
    }

    /// Moves schema grants that no remaining dataset points at, so no
    /// `[old].[schema]` name outlives the rename.
    async fn migrate_unbacked_schema_grants(&self, old_name: &str, new_name: &str) -> AppResult<()> {
        let kind = PermissionKind::SchemaAccess;
        let old_prefix = schema_perm_prefix(old_name);
        let new_prefix = schema_perm_prefix(new_name);

        for key in self
            .registry
            .list_grants_by_prefix(kind.as_str(), &old_prefix)
            .await?
        {
            let Some(schema_suffix) = key.view_menu().strip_prefix(old_prefix.as_str()) else {
                continue;
            };

            let new_view_menu = format!("{new_prefix}{schema_suffix}");
            self.migrate(kind, key.view_menu(), &new_view_menu).await?;
        }

        Ok(())
    }

    async fn migrate(
        &self,
        kind: PermissionKind,
        old_view_menu: &str,
        new_view_menu: &str,
    ) -> AppResult<()> {
        if old_view_menu == new_view_menu {
            return Ok(());
        }

        match self
            .registry
            .rename_grant(kind.as_str(), old_view_menu, new_view_menu)
            .await?
        {
            RenameOutcome::Renamed(grant) => {
                info!(
                    permission = kind.as_str(),
                    from = %old_view_menu,
                    to = %new_view_menu,
                    "renamed grant"
                );
                self.events
                    .record(GrantEvent::Renamed {
                        from: GrantKey::for_kind(kind, old_view_menu)?,
                        to: grant.key().clone(),
                    })
                    .await
            }
            RenameOutcome::MergedIntoExisting(kept) => {
                warn!(
                    permission = kind.as_str(),
                    from = %old_view_menu,
                    to = %new_view_menu,
                    "rename target already registered, dropped source grant"
                );
                self.events
                    .record(GrantEvent::Merged {
                        removed: GrantKey::for_kind(kind, old_view_menu)?,
                        kept: kept.key().clone(),
                    })
                    .await
            }
            RenameOutcome::SourceMissing => {
                warn!(
                    permission = kind.as_str(),
                    view_menu = %old_view_menu,
                    "grant missing before rename, recreating at target"
                );
                self.ensure(kind, new_view_menu).await.map(|_| ())
            }
        }
    }

    async fn ensure(&self, kind: PermissionKind, view_menu: &str) -> AppResult<EnsureOutcome> {
        let key = GrantKey::for_kind(kind, view_menu)?;
        let outcome = self.registry.ensure_grant(&key).await?;
        if outcome.was_created() {
            info!(permission = kind.as_str(), view_menu = %view_menu, "created grant");
            self.events.record(GrantEvent::Created(key)).await?;
        }

        Ok(outcome)
    }

    async fn delete(&self, kind: PermissionKind, view_menu: &str) -> AppResult<()> {
        let key = GrantKey::for_kind(kind, view_menu)?;
        if self.registry.delete_grant(&key).await? {
            info!(permission = kind.as_str(), view_menu = %view_menu, "deleted grant");
            self.events.record(GrantEvent::Deleted(key)).await?;
        }

        Ok(())
    }

    async fn derive_dataset_perm(&self, dataset: &DatasetRecord) -> AppResult<String> {
        let database = self.load_database(dataset.database_id()).await?;
        Ok(dataset_perm(
            dataset.id(),
            dataset.table_name(),
            database.name(),
        ))
    }

    async fn load_database(&self, database_id: DatabaseId) -> AppResult<DatabaseRecord> {
        self.metadata
            .find_database(database_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("database '{database_id}' does not exist")))
    }
}
