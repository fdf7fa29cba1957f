use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vizgate_core::{AppError, AppResult, NonEmptyString};

use crate::{ChartId, DashboardId, DatabaseId, DatasetId, RoleId, UserId};

/// A registered database connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    id: DatabaseId,
    name: NonEmptyString,
}

impl DatabaseRecord {
    /// Creates a validated database record.
    pub fn new(id: DatabaseId, name: impl Into<String>) -> AppResult<Self> {
        Ok(Self {
            id,
            name: NonEmptyString::new(name)?,
        })
    }

    /// Returns the database identifier.
    #[must_use]
    pub fn id(&self) -> DatabaseId {
        self.id
    }

    /// Returns the database display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns a copy renamed to `name`.
    pub fn renamed(&self, name: impl Into<String>) -> AppResult<Self> {
        Self::new(self.id, name)
    }
}

/// Kind of object a chart reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasourceType {
    /// A dataset backed by a physical or virtual table.
    Table,
    /// A saved SQL Lab query.
    Query,
}

impl DatasourceType {
    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Query => "query",
        }
    }
}

impl FromStr for DatasourceType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "table" => Ok(Self::Table),
            "query" => Ok(Self::Query),
            _ => Err(AppError::Validation(format!(
                "unknown datasource type '{value}'"
            ))),
        }
    }
}

/// A dataset registered on top of one database.
///
/// `perm` and `schema_perm` are derived view-menu names. They are read-only
/// here; the permission synchronizer writes them through the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    id: DatasetId,
    table_name: NonEmptyString,
    database_id: DatabaseId,
    schema: Option<String>,
    owners: Vec<UserId>,
    perm: Option<String>,
    schema_perm: Option<String>,
}

impl DatasetRecord {
    /// Creates a dataset that has not been synchronized yet.
    pub fn new(
        id: DatasetId,
        table_name: impl Into<String>,
        database_id: DatabaseId,
        schema: Option<String>,
        owners: Vec<UserId>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            table_name: NonEmptyString::new(table_name)?,
            database_id,
            schema: schema.filter(|value| !value.is_empty()),
            owners,
            perm: None,
            schema_perm: None,
        })
    }

    /// Restores the derived fields of a persisted row.
    ///
    /// Storage adapters call this when loading rows; services never do.
    #[must_use]
    pub fn with_stored_perms(mut self, perm: Option<String>, schema_perm: Option<String>) -> Self {
        self.perm = perm;
        self.schema_perm = schema_perm;
        self
    }

    /// Returns the dataset identifier.
    #[must_use]
    pub fn id(&self) -> DatasetId {
        self.id
    }

    /// Returns the dataset (table) name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        self.table_name.as_str()
    }

    /// Returns the parent database identifier.
    #[must_use]
    pub fn database_id(&self) -> DatabaseId {
        self.database_id
    }

    /// Returns the schema, when the dataset lives in one.
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Returns the owners of the dataset.
    #[must_use]
    pub fn owners(&self) -> &[UserId] {
        self.owners.as_slice()
    }

    /// Returns the stored dataset view-menu name.
    #[must_use]
    pub fn perm(&self) -> Option<&str> {
        self.perm.as_deref()
    }

    /// Returns the stored schema view-menu name.
    #[must_use]
    pub fn schema_perm(&self) -> Option<&str> {
        self.schema_perm.as_deref()
    }

    /// Returns `schema.table`, or the bare table name without a schema.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match self.schema() {
            Some(schema) => format!("{schema}.{}", self.table_name()),
            None => self.table_name().to_owned(),
        }
    }

    /// Returns whether `schema` and `table_name` identify this dataset's table.
    #[must_use]
    pub fn wraps_table(&self, schema: Option<&str>, table_name: &str) -> bool {
        self.table_name() == table_name && self.schema() == schema.filter(|value| !value.is_empty())
    }
}

/// A saved chart reading from one datasource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRecord {
    id: ChartId,
    datasource_id: DatasetId,
    datasource_type: DatasourceType,
    owners: Vec<UserId>,
    perm: Option<String>,
    schema_perm: Option<String>,
}

impl ChartRecord {
    /// Creates a chart that has not been synchronized yet.
    #[must_use]
    pub fn new(
        id: ChartId,
        datasource_id: DatasetId,
        datasource_type: DatasourceType,
        owners: Vec<UserId>,
    ) -> Self {
        Self {
            id,
            datasource_id,
            datasource_type,
            owners,
            perm: None,
            schema_perm: None,
        }
    }

    /// Restores the derived fields of a persisted row.
    #[must_use]
    pub fn with_stored_perms(mut self, perm: Option<String>, schema_perm: Option<String>) -> Self {
        self.perm = perm;
        self.schema_perm = schema_perm;
        self
    }

    /// Returns the chart identifier.
    #[must_use]
    pub fn id(&self) -> ChartId {
        self.id
    }

    /// Returns the referenced datasource identifier.
    #[must_use]
    pub fn datasource_id(&self) -> DatasetId {
        self.datasource_id
    }

    /// Returns the referenced datasource type.
    #[must_use]
    pub fn datasource_type(&self) -> DatasourceType {
        self.datasource_type
    }

    /// Returns the chart owners.
    #[must_use]
    pub fn owners(&self) -> &[UserId] {
        self.owners.as_slice()
    }

    /// Returns the stored dataset view-menu name copied from the datasource.
    #[must_use]
    pub fn perm(&self) -> Option<&str> {
        self.perm.as_deref()
    }

    /// Returns the stored schema view-menu name copied from the datasource.
    #[must_use]
    pub fn schema_perm(&self) -> Option<&str> {
        self.schema_perm.as_deref()
    }
}

/// A dashboard and the access metadata the evaluator needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardRecord {
    id: DashboardId,
    title: NonEmptyString,
    published: bool,
    owners: Vec<UserId>,
    roles: Vec<RoleId>,
    datasets: Vec<DatasetId>,
}

impl DashboardRecord {
    /// Creates a validated dashboard record.
    pub fn new(
        id: DashboardId,
        title: impl Into<String>,
        published: bool,
        owners: Vec<UserId>,
        roles: Vec<RoleId>,
        datasets: Vec<DatasetId>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            title: NonEmptyString::new(title)?,
            published,
            owners,
            roles,
            datasets,
        })
    }

    /// Returns the dashboard identifier.
    #[must_use]
    pub fn id(&self) -> DashboardId {
        self.id
    }

    /// Returns the dashboard title.
    #[must_use]
    pub fn title(&self) -> &str {
        self.title.as_str()
    }

    /// Returns whether the dashboard is published.
    #[must_use]
    pub fn published(&self) -> bool {
        self.published
    }

    /// Returns the dashboard owners.
    #[must_use]
    pub fn owners(&self) -> &[UserId] {
        self.owners.as_slice()
    }

    /// Returns roles the dashboard is restricted to, if any.
    #[must_use]
    pub fn roles(&self) -> &[RoleId] {
        self.roles.as_slice()
    }

    /// Returns datasets used by the dashboard's charts.
    #[must_use]
    pub fn datasets(&self) -> &[DatasetId] {
        self.datasets.as_slice()
    }
}

/// Embedding configuration exposing one dashboard to guest tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedDashboard {
    uuid: Uuid,
    dashboard_id: DashboardId,
    allowed_domains: Vec<String>,
}

impl EmbeddedDashboard {
    /// Creates an embedding entry.
    #[must_use]
    pub fn new(uuid: Uuid, dashboard_id: DashboardId, allowed_domains: Vec<String>) -> Self {
        Self {
            uuid,
            dashboard_id,
            allowed_domains,
        }
    }

    /// Returns the public embedding UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the embedded dashboard identifier.
    #[must_use]
    pub fn dashboard_id(&self) -> DashboardId {
        self.dashboard_id
    }

    /// Returns domains allowed to frame the dashboard.
    #[must_use]
    pub fn allowed_domains(&self) -> &[String] {
        self.allowed_domains.as_slice()
    }
}

/// A physical table referenced by free-form SQL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    schema: Option<String>,
    table: String,
}

impl TableRef {
    /// Creates a table reference.
    pub fn new(schema: Option<String>, table: impl Into<String>) -> AppResult<Self> {
        let table = table.into();
        if table.trim().is_empty() {
            return Err(AppError::Validation(
                "table reference must name a table".to_owned(),
            ));
        }

        Ok(Self {
            schema: schema.filter(|value| !value.is_empty()),
            table,
        })
    }

    /// Parses `[[catalog.]schema.]table` as extracted from a SQL statement.
    ///
    /// The catalog component is dropped.
    pub fn parse(value: &str) -> AppResult<Self> {
        let pieces: Vec<&str> = value.split('.').collect();
        match pieces.as_slice() {
            [table] => Self::new(None, *table),
            [schema, table] | [_, schema, table] => Self::new(Some((*schema).to_owned()), *table),
            _ => Err(AppError::Validation(format!(
                "invalid table reference '{value}'"
            ))),
        }
    }

    /// Returns the schema named in the reference.
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        self.table.as_str()
    }

    /// Returns the reference with `default_schema` applied when none is named.
    #[must_use]
    pub fn with_default_schema(&self, default_schema: Option<&str>) -> Self {
        match (&self.schema, default_schema) {
            (None, Some(schema)) if !schema.is_empty() => Self {
                schema: Some(schema.to_owned()),
                table: self.table.clone(),
            },
            _ => self.clone(),
        }
    }
}

impl Display for TableRef {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(formatter, "{schema}.{}", self.table),
            None => formatter.write_str(self.table.as_str()),
        }
    }
}
