use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Category of resource an access denial refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    /// A registered database.
    Database,
    /// A registered dataset.
    Datasource,
    /// One or more physical tables referenced by free-form SQL.
    Table,
    /// A chart.
    Chart,
    /// A dashboard.
    Dashboard,
    /// A mutation that requires ownership.
    Ownership,
    /// Activity data of another principal.
    Activity,
}

impl DenialKind {
    /// Returns a stable transport value for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Datasource => "datasource",
            Self::Table => "table",
            Self::Chart => "chart",
            Self::Dashboard => "dashboard",
            Self::Ownership => "ownership",
            Self::Activity => "activity",
        }
    }
}

/// User-facing denial naming the resources the caller could not access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDenial {
    kind: DenialKind,
    message: String,
    resources: Vec<String>,
    link: Option<String>,
}

impl AccessDenial {
    /// Creates a denial payload.
    #[must_use]
    pub fn new(
        kind: DenialKind,
        message: impl Into<String>,
        resources: Vec<String>,
        link: Option<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            resources,
            link,
        }
    }

    /// Returns the denial category.
    #[must_use]
    pub fn kind(&self) -> DenialKind {
        self.kind
    }

    /// Returns the user-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Returns every denied resource name.
    #[must_use]
    pub fn resources(&self) -> &[String] {
        self.resources.as_slice()
    }

    /// Returns the remediation link, if one is configured.
    #[must_use]
    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }
}

impl Display for AccessDenial {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} ({})", self.message, self.kind.as_str())
    }
}
