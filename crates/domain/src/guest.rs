use serde::{Deserialize, Serialize};
use vizgate_core::{AppError, AppResult};

use crate::DatasetId;

/// Literal `type` claim carried by guest tokens.
pub const GUEST_TOKEN_TYPE: &str = "guest";

/// Identity claims of an embedded-context guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestUser {
    /// Display username.
    pub username: String,
    /// Optional first name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Optional last name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl GuestUser {
    /// Creates a guest identity with only a username.
    pub fn new(username: impl Into<String>) -> AppResult<Self> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(AppError::Validation(
                "guest username must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            username,
            first_name: None,
            last_name: None,
        })
    }
}

/// Kind of resource a guest token may grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuestResourceType {
    /// An embedded dashboard, referenced by embedding UUID or dashboard id.
    Dashboard,
}

/// A resource the guest may view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuestResource {
    /// Resource kind.
    #[serde(rename = "type")]
    pub resource_type: GuestResourceType,
    /// Embedding UUID or numeric dashboard id, as a string.
    pub id: String,
}

impl GuestResource {
    /// Creates a dashboard resource claim.
    #[must_use]
    pub fn dashboard(id: impl Into<String>) -> Self {
        Self {
            resource_type: GuestResourceType::Dashboard,
            id: id.into(),
        }
    }
}

/// A row-level-security clause carried by the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestRlsRule {
    /// Dataset the clause is scoped to; `None` applies it everywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetId>,
    /// SQL predicate.
    pub clause: String,
}

impl GuestRlsRule {
    /// Returns whether the clause applies to `dataset_id`.
    #[must_use]
    pub fn applies_to(&self, dataset_id: DatasetId) -> bool {
        self.dataset.is_none_or(|dataset| dataset == dataset_id)
    }
}

/// Claims bundle of a signed guest token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestTokenClaims {
    /// Guest identity.
    pub user: GuestUser,
    /// Resources the guest may view.
    pub resources: Vec<GuestResource>,
    /// Row-level-security overrides.
    pub rls_rules: Vec<GuestRlsRule>,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    /// Intended audience.
    pub aud: String,
    /// Token kind; always [`GUEST_TOKEN_TYPE`] for guest tokens.
    #[serde(rename = "type")]
    pub token_type: String,
}
