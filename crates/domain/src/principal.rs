use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vizgate_core::{AppResult, NonEmptyString};

use crate::{
    DashboardId, GuestResource, GuestResourceType, GuestRlsRule, GuestTokenClaims, GuestUser,
    RoleId, UserId,
};

/// A persisted user and the roles assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredUser {
    id: UserId,
    username: NonEmptyString,
    roles: BTreeSet<RoleId>,
}

impl RegisteredUser {
    /// Creates a validated registered user.
    pub fn new(id: UserId, username: impl Into<String>, roles: BTreeSet<RoleId>) -> AppResult<Self> {
        Ok(Self {
            id,
            username: NonEmptyString::new(username)?,
            roles,
        })
    }

    /// Returns the user identifier.
    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        self.username.as_str()
    }

    /// Returns assigned roles.
    #[must_use]
    pub fn roles(&self) -> &BTreeSet<RoleId> {
        &self.roles
    }
}

/// An ephemeral principal decoded from one guest token.
///
/// Built fresh per request and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestPrincipal {
    user: GuestUser,
    resources: Vec<GuestResource>,
    rls_rules: Vec<GuestRlsRule>,
}

impl GuestPrincipal {
    /// Builds the principal from verified claims.
    #[must_use]
    pub fn from_claims(claims: GuestTokenClaims) -> Self {
        Self {
            user: claims.user,
            resources: claims.resources,
            rls_rules: claims.rls_rules,
        }
    }

    /// Returns the guest identity.
    #[must_use]
    pub fn user(&self) -> &GuestUser {
        &self.user
    }

    /// Returns permitted resources.
    #[must_use]
    pub fn resources(&self) -> &[GuestResource] {
        self.resources.as_slice()
    }

    /// Returns token-embedded row-level-security rules.
    #[must_use]
    pub fn rls_rules(&self) -> &[GuestRlsRule] {
        self.rls_rules.as_slice()
    }

    /// Returns whether the token names `dashboard_id` or one of its
    /// embedding UUIDs.
    #[must_use]
    pub fn has_dashboard_resource(&self, dashboard_id: DashboardId, embed_ids: &[String]) -> bool {
        let dashboard_id = dashboard_id.to_string();
        self.resources.iter().any(|resource| {
            resource.resource_type == GuestResourceType::Dashboard
                && (resource.id == dashboard_id || embed_ids.contains(&resource.id))
        })
    }
}

/// The acting identity for an authorization decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// A registered user.
    Registered(RegisteredUser),
    /// A guest from a verified token.
    Guest(GuestPrincipal),
    /// No session and no valid guest token.
    Anonymous,
}

impl Principal {
    /// Returns the registered user, if any.
    #[must_use]
    pub fn as_registered(&self) -> Option<&RegisteredUser> {
        match self {
            Self::Registered(user) => Some(user),
            _ => None,
        }
    }

    /// Returns the guest principal, if any.
    #[must_use]
    pub fn as_guest(&self) -> Option<&GuestPrincipal> {
        match self {
            Self::Guest(guest) => Some(guest),
            _ => None,
        }
    }

    /// Returns the registered user id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.as_registered().map(RegisteredUser::id)
    }

    /// Returns whether the principal is one of `owners`.
    #[must_use]
    pub fn is_owner(&self, owners: &[UserId]) -> bool {
        self.user_id().is_some_and(|user_id| owners.contains(&user_id))
    }

    /// Returns a name suitable for log fields.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::Registered(user) => user.username(),
            Self::Guest(guest) => guest.user().username.as_str(),
            Self::Anonymous => "anonymous",
        }
    }
}
