use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use vizgate_core::{AppError, AppResult};
use vizgate_domain::{
    DashboardId, GUEST_TOKEN_TYPE, GuestPrincipal, GuestResource, GuestResourceType,
    GuestRlsRule, GuestTokenClaims, GuestUser, Principal,
};

use crate::security_ports::{DashboardRepository, GuestTokenCodec};
use crate::{AccessService, GuestTokenConfig};

/// Permission required to mint guest tokens.
pub const GRANT_GUEST_TOKEN_PERMISSION: &str = "can_grant_guest_token";

/// View menu the guest-token permission is registered on.
pub const GUEST_TOKEN_VIEW_MENU: &str = "SecurityRestApi";

/// Issues and verifies guest tokens for embedded dashboards.
#[derive(Clone)]
pub struct GuestTokenService {
    access_service: AccessService,
    dashboards: Arc<dyn DashboardRepository>,
    codec: Arc<dyn GuestTokenCodec>,
    config: GuestTokenConfig,
}

impl GuestTokenService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        access_service: AccessService,
        dashboards: Arc<dyn DashboardRepository>,
        codec: Arc<dyn GuestTokenCodec>,
        config: GuestTokenConfig,
    ) -> Self {
        Self {
            access_service,
            dashboards,
            codec,
            config,
        }
    }

    /// Returns the request header carrying guest tokens.
    #[must_use]
    pub fn header_name(&self) -> &str {
        self.config.header_name.as_str()
    }

    /// Signs a guest token for `user` after checking the actor's right to
    /// grant one and that every resource exists in the embedding layer.
    pub async fn create_guest_token(
        &self,
        actor: &Principal,
        user: GuestUser,
        resources: Vec<GuestResource>,
        rls_rules: Vec<GuestRlsRule>,
    ) -> AppResult<String> {
        let may_grant = self
            .access_service
            .can_access(actor, GRANT_GUEST_TOKEN_PERMISSION, GUEST_TOKEN_VIEW_MENU)
            .await?
            || self.access_service.is_admin(actor).await?;
        if !may_grant {
            return Err(AppError::Forbidden(format!(
                "'{}' is missing permission '{GRANT_GUEST_TOKEN_PERMISSION}' on '{GUEST_TOKEN_VIEW_MENU}'",
                actor.display_name()
            )));
        }

        if resources.is_empty() {
            return Err(AppError::Validation(
                "guest token must name at least one resource".to_owned(),
            ));
        }
        for resource in &resources {
            self.validate_resource(resource).await?;
        }

        let issued_at = Utc::now().timestamp();
        let claims = GuestTokenClaims {
            user,
            resources,
            rls_rules,
            iat: issued_at,
            exp: issued_at + self.config.expiry_seconds,
            aud: self.config.audience.clone(),
            token_type: GUEST_TOKEN_TYPE.to_owned(),
        };

        let token = self.codec.encode(&claims)?;
        info!(
            issuer = actor.display_name(),
            guest = %claims.user.username,
            resources = claims.resources.len(),
            rls_rules = claims.rls_rules.len(),
            "issued guest token"
        );

        Ok(token)
    }

    /// Decodes the guest principal carried by a request, if any.
    ///
    /// Invalid tokens are logged and treated as absent.
    #[must_use]
    pub fn guest_user_from_token(&self, raw_token: Option<&str>) -> Option<GuestPrincipal> {
        let raw_token = raw_token.map(str::trim).filter(|value| !value.is_empty())?;

        match self.codec.decode(raw_token) {
            Ok(claims) => Some(GuestPrincipal::from_claims(claims)),
            Err(error) => {
                warn!(error = %error, "rejected guest token");
                None
            }
        }
    }

    /// Resolves a request's principal from an optional guest token, falling
    /// back to anonymous.
    #[must_use]
    pub fn principal_from_token(&self, raw_token: Option<&str>) -> Principal {
        self.guest_user_from_token(raw_token)
            .map_or(Principal::Anonymous, Principal::Guest)
    }

    async fn validate_resource(&self, resource: &GuestResource) -> AppResult<()> {
        match resource.resource_type {
            GuestResourceType::Dashboard => {
                let exists = match Uuid::parse_str(&resource.id) {
                    Ok(uuid) => self.dashboards.find_embedded_dashboard(uuid).await?.is_some(),
                    Err(_) => match resource.id.parse::<i64>() {
                        Ok(dashboard_id) => self
                            .dashboards
                            .find_dashboard(DashboardId::new(dashboard_id))
                            .await?
                            .is_some(),
                        Err(_) => false,
                    },
                };

                if exists {
                    Ok(())
                } else {
                    Err(AppError::NotFound(format!(
                        "embedded dashboard '{}' does not exist",
                        resource.id
                    )))
                }
            }
        }
    }
}
