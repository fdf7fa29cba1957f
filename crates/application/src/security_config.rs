use vizgate_domain::{BuiltinRole, PermissionCatalogRules};

/// Signing settings for embedded-context guest tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestTokenConfig {
    /// Shared HMAC secret.
    pub secret: String,
    /// JWT algorithm name, for example `HS256`.
    pub algorithm: String,
    /// Token lifetime in seconds.
    pub expiry_seconds: i64,
    /// Audience written to and required from every token.
    pub audience: String,
    /// Request header carrying the token.
    pub header_name: String,
}

impl Default for GuestTokenConfig {
    fn default() -> Self {
        Self {
            secret: "test-guest-secret-change-me".to_owned(),
            algorithm: "HS256".to_owned(),
            expiry_seconds: 300,
            audience: "vizgate".to_owned(),
            header_name: "X-GuestToken".to_owned(),
        }
    }
}

/// Settings shared by the synchronizer, role composer and evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    /// Built-in role copied into `Public` on every role sync.
    pub public_role_like: Option<String>,
    /// Remediation link attached to access denials.
    pub permission_instructions_link: Option<String>,
    /// Enables dashboard-derived dataset access for registered users.
    pub dashboard_rbac: bool,
    /// Lets any registered user read other users' activity.
    pub enable_broad_activity_access: bool,
    /// Role whose grants guests evaluate against.
    pub guest_role_name: String,
    /// Guest token signing settings.
    pub guest_token: GuestTokenConfig,
    /// Classification sets used to rebuild built-in roles.
    pub catalog_rules: PermissionCatalogRules,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            public_role_like: None,
            permission_instructions_link: None,
            dashboard_rbac: false,
            enable_broad_activity_access: false,
            guest_role_name: BuiltinRole::Public.name().to_owned(),
            guest_token: GuestTokenConfig::default(),
            catalog_rules: PermissionCatalogRules::default(),
        }
    }
}
