use std::env;

use url::Url;
use vizgate_application::{GuestTokenConfig, SecurityConfig};
use vizgate_core::{AppError, AppResult};

/// Runtime settings of the sync binary.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub migrate_only: bool,
    pub database_url: String,
    pub security: SecurityConfig,
}

impl SyncConfig {
    pub fn load() -> AppResult<Self> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
        Self::from_lookup(migrate_only, |name| env::var(name).ok())
    }

    fn from_lookup(
        migrate_only: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> AppResult<Self> {
        let optional = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let database_url = optional("DATABASE_URL")
            .ok_or_else(|| AppError::Validation("DATABASE_URL is required".to_owned()))?;

        let permission_instructions_link = optional("PERMISSION_INSTRUCTIONS_LINK")
            .map(|value| {
                Url::parse(value.as_str()).map(|_| value).map_err(|error| {
                    AppError::Validation(format!("invalid PERMISSION_INSTRUCTIONS_LINK: {error}"))
                })
            })
            .transpose()?;

        let defaults = GuestTokenConfig::default();
        let secret = optional("GUEST_TOKEN_JWT_SECRET").unwrap_or(defaults.secret);
        if lookup("GUEST_TOKEN_JWT_SECRET").is_some() && secret.len() < 32 {
            return Err(AppError::Validation(
                "GUEST_TOKEN_JWT_SECRET must be at least 32 characters".to_owned(),
            ));
        }

        let expiry_seconds = match optional("GUEST_TOKEN_JWT_EXP_SECONDS") {
            Some(value) => value.parse::<i64>().map_err(|error| {
                AppError::Validation(format!(
                    "invalid GUEST_TOKEN_JWT_EXP_SECONDS value '{value}': {error}"
                ))
            })?,
            None => defaults.expiry_seconds,
        };
        if expiry_seconds <= 0 {
            return Err(AppError::Validation(
                "GUEST_TOKEN_JWT_EXP_SECONDS must be greater than zero".to_owned(),
            ));
        }

        let security_defaults = SecurityConfig::default();
        let security = SecurityConfig {
            public_role_like: optional("PUBLIC_ROLE_LIKE"),
            permission_instructions_link,
            dashboard_rbac: parse_flag(optional("DASHBOARD_RBAC")),
            enable_broad_activity_access: parse_flag(optional("ENABLE_BROAD_ACTIVITY_ACCESS")),
            guest_role_name: optional("GUEST_ROLE_NAME")
                .unwrap_or(security_defaults.guest_role_name),
            guest_token: GuestTokenConfig {
                secret,
                algorithm: optional("GUEST_TOKEN_JWT_ALGO").unwrap_or(defaults.algorithm),
                expiry_seconds,
                audience: optional("GUEST_TOKEN_JWT_AUDIENCE").unwrap_or(defaults.audience),
                header_name: optional("GUEST_TOKEN_HEADER_NAME").unwrap_or(defaults.header_name),
            },
            catalog_rules: security_defaults.catalog_rules,
        };

        Ok(Self {
            migrate_only,
            database_url,
            security,
        })
    }
}

fn parse_flag(value: Option<String>) -> bool {
    value.is_some_and(|value| value.eq_ignore_ascii_case("true") || value == "1")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use vizgate_core::AppError;

    use super::SyncConfig;

    fn load(pairs: &[(&str, &str)]) -> Result<SyncConfig, AppError> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        SyncConfig::from_lookup(false, |name| values.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/vizgate")]);
        let Ok(config) = config else {
            unreachable!();
        };

        assert_eq!(config.security.guest_role_name, "Public");
        assert_eq!(config.security.guest_token.expiry_seconds, 300);
        assert_eq!(config.security.guest_token.header_name, "X-GuestToken");
        assert!(!config.security.dashboard_rbac);
        assert!(config.security.public_role_like.is_none());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(matches!(load(&[]), Err(AppError::Validation(_))));
        assert!(matches!(
            load(&[
                ("DATABASE_URL", "postgres://localhost/vizgate"),
                ("GUEST_TOKEN_JWT_SECRET", "short"),
            ]),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            load(&[
                ("DATABASE_URL", "postgres://localhost/vizgate"),
                ("PERMISSION_INSTRUCTIONS_LINK", "not a url"),
            ]),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            load(&[
                ("DATABASE_URL", "postgres://localhost/vizgate"),
                ("GUEST_TOKEN_JWT_EXP_SECONDS", "0"),
            ]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn flags_and_overrides_are_read() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/vizgate"),
            ("DASHBOARD_RBAC", "TRUE"),
            ("PUBLIC_ROLE_LIKE", "Gamma"),
            ("PERMISSION_INSTRUCTIONS_LINK", "https://docs.example.com/access"),
            ("GUEST_TOKEN_JWT_SECRET", "0123456789abcdef0123456789abcdef"),
        ]);
        let Ok(config) = config else {
            unreachable!();
        };

        assert!(config.security.dashboard_rbac);
        assert_eq!(config.security.public_role_like.as_deref(), Some("Gamma"));
        assert_eq!(
            config.security.permission_instructions_link.as_deref(),
            Some("https://docs.example.com/access")
        );
    }
}
