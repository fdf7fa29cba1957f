use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Deserialize;

use vizgate_application::{GuestTokenCodec, GuestTokenConfig};
use vizgate_core::{AppError, AppResult};
use vizgate_domain::{
    GUEST_TOKEN_TYPE, GuestResource, GuestRlsRule, GuestTokenClaims, GuestUser,
};

/// HMAC-signed JWT codec for guest tokens.
#[derive(Clone)]
pub struct JwtGuestTokenCodec {
    algorithm: Algorithm,
    audience: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

/// Claims as found on the wire; guest claims may be missing on foreign tokens.
#[derive(Debug, Deserialize)]
struct WireClaims {
    user: Option<GuestUser>,
    resources: Option<Vec<GuestResource>>,
    rls_rules: Option<Vec<GuestRlsRule>>,
    iat: i64,
    exp: i64,
    aud: String,
    #[serde(rename = "type")]
    token_type: Option<String>,
}

impl JwtGuestTokenCodec {
    /// Creates a codec from guest token settings.
    ///
    /// Only the HMAC family (`HS256`, `HS384`, `HS512`) is accepted.
    pub fn new(config: &GuestTokenConfig) -> AppResult<Self> {
        let algorithm = Algorithm::from_str(config.algorithm.as_str()).map_err(|error| {
            AppError::Validation(format!(
                "unsupported guest token algorithm '{}': {error}",
                config.algorithm
            ))
        })?;
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AppError::Validation(format!(
                "guest token algorithm '{}' is not an HMAC algorithm",
                config.algorithm
            )));
        }
        if config.secret.is_empty() {
            return Err(AppError::Validation(
                "guest token secret must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            algorithm,
            audience: config.audience.clone(),
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
        })
    }
}

impl GuestTokenCodec for JwtGuestTokenCodec {
    fn encode(&self, claims: &GuestTokenClaims) -> AppResult<String> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|error| AppError::Internal(format!("failed to sign guest token: {error}")))
    }

    fn decode(&self, raw_token: &str) -> AppResult<GuestTokenClaims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud"]);

        let claims = decode::<WireClaims>(raw_token, &self.decoding_key, &validation)
            .map_err(|error| AppError::GuestTokenInvalid(error.to_string()))?
            .claims;

        if claims.token_type.as_deref() != Some(GUEST_TOKEN_TYPE) {
            return Err(AppError::GuestTokenInvalid(
                "token is not a guest token".to_owned(),
            ));
        }
        let (Some(user), Some(resources), Some(rls_rules)) =
            (claims.user, claims.resources, claims.rls_rules)
        else {
            return Err(AppError::GuestTokenInvalid(
                "token is missing guest claims".to_owned(),
            ));
        };

        Ok(GuestTokenClaims {
            user,
            resources,
            rls_rules,
            iat: claims.iat,
            exp: claims.exp,
            aud: claims.aud,
            token_type: GUEST_TOKEN_TYPE.to_owned(),
        })
    }
}
