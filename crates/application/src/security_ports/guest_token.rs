use vizgate_core::AppResult;
use vizgate_domain::GuestTokenClaims;

/// Signs and verifies guest tokens.
pub trait GuestTokenCodec: Send + Sync {
    /// Signs a claims bundle.
    fn encode(&self, claims: &GuestTokenClaims) -> AppResult<String>;

    /// Verifies signature, audience and expiry, and requires every guest
    /// claim plus the literal guest `type` marker.
    ///
    /// Failures are reported as [`vizgate_core::AppError::GuestTokenInvalid`].
    fn decode(&self, raw_token: &str) -> AppResult<GuestTokenClaims>;
}
