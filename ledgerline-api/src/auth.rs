//! Authentication Module
//!
//! Bearer JWT authentication for the LEDGERLINE API plus the capability
//! check that gates the connection-management surface.
//!
//! A capability is granted when the caller holds the `super_admin` role or a
//! role whose name equals the capability (e.g. `connections:manage`).

use crate::error::{ApiError, ApiResult};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ledgerline_core::{ConfigError, TenantId};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

/// Role that passes every capability check.
pub const SUPER_ADMIN_ROLE: &str = "super_admin";

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock abstraction for JWT time validation.
///
/// Time validation is done here rather than inside `jsonwebtoken` so tests
/// can inject a fixed time.
pub trait JwtClock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// JWT SECRET (TYPE-SAFE)
// ============================================================================

/// JWT signing secret that never shows up in `Debug` output.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// Create a new JWT secret.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingRequired` if the secret is empty.
    pub fn new(secret: String) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "LEDGERLINE_JWT_SECRET".to_string(),
            });
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value (only for signing and verification).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }
}

impl fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// JWT secret key for signing and verification
    pub jwt_secret: JwtSecret,

    /// JWT algorithm (default: HS256)
    pub jwt_algorithm: Algorithm,

    /// JWT token expiration in seconds (default: 1 hour)
    pub jwt_expiration_secs: i64,

    /// JWT clock skew tolerance in seconds (default: 60)
    pub jwt_clock_skew_secs: i64,

    /// Clock for JWT time validation (injected for testing)
    pub clock: Arc<dyn JwtClock>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_clock_skew_secs", &self.jwt_clock_skew_secs)
            .field("clock", &"<JwtClock>")
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: build_jwt_secret(INSECURE_DEFAULT_SECRET.to_string()),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: 3600,
            jwt_clock_skew_secs: 60,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `LEDGERLINE_JWT_SECRET`: JWT signing secret
    /// - `LEDGERLINE_JWT_EXPIRATION_SECS`: JWT token expiration (default: 3600)
    /// - `LEDGERLINE_JWT_CLOCK_SKEW_SECS`: JWT clock skew tolerance (default: 60)
    pub fn from_env() -> Self {
        let secret_str = std::env::var("LEDGERLINE_JWT_SECRET")
            .unwrap_or_else(|_| INSECURE_DEFAULT_SECRET.to_string());

        Self {
            jwt_secret: build_jwt_secret(secret_str),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: std::env::var("LEDGERLINE_JWT_EXPIRATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3600),
            jwt_clock_skew_secs: std::env::var("LEDGERLINE_JWT_CLOCK_SKEW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            clock: Arc::new(SystemClock),
        }
    }

    /// Config with an explicit secret and clock, for tests and tooling.
    pub fn with_secret(secret: &str, clock: Arc<dyn JwtClock>) -> Self {
        Self {
            jwt_secret: build_jwt_secret(secret.to_string()),
            clock,
            ..Self::default()
        }
    }

    /// Refuse to start in production with an insecure or short secret.
    ///
    /// Outside production the same conditions only log a warning.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        let environment = std::env::var("LEDGERLINE_ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase();

        let is_production = environment == "production" || environment == "prod";

        if self.jwt_secret.is_insecure_default() || self.jwt_secret.len() < 32 {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "Cannot start server in production with an insecure JWT secret ({} chars). \
                     Set LEDGERLINE_JWT_SECRET to at least 32 random characters.",
                    self.jwt_secret.len()
                )));
            }
            tracing::warn!(
                secret_len = self.jwt_secret.len(),
                "Insecure JWT secret in use; set LEDGERLINE_JWT_SECRET before deploying"
            );
        }

        Ok(())
    }
}

fn build_jwt_secret(secret_str: String) -> JwtSecret {
    let normalized = if secret_str.trim().is_empty() {
        INSECURE_DEFAULT_SECRET.to_string()
    } else {
        secret_str
    };

    match JwtSecret::new(normalized) {
        Ok(secret) => secret,
        Err(_) => JwtSecret(SecretString::new(INSECURE_DEFAULT_SECRET.into())),
    }
}

// ============================================================================
// JWT CLAIMS
// ============================================================================

/// JWT claims structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Tenant the user belongs to; absent for platform operators
    pub tenant_id: Option<String>,

    /// Roles / capability names
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    pub fn new(
        user_id: String,
        tenant_id: Option<TenantId>,
        expiration_secs: i64,
        clock: &dyn JwtClock,
    ) -> Self {
        let now = clock.now_epoch_secs();

        Self {
            sub: user_id,
            iat: now,
            exp: now + expiration_secs,
            tenant_id: tenant_id.map(|id| id.to_string()),
            roles: Vec::new(),
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles.extend(roles);
        self
    }

    /// Get the tenant ID claim, ignoring values that are not UUIDs.
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id.as_deref().and_then(|s| s.parse().ok())
    }
}

// ============================================================================
// CAPABILITIES
// ============================================================================

/// Capabilities checked by the route layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// List and inspect cached connections.
    ConnectionsRead,
    /// Close cached connections.
    ConnectionsManage,
    /// Validate and live-test credentials.
    CredentialsTest,
    /// Rotate credentials and delete tenants.
    TenantsManage,
    /// Query the caller's own ERP databases.
    ErpRead,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ConnectionsRead => "connections:read",
            Capability::ConnectionsManage => "connections:manage",
            Capability::CredentialsTest => "credentials:test",
            Capability::TenantsManage => "tenants:manage",
            Capability::ErpRead => "erp:read",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// AUTHENTICATION CONTEXT
// ============================================================================

/// Authentication context extracted from request.
///
/// Injected into Axum request extensions after successful authentication.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// User ID (from JWT sub claim)
    pub user_id: String,

    /// Tenant the caller belongs to, if any
    pub tenant_id: Option<TenantId>,

    /// Roles / capability names
    pub roles: Vec<String>,
}

impl AuthContext {
    pub fn new(user_id: String, tenant_id: Option<TenantId>, roles: Vec<String>) -> Self {
        Self {
            user_id,
            tenant_id,
            roles,
        }
    }

    /// Check if the user has a specific role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_super_admin(&self) -> bool {
        self.has_role(SUPER_ADMIN_ROLE)
    }

    /// Whether the caller holds `capability`.
    pub fn can(&self, capability: Capability) -> bool {
        self.is_super_admin() || self.has_role(capability.as_str())
    }

    /// Fail with 403 unless the caller holds `capability`.
    pub fn require(&self, capability: Capability) -> ApiResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "Missing capability: {}",
                capability
            )))
        }
    }

    /// The caller's own tenant, required for tenant-scoped routes.
    pub fn require_tenant(&self) -> ApiResult<TenantId> {
        self.tenant_id
            .ok_or_else(|| ApiError::forbidden("Token is not bound to a tenant"))
    }

    /// Fail with 403 when a tenant-bound caller targets another tenant.
    pub fn require_tenant_access(&self, tenant_id: TenantId) -> ApiResult<()> {
        match self.tenant_id {
            Some(own) if own != tenant_id && !self.is_super_admin() => Err(ApiError::forbidden(
                "Token does not grant access to this tenant",
            )),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// AUTHENTICATION FUNCTIONS
// ============================================================================

/// Validate JWT claim times against our own clock with leeway.
fn validate_claim_times(now: i64, exp: i64, leeway_secs: i64) -> ApiResult<()> {
    if exp < now - leeway_secs {
        return Err(ApiError::token_expired());
    }
    Ok(())
}

/// Validate a JWT token and extract claims.
///
/// Signature is checked by `jsonwebtoken`; expiry is checked against the
/// configured clock.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    let mut validation = Validation::new(config.jwt_algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = std::collections::HashSet::from(["exp".to_string()]);

    let token_data =
        decode::<Claims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidToken => {
                ApiError::invalid_token("Token is invalid")
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::invalid_token("Token signature is invalid")
            }
            _ => ApiError::invalid_token(format!("Token validation failed: {}", e)),
        })?;

    let claims = token_data.claims;

    let now = config.clock.now_epoch_secs();
    if now < 0 {
        tracing::error!(
            timestamp = now,
            "System clock returned pre-epoch time - server time is broken"
        );
        return Err(ApiError::internal_error(
            "Server time configuration error - please contact support",
        ));
    }

    validate_claim_times(now, claims.exp, config.jwt_clock_skew_secs)?;

    Ok(claims)
}

/// Generate a JWT token for a user.
pub fn generate_jwt_token(
    config: &AuthConfig,
    user_id: String,
    tenant_id: Option<TenantId>,
    roles: Vec<String>,
) -> ApiResult<String> {
    let claims = Claims::new(
        user_id,
        tenant_id,
        config.jwt_expiration_secs,
        &*config.clock,
    )
    .with_roles(roles);

    let encoding_key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    let header = Header::new(config.jwt_algorithm);

    encode(&header, &claims, &encoding_key)
        .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))
}

/// Authenticate a request from its `Authorization` header value.
pub fn authenticate(config: &AuthConfig, auth_header: Option<&str>) -> ApiResult<AuthContext> {
    let auth_value = auth_header.ok_or_else(|| {
        ApiError::unauthorized("Authentication required: provide an Authorization header")
    })?;

    let token = auth_value.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::invalid_token("Authorization header must use Bearer scheme")
    })?;

    let claims = validate_jwt_token(config, token)?;
    let tenant_id = claims.tenant_id();
    Ok(AuthContext::new(claims.sub, tenant_id, claims.roles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    /// 2024-01-01 00:00:00 UTC
    const NOW: i64 = 1_704_067_200;

    fn config() -> AuthConfig {
        AuthConfig::with_secret(
            "unit-test-secret-that-is-long-enough-123",
            Arc::new(FixedClock(NOW)),
        )
    }

    #[test]
    fn test_roundtrip_token() {
        let config = config();
        let tenant = TenantId::now_v7();
        let token = generate_jwt_token(
            &config,
            "user-1".to_string(),
            Some(tenant),
            vec!["erp:read".to_string()],
        )
        .expect("token");

        let ctx = authenticate(&config, Some(&format!("Bearer {}", token))).expect("auth");
        assert_eq!(ctx.user_id, "user-1");
        assert_eq!(ctx.tenant_id, Some(tenant));
        assert!(ctx.can(Capability::ErpRead));
        assert!(!ctx.can(Capability::ConnectionsManage));
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuing = AuthConfig {
            clock: Arc::new(FixedClock(NOW - 10_000)),
            ..config()
        };
        let token = generate_jwt_token(&issuing, "u".to_string(), None, vec![]).expect("token");

        let err = authenticate(&config(), Some(&format!("Bearer {}", token))).unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenExpired);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = AuthConfig::with_secret(
            "some-other-secret-that-is-long-enough-456",
            Arc::new(FixedClock(NOW)),
        );
        let token = generate_jwt_token(&other, "u".to_string(), None, vec![]).expect("token");

        let err = authenticate(&config(), Some(&format!("Bearer {}", token))).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidToken);
    }

    #[test]
    fn test_missing_and_malformed_header() {
        let err = authenticate(&config(), None).unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);

        let err = authenticate(&config(), Some("Basic abc")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidToken);
    }

    #[test]
    fn test_super_admin_passes_every_capability() {
        let ctx = AuthContext::new("root".to_string(), None, vec![SUPER_ADMIN_ROLE.to_string()]);
        for cap in [
            Capability::ConnectionsRead,
            Capability::ConnectionsManage,
            Capability::CredentialsTest,
            Capability::TenantsManage,
            Capability::ErpRead,
        ] {
            assert!(ctx.require(cap).is_ok(), "{cap}");
        }
    }

    #[test]
    fn test_require_reports_missing_capability() {
        let ctx = AuthContext::new("u".to_string(), None, vec!["connections:read".to_string()]);
        assert!(ctx.require(Capability::ConnectionsRead).is_ok());

        let err = ctx.require(Capability::ConnectionsManage).unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
        assert!(err.message.contains("connections:manage"));
    }

    #[test]
    fn test_require_tenant() {
        let ctx = AuthContext::new("u".to_string(), None, vec![]);
        assert!(ctx.require_tenant().is_err());
    }

    #[test]
    fn test_tenant_access_scoping() {
        let own = TenantId::now_v7();
        let other = TenantId::now_v7();

        let bound = AuthContext::new("u".to_string(), Some(own), vec![]);
        assert!(bound.require_tenant_access(own).is_ok());
        assert!(bound.require_tenant_access(other).is_err());

        let admin = AuthContext::new("a".to_string(), Some(own), vec![SUPER_ADMIN_ROLE.to_string()]);
        assert!(admin.require_tenant_access(other).is_ok());

        let operator = AuthContext::new("o".to_string(), None, vec![]);
        assert!(operator.require_tenant_access(other).is_ok());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = JwtSecret::new("abcdef".to_string()).expect("secret");
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("abcdef"));
        assert!(rendered.contains("6 chars"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            JwtSecret::new(String::new()),
            Err(ConfigError::MissingRequired { .. })
        ));
    }
}
