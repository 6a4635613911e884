//! LEDGERLINE API - Tenant ERP Connection Server
//!
//! Axum HTTP layer over the per-tenant connection cache. Tenant records live
//! in the control-plane PostgreSQL database; each tenant's ERP databases are
//! reached through cached tokio-postgres clients built on demand.

mod macros;

pub mod auth;
pub mod config;
pub mod db;
pub mod erp_client;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod tenants;
pub mod validation;

// Re-export commonly used types
pub use auth::{
    authenticate, generate_jwt_token, validate_jwt_token, AuthConfig, AuthContext, Capability,
    Claims, FixedClock, JwtClock, SUPER_ADMIN_ROLE,
};
pub use config::ApiConfig;
pub use db::DbConfig;
pub use erp_client::{PgConnectionFactory, SchemaMap};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use live_test::{test_all, test_connection, user_message, TestOutcome, GENERIC_FAILURE};
pub use middleware::{auth_middleware, AuthExtractor, AuthMiddlewareState};
pub use routes::create_api_router;
pub use state::{AppState, ErpCache, ErpFactory};
pub use tenants::{CredentialUpdate, InMemoryTenantStore, PgTenantStore, TenantStore};
pub use validation::{validate_shape, CredentialForm, ShapeReport};
