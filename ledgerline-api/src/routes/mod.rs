//! REST API Routes Module
//!
//! Includes:
//! - Connection cache introspection and close operations
//! - Credential shape validation and live tests
//! - Tenant credential rotation and deletion
//! - The tenant-facing ERP status check
//! - Health check endpoints (Kubernetes-compatible)

pub mod connections;
pub mod credentials;
pub mod erp;
pub mod health;
pub mod tenants;

use axum::{middleware::from_fn_with_state, Router};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::{auth_middleware, AuthMiddlewareState};
use crate::state::AppState;

pub use connections::create_router as connections_router;
pub use credentials::create_router as credentials_router;
pub use erp::create_router as erp_router;
pub use health::create_router as health_router;
pub use tenants::create_router as tenants_router;

/// Build the full application router.
///
/// Everything under `/api/v1` requires a Bearer JWT; `/health` is open.
pub fn create_api_router(state: AppState, auth_config: AuthConfig) -> Router {
    let auth_state = AuthMiddlewareState::new(auth_config);

    let api_routes = Router::new()
        .nest("/connections", connections::create_router())
        .nest("/credentials", credentials::create_router())
        .nest("/tenants", tenants::create_router())
        .nest("/erp", erp::create_router())
        .layer(from_fn_with_state(auth_state, auth_middleware));

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health::create_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
