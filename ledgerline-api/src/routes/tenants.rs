//! Tenant Credential Routes
//!
//! Credential rotation and tenant deletion. Both invalidate the tenant's
//! cached connections after the store has been updated, so the next request
//! connects with the new state.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, put},
    Json, Router,
};
use ledgerline_core::TenantId;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::Capability,
    error::{ApiError, ApiResult},
    middleware::AuthExtractor,
    state::{AppState, ErpCache},
    tenants::{CredentialUpdate, TenantStore},
    validation::{parse_port, CredentialForm},
};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct TenantConnectionsResponse {
    pub tenant_id: TenantId,
    /// Cached connections closed as a result of the change.
    pub closed: usize,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// PUT /api/v1/tenants/{id}/credentials - Rotate a tenant's credentials
pub async fn update_credentials(
    AuthExtractor(auth): AuthExtractor,
    State(cache): State<Arc<ErpCache>>,
    State(tenants): State<Arc<dyn TenantStore>>,
    Path(id): Path<Uuid>,
    Json(form): Json<CredentialForm>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Capability::TenantsManage)?;
    let tenant_id = TenantId::new(id);
    auth.require_tenant_access(tenant_id)?;

    let report = form.validate();
    if !report.valid {
        return Err(ApiError::validation_failed("Invalid credentials")
            .with_details(serde_json::json!({ "errors": report.errors })));
    }
    let port = parse_port(&form.port)
        .ok_or_else(|| ApiError::invalid_format("port", "a number between 1 and 65535"))?;

    let update = CredentialUpdate {
        host: form.host.trim().to_string(),
        port,
        username: form.username.trim().to_string(),
        encrypted_password: cache.codec().encrypt_async(&form.password).await?,
    };

    if !tenants.update_credentials(tenant_id, update).await? {
        return Err(ApiError::tenant_not_found(tenant_id));
    }

    let closed = cache.close_for_tenant(tenant_id).await;
    tracing::info!(
        tenant_id = %tenant_id,
        closed,
        user_id = %auth.user_id,
        "Tenant database credentials updated"
    );

    Ok(Json(TenantConnectionsResponse { tenant_id, closed }))
}

/// DELETE /api/v1/tenants/{id} - Soft-delete a tenant
pub async fn delete_tenant(
    AuthExtractor(auth): AuthExtractor,
    State(cache): State<Arc<ErpCache>>,
    State(tenants): State<Arc<dyn TenantStore>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Capability::TenantsManage)?;
    let tenant_id = TenantId::new(id);
    auth.require_tenant_access(tenant_id)?;

    if !tenants.soft_delete(tenant_id).await? {
        return Err(ApiError::tenant_not_found(tenant_id));
    }

    let closed = cache.close_for_tenant(tenant_id).await;
    tracing::info!(
        tenant_id = %tenant_id,
        closed,
        user_id = %auth.user_id,
        "Tenant deleted"
    );

    Ok(Json(TenantConnectionsResponse { tenant_id, closed }))
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

/// Create the tenant routes router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/:id", delete(delete_tenant))
        .route("/:id/credentials", put(update_credentials))
}
