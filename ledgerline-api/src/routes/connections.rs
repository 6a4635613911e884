//! Connection Cache Admin Routes
//!
//! Read-only introspection of the tenant connection cache and the explicit
//! close operations. Keys travel in paths as `<tenant-uuid>:<database>`.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use ledgerline_core::TenantId;
use ledgerline_pool::{ConnectionInfo, ConnectionKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::Capability,
    error::{ApiError, ApiResult},
    middleware::AuthExtractor,
    state::{AppState, ErpCache},
};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ListConnectionsResponse {
    pub connections: Vec<ConnectionInfo>,
    pub total: usize,
}

/// Body returned by every close operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseResponse {
    pub closed: usize,
}

fn parse_key(raw: &str) -> ApiResult<ConnectionKey> {
    Ok(raw.parse::<ConnectionKey>()?)
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/v1/connections - List cached connections
pub async fn list_connections(
    AuthExtractor(auth): AuthExtractor,
    State(cache): State<Arc<ErpCache>>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Capability::ConnectionsRead)?;
    let connections = cache.list().await;
    let total = connections.len();
    Ok(Json(ListConnectionsResponse { connections, total }))
}

/// GET /api/v1/connections/stats - Aggregate counts and counters
pub async fn connection_stats(
    AuthExtractor(auth): AuthExtractor,
    State(cache): State<Arc<ErpCache>>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Capability::ConnectionsRead)?;
    Ok(Json(cache.stats().await))
}

/// GET /api/v1/connections/{key} - One connection's metadata
pub async fn get_connection(
    AuthExtractor(auth): AuthExtractor,
    State(cache): State<Arc<ErpCache>>,
    Path(raw_key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Capability::ConnectionsRead)?;
    let key = parse_key(&raw_key)?;
    let info = cache
        .details(&key)
        .await
        .ok_or_else(|| ApiError::connection_not_found(key))?;
    Ok(Json(info))
}

/// DELETE /api/v1/connections/{key} - Close one connection
pub async fn close_connection(
    AuthExtractor(auth): AuthExtractor,
    State(cache): State<Arc<ErpCache>>,
    Path(raw_key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Capability::ConnectionsManage)?;
    let key = parse_key(&raw_key)?;
    if !cache.close_one(&key).await {
        return Err(ApiError::connection_not_found(key));
    }
    tracing::info!(key = %key, user_id = %auth.user_id, "Connection closed by operator");
    Ok(Json(CloseResponse { closed: 1 }))
}

/// DELETE /api/v1/connections - Close every connection
pub async fn close_all_connections(
    AuthExtractor(auth): AuthExtractor,
    State(cache): State<Arc<ErpCache>>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Capability::ConnectionsManage)?;
    let closed = cache.close_all().await;
    tracing::info!(closed, user_id = %auth.user_id, "All connections closed by operator");
    Ok(Json(CloseResponse { closed }))
}

/// DELETE /api/v1/connections/tenant/{tenant_id} - Close one tenant's connections
pub async fn close_tenant_connections(
    AuthExtractor(auth): AuthExtractor,
    State(cache): State<Arc<ErpCache>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Capability::ConnectionsManage)?;
    let tenant_id = TenantId::new(tenant_id);
    let closed = cache.close_for_tenant(tenant_id).await;
    tracing::info!(
        tenant_id = %tenant_id,
        closed,
        user_id = %auth.user_id,
        "Tenant connections closed by operator"
    );
    Ok(Json(CloseResponse { closed }))
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

/// Create the connection admin router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_connections).delete(close_all_connections))
        .route("/stats", get(connection_stats))
        .route("/tenant/:tenant_id", axum::routing::delete(close_tenant_connections))
        .route("/:key", get(get_connection).delete(close_connection))
}
