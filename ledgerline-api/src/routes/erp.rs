//! ERP Status Route
//!
//! The tenant-facing read surface. Every request re-requests its handles
//! from the connection cache; handles are never held across requests.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use ledgerline_core::{LogicalDb, TenantId};
use ledgerline_pool::Probe;
use serde::Serialize;
use std::sync::Arc;

use crate::{
    auth::Capability,
    error::{ApiError, ApiResult},
    middleware::AuthExtractor,
    state::{AppState, ErpCache},
    tenants::TenantStore,
};

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStatus {
    pub database: LogicalDb,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErpStatusResponse {
    pub tenant_id: TenantId,
    pub databases: Vec<DatabaseStatus>,
}

/// GET /api/v1/erp/status - Reachability of the caller's ERP databases
pub async fn erp_status(
    AuthExtractor(auth): AuthExtractor,
    State(cache): State<Arc<ErpCache>>,
    State(tenants): State<Arc<dyn TenantStore>>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Capability::ErpRead)?;
    let tenant_id = auth.require_tenant()?;

    let credentials = tenants
        .get(tenant_id)
        .await?
        .ok_or_else(|| ApiError::tenant_not_found(tenant_id))?;
    if !credentials.is_complete() {
        return Err(ApiError::credentials_not_configured(tenant_id));
    }

    let mut databases = Vec::with_capacity(LogicalDb::ALL.len());
    for database in LogicalDb::ALL {
        let outcome = match cache.get(&credentials, database).await {
            Ok(handle) => handle.round_trip().await.map_err(ApiError::from),
            Err(err) => Err(ApiError::from(err)),
        };
        if let Err(err) = &outcome {
            tracing::warn!(
                tenant_id = %tenant_id,
                database = %database,
                error = %err.message,
                "ERP database unavailable"
            );
        }
        databases.push(DatabaseStatus {
            database,
            connected: outcome.is_ok(),
            error: outcome.err().map(|e| e.message),
        });
    }

    Ok(Json(ErpStatusResponse {
        tenant_id,
        databases,
    }))
}

/// Create the ERP router.
pub fn create_router() -> Router<AppState> {
    Router::new().route("/status", get(erp_status))
}
