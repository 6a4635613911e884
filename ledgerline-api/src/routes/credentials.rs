//! Credential Test Routes
//!
//! Administrator actions for checking a credential form before saving it.
//! Neither route touches the connection cache.

use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use ledgerline_core::LogicalDb;
use serde::{Deserialize, Serialize};

use crate::{
    auth::Capability,
    error::ApiResult,
    live_test::{test_all, test_connection, TestOutcome},
    middleware::AuthExtractor,
    state::{AppState, ErpFactory, LiveTestTimeout},
    validation::CredentialForm,
};

// ============================================================================
// TYPES
// ============================================================================

/// Live-test request: the credential form plus an optional target.
/// Without a target both logical databases are tested.
#[derive(Debug, Clone, Deserialize)]
pub struct TestCredentialsRequest {
    #[serde(flatten)]
    pub form: CredentialForm,
    #[serde(default)]
    pub database: Option<LogicalDb>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestCredentialsResponse {
    /// True only if every tested database succeeded.
    pub success: bool,
    pub results: Vec<TestOutcome>,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/v1/credentials/validate - Shape check only
pub async fn validate_credentials(
    AuthExtractor(auth): AuthExtractor,
    Json(form): Json<CredentialForm>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Capability::CredentialsTest)?;
    Ok(Json(form.validate()))
}

/// POST /api/v1/credentials/test - One-shot connect and round-trip
pub async fn test_credentials(
    AuthExtractor(auth): AuthExtractor,
    State(factory): State<ErpFactory>,
    State(LiveTestTimeout(timeout)): State<LiveTestTimeout>,
    Json(request): Json<TestCredentialsRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require(Capability::CredentialsTest)?;

    let results = match request.database {
        Some(database) => vec![test_connection(&*factory, &request.form, database, timeout).await],
        None => test_all(&*factory, &request.form, timeout).await,
    };
    let success = results.iter().all(|r| r.success);

    tracing::info!(
        user_id = %auth.user_id,
        host = %request.form.host,
        success,
        "Credential live test finished"
    );

    Ok(Json(TestCredentialsResponse { success, results }))
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

/// Create the credential test router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/validate", post(validate_credentials))
        .route("/test", post(test_credentials))
}
