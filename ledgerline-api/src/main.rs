//! LEDGERLINE API Server Entry Point
//!
//! Bootstraps configuration, builds the connection cache, starts the expiry
//! sweeper and serves the Axum router until ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use ledgerline_api::telemetry::{init_tracing, TelemetryConfig};
use ledgerline_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, DbConfig, ErpCache,
    ErpFactory, PgConnectionFactory, PgTenantStore, SchemaMap, TenantStore,
};
use ledgerline_pool::expiry_sweeper;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let api_config = ApiConfig::from_env();
    let codec = Arc::new(api_config.credential_codec().map_err(|e| {
        tracing::error!(error = %e, "Credential codec unavailable");
        ApiError::from(e)
    })?);

    let auth_config = AuthConfig::from_env();
    auth_config.validate_for_production()?;

    let db_config = DbConfig::from_env();
    let pool = db_config.create_pool()?;
    let tenants: Arc<dyn TenantStore> = Arc::new(PgTenantStore::new(pool));

    let factory: ErpFactory = Arc::new(PgConnectionFactory::new(
        SchemaMap {
            primary: api_config.erp_primary_database.clone(),
            secondary: api_config.erp_secondary_database.clone(),
        },
        api_config.erp_connect_timeout,
        api_config.erp_query_timeout,
    ));

    let cache: Arc<ErpCache> = Arc::new(ErpCache::new(
        Arc::clone(&factory),
        codec,
        api_config.cache_config(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweeper = tokio::spawn(expiry_sweeper(
        Arc::clone(&cache),
        api_config.sweep_interval(),
        shutdown_rx,
    ));

    let state = AppState::new(
        Arc::clone(&cache),
        factory,
        tenants,
        api_config.erp_connect_timeout + api_config.erp_query_timeout,
    );
    let app: Router = create_api_router(state, auth_config);

    let addr = resolve_bind_addr()?;
    tracing::info!(
        %addr,
        cache_max_size = api_config.cache_max_size,
        cache_ttl_secs = api_config.cache_ttl.as_secs(),
        "Starting LEDGERLINE API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    match sweeper.await {
        Ok(purged) => tracing::debug!(purged, "Expiry sweeper stopped"),
        Err(e) => tracing::warn!(error = %e, "Expiry sweeper task failed"),
    }

    let closed = cache.close_all().await;
    tracing::info!(closed, "Closed tenant database connections");
    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("LEDGERLINE_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("LEDGERLINE_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str.parse::<u16>().map_err(|_| {
        ApiError::invalid_input(format!("Invalid port value: {}", port_str))
    })?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
    })
}
