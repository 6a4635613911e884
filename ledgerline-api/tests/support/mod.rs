//! Shared harness for route tests: an app wired to a mock factory and an
//! in-memory tenant store, plus request helpers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use ledgerline_api::{
    create_api_router, generate_jwt_token, AppState, AuthConfig, ErpCache, ErpFactory, FixedClock,
    InMemoryTenantStore, TenantStore,
};
use ledgerline_test_utils::fixtures::{complete_tenant, test_codec};
use ledgerline_test_utils::{
    CacheConfig, CredentialCodec, DynMockFactory, MockFactory, TenantCredentials, TenantId,
};
use serde_json::Value;
use tower::ServiceExt;

/// 2024-01-01 00:00:00 UTC
pub const NOW: i64 = 1_704_067_200;

pub const JWT_SECRET: &str = "route-test-secret-that-is-long-enough";

pub struct Harness {
    pub app: Router,
    pub cache: Arc<ErpCache>,
    pub mock: Arc<MockFactory>,
    pub tenants: Arc<InMemoryTenantStore>,
    pub codec: Arc<CredentialCodec>,
    pub auth: AuthConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_cache_config(CacheConfig::new().with_max_size(16))
    }

    pub fn with_cache_config(config: CacheConfig) -> Self {
        let mock = Arc::new(MockFactory::new());
        let factory: ErpFactory = Arc::new(DynMockFactory(Arc::clone(&mock)));
        let codec = test_codec();
        let cache = Arc::new(ErpCache::new(Arc::clone(&factory), Arc::clone(&codec), config));
        let tenants = Arc::new(InMemoryTenantStore::new());
        let store: Arc<dyn TenantStore> = tenants.clone();

        let state = AppState::new(Arc::clone(&cache), factory, store, Duration::from_secs(5));
        let auth = AuthConfig::with_secret(JWT_SECRET, Arc::new(FixedClock(NOW)));
        let app = create_api_router(state, auth.clone());

        Self {
            app,
            cache,
            mock,
            tenants,
            codec,
            auth,
        }
    }

    /// Insert a tenant with complete credentials and return it.
    pub fn add_tenant(&self, password: &str) -> TenantCredentials {
        let tenant = complete_tenant(&self.codec, password);
        self.tenants.insert(tenant.clone());
        tenant
    }

    pub fn token(&self, roles: &[&str], tenant_id: Option<TenantId>) -> String {
        generate_jwt_token(
            &self.auth,
            "route-test-user".to_string(),
            tenant_id,
            roles.iter().map(|r| r.to_string()).collect(),
        )
        .expect("token generation")
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }
}
