//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Duration;

use ledgerline_pool::{ClientHandle, ConnectionCache, ConnectionFactory};

use crate::tenants::TenantStore;

/// The process-wide cache of tenant ERP clients.
pub type ErpCache = ConnectionCache<dyn ClientHandle>;

/// Factory shared by the cache and the live credential test.
pub type ErpFactory = Arc<dyn ConnectionFactory<dyn ClientHandle>>;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Tenant ERP connections. Handlers re-request a handle on every use.
    pub cache: Arc<ErpCache>,
    /// Used directly only by the live credential test, which must bypass the cache.
    pub factory: ErpFactory,
    pub tenants: Arc<dyn TenantStore>,
    /// Overall bound for one live credential test per logical database.
    pub live_test_timeout: LiveTestTimeout,
    pub start_time: std::time::Instant,
}

/// Newtype so the timeout can be extracted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveTestTimeout(pub Duration);

impl AppState {
    pub fn new(
        cache: Arc<ErpCache>,
        factory: ErpFactory,
        tenants: Arc<dyn TenantStore>,
        live_test_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            factory,
            tenants,
            live_test_timeout: LiveTestTimeout(live_test_timeout),
            start_time: std::time::Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<ErpCache>, cache);
crate::impl_from_ref!(ErpFactory, factory);
crate::impl_from_ref!(Arc<dyn TenantStore>, tenants);
crate::impl_from_ref!(LiveTestTimeout, live_test_timeout);
crate::impl_from_ref!(std::time::Instant, start_time);
