//! Tenant Credential Store
//!
//! Read and update access to the external-database credentials stored on
//! tenant records. The cache never talks to the store directly; handlers
//! fetch the record and pass it to `ConnectionCache::get`.

use crate::error::ApiResult;
use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_postgres::Pool;
use ledgerline_core::{TenantCredentials, TenantId};
use tokio_postgres::Row;
use uuid::Uuid;

/// New credential values for a tenant. `encrypted_password` is the codec
/// output, never plaintext.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialUpdate {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub encrypted_password: String,
}

impl std::fmt::Debug for CredentialUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialUpdate")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("encrypted_password", &"[REDACTED]")
            .finish()
    }
}

/// Storage seam for tenant credential records.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Fetch a live tenant. Soft-deleted tenants read as `None`.
    async fn get(&self, tenant_id: TenantId) -> ApiResult<Option<TenantCredentials>>;

    /// Replace a tenant's credentials. Returns `false` if no live tenant matched.
    async fn update_credentials(
        &self,
        tenant_id: TenantId,
        update: CredentialUpdate,
    ) -> ApiResult<bool>;

    /// Mark a tenant deleted. Returns `false` if no live tenant matched.
    async fn soft_delete(&self, tenant_id: TenantId) -> ApiResult<bool>;

    /// Verify the backing store is reachable.
    async fn ping(&self) -> ApiResult<()>;
}

// ============================================================================
// POSTGRES STORE
// ============================================================================

const SELECT_TENANT: &str = "SELECT id, db_host, db_port, db_username, db_password \
     FROM tenants WHERE id = $1 AND deleted_at IS NULL";

const UPDATE_CREDENTIALS: &str = "UPDATE tenants \
     SET db_host = $2, db_port = $3, db_username = $4, db_password = $5, updated_at = now() \
     WHERE id = $1 AND deleted_at IS NULL";

const SOFT_DELETE: &str =
    "UPDATE tenants SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL";

/// Tenant store backed by the control-plane `tenants` table.
#[derive(Clone)]
pub struct PgTenantStore {
    pool: Pool,
}

impl PgTenantStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

/// Assemble a credential record from nullable column values.
///
/// Blank strings are kept as-is; the completeness check treats them as
/// absent.
pub fn credentials_from_columns(
    id: Uuid,
    db_host: Option<String>,
    db_port: Option<i32>,
    db_username: Option<String>,
    db_password: Option<String>,
) -> TenantCredentials {
    TenantCredentials {
        tenant_id: TenantId::new(id),
        db_host,
        db_port: db_port.map(|p| p.to_string()),
        db_username,
        db_password,
    }
}

fn credentials_from_row(row: &Row) -> Result<TenantCredentials, tokio_postgres::Error> {
    Ok(credentials_from_columns(
        row.try_get("id")?,
        row.try_get("db_host")?,
        row.try_get("db_port")?,
        row.try_get("db_username")?,
        row.try_get("db_password")?,
    ))
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn get(&self, tenant_id: TenantId) -> ApiResult<Option<TenantCredentials>> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(SELECT_TENANT, &[&tenant_id.as_uuid()])
            .await?;
        Ok(row.as_ref().map(credentials_from_row).transpose()?)
    }

    async fn update_credentials(
        &self,
        tenant_id: TenantId,
        update: CredentialUpdate,
    ) -> ApiResult<bool> {
        let conn = self.pool.get().await?;
        let port = i32::from(update.port);
        let updated = conn
            .execute(
                UPDATE_CREDENTIALS,
                &[
                    &tenant_id.as_uuid(),
                    &update.host,
                    &port,
                    &update.username,
                    &update.encrypted_password,
                ],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn soft_delete(&self, tenant_id: TenantId) -> ApiResult<bool> {
        let conn = self.pool.get().await?;
        let deleted = conn.execute(SOFT_DELETE, &[&tenant_id.as_uuid()]).await?;
        Ok(deleted > 0)
    }

    async fn ping(&self) -> ApiResult<()> {
        crate::db::health_check(&self.pool).await
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Clone)]
struct StoredTenant {
    credentials: TenantCredentials,
    deleted: bool,
}

/// Tenant store held in memory, for tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryTenantStore {
    tenants: DashMap<TenantId, StoredTenant>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tenant record.
    pub fn insert(&self, credentials: TenantCredentials) {
        self.tenants.insert(
            credentials.tenant_id,
            StoredTenant {
                credentials,
                deleted: false,
            },
        );
    }

    /// Whether the tenant exists and has been soft-deleted.
    pub fn is_deleted(&self, tenant_id: TenantId) -> bool {
        self.tenants
            .get(&tenant_id)
            .is_some_and(|stored| stored.deleted)
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn get(&self, tenant_id: TenantId) -> ApiResult<Option<TenantCredentials>> {
        Ok(self
            .tenants
            .get(&tenant_id)
            .filter(|stored| !stored.deleted)
            .map(|stored| stored.credentials.clone()))
    }

    async fn update_credentials(
        &self,
        tenant_id: TenantId,
        update: CredentialUpdate,
    ) -> ApiResult<bool> {
        let Some(mut stored) = self.tenants.get_mut(&tenant_id) else {
            return Ok(false);
        };
        if stored.deleted {
            return Ok(false);
        }
        stored.credentials.db_host = Some(update.host);
        stored.credentials.db_port = Some(update.port.to_string());
        stored.credentials.db_username = Some(update.username);
        stored.credentials.db_password = Some(update.encrypted_password);
        Ok(true)
    }

    async fn soft_delete(&self, tenant_id: TenantId) -> ApiResult<bool> {
        let Some(mut stored) = self.tenants.get_mut(&tenant_id) else {
            return Ok(false);
        };
        if stored.deleted {
            return Ok(false);
        }
        stored.deleted = true;
        Ok(true)
    }

    async fn ping(&self) -> ApiResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update() -> CredentialUpdate {
        CredentialUpdate {
            host: "10.0.0.5".to_string(),
            port: 5433,
            username: "reader".to_string(),
            encrypted_password: "blob".to_string(),
        }
    }

    #[test]
    fn test_credentials_from_columns() {
        let id = Uuid::now_v7();
        let creds = credentials_from_columns(
            id,
            Some("db.example.com".to_string()),
            Some(5432),
            Some("u".to_string()),
            Some("blob".to_string()),
        );
        assert_eq!(creds.tenant_id, TenantId::new(id));
        assert_eq!(creds.db_port.as_deref(), Some("5432"));
        assert!(creds.is_complete());

        let empty = credentials_from_columns(id, None, None, None, None);
        assert_eq!(empty, TenantCredentials::unconfigured(TenantId::new(id)));
    }

    #[test]
    fn test_update_debug_redacts_password() {
        let rendered = format!("{:?}", update());
        assert!(!rendered.contains("blob"));
        assert!(rendered.contains("REDACTED"));
    }

    #[tokio::test]
    async fn test_in_memory_update_and_get() {
        let store = InMemoryTenantStore::new();
        let tenant_id = TenantId::now_v7();
        store.insert(TenantCredentials::unconfigured(tenant_id));

        assert!(store.update_credentials(tenant_id, update()).await.unwrap());
        let creds = store.get(tenant_id).await.unwrap().expect("tenant present");
        assert!(creds.is_complete());
        assert_eq!(creds.db_port.as_deref(), Some("5433"));
    }

    #[tokio::test]
    async fn test_in_memory_soft_delete_hides_tenant() {
        let store = InMemoryTenantStore::new();
        let tenant_id = TenantId::now_v7();
        store.insert(TenantCredentials::unconfigured(tenant_id));

        assert!(store.soft_delete(tenant_id).await.unwrap());
        assert!(store.is_deleted(tenant_id));
        assert!(store.get(tenant_id).await.unwrap().is_none());
        assert!(!store.soft_delete(tenant_id).await.unwrap());
        assert!(!store.update_credentials(tenant_id, update()).await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_unknown_tenant() {
        let store = InMemoryTenantStore::new();
        assert!(store.get(TenantId::now_v7()).await.unwrap().is_none());
        assert!(!store.soft_delete(TenantId::now_v7()).await.unwrap());
    }
}
