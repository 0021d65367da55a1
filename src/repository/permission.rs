//! Permission registry

use crate::domain::{
    CreatePermissionInput, MethodSpec, Permission, PermissionKey, StringUuid, TenantId,
    UpdatePermissionRouteInput,
};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

/// Tenant-scoped permission records.
///
/// Listings come back in store order (`created_at`, then key); resolution
/// relies on that order to break ranking ties deterministically.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn create_permission(
        &self,
        tenant_id: TenantId,
        key: &PermissionKey,
        input: &CreatePermissionInput,
    ) -> Result<Permission>;
    async fn list_permissions(&self, tenant_id: TenantId) -> Result<Vec<Permission>>;
    async fn find_permission_by_key(
        &self,
        tenant_id: TenantId,
        key: &PermissionKey,
    ) -> Result<Option<Permission>>;
    async fn find_permission_by_route(
        &self,
        tenant_id: TenantId,
        path: &str,
        method: MethodSpec,
    ) -> Result<Option<Permission>>;
    async fn update_permission_route(
        &self,
        tenant_id: TenantId,
        key: &PermissionKey,
        input: &UpdatePermissionRouteInput,
    ) -> Result<Permission>;
    /// Renames the key and rewrites the objects of policy tuples held by
    /// roles of the same tenant, atomically.
    async fn rename_permission_key(
        &self,
        tenant_id: TenantId,
        old_key: &PermissionKey,
        new_key: &PermissionKey,
    ) -> Result<Permission>;
    /// Deletes the permission and purges same-tenant tuples naming it.
    async fn delete_permission_cascade(&self, tenant_id: TenantId, key: &PermissionKey)
        -> Result<()>;
}

pub struct PermissionRepositoryImpl {
    pool: MySqlPool,
}

impl PermissionRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn not_found(key: &PermissionKey) -> AppError {
        AppError::NotFound(format!("Permission {} not found", key))
    }
}

const PERMISSION_COLUMNS: &str =
    "id, tenant_id, perm_key, name, path, method, description, created_at";

/// Restricts a policy statement to subjects that are roles of one tenant.
const TENANT_SUBJECTS: &str =
    "subject IN (SELECT CONCAT('role:', id) FROM authz_roles WHERE tenant_id = ?)";

#[async_trait]
impl PermissionRepository for PermissionRepositoryImpl {
    async fn create_permission(
        &self,
        tenant_id: TenantId,
        key: &PermissionKey,
        input: &CreatePermissionInput,
    ) -> Result<Permission> {
        let id = StringUuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO authz_permissions
                (id, tenant_id, perm_key, name, path, method, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, NOW())
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(key)
        .bind(&input.name)
        .bind(&input.path)
        .bind(input.method)
        .bind(&input.description)
        .execute(&self.pool)
        .await?;

        self.find_permission_by_key(tenant_id, key)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create permission")))
    }

    async fn list_permissions(&self, tenant_id: TenantId) -> Result<Vec<Permission>> {
        let sql = format!(
            "SELECT {} FROM authz_permissions WHERE tenant_id = ? ORDER BY created_at, perm_key",
            PERMISSION_COLUMNS
        );
        let permissions = sqlx::query_as::<_, Permission>(&sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(permissions)
    }

    async fn find_permission_by_key(
        &self,
        tenant_id: TenantId,
        key: &PermissionKey,
    ) -> Result<Option<Permission>> {
        let sql = format!(
            "SELECT {} FROM authz_permissions WHERE tenant_id = ? AND perm_key = ?",
            PERMISSION_COLUMNS
        );
        let permission = sqlx::query_as::<_, Permission>(&sql)
            .bind(tenant_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(permission)
    }

    async fn find_permission_by_route(
        &self,
        tenant_id: TenantId,
        path: &str,
        method: MethodSpec,
    ) -> Result<Option<Permission>> {
        let sql = format!(
            "SELECT {} FROM authz_permissions \
             WHERE tenant_id = ? AND path = ? AND method = ? LIMIT 1",
            PERMISSION_COLUMNS
        );
        let permission = sqlx::query_as::<_, Permission>(&sql)
            .bind(tenant_id)
            .bind(path)
            .bind(method)
            .fetch_optional(&self.pool)
            .await?;

        Ok(permission)
    }

    async fn update_permission_route(
        &self,
        tenant_id: TenantId,
        key: &PermissionKey,
        input: &UpdatePermissionRouteInput,
    ) -> Result<Permission> {
        sqlx::query(
            "UPDATE authz_permissions SET path = ?, method = ? \
             WHERE tenant_id = ? AND perm_key = ?",
        )
        .bind(&input.path)
        .bind(input.method)
        .bind(tenant_id)
        .bind(key)
        .execute(&self.pool)
        .await?;

        // A no-op update reports zero affected rows, so existence is checked by re-reading
        self.find_permission_by_key(tenant_id, key)
            .await?
            .ok_or_else(|| Self::not_found(key))
    }

    async fn rename_permission_key(
        &self,
        tenant_id: TenantId,
        old_key: &PermissionKey,
        new_key: &PermissionKey,
    ) -> Result<Permission> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE authz_permissions SET perm_key = ? WHERE tenant_id = ? AND perm_key = ?",
        )
        .bind(new_key)
        .bind(tenant_id)
        .bind(old_key)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Self::not_found(old_key));
        }

        let sql = format!(
            "UPDATE authz_policies SET object = ? WHERE object = ? AND {}",
            TENANT_SUBJECTS
        );
        sqlx::query(&sql)
            .bind(new_key)
            .bind(old_key)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.find_permission_by_key(tenant_id, new_key)
            .await?
            .ok_or_else(|| Self::not_found(new_key))
    }

    async fn delete_permission_cascade(
        &self,
        tenant_id: TenantId,
        key: &PermissionKey,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Row first: a concurrent checked grant blocks on it, then sees it gone
        let result =
            sqlx::query("DELETE FROM authz_permissions WHERE tenant_id = ? AND perm_key = ?")
                .bind(tenant_id)
                .bind(key)
                .execute(&mut *tx)
                .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Self::not_found(key));
        }

        let sql = format!(
            "DELETE FROM authz_policies WHERE object = ? AND {}",
            TENANT_SUBJECTS
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
