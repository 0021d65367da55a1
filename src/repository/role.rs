//! Tenant role registry and user-role associations

use crate::domain::{CreateRoleInput, Role, StringUuid, SubjectRef, TenantId, User};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleRepository: Send + Sync {
    // Roles
    async fn create_role(&self, tenant_id: TenantId, input: &CreateRoleInput) -> Result<Role>;
    /// Looks a role up by its globally unique id; the caller checks the tenant.
    async fn find_role(&self, role_id: StringUuid) -> Result<Option<Role>>;
    async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<Role>>;
    /// Removes the role, its policy tuples and its user associations as one unit.
    async fn delete_role_cascade(&self, role_id: StringUuid) -> Result<()>;

    // Users
    async fn create_user(&self, tenant_id: TenantId, user_id: StringUuid) -> Result<User>;
    async fn find_user(&self, user_id: StringUuid) -> Result<Option<User>>;
    /// Role records held by the user, in no particular order.
    async fn find_user_roles(&self, user_id: StringUuid) -> Result<Vec<Role>>;
    /// Replaces the user's role set. The user and every role must belong to
    /// `tenant_id`; the check and the write form one atomic unit.
    async fn assign_roles(
        &self,
        tenant_id: TenantId,
        user_id: StringUuid,
        role_ids: &[StringUuid],
    ) -> Result<()>;
}

pub struct RoleRepositoryImpl {
    pool: MySqlPool,
}

impl RoleRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleRepository for RoleRepositoryImpl {
    async fn create_role(&self, tenant_id: TenantId, input: &CreateRoleInput) -> Result<Role> {
        let id = StringUuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO authz_roles (id, tenant_id, name, is_super_admin, created_at)
            VALUES (?, ?, ?, ?, NOW())
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(&input.name)
        .bind(input.is_super_admin)
        .execute(&self.pool)
        .await?;

        self.find_role(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create role")))
    }

    async fn find_role(&self, role_id: StringUuid) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, tenant_id, name, is_super_admin, created_at FROM authz_roles WHERE id = ?",
        )
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }

    async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT id, tenant_id, name, is_super_admin, created_at
            FROM authz_roles WHERE tenant_id = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    async fn delete_role_cascade(&self, role_id: StringUuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Row first: concurrent checked grants and assignments block on it
        let result = sqlx::query("DELETE FROM authz_roles WHERE id = ?")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::NotFound(format!("Role {} not found", role_id)));
        }

        sqlx::query("DELETE FROM authz_policies WHERE subject = ?")
            .bind(SubjectRef::Role(role_id).to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM authz_user_roles WHERE role_id = ?")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn create_user(&self, tenant_id: TenantId, user_id: StringUuid) -> Result<User> {
        sqlx::query("INSERT INTO authz_users (id, tenant_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        Ok(User {
            id: user_id,
            tenant_id,
            role_ids: vec![],
        })
    }

    async fn find_user(&self, user_id: StringUuid) -> Result<Option<User>> {
        let row: Option<(StringUuid, StringUuid)> =
            sqlx::query_as("SELECT id, tenant_id FROM authz_users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((id, tenant_id)) = row else {
            return Ok(None);
        };

        let role_ids: Vec<(StringUuid,)> =
            sqlx::query_as("SELECT role_id FROM authz_user_roles WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(User {
            id,
            tenant_id,
            role_ids: role_ids.into_iter().map(|(r,)| r).collect(),
        }))
    }

    async fn find_user_roles(&self, user_id: StringUuid) -> Result<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.tenant_id, r.name, r.is_super_admin, r.created_at
            FROM authz_roles r
            INNER JOIN authz_user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    async fn assign_roles(
        &self,
        tenant_id: TenantId,
        user_id: StringUuid,
        role_ids: &[StringUuid],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let user: Option<(TenantId,)> =
            sqlx::query_as("SELECT tenant_id FROM authz_users WHERE id = ? FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        match user {
            None => {
                tx.rollback().await?;
                return Err(AppError::NotFound(format!("User {} not found", user_id)));
            }
            Some((owner,)) if owner != tenant_id => {
                tx.rollback().await?;
                return Err(AppError::cross_tenant(tenant_id, owner));
            }
            Some(_) => {}
        }

        for role_id in role_ids {
            let role: Option<(TenantId,)> =
                sqlx::query_as("SELECT tenant_id FROM authz_roles WHERE id = ? FOR UPDATE")
                    .bind(*role_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            match role {
                None => {
                    tx.rollback().await?;
                    return Err(AppError::NotFound(format!("Role {} not found", role_id)));
                }
                Some((owner,)) if owner != tenant_id => {
                    tx.rollback().await?;
                    return Err(AppError::cross_tenant(tenant_id, owner));
                }
                Some(_) => {}
            }
        }

        sqlx::query("DELETE FROM authz_user_roles WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for role_id in role_ids {
            sqlx::query("INSERT IGNORE INTO authz_user_roles (user_id, role_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(*role_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
