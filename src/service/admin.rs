//! Tenant-checked mutation path for roles, permissions and policy

use crate::domain::{
    AssignRolesInput, CreatePermissionInput, CreateRoleInput, MethodSpec, Permission,
    PermissionKey, PolicyFilter, PolicyTuple, Role, StringUuid, SubjectRef, TenantId,
    UpdatePermissionRouteInput, User,
};
use crate::error::{AppError, Result};
use crate::policy::normalize_path;
use crate::repository::{PermissionRepository, PolicyStore, RoleRepository};
use std::sync::Arc;
use validator::Validate;

/// Every mutation here is confined to `tenant_id`: roles, users and
/// permissions of other tenants are refused.
pub struct PolicyAdminService<R, P, S>
where
    R: RoleRepository,
    P: PermissionRepository,
    S: PolicyStore,
{
    roles: Arc<R>,
    permissions: Arc<P>,
    policy: Arc<S>,
}

impl<R, P, S> PolicyAdminService<R, P, S>
where
    R: RoleRepository,
    P: PermissionRepository,
    S: PolicyStore,
{
    pub fn new(roles: Arc<R>, permissions: Arc<P>, policy: Arc<S>) -> Self {
        Self {
            roles,
            permissions,
            policy,
        }
    }

    // ==================== Permissions ====================

    pub async fn create_permission(
        &self,
        tenant_id: TenantId,
        input: CreatePermissionInput,
    ) -> Result<Permission> {
        input.validate()?;
        let key = PermissionKey::parse(&input.key)?;
        let input = CreatePermissionInput {
            path: normalize_path(&input.path).to_string(),
            ..input
        };

        if self
            .permissions
            .find_permission_by_key(tenant_id, &key)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "Permission {} already exists",
                key
            )));
        }
        self.ensure_route_free(tenant_id, &input.path, input.method, None)
            .await?;

        let permission = self
            .permissions
            .create_permission(tenant_id, &key, &input)
            .await?;
        tracing::info!(
            %tenant_id,
            %key,
            path = %permission.path,
            method = %permission.method,
            "Permission created"
        );
        Ok(permission)
    }

    pub async fn get_permission(
        &self,
        tenant_id: TenantId,
        key: &PermissionKey,
    ) -> Result<Permission> {
        self.permissions
            .find_permission_by_key(tenant_id, key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Permission {} not found", key)))
    }

    pub async fn list_permissions(&self, tenant_id: TenantId) -> Result<Vec<Permission>> {
        self.permissions.list_permissions(tenant_id).await
    }

    /// Move the route a permission resolves from. Policy is untouched.
    pub async fn update_permission_route(
        &self,
        tenant_id: TenantId,
        key: &PermissionKey,
        input: UpdatePermissionRouteInput,
    ) -> Result<Permission> {
        input.validate()?;
        let _ = self.get_permission(tenant_id, key).await?;
        let input = UpdatePermissionRouteInput {
            path: normalize_path(&input.path).to_string(),
            ..input
        };
        self.ensure_route_free(tenant_id, &input.path, input.method, Some(key))
            .await?;

        let permission = self
            .permissions
            .update_permission_route(tenant_id, key, &input)
            .await?;
        tracing::info!(
            %tenant_id,
            %key,
            path = %permission.path,
            method = %permission.method,
            "Permission route updated"
        );
        Ok(permission)
    }

    pub async fn rename_permission_key(
        &self,
        tenant_id: TenantId,
        old_key: &PermissionKey,
        new_key: &PermissionKey,
    ) -> Result<Permission> {
        let existing = self.get_permission(tenant_id, old_key).await?;
        if old_key == new_key {
            return Ok(existing);
        }
        if self
            .permissions
            .find_permission_by_key(tenant_id, new_key)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "Permission {} already exists",
                new_key
            )));
        }

        let permission = self
            .permissions
            .rename_permission_key(tenant_id, old_key, new_key)
            .await?;
        tracing::info!(%tenant_id, %old_key, %new_key, "Permission key renamed");
        Ok(permission)
    }

    pub async fn delete_permission(&self, tenant_id: TenantId, key: &PermissionKey) -> Result<()> {
        let _ = self.get_permission(tenant_id, key).await?;
        self.permissions
            .delete_permission_cascade(tenant_id, key)
            .await?;
        tracing::info!(%tenant_id, %key, "Permission deleted");
        Ok(())
    }

    async fn ensure_route_free(
        &self,
        tenant_id: TenantId,
        path: &str,
        method: MethodSpec,
        owner: Option<&PermissionKey>,
    ) -> Result<()> {
        match self
            .permissions
            .find_permission_by_route(tenant_id, path, method)
            .await?
        {
            Some(existing) if Some(&existing.key) != owner => Err(AppError::Conflict(format!(
                "Route {} {} is already mapped to {}",
                method, path, existing.key
            ))),
            _ => Ok(()),
        }
    }

    // ==================== Roles ====================

    pub async fn create_role(&self, tenant_id: TenantId, input: CreateRoleInput) -> Result<Role> {
        input.validate()?;
        let role = self.roles.create_role(tenant_id, &input).await?;
        tracing::info!(
            %tenant_id,
            role_id = %role.id,
            name = %role.name,
            is_super_admin = role.is_super_admin,
            "Role created"
        );
        Ok(role)
    }

    /// Role lookup that refuses roles of other tenants
    pub async fn get_role(&self, tenant_id: TenantId, role_id: StringUuid) -> Result<Role> {
        let role = self
            .roles
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Role {} not found", role_id)))?;
        if role.tenant_id != tenant_id {
            return Err(AppError::cross_tenant(tenant_id, role.tenant_id));
        }
        Ok(role)
    }

    pub async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<Role>> {
        self.roles.list_roles(tenant_id).await
    }

    /// Delete a role together with its policy tuples and user assignments.
    pub async fn delete_role(&self, tenant_id: TenantId, role_id: StringUuid) -> Result<()> {
        let _ = self.get_role(tenant_id, role_id).await?;
        self.roles.delete_role_cascade(role_id).await?;
        tracing::info!(%tenant_id, %role_id, "Role deleted");
        Ok(())
    }

    // ==================== Users ====================

    pub async fn create_user(&self, tenant_id: TenantId, user_id: StringUuid) -> Result<User> {
        if self.roles.find_user(user_id).await?.is_some() {
            return Err(AppError::Conflict(format!("User {} already exists", user_id)));
        }
        let user = self.roles.create_user(tenant_id, user_id).await?;
        tracing::info!(%tenant_id, %user_id, "User registered");
        Ok(user)
    }

    pub async fn get_user(&self, tenant_id: TenantId, user_id: StringUuid) -> Result<User> {
        let user = self
            .roles
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        if user.tenant_id != tenant_id {
            return Err(AppError::cross_tenant(tenant_id, user.tenant_id));
        }
        Ok(user)
    }

    /// Replace the user's role set. Every role must belong to the user's tenant.
    pub async fn assign_roles(&self, tenant_id: TenantId, input: AssignRolesInput) -> Result<()> {
        input.validate()?;

        let mut role_ids = Vec::with_capacity(input.role_ids.len());
        for role_id in input.role_ids {
            if !role_ids.contains(&role_id) {
                role_ids.push(role_id);
            }
        }

        // The store re-checks user and role tenancy under the same write
        self.roles
            .assign_roles(tenant_id, input.user_id, &role_ids)
            .await?;
        tracing::info!(
            %tenant_id,
            user_id = %input.user_id,
            roles = role_ids.len(),
            "User roles assigned"
        );
        Ok(())
    }

    // ==================== Policy ====================

    /// Grant `action` on `key` to a role. Role and permission must both live
    /// in `tenant_id`; the store checks this atomically with the insert.
    pub async fn grant(
        &self,
        tenant_id: TenantId,
        role_id: StringUuid,
        key: &PermissionKey,
        action: MethodSpec,
    ) -> Result<PolicyTuple> {
        let tuple = PolicyTuple::new(SubjectRef::Role(role_id), key.clone(), action);
        if !self.policy.grant_checked(tenant_id, &tuple).await? {
            return Err(AppError::Conflict(format!(
                "Role {} already holds {} on {}",
                role_id, action, key
            )));
        }
        tracing::info!(%tenant_id, %role_id, %key, %action, "Policy granted");
        Ok(tuple)
    }

    pub async fn revoke(
        &self,
        tenant_id: TenantId,
        role_id: StringUuid,
        key: &PermissionKey,
        action: MethodSpec,
    ) -> Result<()> {
        let role = self.get_role(tenant_id, role_id).await?;

        let tuple = PolicyTuple::new(SubjectRef::Role(role.id), key.clone(), action);
        if !self.policy.remove_policy(&tuple).await? {
            return Err(AppError::NotFound(format!(
                "Role {} does not hold {} on {}",
                role.id, action, key
            )));
        }
        tracing::info!(%tenant_id, %role_id, %key, %action, "Policy revoked");
        Ok(())
    }

    pub async fn permissions_for_role(
        &self,
        tenant_id: TenantId,
        role_id: StringUuid,
    ) -> Result<Vec<PolicyTuple>> {
        let role = self.get_role(tenant_id, role_id).await?;
        self.policy
            .query_policies(&PolicyFilter::by_subject(SubjectRef::Role(role.id)))
            .await
    }

    /// Tuples naming `key` that are held by roles of this tenant.
    pub async fn roles_for_permission(
        &self,
        tenant_id: TenantId,
        key: &PermissionKey,
    ) -> Result<Vec<PolicyTuple>> {
        let _ = self.get_permission(tenant_id, key).await?;
        let tuples = self
            .policy
            .query_policies(&PolicyFilter::by_object(key.clone()))
            .await?;

        // Keys are only unique per tenant, so other tenants' grants share the object
        let mut own = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            if let Some(role) = self.roles.find_role(tuple.subject.role_id()).await? {
                if role.tenant_id == tenant_id {
                    own.push(tuple);
                }
            }
        }
        Ok(own)
    }
}
