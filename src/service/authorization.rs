//! Role-based policy evaluation

use crate::domain::{MethodSpec, PermissionKey, Role, StringUuid, SubjectRef, TenantId, User};
use crate::error::{AppError, Result};
use crate::repository::{PermissionRepository, PolicyStore, RoleRepository};
use crate::telemetry::metrics;
use std::sync::Arc;

pub struct AuthorizationEngine<R, P, S>
where
    R: RoleRepository,
    P: PermissionRepository,
    S: PolicyStore,
{
    roles: Arc<R>,
    permissions: Arc<P>,
    policy: Arc<S>,
}

impl<R, P, S> AuthorizationEngine<R, P, S>
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

    /// May `user_id` perform `action` on `key`?
    ///
    /// Unknown users are denied. Storage failures and tenant inconsistencies
    /// surface as errors, never as a deny.
    pub async fn authorize(
        &self,
        user_id: StringUuid,
        key: &PermissionKey,
        action: MethodSpec,
    ) -> Result<bool> {
        let result = match self.roles.find_user(user_id).await {
            Ok(Some(user)) => self.decide(&user, key, action).await,
            Ok(None) => {
                tracing::debug!(%user_id, "Unknown user, denying");
                Ok(false)
            }
            Err(e) => Err(e),
        };
        record(&result);
        result
    }

    /// As [`authorize`](Self::authorize), but the user must also belong to
    /// `tenant_id`. A user of another tenant is denied.
    pub async fn authorize_in_tenant(
        &self,
        tenant_id: TenantId,
        user_id: StringUuid,
        key: &PermissionKey,
        action: MethodSpec,
    ) -> Result<bool> {
        let result = match self.roles.find_user(user_id).await {
            Ok(Some(user)) if user.tenant_id == tenant_id => self.decide(&user, key, action).await,
            Ok(Some(user)) => {
                tracing::warn!(
                    %user_id,
                    user_tenant = %user.tenant_id,
                    request_tenant = %tenant_id,
                    "Authorization requested for a user of another tenant"
                );
                Ok(false)
            }
            Ok(None) => {
                tracing::debug!(%user_id, "Unknown user, denying");
                Ok(false)
            }
            Err(e) => Err(e),
        };
        record(&result);
        result
    }

    async fn decide(&self, user: &User, key: &PermissionKey, action: MethodSpec) -> Result<bool> {
        let roles = self.roles.find_user_roles(user.id).await?;
        check_role_tenants(user, &roles)?;

        if let Some(role) = roles.iter().find(|r| r.is_super_admin) {
            tracing::debug!(user_id = %user.id, role_id = %role.id, %key, "Superadmin bypass");
            return Ok(true);
        }
        if roles.is_empty() {
            tracing::debug!(user_id = %user.id, %key, "User holds no roles");
            return Ok(false);
        }

        // A tuple naming another tenant's key must never grant
        if self
            .permissions
            .find_permission_by_key(user.tenant_id, key)
            .await?
            .is_none()
        {
            tracing::debug!(
                user_id = %user.id,
                %key,
                "Key is not a permission of the user's tenant"
            );
            return Ok(false);
        }

        for role in &roles {
            if self
                .policy
                .enforce(SubjectRef::Role(role.id), key, action)
                .await?
            {
                tracing::debug!(user_id = %user.id, role_id = %role.id, %key, %action, "Allowed");
                return Ok(true);
            }
        }

        tracing::debug!(user_id = %user.id, %key, %action, "Denied");
        Ok(false)
    }
}

fn check_role_tenants(user: &User, roles: &[Role]) -> Result<()> {
    match roles.iter().find(|r| r.tenant_id != user.tenant_id) {
        Some(role) => Err(AppError::cross_tenant(user.tenant_id, role.tenant_id)),
        None => Ok(()),
    }
}

fn record(result: &Result<bool>) {
    metrics::record_decision(match result {
        Ok(true) => "allow",
        Ok(false) => "deny",
        Err(_) => "error",
    });
}
