//! Request authorization pipeline: identity, then resolution, then policy

use super::{AuthorizationEngine, PermissionResolutionService};
use crate::domain::{IdentityContext, MethodSpec, PermissionKey, StringUuid, TenantId};
use crate::error::{AppError, Result};
use crate::repository::{PermissionRepository, PolicyStore, RoleRepository};
use serde::Serialize;

/// Outcome of a pipeline check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthzDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<PermissionKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl AuthzDecision {
    fn granted(allowed: bool, permission: PermissionKey) -> Self {
        Self {
            allowed,
            permission: Some(permission),
            reason: (!allowed).then_some("policy_denied"),
        }
    }

    fn unmapped() -> Self {
        Self {
            allowed: false,
            permission: None,
            reason: Some("permission_not_found"),
        }
    }
}

pub struct AuthzService<R, P, S>
where
    R: RoleRepository,
    P: PermissionRepository,
    S: PolicyStore,
{
    resolver: PermissionResolutionService<P>,
    engine: AuthorizationEngine<R, P, S>,
}

impl<R, P, S> AuthzService<R, P, S>
where
    R: RoleRepository,
    P: PermissionRepository,
    S: PolicyStore,
{
    pub fn new(
        resolver: PermissionResolutionService<P>,
        engine: AuthorizationEngine<R, P, S>,
    ) -> Self {
        Self { resolver, engine }
    }

    pub fn resolver(&self) -> &PermissionResolutionService<P> {
        &self.resolver
    }

    pub fn engine(&self) -> &AuthorizationEngine<R, P, S> {
        &self.engine
    }

    /// Authorize an explicit `(user, key, action)` within the caller's tenant.
    pub async fn check(
        &self,
        ctx: &IdentityContext,
        user_id: StringUuid,
        key: &PermissionKey,
        action: MethodSpec,
    ) -> Result<bool> {
        let tenant_id = require_tenant(ctx)?;
        self.engine
            .authorize_in_tenant(tenant_id, user_id, key, action)
            .await
    }

    /// Resolve `(path, method)` in the caller's tenant and authorize the user
    /// against the resulting key. User tokens default to their own identity.
    ///
    /// A route with no permission mapping is a deny, not an error.
    pub async fn check_request(
        &self,
        ctx: &IdentityContext,
        user_id: Option<StringUuid>,
        path: &str,
        method: &str,
    ) -> Result<AuthzDecision> {
        let tenant_id = require_tenant(ctx)?;
        let user_id = user_id
            .or_else(|| ctx.user_id())
            .ok_or_else(|| AppError::BadRequest("user_id is required".to_string()))?;

        let key = match self.resolver.resolve(tenant_id, path, method).await {
            Ok(key) => key,
            Err(AppError::PermissionNotFound(_)) => return Ok(AuthzDecision::unmapped()),
            Err(e) => return Err(e),
        };
        // resolve only succeeds for a parseable method
        let action: MethodSpec = method.parse()?;

        let allowed = self
            .engine
            .authorize_in_tenant(tenant_id, user_id, &key, action)
            .await?;
        Ok(AuthzDecision::granted(allowed, key))
    }
}

/// The tenant a request acts within; system tokens must select one.
pub fn require_tenant(ctx: &IdentityContext) -> Result<TenantId> {
    ctx.tenant_id.ok_or_else(|| {
        AppError::BadRequest(
            "No tenant selected; system tokens must send a tenant override".to_string(),
        )
    })
}
