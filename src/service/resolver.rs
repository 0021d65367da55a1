//! Route to permission resolution

use crate::domain::{MethodSpec, Permission, PermissionKey, TenantId};
use crate::error::{AppError, Result};
use crate::policy::{method_specificity, normalize_path, path_matches, PathMatchMode};
use crate::repository::PermissionRepository;
use crate::telemetry::metrics;
use std::sync::Arc;

/// Pick the permission that best covers `(path, method)`.
///
/// Longer normalized path wins, then an exact method over `*`. On a full tie
/// the earlier entry of `permissions` is kept, so callers must pass them in
/// store order.
pub fn rank_candidates<'a>(
    permissions: &'a [Permission],
    path: &str,
    method: MethodSpec,
    mode: PathMatchMode,
) -> Option<&'a Permission> {
    let request_path = normalize_path(path);
    let mut best: Option<(&Permission, (usize, u8))> = None;

    for permission in permissions {
        if !(permission.method.is_wildcard() || permission.method == method) {
            continue;
        }
        let prefix = normalize_path(&permission.path);
        if !path_matches(mode, prefix, request_path) {
            continue;
        }
        let rank = (prefix.len(), method_specificity(permission.method));
        // strictly greater: ties keep the first candidate
        if best.is_none_or(|(_, best_rank)| rank > best_rank) {
            best = Some((permission, rank));
        }
    }

    best.map(|(permission, _)| permission)
}

pub struct PermissionResolutionService<P: PermissionRepository> {
    repo: Arc<P>,
    mode: PathMatchMode,
}

impl<P: PermissionRepository> PermissionResolutionService<P> {
    pub fn new(repo: Arc<P>, mode: PathMatchMode) -> Self {
        Self { repo, mode }
    }

    /// Resolve a request to the permission record guarding it.
    pub async fn resolve_permission(
        &self,
        tenant_id: TenantId,
        path: &str,
        method: &str,
    ) -> Result<Permission> {
        let result = self.lookup(tenant_id, path, method).await;
        metrics::record_resolution(match &result {
            Ok(_) => "hit",
            Err(AppError::PermissionNotFound(_)) => "miss",
            Err(_) => "error",
        });
        result
    }

    /// Resolve a request to its canonical permission key.
    pub async fn resolve(
        &self,
        tenant_id: TenantId,
        path: &str,
        method: &str,
    ) -> Result<PermissionKey> {
        self.resolve_permission(tenant_id, path, method)
            .await
            .map(|p| p.key)
    }

    async fn lookup(&self, tenant_id: TenantId, path: &str, method: &str) -> Result<Permission> {
        let not_found = || AppError::PermissionNotFound(format!("{} {}", method, path));

        let Ok(method) = method.parse::<MethodSpec>() else {
            tracing::debug!(%tenant_id, method, path, "Unknown request method");
            return Err(not_found());
        };

        let permissions = self.repo.list_permissions(tenant_id).await?;
        if let Some(foreign) = permissions.iter().find(|p| p.tenant_id != tenant_id) {
            return Err(AppError::cross_tenant(tenant_id, foreign.tenant_id));
        }

        match rank_candidates(&permissions, path, method, self.mode) {
            Some(permission) => {
                tracing::debug!(
                    %tenant_id,
                    %method,
                    path,
                    key = %permission.key,
                    "Resolved permission"
                );
                Ok(permission.clone())
            }
            None => {
                tracing::debug!(%tenant_id, %method, path, "No permission covers request");
                Err(not_found())
            }
        }
    }
}
