//! Application state trait for dependency injection
//!
//! Handlers are written against [`HasAuthz`] so the same router serves the
//! MySQL-backed production state and the in-memory state used in tests.

use crate::config::Config;
use crate::jwt::JwtManager;
use crate::repository::{PermissionRepository, PolicyStore, RoleRepository};
use crate::service::{AuthzService, IdentityTokenResolver, PolicyAdminService};
use metrics_exporter_prometheus::PrometheusHandle;

pub trait HasAuthz: Clone + Send + Sync + 'static {
    type RoleRepo: RoleRepository + 'static;
    type PermissionRepo: PermissionRepository + 'static;
    type PolicyRepo: PolicyStore + 'static;

    fn config(&self) -> &Config;

    fn jwt_manager(&self) -> &JwtManager;

    fn identity_resolver(&self) -> &IdentityTokenResolver;

    /// Resolution + enforcement pipeline
    fn authz_service(
        &self,
    ) -> &AuthzService<Self::RoleRepo, Self::PermissionRepo, Self::PolicyRepo>;

    /// Tenant-checked mutations
    fn admin_service(
        &self,
    ) -> &PolicyAdminService<Self::RoleRepo, Self::PermissionRepo, Self::PolicyRepo>;

    /// Present when metrics are enabled
    fn prometheus_handle(&self) -> Option<&PrometheusHandle>;

    /// Whether the backing store answers
    fn check_ready(&self) -> impl std::future::Future<Output = bool> + Send;
}
