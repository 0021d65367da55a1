//! Server initialization and routing

use crate::api;
use crate::config::{Config, StoreBackend};
use crate::jwt::JwtManager;
use crate::middleware::ObservabilityLayer;
use crate::repository::{
    DbPool, MemoryStore, PermissionRepository, PermissionRepositoryImpl, PolicyStore,
    PolicyStoreImpl, RoleRepository, RoleRepositoryImpl,
};
use crate::service::{
    AuthorizationEngine, AuthzService, IdentityTokenResolver, PermissionResolutionService,
    PolicyAdminService,
};
use crate::state::HasAuthz;
use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across handlers
pub struct AppState<R, P, S>
where
    R: RoleRepository,
    P: PermissionRepository,
    S: PolicyStore,
{
    pub config: Arc<Config>,
    pub jwt_manager: Arc<JwtManager>,
    pub identity_resolver: IdentityTokenResolver,
    pub authz_service: Arc<AuthzService<R, P, S>>,
    pub admin_service: Arc<PolicyAdminService<R, P, S>>,
    pub prometheus_handle: Option<PrometheusHandle>,
    /// Set for the MySQL backend; readiness pings it
    pub db_pool: Option<DbPool>,
}

// Derived Clone would require the repositories themselves to be Clone
impl<R, P, S> Clone for AppState<R, P, S>
where
    R: RoleRepository,
    P: PermissionRepository,
    S: PolicyStore,
{
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            jwt_manager: self.jwt_manager.clone(),
            identity_resolver: self.identity_resolver.clone(),
            authz_service: self.authz_service.clone(),
            admin_service: self.admin_service.clone(),
            prometheus_handle: self.prometheus_handle.clone(),
            db_pool: self.db_pool.clone(),
        }
    }
}

impl<R, P, S> AppState<R, P, S>
where
    R: RoleRepository,
    P: PermissionRepository,
    S: PolicyStore,
{
    /// Wire the services over one set of repositories.
    pub fn new(
        config: Config,
        roles: Arc<R>,
        permissions: Arc<P>,
        policy: Arc<S>,
        prometheus_handle: Option<PrometheusHandle>,
        db_pool: Option<DbPool>,
    ) -> crate::error::Result<Self> {
        let jwt_manager = Arc::new(JwtManager::new(config.jwt.clone())?);
        tracing::debug!(rsa = jwt_manager.uses_rsa(), "Token verifier configured");
        let identity_resolver = IdentityTokenResolver::new(jwt_manager.clone());

        let resolver =
            PermissionResolutionService::new(permissions.clone(), config.authz.path_match_mode);
        let engine = AuthorizationEngine::new(roles.clone(), permissions.clone(), policy.clone());
        let authz_service = Arc::new(AuthzService::new(resolver, engine));
        let admin_service = Arc::new(PolicyAdminService::new(roles, permissions, policy));

        Ok(Self {
            config: Arc::new(config),
            jwt_manager,
            identity_resolver,
            authz_service,
            admin_service,
            prometheus_handle,
            db_pool,
        })
    }
}

impl<R, P, S> HasAuthz for AppState<R, P, S>
where
    R: RoleRepository + 'static,
    P: PermissionRepository + 'static,
    S: PolicyStore + 'static,
{
    type RoleRepo = R;
    type PermissionRepo = P;
    type PolicyRepo = S;

    fn config(&self) -> &Config {
        &self.config
    }

    fn jwt_manager(&self) -> &JwtManager {
        &self.jwt_manager
    }

    fn identity_resolver(&self) -> &IdentityTokenResolver {
        &self.identity_resolver
    }

    fn authz_service(&self) -> &AuthzService<R, P, S> {
        &self.authz_service
    }

    fn admin_service(&self) -> &PolicyAdminService<R, P, S> {
        &self.admin_service
    }

    fn prometheus_handle(&self) -> Option<&PrometheusHandle> {
        self.prometheus_handle.as_ref()
    }

    async fn check_ready(&self) -> bool {
        match &self.db_pool {
            Some(pool) => sqlx::query("SELECT 1").execute(pool.inner()).await.is_ok(),
            None => true,
        }
    }
}

/// Run the HTTP server until ctrl-c
pub async fn run(config: Config, prometheus_handle: Option<PrometheusHandle>) -> Result<()> {
    let http_addr = config.http_addr();

    let app = match config.store_backend {
        StoreBackend::MySql => {
            let db_pool = DbPool::connect(&config.database).await?;
            info!("Connected to database");

            let roles = Arc::new(RoleRepositoryImpl::new(db_pool.inner().clone()));
            let permissions = Arc::new(PermissionRepositoryImpl::new(db_pool.inner().clone()));
            let policy = Arc::new(PolicyStoreImpl::new(db_pool.inner().clone()));
            let state = AppState::new(
                config,
                roles,
                permissions,
                policy,
                prometheus_handle,
                Some(db_pool),
            )?;
            build_router(state)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            let store = Arc::new(MemoryStore::new());
            let state = AppState::new(
                config,
                store.clone(),
                store.clone(),
                store,
                prometheus_handle,
                None,
            )?;
            build_router(state)
        }
    };

    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Build the HTTP router with generic state type
///
/// Generic over the state so production `AppState` and test states share
/// one route table.
pub fn build_router<S: HasAuthz>(state: S) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/health", get(api::health::health))
        .route("/ready", get(api::health::ready::<S>))
        .route("/metrics", get(api::metrics::metrics_handler::<S>))
        // Decision endpoints
        .route("/api/v1/authz/check", post(api::authz::check::<S>))
        .route(
            "/api/v1/authz/check-request",
            post(api::authz::check_request::<S>),
        )
        .route("/api/v1/authz/resolve", post(api::authz::resolve::<S>))
        .route("/api/v1/authz/whoami", get(api::authz::whoami))
        // Permission administration
        .route(
            "/api/v1/admin/permissions",
            get(api::admin::list_permissions::<S>).post(api::admin::create_permission::<S>),
        )
        .route(
            "/api/v1/admin/permissions/{key}",
            get(api::admin::get_permission::<S>).delete(api::admin::delete_permission::<S>),
        )
        .route(
            "/api/v1/admin/permissions/{key}/route",
            put(api::admin::update_permission_route::<S>),
        )
        .route(
            "/api/v1/admin/permissions/{key}/key",
            put(api::admin::rename_permission::<S>),
        )
        .route(
            "/api/v1/admin/permissions/{key}/policies",
            get(api::admin::list_permission_policies::<S>),
        )
        // Role administration
        .route(
            "/api/v1/admin/roles",
            get(api::admin::list_roles::<S>).post(api::admin::create_role::<S>),
        )
        .route(
            "/api/v1/admin/roles/{id}",
            get(api::admin::get_role::<S>).delete(api::admin::delete_role::<S>),
        )
        .route(
            "/api/v1/admin/roles/{id}/policies",
            get(api::admin::list_role_policies::<S>),
        )
        // User administration
        .route("/api/v1/admin/users", post(api::admin::create_user::<S>))
        .route("/api/v1/admin/users/{id}", get(api::admin::get_user::<S>))
        .route(
            "/api/v1/admin/users/{id}/roles",
            put(api::admin::assign_roles::<S>),
        )
        // Policy tuples
        .route(
            "/api/v1/admin/policies",
            post(api::admin::grant::<S>).delete(api::admin::revoke::<S>),
        )
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(ObservabilityLayer)
        .with_state(state)
}
