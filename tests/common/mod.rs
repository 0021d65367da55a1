//! Common test utilities
//!
//! Builds the production router over an in-memory store so HTTP tests need
//! no database.

#![allow(dead_code)]

use authgate_core::config::{
    AuthzConfig, Config, DatabaseConfig, JwtConfig, StoreBackend, TelemetryConfig,
};
use authgate_core::domain::{
    AssignRolesInput, CreatePermissionInput, CreateRoleInput, MethodSpec, Permission,
    PermissionKey, PolicyFilter, PolicyTuple, Role, StringUuid, TenantId,
};
use authgate_core::policy::PathMatchMode;
use authgate_core::repository::{MemoryStore, PolicyStore};
use authgate_core::server::{build_router, AppState};
use authgate_core::state::HasAuthz;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub type TestState = AppState<MemoryStore, MemoryStore, MemoryStore>;

pub fn test_config(mode: PathMatchMode) -> Config {
    Config {
        http_host: "127.0.0.1".to_string(),
        http_port: 3000,
        store_backend: StoreBackend::Memory,
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: "test-secret-key-for-http-testing".to_string(),
            issuer: Some("https://authgate.test".to_string()),
            token_ttl_secs: 3600,
            private_key_pem: None,
            public_key_pem: None,
        },
        authz: AuthzConfig {
            path_match_mode: mode,
            ..AuthzConfig::default()
        },
        telemetry: TelemetryConfig::default(),
    }
}

pub struct TestApp {
    pub state: TestState,
    pub store: Arc<MemoryStore>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_mode(PathMatchMode::Segment)
    }

    pub fn with_mode(mode: PathMatchMode) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(
            test_config(mode),
            store.clone(),
            store.clone(),
            store.clone(),
            None,
            None,
        )
        .expect("test state");
        let router = build_router(state.clone());
        Self {
            state,
            store,
            router,
        }
    }

    pub fn system_token(&self) -> String {
        self.state
            .jwt_manager()
            .create_system_token("operator")
            .unwrap()
    }

    pub fn app_token(&self, tenant_id: TenantId) -> String {
        self.state
            .jwt_manager()
            .create_app_token(tenant_id, "tenant-app")
            .unwrap()
    }

    pub fn user_token(&self, user_id: StringUuid, tenant_id: TenantId) -> String {
        self.state
            .jwt_manager()
            .create_user_token(user_id, tenant_id, Some("alice"))
            .unwrap()
    }

    // ==================== Seeding ====================

    pub async fn permission(
        &self,
        tenant_id: TenantId,
        key: &str,
        path: &str,
        method: MethodSpec,
    ) -> Permission {
        self.state
            .admin_service()
            .create_permission(
                tenant_id,
                CreatePermissionInput {
                    key: key.to_string(),
                    name: key.to_string(),
                    path: path.to_string(),
                    method,
                    description: None,
                },
            )
            .await
            .unwrap()
    }

    pub async fn role(&self, tenant_id: TenantId, name: &str, is_super_admin: bool) -> Role {
        self.state
            .admin_service()
            .create_role(
                tenant_id,
                CreateRoleInput {
                    name: name.to_string(),
                    is_super_admin,
                },
            )
            .await
            .unwrap()
    }

    pub async fn user_with_roles(
        &self,
        tenant_id: TenantId,
        role_ids: &[StringUuid],
    ) -> StringUuid {
        let admin = self.state.admin_service();
        let user = admin
            .create_user(tenant_id, StringUuid::new_v4())
            .await
            .unwrap();
        admin
            .assign_roles(
                tenant_id,
                AssignRolesInput {
                    user_id: user.id,
                    role_ids: role_ids.to_vec(),
                },
            )
            .await
            .unwrap();
        user.id
    }

    pub async fn grant(
        &self,
        tenant_id: TenantId,
        role_id: StringUuid,
        key: &str,
        action: MethodSpec,
    ) {
        self.state
            .admin_service()
            .grant(tenant_id, role_id, &PermissionKey::parse(key).unwrap(), action)
            .await
            .unwrap();
    }

    pub async fn policies_of(&self, key: &str) -> Vec<PolicyTuple> {
        self.store
            .query_policies(&PolicyFilter::by_object(PermissionKey::parse(key).unwrap()))
            .await
            .unwrap()
    }
}

// ==================== HTTP helpers ====================

/// Send a request with optional bearer token, extra headers and JSON body.
pub async fn send(
    app: &Router,
    method: Method,
    path: &str,
    token: Option<&str>,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap_or_default();

    if body_bytes.is_empty() {
        return (status, Value::Null);
    }

    match serde_json::from_slice(&body_bytes) {
        Ok(data) => (status, data),
        Err(_) => (status, Value::String(String::from_utf8_lossy(&body_bytes).into_owned())),
    }
}

pub async fn get_json(app: &Router, path: &str, token: &str) -> (StatusCode, Value) {
    send(app, Method::GET, path, Some(token), &[], None).await
}

pub async fn post_json(app: &Router, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, path, Some(token), &[], Some(body)).await
}

pub async fn put_json(app: &Router, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::PUT, path, Some(token), &[], Some(body)).await
}

pub async fn delete_json(
    app: &Router,
    path: &str,
    token: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send(app, Method::DELETE, path, Some(token), &[], body).await
}
