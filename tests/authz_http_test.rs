//! HTTP tests for the decision endpoints and credential handling

mod common;

use authgate_core::domain::{MethodSpec, StringUuid};
use axum::http::{Method, StatusCode};
use common::{get_json, post_json, send, TestApp};
use pretty_assertions::assert_eq;
use serde_json::json;

/// Tenant with `user:create` on `/api/v1/users`, granted to an editor role
/// held by one user.
async fn seeded() -> (TestApp, StringUuid, StringUuid) {
    let app = TestApp::new();
    let tenant = StringUuid::new_v4();
    app.permission(tenant, "user:create", "/api/v1/users", MethodSpec::Any)
        .await;
    let role = app.role(tenant, "editor", false).await;
    app.grant(tenant, role.id, "user:create", MethodSpec::Any).await;
    let user = app.user_with_roles(tenant, &[role.id]).await;
    (app, tenant, user)
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = TestApp::new();

    let (status, body) = send(&app.router, Method::GET, "/health", None, &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = send(&app.router, Method::GET, "/ready", None, &[], None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app.router, Method::GET, "/metrics", None, &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_credential_is_unauthorized() {
    let app = TestApp::new();
    let (status, body) = send(
        &app.router,
        Method::GET,
        "/api/v1/authz/whoami",
        None,
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_credential");
}

#[tokio::test]
async fn test_forged_credential_is_unauthorized() {
    let app = TestApp::new();
    let (status, body) = get_json(&app.router, "/api/v1/authz/whoami", "not.a.jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_credential");
}

#[tokio::test]
async fn test_whoami_for_each_token_kind() {
    let app = TestApp::new();
    let tenant = StringUuid::new_v4();
    let user = StringUuid::new_v4();

    let (status, body) =
        get_json(&app.router, "/api/v1/authz/whoami", &app.user_token(user, tenant)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "user");
    assert_eq!(body["tenant_id"], tenant.to_string());
    assert_eq!(body["identity"], user.to_string());

    let (status, body) =
        get_json(&app.router, "/api/v1/authz/whoami", &app.app_token(tenant)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "app");
    assert_eq!(body["tenant_code"], "tenant-app");

    let (status, body) =
        get_json(&app.router, "/api/v1/authz/whoami", &app.system_token()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "system");
    assert!(body["tenant_id"].is_null());
    assert_eq!(body["impersonating"], false);
}

#[tokio::test]
async fn test_system_token_tenant_override() {
    let app = TestApp::new();
    let tenant = StringUuid::new_v4();
    let token = app.system_token();
    let tenant_header = tenant.to_string();

    let (status, body) = send(
        &app.router,
        Method::GET,
        "/api/v1/authz/whoami",
        Some(token.as_str()),
        &[("x-tenant-id", tenant_header.as_str())],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"], tenant_header);
    assert_eq!(body["impersonating"], true);

    let (status, body) = send(
        &app.router,
        Method::GET,
        "/api/v1/authz/whoami",
        Some(token.as_str()),
        &[("x-tenant-id", "not-a-tenant")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_tenant_override");
}

#[tokio::test]
async fn test_override_is_ignored_for_app_tokens() {
    let app = TestApp::new();
    let tenant = StringUuid::new_v4();
    let other = StringUuid::new_v4().to_string();

    let (status, body) = send(
        &app.router,
        Method::GET,
        "/api/v1/authz/whoami",
        Some(app.app_token(tenant).as_str()),
        &[("x-tenant-id", other.as_str())],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"], tenant.to_string());
    assert_eq!(body["impersonating"], false);
}

#[tokio::test]
async fn test_non_ascii_override_only_matters_for_system_tokens() {
    let app = TestApp::new();
    let tenant = StringUuid::new_v4();
    let whoami = |token: String| {
        let mut request = axum::http::Request::builder()
            .uri("/api/v1/authz/whoami")
            .header("Authorization", format!("Bearer {}", token))
            .body(axum::body::Body::empty())
            .unwrap();
        request.headers_mut().insert(
            "x-tenant-id",
            axum::http::HeaderValue::from_bytes(b"caf\xe9").unwrap(),
        );
        tower::ServiceExt::oneshot(app.router.clone(), request)
    };

    for token in [app.app_token(tenant), app.user_token(StringUuid::new_v4(), tenant)] {
        let response = whoami(token).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = whoami(app.system_token()).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dedicated_and_legacy_headers() {
    let app = TestApp::new();
    let tenant = StringUuid::new_v4();
    let token = app.app_token(tenant);

    for header in ["x-authgate-token", "x-app-token"] {
        let (status, body) = send(
            &app.router,
            Method::GET,
            "/api/v1/authz/whoami",
            None,
            &[(header, token.as_str())],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "header {}", header);
        assert_eq!(body["kind"], "app");
    }
}

#[tokio::test]
async fn test_check_allows_then_denies_after_revoke() {
    let (app, tenant, user) = seeded().await;
    let token = app.app_token(tenant);
    let body = json!({"user_id": user, "permission": "user:create", "action": "POST"});

    let (status, resp) = post_json(&app.router, "/api/v1/authz/check", &token, body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["allowed"], true);

    let policies = app.policies_of("user:create").await;
    assert_eq!(policies.len(), 1);
    let role_id = policies[0].subject.role_id();

    let (status, _) = common::delete_json(
        &app.router,
        "/api/v1/admin/policies",
        &token,
        Some(json!({"role_id": role_id, "permission": "user:create", "action": "*"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, resp) = post_json(&app.router, "/api/v1/authz/check", &token, body).await;
    assert_eq!(resp["allowed"], false);
}

#[tokio::test]
async fn test_check_defaults_action_to_wildcard() {
    let (app, tenant, user) = seeded().await;
    let (status, resp) = post_json(
        &app.router,
        "/api/v1/authz/check",
        &app.app_token(tenant),
        json!({"user_id": user, "permission": "user:create"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["allowed"], true);
}

#[tokio::test]
async fn test_check_for_user_of_another_tenant_is_denied() {
    let (app, _tenant, user) = seeded().await;
    let other_tenant = StringUuid::new_v4();
    let (status, resp) = post_json(
        &app.router,
        "/api/v1/authz/check",
        &app.app_token(other_tenant),
        json!({"user_id": user, "permission": "user:create", "action": "POST"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["allowed"], false);
}

#[tokio::test]
async fn test_check_requires_a_tenant() {
    let (app, _tenant, user) = seeded().await;
    let (status, resp) = post_json(
        &app.router,
        "/api/v1/authz/check",
        &app.system_token(),
        json!({"user_id": user, "permission": "user:create"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["error"], "bad_request");
}

#[tokio::test]
async fn test_check_request_uses_token_identity() {
    let (app, tenant, user) = seeded().await;
    let token = app.user_token(user, tenant);

    let (status, resp) = post_json(
        &app.router,
        "/api/v1/authz/check-request",
        &token,
        json!({"path": "/api/v1/users/", "method": "POST"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["allowed"], true);
    assert_eq!(resp["permission"], "user:create");

    let (status, resp) = post_json(
        &app.router,
        "/api/v1/authz/check-request",
        &token,
        json!({"path": "/api/v1/orders", "method": "GET"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["allowed"], false);
    assert_eq!(resp["reason"], "permission_not_found");
}

#[tokio::test]
async fn test_check_request_reports_policy_denial() {
    let (app, tenant, _user) = seeded().await;
    let stranger = app.user_with_roles(tenant, &[]).await;

    let (status, resp) = post_json(
        &app.router,
        "/api/v1/authz/check-request",
        &app.app_token(tenant),
        json!({"user_id": stranger, "path": "/api/v1/users", "method": "POST"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["allowed"], false);
    assert_eq!(resp["reason"], "policy_denied");
    assert_eq!(resp["permission"], "user:create");
}

#[tokio::test]
async fn test_resolve_endpoint() {
    let (app, tenant, _user) = seeded().await;
    let token = app.app_token(tenant);

    let (status, resp) = post_json(
        &app.router,
        "/api/v1/authz/resolve",
        &token,
        json!({"path": "/api/v1/users/42", "method": "DELETE"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["permission"], "user:create");
    assert_eq!(resp["method"], "*");

    let (status, resp) = post_json(
        &app.router,
        "/api/v1/authz/resolve",
        &token,
        json!({"path": "/api/v1/userslist", "method": "GET"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(resp["error"], "not_found");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = TestApp::new();
    let request = axum::http::Request::builder()
        .uri("/health")
        .header("x-request-id", "req-123")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-123"
    );
}
