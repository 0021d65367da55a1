//! Authorization decision endpoints

use crate::domain::{IdentityContext, MethodSpec, PermissionKey, StringUuid};
use crate::error::{AppError, Result};
use crate::middleware::AuthContext;
use crate::service::authz::require_tenant;
use crate::service::AuthzDecision;
use crate::state::HasAuthz;
use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub user_id: StringUuid,
    pub permission: PermissionKey,
    #[serde(default = "any_action")]
    pub action: MethodSpec,
}

fn any_action() -> MethodSpec {
    MethodSpec::Any
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequestInput {
    pub user_id: Option<StringUuid>,
    pub path: String,
    pub method: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub path: String,
    pub method: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub permission: PermissionKey,
    pub name: String,
    pub path: String,
    pub method: MethodSpec,
}

/// POST /api/v1/authz/check
pub async fn check<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Json(input): Json<CheckRequest>,
) -> Result<impl IntoResponse> {
    let allowed = state
        .authz_service()
        .check(auth.context(), input.user_id, &input.permission, input.action)
        .await?;
    Ok(Json(CheckResponse { allowed }))
}

/// POST /api/v1/authz/check-request
pub async fn check_request<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Json(input): Json<CheckRequestInput>,
) -> Result<Json<AuthzDecision>> {
    let decision = state
        .authz_service()
        .check_request(auth.context(), input.user_id, &input.path, &input.method)
        .await?;
    Ok(Json(decision))
}

/// POST /api/v1/authz/resolve
pub async fn resolve<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Json(input): Json<ResolveRequest>,
) -> Result<impl IntoResponse> {
    let tenant_id = require_tenant(auth.context())?;
    let permission = match state
        .authz_service()
        .resolver()
        .resolve_permission(tenant_id, &input.path, &input.method)
        .await
    {
        Ok(permission) => permission,
        Err(AppError::PermissionNotFound(route)) => {
            return Err(AppError::NotFound(format!("No permission covers {}", route)))
        }
        Err(e) => return Err(e),
    };

    Ok(Json(ResolveResponse {
        permission: permission.key,
        name: permission.name,
        path: permission.path,
        method: permission.method,
    }))
}

/// GET /api/v1/authz/whoami
pub async fn whoami(auth: AuthContext) -> Json<IdentityContext> {
    Json(auth.0)
}
