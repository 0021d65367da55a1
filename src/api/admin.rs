//! Tenant policy administration endpoints
//!
//! Every handler acts on `AuthContext::managed_tenant`: an app token manages
//! its own tenant, a system token the tenant named in the override header.

use crate::api::{MessageResponse, SuccessResponse};
use crate::domain::{
    AssignRolesInput, CreatePermissionInput, CreateRoleInput, MethodSpec, PermissionKey,
    StringUuid, UpdatePermissionRouteInput,
};
use crate::error::Result;
use crate::middleware::AuthContext;
use crate::state::HasAuthz;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RenamePermissionInput {
    pub key: PermissionKey,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserInput {
    pub id: StringUuid,
}

#[derive(Debug, Deserialize)]
pub struct UserRolesInput {
    pub role_ids: Vec<StringUuid>,
}

#[derive(Debug, Deserialize)]
pub struct PolicyInput {
    pub role_id: StringUuid,
    pub permission: PermissionKey,
    pub action: MethodSpec,
}

// ==================== Permissions ====================

/// POST /api/v1/admin/permissions
pub async fn create_permission<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Json(input): Json<CreatePermissionInput>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    let permission = state
        .admin_service()
        .create_permission(tenant_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(permission))))
}

/// GET /api/v1/admin/permissions
pub async fn list_permissions<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    let permissions = state.admin_service().list_permissions(tenant_id).await?;
    Ok(Json(SuccessResponse::new(permissions)))
}

/// GET /api/v1/admin/permissions/{key}
pub async fn get_permission<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Path(key): Path<PermissionKey>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    let permission = state.admin_service().get_permission(tenant_id, &key).await?;
    Ok(Json(SuccessResponse::new(permission)))
}

/// PUT /api/v1/admin/permissions/{key}/route
pub async fn update_permission_route<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Path(key): Path<PermissionKey>,
    Json(input): Json<UpdatePermissionRouteInput>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    let permission = state
        .admin_service()
        .update_permission_route(tenant_id, &key, input)
        .await?;
    Ok(Json(SuccessResponse::new(permission)))
}

/// PUT /api/v1/admin/permissions/{key}/key
pub async fn rename_permission<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Path(key): Path<PermissionKey>,
    Json(input): Json<RenamePermissionInput>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    let permission = state
        .admin_service()
        .rename_permission_key(tenant_id, &key, &input.key)
        .await?;
    Ok(Json(SuccessResponse::new(permission)))
}

/// DELETE /api/v1/admin/permissions/{key}
pub async fn delete_permission<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Path(key): Path<PermissionKey>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    state.admin_service().delete_permission(tenant_id, &key).await?;
    Ok(Json(MessageResponse::new("Permission deleted successfully")))
}

/// GET /api/v1/admin/permissions/{key}/policies
pub async fn list_permission_policies<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Path(key): Path<PermissionKey>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    let tuples = state
        .admin_service()
        .roles_for_permission(tenant_id, &key)
        .await?;
    Ok(Json(SuccessResponse::new(tuples)))
}

// ==================== Roles ====================

/// POST /api/v1/admin/roles
pub async fn create_role<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Json(input): Json<CreateRoleInput>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    let role = state.admin_service().create_role(tenant_id, input).await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(role))))
}

/// GET /api/v1/admin/roles
pub async fn list_roles<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    let roles = state.admin_service().list_roles(tenant_id).await?;
    Ok(Json(SuccessResponse::new(roles)))
}

/// GET /api/v1/admin/roles/{id}
pub async fn get_role<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Path(id): Path<StringUuid>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    let role = state.admin_service().get_role(tenant_id, id).await?;
    Ok(Json(SuccessResponse::new(role)))
}

/// DELETE /api/v1/admin/roles/{id}
pub async fn delete_role<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Path(id): Path<StringUuid>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    state.admin_service().delete_role(tenant_id, id).await?;
    Ok(Json(MessageResponse::new("Role deleted successfully")))
}

/// GET /api/v1/admin/roles/{id}/policies
pub async fn list_role_policies<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Path(id): Path<StringUuid>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    let tuples = state
        .admin_service()
        .permissions_for_role(tenant_id, id)
        .await?;
    Ok(Json(SuccessResponse::new(tuples)))
}

// ==================== Users ====================

/// POST /api/v1/admin/users
pub async fn create_user<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Json(input): Json<CreateUserInput>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    let user = state.admin_service().create_user(tenant_id, input.id).await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(user))))
}

/// GET /api/v1/admin/users/{id}
pub async fn get_user<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Path(id): Path<StringUuid>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    let user = state.admin_service().get_user(tenant_id, id).await?;
    Ok(Json(SuccessResponse::new(user)))
}

/// PUT /api/v1/admin/users/{id}/roles
pub async fn assign_roles<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Path(id): Path<StringUuid>,
    Json(input): Json<UserRolesInput>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    let admin = state.admin_service();
    admin
        .assign_roles(
            tenant_id,
            AssignRolesInput {
                user_id: id,
                role_ids: input.role_ids,
            },
        )
        .await?;
    let user = admin.get_user(tenant_id, id).await?;
    Ok(Json(SuccessResponse::new(user)))
}

// ==================== Policy ====================

/// POST /api/v1/admin/policies
pub async fn grant<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Json(input): Json<PolicyInput>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    let tuple = state
        .admin_service()
        .grant(tenant_id, input.role_id, &input.permission, input.action)
        .await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(tuple))))
}

/// DELETE /api/v1/admin/policies
pub async fn revoke<S: HasAuthz>(
    State(state): State<S>,
    auth: AuthContext,
    Json(input): Json<PolicyInput>,
) -> Result<impl IntoResponse> {
    let tenant_id = auth.managed_tenant()?;
    state
        .admin_service()
        .revoke(tenant_id, input.role_id, &input.permission, input.action)
        .await?;
    Ok(Json(MessageResponse::new("Policy revoked successfully")))
}
