//! In-process store backing all three repositories.
//!
//! Used for tests and for `STORE_BACKEND=memory` deployments. All state sits
//! behind one lock so cascading mutations are atomic with respect to readers.

use super::{PermissionRepository, PolicyStore, RoleRepository};
use crate::domain::{
    CreatePermissionInput, CreateRoleInput, MethodSpec, Permission, PermissionKey, PolicyFilter,
    PolicyTuple, Role, StringUuid, SubjectRef, TenantId, UpdatePermissionRouteInput, User,
};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    roles: HashMap<StringUuid, Role>,
    users: HashMap<StringUuid, User>,
    permissions: Vec<Permission>,
    policies: Vec<PolicyTuple>,
}

impl MemoryState {
    fn tenant_role_subject(&self, tenant_id: TenantId, subject: SubjectRef) -> bool {
        self.roles
            .get(&subject.role_id())
            .is_some_and(|role| role.tenant_id == tenant_id)
    }

    fn check_role(&self, tenant_id: TenantId, role_id: StringUuid) -> Result<()> {
        match self.roles.get(&role_id) {
            None => Err(AppError::NotFound(format!("Role {} not found", role_id))),
            Some(role) if role.tenant_id != tenant_id => {
                Err(AppError::cross_tenant(tenant_id, role.tenant_id))
            }
            Some(_) => Ok(()),
        }
    }

    fn permission_mut(
        &mut self,
        tenant_id: TenantId,
        key: &PermissionKey,
    ) -> Result<&mut Permission> {
        self.permissions
            .iter_mut()
            .find(|p| p.tenant_id == tenant_id && p.key == *key)
            .ok_or_else(|| AppError::NotFound(format!("Permission {} not found", key)))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn create_role(&self, tenant_id: TenantId, input: &CreateRoleInput) -> Result<Role> {
        let role = Role {
            id: StringUuid::new_v4(),
            tenant_id,
            name: input.name.clone(),
            is_super_admin: input.is_super_admin,
            created_at: Utc::now(),
        };
        self.state.write().await.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn find_role(&self, role_id: StringUuid) -> Result<Option<Role>> {
        Ok(self.state.read().await.roles.get(&role_id).cloned())
    }

    async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<Role>> {
        let state = self.state.read().await;
        let mut roles: Vec<Role> = state
            .roles
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(roles)
    }

    async fn delete_role_cascade(&self, role_id: StringUuid) -> Result<()> {
        let mut state = self.state.write().await;
        if state.roles.remove(&role_id).is_none() {
            return Err(AppError::NotFound(format!("Role {} not found", role_id)));
        }
        let subject = SubjectRef::Role(role_id);
        state.policies.retain(|t| t.subject != subject);
        for user in state.users.values_mut() {
            user.role_ids.retain(|id| *id != role_id);
        }
        Ok(())
    }

    async fn create_user(&self, tenant_id: TenantId, user_id: StringUuid) -> Result<User> {
        let mut state = self.state.write().await;
        if state.users.contains_key(&user_id) {
            return Err(AppError::Conflict(format!("User {} already exists", user_id)));
        }
        let user = User {
            id: user_id,
            tenant_id,
            role_ids: vec![],
        };
        state.users.insert(user_id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, user_id: StringUuid) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn find_user_roles(&self, user_id: StringUuid) -> Result<Vec<Role>> {
        let state = self.state.read().await;
        let Some(user) = state.users.get(&user_id) else {
            return Ok(vec![]);
        };
        Ok(user
            .role_ids
            .iter()
            .filter_map(|id| state.roles.get(id).cloned())
            .collect())
    }

    async fn assign_roles(
        &self,
        tenant_id: TenantId,
        user_id: StringUuid,
        role_ids: &[StringUuid],
    ) -> Result<()> {
        let mut state = self.state.write().await;
        match state.users.get(&user_id) {
            None => return Err(AppError::NotFound(format!("User {} not found", user_id))),
            Some(user) if user.tenant_id != tenant_id => {
                return Err(AppError::cross_tenant(tenant_id, user.tenant_id));
            }
            Some(_) => {}
        }
        for role_id in role_ids {
            state.check_role(tenant_id, *role_id)?;
        }

        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        user.role_ids.clear();
        for role_id in role_ids {
            if !user.role_ids.contains(role_id) {
                user.role_ids.push(*role_id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionRepository for MemoryStore {
    async fn create_permission(
        &self,
        tenant_id: TenantId,
        key: &PermissionKey,
        input: &CreatePermissionInput,
    ) -> Result<Permission> {
        let mut state = self.state.write().await;
        if state
            .permissions
            .iter()
            .any(|p| p.tenant_id == tenant_id && p.key == *key)
        {
            return Err(AppError::Conflict(format!(
                "Permission {} already exists",
                key
            )));
        }
        let permission = Permission {
            id: StringUuid::new_v4(),
            tenant_id,
            key: key.clone(),
            name: input.name.clone(),
            path: input.path.clone(),
            method: input.method,
            description: input.description.clone(),
            created_at: Utc::now(),
        };
        state.permissions.push(permission.clone());
        Ok(permission)
    }

    async fn list_permissions(&self, tenant_id: TenantId) -> Result<Vec<Permission>> {
        let state = self.state.read().await;
        let mut permissions: Vec<Permission> = state
            .permissions
            .iter()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect();
        permissions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));
        Ok(permissions)
    }

    async fn find_permission_by_key(
        &self,
        tenant_id: TenantId,
        key: &PermissionKey,
    ) -> Result<Option<Permission>> {
        let state = self.state.read().await;
        Ok(state
            .permissions
            .iter()
            .find(|p| p.tenant_id == tenant_id && p.key == *key)
            .cloned())
    }

    async fn find_permission_by_route(
        &self,
        tenant_id: TenantId,
        path: &str,
        method: MethodSpec,
    ) -> Result<Option<Permission>> {
        let state = self.state.read().await;
        Ok(state
            .permissions
            .iter()
            .find(|p| p.tenant_id == tenant_id && p.path == path && p.method == method)
            .cloned())
    }

    async fn update_permission_route(
        &self,
        tenant_id: TenantId,
        key: &PermissionKey,
        input: &UpdatePermissionRouteInput,
    ) -> Result<Permission> {
        let mut state = self.state.write().await;
        let permission = state.permission_mut(tenant_id, key)?;
        permission.path = input.path.clone();
        permission.method = input.method;
        Ok(permission.clone())
    }

    async fn rename_permission_key(
        &self,
        tenant_id: TenantId,
        old_key: &PermissionKey,
        new_key: &PermissionKey,
    ) -> Result<Permission> {
        let mut state = self.state.write().await;
        if state
            .permissions
            .iter()
            .any(|p| p.tenant_id == tenant_id && p.key == *new_key)
        {
            return Err(AppError::Conflict(format!(
                "Permission {} already exists",
                new_key
            )));
        }

        let permission = state.permission_mut(tenant_id, old_key)?;
        permission.key = new_key.clone();
        let renamed = permission.clone();

        let rewrite: Vec<usize> = state
            .policies
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                t.object == *old_key && state.tenant_role_subject(tenant_id, t.subject)
            })
            .map(|(i, _)| i)
            .collect();
        for i in rewrite {
            state.policies[i].object = new_key.clone();
        }
        // Rewriting can collapse two tuples into one
        let mut seen = Vec::with_capacity(state.policies.len());
        state.policies.retain(|t| {
            if seen.contains(t) {
                false
            } else {
                seen.push(t.clone());
                true
            }
        });

        Ok(renamed)
    }

    async fn delete_permission_cascade(
        &self,
        tenant_id: TenantId,
        key: &PermissionKey,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let before = state.permissions.len();
        state
            .permissions
            .retain(|p| !(p.tenant_id == tenant_id && p.key == *key));
        if state.permissions.len() == before {
            return Err(AppError::NotFound(format!("Permission {} not found", key)));
        }

        let purge: Vec<bool> = state
            .policies
            .iter()
            .map(|t| t.object == *key && state.tenant_role_subject(tenant_id, t.subject))
            .collect();
        let mut purge = purge.into_iter();
        state.policies.retain(|_| !purge.next().unwrap_or(false));
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn add_policy(&self, tuple: &PolicyTuple) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.policies.contains(tuple) {
            return Ok(false);
        }
        state.policies.push(tuple.clone());
        Ok(true)
    }

    async fn grant_checked(&self, tenant_id: TenantId, tuple: &PolicyTuple) -> Result<bool> {
        let mut state = self.state.write().await;
        state.check_role(tenant_id, tuple.subject.role_id())?;
        if !state
            .permissions
            .iter()
            .any(|p| p.tenant_id == tenant_id && p.key == tuple.object)
        {
            return Err(AppError::NotFound(format!(
                "Permission {} not found",
                tuple.object
            )));
        }
        if state.policies.contains(tuple) {
            return Ok(false);
        }
        state.policies.push(tuple.clone());
        Ok(true)
    }

    async fn remove_policy(&self, tuple: &PolicyTuple) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.policies.len();
        state.policies.retain(|t| t != tuple);
        Ok(state.policies.len() != before)
    }

    async fn query_policies(&self, filter: &PolicyFilter) -> Result<Vec<PolicyTuple>> {
        let state = self.state.read().await;
        Ok(state
            .policies
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn remove_filtered_policies(&self, filter: &PolicyFilter) -> Result<u64> {
        if filter.is_empty() {
            return Err(AppError::BadRequest(
                "Refusing to remove policies with an empty filter".to_string(),
            ));
        }
        let mut state = self.state.write().await;
        let before = state.policies.len();
        state.policies.retain(|t| !filter.matches(t));
        Ok((before - state.policies.len()) as u64)
    }
}
