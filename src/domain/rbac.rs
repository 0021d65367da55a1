//! RBAC (Role-Based Access Control) domain models

use super::common::{StringUuid, TenantId};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// HTTP verb a permission or policy tuple applies to, or the `*` wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MethodSpec {
    Any,
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl MethodSpec {
    pub const ALL: [MethodSpec; 8] = [
        MethodSpec::Any,
        MethodSpec::Get,
        MethodSpec::Post,
        MethodSpec::Put,
        MethodSpec::Delete,
        MethodSpec::Patch,
        MethodSpec::Head,
        MethodSpec::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MethodSpec::Any => "*",
            MethodSpec::Get => "GET",
            MethodSpec::Post => "POST",
            MethodSpec::Put => "PUT",
            MethodSpec::Delete => "DELETE",
            MethodSpec::Patch => "PATCH",
            MethodSpec::Head => "HEAD",
            MethodSpec::Options => "OPTIONS",
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, MethodSpec::Any)
    }
}

impl std::fmt::Display for MethodSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MethodSpec {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        MethodSpec::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| AppError::Validation(format!("Invalid HTTP method: {}", s)))
    }
}

impl Serialize for MethodSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MethodSpec {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl sqlx::Type<sqlx::MySql> for MethodSpec {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <String as sqlx::Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::MySql>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::MySql> for MethodSpec {
    fn decode(value: sqlx::mysql::MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::MySql>>::decode(value)?;
        Ok(s.parse::<MethodSpec>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::MySql> for MethodSpec {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// Stable, tenant-unique identifier a policy is written against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct PermissionKey(String);

impl PermissionKey {
    pub fn parse(key: &str) -> Result<Self, AppError> {
        let key = key.trim();
        if key.len() > 100 || !PERMISSION_KEY_REGEX.is_match(key) {
            return Err(AppError::Validation(format!(
                "Invalid permission key: {:?}",
                key
            )));
        }
        Ok(PermissionKey(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PermissionKey {
    type Err = AppError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionKey::parse(s)
    }
}

impl<'de> Deserialize<'de> for PermissionKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PermissionKey::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Permission entity: a stable key bound to a route prefix and method.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: StringUuid,
    pub tenant_id: TenantId,
    #[sqlx(rename = "perm_key")]
    pub key: PermissionKey,
    pub name: String,
    pub path: String,
    pub method: MethodSpec,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Role entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: StringUuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub is_super_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl Default for Role {
    fn default() -> Self {
        Self {
            id: StringUuid::new_v4(),
            tenant_id: StringUuid::nil(),
            name: String::new(),
            is_super_admin: false,
            created_at: Utc::now(),
        }
    }
}

/// A user as seen by the authorization core: its tenant and role ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: StringUuid,
    pub tenant_id: TenantId,
    pub role_ids: Vec<StringUuid>,
}

/// Input for creating a permission
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePermissionInput {
    #[validate(length(min = 1, max = 100), custom(function = "validate_permission_key"))]
    pub key: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 200), custom(function = "validate_route_path"))]
    pub path: String,
    pub method: MethodSpec,
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

/// Input for editing the route a permission resolves from. Policy is untouched.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdatePermissionRouteInput {
    #[validate(length(min = 1, max = 200), custom(function = "validate_route_path"))]
    pub path: String,
    pub method: MethodSpec,
}

/// Input for creating a role
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRoleInput {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[serde(default)]
    pub is_super_admin: bool,
}

/// Input for assigning roles to a user
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AssignRolesInput {
    pub user_id: StringUuid,
    #[validate(length(max = 100))]
    pub role_ids: Vec<StringUuid>,
}

fn validate_permission_key(key: &str) -> Result<(), validator::ValidationError> {
    if PERMISSION_KEY_REGEX.is_match(key) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_permission_key"))
    }
}

fn validate_route_path(path: &str) -> Result<(), validator::ValidationError> {
    // Empty segments would leave a trailing `/` after normalization, which
    // never matches a sub-path
    let well_formed = path.starts_with('/')
        && !path.contains("//")
        && !path.contains(|c: char| c.is_whitespace() || c == '?' || c == '#');
    if well_formed {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_route_path"))
    }
}

lazy_static::lazy_static! {
    pub static ref PERMISSION_KEY_REGEX: regex::Regex =
        regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:\-]*$").unwrap();
}
