//! Bearer credential extraction
//!
//! Provides the `AuthContext` extractor: it reads the credential, classifies
//! it and exposes the resulting [`IdentityContext`] to handlers.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use std::borrow::Cow;

use crate::domain::{IdentityContext, TenantId, TokenKind};
use crate::error::AppError;
use crate::state::HasAuthz;

/// Dedicated header for deployments where `Authorization` belongs to the
/// protected application
pub const AUTHGATE_TOKEN_HEADER: &str = "x-authgate-token";

/// Per-kind headers accepted from older clients
const LEGACY_TOKEN_HEADERS: [&str; 2] = ["x-system-token", "x-app-token"];

/// Classified caller identity
#[derive(Debug, Clone)]
pub struct AuthContext(pub IdentityContext);

impl AuthContext {
    pub fn context(&self) -> &IdentityContext {
        &self.0
    }

    /// Tenant for management calls: app tokens act on their own tenant, system
    /// tokens on the tenant they selected. User tokens never manage policy.
    pub fn managed_tenant(&self) -> Result<TenantId, AppError> {
        match self.0.kind {
            TokenKind::User => Err(AppError::Forbidden(
                "User tokens cannot manage authorization data".to_string(),
            )),
            TokenKind::App | TokenKind::System => crate::service::authz::require_tenant(&self.0),
        }
    }
}

/// First credential found, in precedence order
fn extract_credential(headers: &HeaderMap) -> Result<&str, AppError> {
    let candidates = ["authorization", AUTHGATE_TOKEN_HEADER]
        .into_iter()
        .chain(LEGACY_TOKEN_HEADERS);

    for name in candidates {
        if let Some(value) = headers.get(name) {
            let value = value.to_str().map_err(|_| {
                AppError::InvalidCredential(format!("{} is not valid ASCII", name))
            })?;
            if !value.trim().is_empty() {
                return Ok(value);
            }
        }
    }

    Err(AppError::InvalidCredential("missing credential".to_string()))
}

/// Raw override value. Undecodable bytes are kept lossily so only the
/// classifier decides whether the value matters for this token kind.
fn extract_override<'a>(headers: &'a HeaderMap, name: &str) -> Option<Cow<'a, str>> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()))
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: HasAuthz,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let credential = extract_credential(&parts.headers)?;
        let tenant_override = extract_override(
            &parts.headers,
            &state.config().authz.tenant_override_header,
        );

        let ctx = state
            .identity_resolver()
            .classify(credential, tenant_override.as_deref())?;

        if ctx.impersonating {
            tracing::warn!(
                operator = ?ctx.identity,
                tenant_id = ?ctx.tenant_id,
                method = %parts.method,
                path = %parts.uri.path(),
                "System operator acting on behalf of tenant"
            );
        }

        Ok(AuthContext(ctx))
    }
}
