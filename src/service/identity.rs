//! Bearer credential classification

use crate::domain::{IdentityContext, StringUuid, TenantId, TokenKind};
use crate::error::{AppError, Result};
use crate::jwt::{AuthgateClaims, JwtManager};
use crate::telemetry::metrics;
use std::sync::Arc;

/// Turns a raw bearer credential into an [`IdentityContext`].
#[derive(Clone)]
pub struct IdentityTokenResolver {
    jwt: Arc<JwtManager>,
}

impl IdentityTokenResolver {
    pub fn new(jwt: Arc<JwtManager>) -> Self {
        Self { jwt }
    }

    /// Verify and classify `raw`. `tenant_override` is the raw value of the
    /// tenant override header; only system tokens honour it.
    pub fn classify(&self, raw: &str, tenant_override: Option<&str>) -> Result<IdentityContext> {
        let result = self.classify_inner(raw, tenant_override);
        metrics::record_classification(result.as_ref().ok().map(|ctx| ctx.kind));
        result
    }

    fn classify_inner(&self, raw: &str, tenant_override: Option<&str>) -> Result<IdentityContext> {
        let token = strip_bearer(raw);
        if token.is_empty() {
            return Err(AppError::InvalidCredential("empty credential".to_string()));
        }
        let claims = self
            .jwt
            .verify(token)
            .map_err(|e| AppError::InvalidCredential(e.to_string()))?;
        context_from_claims(claims, tenant_override)
    }
}

fn strip_bearer(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => raw[7..].trim_start(),
        _ => raw,
    }
}

/// Kind from the discriminator, or inferred from claim shape for legacy credentials.
pub fn token_kind(claims: &AuthgateClaims) -> Result<TokenKind> {
    match claims.token_type.as_deref() {
        Some("system") => Ok(TokenKind::System),
        Some("app") => Ok(TokenKind::App),
        Some("user") => Ok(TokenKind::User),
        Some(other) => Err(AppError::InvalidCredential(format!(
            "unknown token type: {}",
            other
        ))),
        None if claims.is_admin.is_some() => Ok(TokenKind::System),
        None if claims.tenant_code.is_some()
            && claims.sub.is_none()
            && claims.username.is_none() =>
        {
            Ok(TokenKind::App)
        }
        None => Ok(TokenKind::User),
    }
}

fn claim_tenant(claims: &AuthgateClaims, kind: TokenKind) -> Result<TenantId> {
    let raw = claims.tenant_id.as_deref().ok_or_else(|| {
        AppError::InvalidCredential(format!("{} token without tenant", kind))
    })?;
    raw.parse()
        .map_err(|_| AppError::InvalidCredential(format!("{} token with malformed tenant", kind)))
}

fn parse_override(raw: Option<&str>) -> Result<Option<TenantId>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse::<StringUuid>()
            .map(Some)
            .map_err(|_| AppError::InvalidTenantOverride(format!("not a tenant id: {:?}", value))),
    }
}

/// Build the request context for already-verified claims.
pub fn context_from_claims(
    claims: AuthgateClaims,
    tenant_override: Option<&str>,
) -> Result<IdentityContext> {
    let kind = token_kind(&claims)?;
    match kind {
        TokenKind::System => {
            let tenant_id = parse_override(tenant_override)?;
            Ok(IdentityContext {
                kind,
                tenant_id,
                identity: claims.username.or(claims.sub),
                tenant_code: None,
                impersonating: tenant_id.is_some(),
            })
        }
        TokenKind::App => Ok(IdentityContext {
            kind,
            tenant_id: Some(claim_tenant(&claims, kind)?),
            identity: None,
            tenant_code: claims.tenant_code,
            impersonating: false,
        }),
        TokenKind::User => {
            let tenant_id = claim_tenant(&claims, kind)?;
            let identity = claims
                .sub
                .or(claims.username)
                .ok_or_else(|| {
                    AppError::InvalidCredential("user token without identity".to_string())
                })?;
            Ok(IdentityContext {
                kind,
                tenant_id: Some(tenant_id),
                identity: Some(identity),
                tenant_code: None,
                impersonating: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;

    fn resolver() -> (IdentityTokenResolver, Arc<JwtManager>) {
        let jwt = Arc::new(
            JwtManager::new(JwtConfig {
                secret: "identity-resolver-test-secret".to_string(),
                issuer: None,
                token_ttl_secs: 300,
                private_key_pem: None,
                public_key_pem: None,
            })
            .unwrap(),
        );
        (IdentityTokenResolver::new(jwt.clone()), jwt)
    }

    fn legacy(claims: AuthgateClaims) -> AuthgateClaims {
        AuthgateClaims {
            iat: 0,
            exp: i64::MAX,
            ..claims
        }
    }

    #[test]
    fn test_classify_user_token() {
        let (resolver, jwt) = resolver();
        let user = StringUuid::new_v4();
        let tenant = StringUuid::new_v4();
        let token = jwt.create_user_token(user, tenant, Some("alice")).unwrap();

        let ctx = resolver
            .classify(&format!("Bearer {}", token), None)
            .unwrap();
        assert_eq!(ctx.kind, TokenKind::User);
        assert_eq!(ctx.tenant_id, Some(tenant));
        assert_eq!(ctx.user_id(), Some(user));
        assert!(!ctx.impersonating);
    }

    #[test]
    fn test_classify_app_token_ignores_override() {
        let (resolver, jwt) = resolver();
        let tenant = StringUuid::new_v4();
        let token = jwt.create_app_token(tenant, "crm").unwrap();

        let other = StringUuid::new_v4().to_string();
        let ctx = resolver.classify(&token, Some(&other)).unwrap();
        assert_eq!(ctx.kind, TokenKind::App);
        assert_eq!(ctx.tenant_id, Some(tenant));
        assert_eq!(ctx.tenant_code.as_deref(), Some("crm"));
        assert!(!ctx.impersonating);
    }

    #[test]
    fn test_classify_system_token_with_override() {
        let (resolver, jwt) = resolver();
        let token = jwt.create_system_token("operator").unwrap();
        let target = StringUuid::new_v4();

        let ctx = resolver
            .classify(&token, Some(&target.to_string()))
            .unwrap();
        assert_eq!(ctx.kind, TokenKind::System);
        assert_eq!(ctx.tenant_id, Some(target));
        assert_eq!(ctx.identity.as_deref(), Some("operator"));
        assert!(ctx.impersonating);
    }

    #[test]
    fn test_classify_system_token_without_override() {
        let (resolver, jwt) = resolver();
        let token = jwt.create_system_token("operator").unwrap();

        let ctx = resolver.classify(&token, Some("  ")).unwrap();
        assert!(ctx.tenant_id.is_none());
        assert!(!ctx.impersonating);
    }

    #[test]
    fn test_malformed_override_rejected() {
        let (resolver, jwt) = resolver();
        let token = jwt.create_system_token("operator").unwrap();

        let result = resolver.classify(&token, Some("tenant-42"));
        assert!(matches!(result, Err(AppError::InvalidTenantOverride(_))));
    }

    #[test]
    fn test_forged_token_rejected() {
        let (resolver, _) = resolver();
        let result = resolver.classify("Bearer not.a.jwt", None);
        assert!(matches!(result, Err(AppError::InvalidCredential(_))));
        assert!(matches!(
            resolver.classify("Bearer ", None),
            Err(AppError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_legacy_inference() {
        let system = legacy(AuthgateClaims {
            username: Some("root".to_string()),
            is_admin: Some(true),
            ..Default::default()
        });
        assert_eq!(token_kind(&system).unwrap(), TokenKind::System);

        let app = legacy(AuthgateClaims {
            tenant_code: Some("crm".to_string()),
            ..Default::default()
        });
        assert_eq!(token_kind(&app).unwrap(), TokenKind::App);

        // tenant_code alongside an identity is a user token
        let user = legacy(AuthgateClaims {
            tenant_code: Some("crm".to_string()),
            username: Some("bob".to_string()),
            ..Default::default()
        });
        assert_eq!(token_kind(&user).unwrap(), TokenKind::User);
    }

    #[test]
    fn test_unknown_discriminator_rejected() {
        let claims = legacy(AuthgateClaims {
            token_type: Some("refresh".to_string()),
            ..Default::default()
        });
        assert!(matches!(
            token_kind(&claims),
            Err(AppError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_incomplete_shapes_rejected() {
        let user_without_tenant = legacy(AuthgateClaims {
            token_type: Some("user".to_string()),
            sub: Some(StringUuid::new_v4().to_string()),
            ..Default::default()
        });
        assert!(matches!(
            context_from_claims(user_without_tenant, None),
            Err(AppError::InvalidCredential(_))
        ));

        let user_without_identity = legacy(AuthgateClaims {
            token_type: Some("user".to_string()),
            tenant_id: Some(StringUuid::new_v4().to_string()),
            ..Default::default()
        });
        assert!(matches!(
            context_from_claims(user_without_identity, None),
            Err(AppError::InvalidCredential(_))
        ));

        let app_without_tenant = legacy(AuthgateClaims {
            token_type: Some("app".to_string()),
            tenant_code: Some("crm".to_string()),
            ..Default::default()
        });
        assert!(matches!(
            context_from_claims(app_without_tenant, None),
            Err(AppError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer("Bearer abc"), "abc");
        assert_eq!(strip_bearer("bearer abc"), "abc");
        assert_eq!(strip_bearer("abc"), "abc");
        assert_eq!(strip_bearer("  Bearer   abc "), "abc");
    }
}
