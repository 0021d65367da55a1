//! Request identity derived from a bearer credential

use super::common::{StringUuid, TenantId};
use serde::{Deserialize, Serialize};

/// The three bearer credential kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Platform operator; no intrinsic tenant
    System,
    /// Tenant application acting as itself
    App,
    /// End user of a tenant
    User,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::System => "system",
            TokenKind::App => "app",
            TokenKind::User => "user",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant and identity context of a classified credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityContext {
    pub kind: TokenKind,
    /// Tenant the request acts within. `None` for a system token that did
    /// not ask to act on behalf of a tenant.
    pub tenant_id: Option<TenantId>,
    /// Operator username (System) or user id (User)
    pub identity: Option<String>,
    /// Application code (App)
    pub tenant_code: Option<String>,
    /// True when a system operator selected the tenant via the override header
    #[serde(default)]
    pub impersonating: bool,
}

impl IdentityContext {
    /// User id for User tokens
    pub fn user_id(&self) -> Option<StringUuid> {
        match self.kind {
            TokenKind::User => self.identity.as_deref().and_then(|s| s.parse().ok()),
            _ => None,
        }
    }

    pub fn is_system(&self) -> bool {
        self.kind == TokenKind::System
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_kind_serde() {
        assert_eq!(serde_json::to_string(&TokenKind::App).unwrap(), "\"app\"");
        let kind: TokenKind = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(kind, TokenKind::System);
    }

    #[test]
    fn test_user_id_only_for_user_tokens() {
        let id = StringUuid::new_v4();
        let user = IdentityContext {
            kind: TokenKind::User,
            tenant_id: Some(StringUuid::new_v4()),
            identity: Some(id.to_string()),
            tenant_code: None,
            impersonating: false,
        };
        assert_eq!(user.user_id(), Some(id));

        let system = IdentityContext {
            kind: TokenKind::System,
            identity: Some(id.to_string()),
            ..user
        };
        assert_eq!(system.user_id(), None);
        assert!(system.is_system());
    }
}
