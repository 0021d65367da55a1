//! JWT token handling

use crate::config::JwtConfig;
use crate::domain::{StringUuid, TenantId, TokenKind};
use crate::error::{AppError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by every Authgate credential.
///
/// One shape covers all three kinds; `token_type` tells them apart. Legacy
/// credentials predate the discriminator and are classified from which
/// optional claims are present, so absent fields stay absent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthgateClaims {
    /// Token type discriminator: "system", "app" or "user"
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// User id (user tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Operator or user login name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Application code (app tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_code: Option<String>,
    /// Present only on system tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// JWT token manager
#[derive(Clone)]
pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
}

impl JwtManager {
    /// HS256 over the shared secret, or RS256 when a private key is configured.
    pub fn new(config: JwtConfig) -> Result<Self> {
        let algorithm = if config.private_key_pem.is_some() {
            Algorithm::RS256
        } else {
            Algorithm::HS256
        };
        let encoding_key = match config.private_key_pem.as_ref() {
            Some(private_key) => EncodingKey::from_rsa_pem(private_key.as_bytes())?,
            None => EncodingKey::from_secret(config.secret.as_bytes()),
        };
        let decoding_key = match (&config.public_key_pem, &config.private_key_pem) {
            (Some(public_key), _) => DecodingKey::from_rsa_pem(public_key.as_bytes())?,
            (None, Some(_)) => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "JWT_PUBLIC_KEY_PEM is required when JWT_PRIVATE_KEY_PEM is set"
                )))
            }
            (None, None) => DecodingKey::from_secret(config.secret.as_bytes()),
        };
        Ok(Self {
            config,
            encoding_key,
            decoding_key,
            algorithm,
        })
    }

    /// Strict leeway (5 seconds) instead of the default 60 seconds.
    fn strict_validation(&self) -> Validation {
        let mut v = Validation::new(self.algorithm);
        v.leeway = 5;
        v.validate_aud = false;
        if let Some(issuer) = &self.config.issuer {
            v.set_issuer(&[issuer]);
        }
        v
    }

    fn base_claims(&self, kind: TokenKind) -> AuthgateClaims {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.config.token_ttl_secs);
        AuthgateClaims {
            token_type: Some(kind.as_str().to_string()),
            iss: self.config.issuer.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            ..Default::default()
        }
    }

    /// Sign an arbitrary claim set
    pub fn sign(&self, claims: &AuthgateClaims) -> Result<String> {
        let header = Header::new(self.algorithm);
        encode(&header, claims, &self.encoding_key).map_err(|e| AppError::Internal(e.into()))
    }

    /// Create a platform operator token
    pub fn create_system_token(&self, username: &str) -> Result<String> {
        let claims = AuthgateClaims {
            username: Some(username.to_string()),
            is_admin: Some(true),
            ..self.base_claims(TokenKind::System)
        };
        self.sign(&claims)
    }

    /// Create a tenant application token
    pub fn create_app_token(&self, tenant_id: TenantId, tenant_code: &str) -> Result<String> {
        let claims = AuthgateClaims {
            tenant_id: Some(tenant_id.to_string()),
            tenant_code: Some(tenant_code.to_string()),
            ..self.base_claims(TokenKind::App)
        };
        self.sign(&claims)
    }

    /// Create an end-user token
    pub fn create_user_token(
        &self,
        user_id: StringUuid,
        tenant_id: TenantId,
        username: Option<&str>,
    ) -> Result<String> {
        let claims = AuthgateClaims {
            sub: Some(user_id.to_string()),
            username: username.map(String::from),
            tenant_id: Some(tenant_id.to_string()),
            ..self.base_claims(TokenKind::User)
        };
        self.sign(&claims)
    }

    /// Verify signature, expiry and (when configured) issuer
    pub fn verify(&self, token: &str) -> Result<AuthgateClaims> {
        let token_data =
            decode::<AuthgateClaims>(token, &self.decoding_key, &self.strict_validation())?;
        Ok(token_data.claims)
    }

    pub fn token_ttl(&self) -> i64 {
        self.config.token_ttl_secs
    }

    pub fn uses_rsa(&self) -> bool {
        self.algorithm == Algorithm::RS256
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-key-for-testing-purposes-only".to_string(),
            issuer: Some("https://authgate.test".to_string()),
            token_ttl_secs: 3600,
            private_key_pem: None,
            public_key_pem: None,
        }
    }

    #[test]
    fn test_create_and_verify_system_token() {
        let manager = JwtManager::new(test_config()).unwrap();

        let token = manager.create_system_token("root").unwrap();
        let claims = manager.verify(&token).unwrap();

        assert_eq!(claims.token_type.as_deref(), Some("system"));
        assert_eq!(claims.username.as_deref(), Some("root"));
        assert_eq!(claims.is_admin, Some(true));
        assert!(claims.tenant_id.is_none());
    }

    #[test]
    fn test_create_and_verify_app_token() {
        let manager = JwtManager::new(test_config()).unwrap();
        let tenant_id = StringUuid::new_v4();

        let token = manager.create_app_token(tenant_id, "billing").unwrap();
        let claims = manager.verify(&token).unwrap();

        assert_eq!(claims.token_type.as_deref(), Some("app"));
        assert_eq!(claims.tenant_id, Some(tenant_id.to_string()));
        assert_eq!(claims.tenant_code.as_deref(), Some("billing"));
        assert!(claims.sub.is_none());
    }

    #[test]
    fn test_create_and_verify_user_token() {
        let manager = JwtManager::new(test_config()).unwrap();
        let user_id = StringUuid::new_v4();
        let tenant_id = StringUuid::new_v4();

        let token = manager
            .create_user_token(user_id, tenant_id, Some("alice"))
            .unwrap();
        let claims = manager.verify(&token).unwrap();

        assert_eq!(claims.token_type.as_deref(), Some("user"));
        assert_eq!(claims.sub, Some(user_id.to_string()));
        assert_eq!(claims.tenant_id, Some(tenant_id.to_string()));
        assert_eq!(claims.username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_invalid_token() {
        let manager = JwtManager::new(test_config()).unwrap();
        assert!(manager.verify("invalid-token").is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let manager = JwtManager::new(test_config()).unwrap();
        let other = JwtManager::new(JwtConfig {
            secret: "a-completely-different-secret-value".to_string(),
            ..test_config()
        })
        .unwrap();

        let token = other.create_system_token("root").unwrap();
        assert!(manager.verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = JwtManager::new(test_config()).unwrap();
        let now = Utc::now().timestamp();
        let claims = AuthgateClaims {
            token_type: Some("system".to_string()),
            username: Some("root".to_string()),
            iss: Some("https://authgate.test".to_string()),
            iat: now - 7200,
            exp: now - 3600,
            ..Default::default()
        };

        let token = manager.sign(&claims).unwrap();
        assert!(manager.verify(&token).is_err());
    }

    #[test]
    fn test_issuer_mismatch_rejected() {
        let manager = JwtManager::new(test_config()).unwrap();
        let foreign = JwtManager::new(JwtConfig {
            issuer: Some("https://elsewhere.test".to_string()),
            ..test_config()
        })
        .unwrap();

        let token = foreign.create_system_token("root").unwrap();
        assert!(manager.verify(&token).is_err());
    }

    #[test]
    fn test_issuer_not_checked_when_unconfigured() {
        let lenient = JwtManager::new(JwtConfig {
            issuer: None,
            ..test_config()
        })
        .unwrap();
        let issuing = JwtManager::new(test_config()).unwrap();

        let token = issuing.create_system_token("root").unwrap();
        assert!(lenient.verify(&token).is_ok());
    }

    #[test]
    fn test_legacy_type_claim_alias() {
        let json = r#"{"type":"app","tenant_code":"crm","iat":1,"exp":2}"#;
        let claims: AuthgateClaims = serde_json::from_str(json).unwrap();
        assert_eq!(claims.token_type.as_deref(), Some("app"));
    }

    #[test]
    fn test_absent_claims_not_serialized() {
        let claims = AuthgateClaims {
            sub: Some("user-123".to_string()),
            iat: 1000000,
            exp: 1003600,
            ..Default::default()
        };

        let json = serde_json::to_string(&claims).unwrap();
        assert!(json.contains("\"sub\":\"user-123\""));
        assert!(!json.contains("is_admin"));
        assert!(!json.contains("token_type"));
    }

    #[test]
    fn test_token_ttl_and_algorithm() {
        let manager = JwtManager::new(test_config()).unwrap();
        assert_eq!(manager.token_ttl(), 3600);
        assert!(!manager.uses_rsa());
    }

    const RSA_PRIVATE_KEY: &str = include_str!("testdata/rsa_private.pem");
    const RSA_PUBLIC_KEY: &str = include_str!("testdata/rsa_public.pem");

    #[test]
    fn test_private_key_without_public_key_rejected() {
        let result = JwtManager::new(JwtConfig {
            private_key_pem: Some(RSA_PRIVATE_KEY.to_string()),
            ..test_config()
        });
        match result {
            Err(AppError::Internal(e)) => assert!(e.to_string().contains("JWT_PUBLIC_KEY_PEM")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("a private key alone must be rejected"),
        }
    }

    #[test]
    fn test_rsa_key_pair_signs_and_verifies() {
        let manager = JwtManager::new(JwtConfig {
            private_key_pem: Some(RSA_PRIVATE_KEY.to_string()),
            public_key_pem: Some(RSA_PUBLIC_KEY.to_string()),
            ..test_config()
        })
        .unwrap();
        assert!(manager.uses_rsa());

        let token = manager.create_system_token("root").unwrap();
        let claims = manager.verify(&token).unwrap();
        assert_eq!(claims.username.as_deref(), Some("root"));

        // An HS256 token signed with the shared secret is not accepted
        let hmac = JwtManager::new(test_config()).unwrap();
        assert!(manager
            .verify(&hmac.create_system_token("root").unwrap())
            .is_err());
    }
}
