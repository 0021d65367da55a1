//! Configuration management for Authgate Core

use crate::policy::PathMatchMode;
use anyhow::{bail, Context, Result};
use std::env;

/// Default header a system operator uses to act on behalf of a tenant
pub const DEFAULT_TENANT_OVERRIDE_HEADER: &str = "x-tenant-id";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Which backing store holds roles, permissions and policy
    pub store_backend: StoreBackend,
    /// Database configuration (required for the MySQL backend)
    pub database: DatabaseConfig,
    /// JWT configuration
    pub jwt: JwtConfig,
    /// Authorization behaviour
    pub authz: AuthzConfig,
    /// Logging and metrics
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    MySql,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(StoreBackend::MySql),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("unknown store backend: {}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    /// Expected `iss`; issuer is not checked when unset so legacy
    /// credentials without one still verify.
    pub issuer: Option<String>,
    pub token_ttl_secs: i64,
    pub private_key_pem: Option<String>,
    pub public_key_pem: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthzConfig {
    /// Prefix semantics used by the permission resolver
    pub path_match_mode: PathMatchMode,
    /// Lowercase header name carrying a system operator's target tenant
    pub tenant_override_header: String,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            path_match_mode: PathMatchMode::Segment,
            tenant_override_header: DEFAULT_TENANT_OVERRIDE_HEADER.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "json" or "pretty"
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "pretty".to_string(),
            metrics_enabled: false,
        }
    }
}

impl JwtConfig {
    /// Signing settings alone; token issuance needs nothing else.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // PEM values arrive with escaped newlines when passed through env files
        let pem = |name: &str| lookup(name).map(|value| value.replace("\\n", "\n"));
        Ok(Self {
            secret: lookup("JWT_SECRET").context("JWT_SECRET is required")?,
            issuer: lookup("JWT_ISSUER").filter(|s| !s.is_empty()),
            token_ttl_secs: lookup("JWT_TTL_SECS")
                .and_then(|ttl| ttl.parse().ok())
                .unwrap_or(86400),
            private_key_pem: pem("JWT_PRIVATE_KEY_PEM"),
            public_key_pem: pem("JWT_PUBLIC_KEY_PEM"),
        })
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let store_backend: StoreBackend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "mysql".to_string())
            .parse()?;

        let database_url = match (store_backend, env::var("DATABASE_URL")) {
            (_, Ok(url)) => url,
            (StoreBackend::MySql, Err(_)) => {
                bail!("DATABASE_URL is required for the mysql store backend")
            }
            (StoreBackend::Memory, Err(_)) => String::new(),
        };

        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            store_backend,
            database: DatabaseConfig {
                url: database_url,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
            },
            jwt: JwtConfig::from_env()?,
            authz: AuthzConfig {
                path_match_mode: env::var("PATH_MATCH_MODE")
                    .unwrap_or_else(|_| "segment".to_string())
                    .parse()
                    .context("Invalid PATH_MATCH_MODE")?,
                tenant_override_header: env::var("TENANT_OVERRIDE_HEADER")
                    .map(|h| h.to_ascii_lowercase())
                    .unwrap_or_else(|_| DEFAULT_TENANT_OVERRIDE_HEADER.to_string()),
            },
            telemetry: TelemetryConfig {
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
                metrics_enabled: env::var("METRICS_ENABLED")
                    .map(|s| s.to_lowercase() == "true")
                    .unwrap_or(false),
            },
        })
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            http_host: "127.0.0.1".to_string(),
            http_port: 8080,
            store_backend: StoreBackend::Memory,
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 10,
                min_connections: 2,
            },
            jwt: JwtConfig {
                secret: "test-secret".to_string(),
                issuer: None,
                token_ttl_secs: 3600,
                private_key_pem: None,
                public_key_pem: None,
            },
            authz: AuthzConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    #[test]
    fn test_config_addresses() {
        let config = test_config();
        assert_eq!(config.http_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_config_http_addr_ipv6() {
        let mut config = test_config();
        config.http_host = "::1".to_string();
        config.http_port = 3000;

        assert_eq!(config.http_addr(), "::1:3000");
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("mysql".parse::<StoreBackend>().unwrap(), StoreBackend::MySql);
        assert_eq!(" Memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("postgres".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_authz_config_default() {
        let authz = AuthzConfig::default();
        assert_eq!(authz.path_match_mode, PathMatchMode::Segment);
        assert_eq!(authz.tenant_override_header, "x-tenant-id");
    }

    #[test]
    fn test_jwt_config_needs_only_jwt_settings() {
        let vars = std::collections::HashMap::from([
            ("JWT_SECRET", "s3cret"),
            ("JWT_ISSUER", ""),
            ("JWT_PRIVATE_KEY_PEM", "-----BEGIN-----\\nabc\\n-----END-----"),
        ]);
        let jwt = JwtConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(jwt.secret, "s3cret");
        assert_eq!(jwt.issuer, None);
        assert_eq!(jwt.token_ttl_secs, 86400);
        assert_eq!(
            jwt.private_key_pem.as_deref(),
            Some("-----BEGIN-----\nabc\n-----END-----")
        );
        assert!(jwt.public_key_pem.is_none());
    }

    #[test]
    fn test_jwt_config_requires_secret() {
        assert!(JwtConfig::from_lookup(|_| None).is_err());
    }

    #[test]
    fn test_telemetry_config_default() {
        let telemetry = TelemetryConfig::default();
        assert_eq!(telemetry.log_format, "pretty");
        assert!(!telemetry.metrics_enabled);
    }
}
