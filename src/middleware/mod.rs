//! HTTP middleware for Authgate Core
//!
//! - `AuthContext` extractor classifying the bearer credential
//! - Request ID and metrics layer

pub mod auth;
pub mod metrics;

pub use auth::AuthContext;
pub use metrics::ObservabilityLayer;
