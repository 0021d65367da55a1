//! Authgate Core - multi-tenant authorization service
//!
//! Maps `(path, method)` requests to tenant-scoped permission keys, evaluates
//! role-based policy tuples against them and classifies the bearer
//! credentials callers present.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod policy;
pub mod repository;
pub mod server;
pub mod service;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
