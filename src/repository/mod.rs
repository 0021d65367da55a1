//! Data access layer (Repository pattern)

pub mod memory;
pub mod permission;
pub mod policy;
pub mod role;

pub use memory::MemoryStore;
pub use permission::{PermissionRepository, PermissionRepositoryImpl};
pub use policy::{PolicyStore, PolicyStoreImpl};
pub use role::{RoleRepository, RoleRepositoryImpl};

use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;

use crate::config::DatabaseConfig;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    pool: MySqlPool,
}

impl DbPool {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    pub fn inner(&self) -> &MySqlPool {
        &self.pool
    }
}
