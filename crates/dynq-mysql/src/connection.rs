//! Database connection management

use dynq_shared::DatabaseConfig;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool, Row};
use std::time::Duration;
use tracing::{info, instrument};

use crate::error::Result;

/// MySQL connection manager
pub struct MySqlConnectionManager {
    pool: Pool<MySql>,
}

impl MySqlConnectionManager {
    /// Create a new connection pool from the `database` config section
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Creating MySQL connection pool");

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .idle_timeout(Duration::from_secs(config.idle_timeout))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub fn into_pool(self) -> Pool<MySql> {
        self.pool
    }

    /// Test database connectivity
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    /// Get database version
    pub async fn get_version(&self) -> Result<String> {
        let row = sqlx::query("SELECT VERSION() as version")
            .fetch_one(&self.pool)
            .await?;
        let version: String = row.try_get("version")?;
        Ok(version)
    }
}
