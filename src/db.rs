use anyhow::{Context, Result};
use sqlx::MySqlPool;

use crate::config::Config;

pub async fn init_db(name: &str, database_url: &str) -> Result<MySqlPool> {
    MySqlPool::connect(database_url)
        .await
        .with_context(|| format!("Failed to connect to {name} database"))
}

/// One pool per upstream database.
#[derive(Clone)]
pub struct Pools {
    pub workflow: MySqlPool,
    pub transactions: MySqlPool,
    pub profiles: MySqlPool,
}

impl Pools {
    pub async fn connect(config: &Config) -> Result<Self> {
        Ok(Self {
            workflow: init_db("workflow", &config.database_url).await?,
            transactions: init_db("transaction", &config.transaction_database_url).await?,
            profiles: init_db("profile", &config.profile_database_url).await?,
        })
    }
}

#[cfg(test)]
impl Pools {
    /// Pools that only connect on first use.
    pub fn lazy(config: &Config) -> Self {
        let pool = |url: &str| MySqlPool::connect_lazy(url).unwrap();
        Self {
            workflow: pool(&config.database_url),
            transactions: pool(&config.transaction_database_url),
            profiles: pool(&config.profile_database_url),
        }
    }
}
