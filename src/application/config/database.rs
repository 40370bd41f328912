use std::env;
use std::time::Duration;

use super::env_parse;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    /// Build workers and request handlers share this pool
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("EDGEBUILD_DATABASE_URL")
                .or_else(|_| env::var("DATABASE_URL"))
                .unwrap_or_else(|_| {
                    "sqlite:///var/lib/edgebuild/edgebuild.db?mode=rwc".to_string()
                }),
            max_connections: env_parse("EDGEBUILD_DB_MAX_CONNECTIONS", 10),
            min_connections: env_parse("EDGEBUILD_DB_MIN_CONNECTIONS", 1),
            connect_timeout: Duration::from_secs(env_parse("EDGEBUILD_DB_CONNECT_TIMEOUT_SECS", 30)),
            idle_timeout: Duration::from_secs(env_parse("EDGEBUILD_DB_IDLE_TIMEOUT_SECS", 600)),
        }
    }
}
