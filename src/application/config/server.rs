use std::env;

use super::env_parse;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env::var("EDGEBUILD_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("EDGEBUILD_API_PORT", 8000),
        }
    }
}
