use std::env;

use super::env_parse;

#[derive(Debug, Clone)]
pub struct ImageBuilderConfig {
    /// Base URL of the image-builder API, e.g. `http://image-builder:8080/api/image-builder/v1`
    pub url: String,
    pub timeout_secs: u64,
    pub default_distribution: String,
    pub default_arch: String,
}

impl ImageBuilderConfig {
    pub fn from_env() -> Self {
        Self {
            url: env::var("EDGEBUILD_IMAGE_BUILDER_URL")
                .unwrap_or_else(|_| "http://localhost:8086/api/image-builder/v1".to_string()),
            timeout_secs: env_parse("EDGEBUILD_IMAGE_BUILDER_TIMEOUT_SECS", 30),
            default_distribution: env::var("EDGEBUILD_DEFAULT_DISTRIBUTION")
                .unwrap_or_else(|_| "rhel-90".to_string()),
            default_arch: env::var("EDGEBUILD_DEFAULT_ARCH")
                .unwrap_or_else(|_| "x86_64".to_string()),
        }
    }
}
