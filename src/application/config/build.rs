use std::env;
use std::path::PathBuf;

use super::{env_flag, env_parse};

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub poll_interval_secs: u64,
    pub workers: usize,
    pub queue_capacity: usize,
    /// Script that injects a kickstart file into an installer ISO
    pub iso_script: PathBuf,
    pub kickstart_template: Option<PathBuf>,
    pub stale_recovery: bool,
    pub stale_after_secs: u64,
}

impl BuildConfig {
    pub fn from_env() -> Self {
        Self {
            poll_interval_secs: env_parse("EDGEBUILD_POLL_INTERVAL_SECS", 60),
            workers: env_parse("EDGEBUILD_WORKERS", 4).max(1),
            queue_capacity: env_parse("EDGEBUILD_QUEUE_CAPACITY", 64).max(1),
            iso_script: PathBuf::from(
                env::var("EDGEBUILD_ISO_SCRIPT")
                    .unwrap_or_else(|_| "/usr/local/bin/fleetkick.sh".to_string()),
            ),
            kickstart_template: env::var("EDGEBUILD_KICKSTART_TEMPLATE")
                .ok()
                .map(PathBuf::from),
            stale_recovery: env_flag("EDGEBUILD_STALE_RECOVERY", false),
            // 12 hours
            stale_after_secs: env_parse("EDGEBUILD_STALE_AFTER_SECS", 12 * 60 * 60),
        }
    }
}
