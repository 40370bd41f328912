use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RepoConfig {
    /// Local scratch space for tree extraction and delta generation
    pub repo_temp_path: PathBuf,
    pub ostree_bin: String,
    /// Directory the local uploader publishes into
    pub storage_dir: PathBuf,
    /// Public URL under which `storage_dir` is served
    pub storage_url: String,
}

impl RepoConfig {
    pub fn from_env() -> Self {
        Self {
            repo_temp_path: PathBuf::from(
                env::var("EDGEBUILD_REPO_TEMP_PATH").unwrap_or_else(|_| "/tmp/repos".to_string()),
            ),
            ostree_bin: env::var("EDGEBUILD_OSTREE_BIN")
                .unwrap_or_else(|_| "/usr/bin/ostree".to_string()),
            storage_dir: PathBuf::from(
                env::var("EDGEBUILD_STORAGE_DIR")
                    .unwrap_or_else(|_| "/var/lib/edgebuild/storage".to_string()),
            ),
            storage_url: env::var("EDGEBUILD_STORAGE_URL")
                .unwrap_or_else(|_| "http://localhost:8000/storage".to_string()),
        }
    }
}
