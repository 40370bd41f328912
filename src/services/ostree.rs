//! Thin wrapper producing the `ostree` invocations the repo pipelines need

use std::path::Path;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::services::command::{run_checked, CommandRunner, CommandSpec};

#[derive(Clone)]
pub struct OstreeCli {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl OstreeCli {
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// `ostree rev-parse --repo <path> <ref>`, returning the revision hash
    pub async fn rev_parse(&self, repo: &Path, reference: &str) -> Result<String> {
        let spec = CommandSpec::new(&self.binary)
            .arg("rev-parse")
            .arg("--repo")
            .path_arg(repo)
            .arg(reference);

        let output = run_checked(self.runner.as_ref(), &spec).await?;
        let revision = output.stdout.trim().to_string();
        if revision.is_empty() {
            return Err(AppError::Internal(format!(
                "ostree rev-parse returned no revision for {} in {}",
                reference,
                repo.display()
            )));
        }
        Ok(revision)
    }

    /// `ostree pull-local --repo <dst> <src> <revision>`
    pub async fn pull_local(&self, dest: &Path, src: &Path, revision: &str) -> Result<()> {
        let spec = CommandSpec::new(&self.binary)
            .arg("pull-local")
            .arg("--repo")
            .path_arg(dest)
            .path_arg(src)
            .arg(revision);

        run_checked(self.runner.as_ref(), &spec).await?;
        Ok(())
    }

    /// `ostree static-delta generate --repo <repo> --from <from> --to <to>`
    pub async fn static_delta_generate(&self, repo: &Path, from: &str, to: &str) -> Result<()> {
        let spec = CommandSpec::new(&self.binary)
            .args(["static-delta", "generate", "--repo"])
            .path_arg(repo)
            .args(["--from", from, "--to", to]);

        run_checked(self.runner.as_ref(), &spec).await?;
        Ok(())
    }

    /// `ostree commit --repo <repo> <ref> --add-metadata-string version=<version>`
    pub async fn commit_version(&self, repo: &Path, reference: &str, version: &str) -> Result<()> {
        let spec = CommandSpec::new(&self.binary)
            .arg("commit")
            .arg("--repo")
            .path_arg(repo)
            .arg(reference)
            .arg("--add-metadata-string")
            .arg(format!("version={}", version));

        run_checked(self.runner.as_ref(), &spec).await?;
        Ok(())
    }
}
