//! Process command layer
//!
//! Every external program the build pipelines run (`ostree`, the ISO
//! injection script) goes through a [`CommandRunner`]. Production code uses
//! [`ProcessCommandRunner`]; tests substitute [`ScriptedCommandRunner`], which
//! replays canned output and records each invocation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;

use crate::error::{AppError, Result};

/// A fully described process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// True if any argument equals `needle` (used to identify subcommands)
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the process to completion. Only failing to start it is an error;
    /// a non-zero exit is reported through [`CommandOutput`].
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Run a command and treat a non-zero exit as an error
pub async fn run_checked(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<CommandOutput> {
    tracing::debug!(command = %spec, "Running command");

    let output = runner.run(spec).await?;
    if !output.success() {
        tracing::error!(
            command = %spec,
            code = ?output.status_code,
            stderr = %output.stderr.trim(),
            "Command failed"
        );
        return Err(AppError::CommandFailed {
            command: spec.to_string(),
            code: output.status_code,
            stderr: output.stderr.trim().to_string(),
        });
    }

    Ok(output)
}

/// Runs real OS processes.
///
/// Children are not killed when the awaiting future is dropped, so a
/// cancelled build leaves an in-progress step to finish on its own.
#[derive(Debug, Clone, Default)]
pub struct ProcessCommandRunner;

#[async_trait]
impl CommandRunner for ProcessCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args).kill_on_drop(false);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| {
            AppError::Internal(format!("Failed to run {}: {}", spec.program, e))
        })?;

        Ok(CommandOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

type Handler = dyn Fn(&CommandSpec) -> CommandOutput + Send + Sync;

/// Replays scripted output instead of spawning processes
#[derive(Clone)]
pub struct ScriptedCommandRunner {
    handler: Arc<Handler>,
    calls: Arc<Mutex<Vec<CommandSpec>>>,
}

impl ScriptedCommandRunner {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&CommandSpec) -> CommandOutput + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every command exits 0 with empty output
    pub fn succeeding() -> Self {
        Self::new(|_| CommandOutput::ok(""))
    }

    /// All invocations so far, in order
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Invocations whose arguments contain `subcommand`
    pub fn calls_with(&self, subcommand: &str) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.has_arg(subcommand))
            .cloned()
            .collect()
    }
}

impl fmt::Debug for ScriptedCommandRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedCommandRunner")
            .field("calls", &self.calls.lock().len())
            .finish()
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().push(spec.clone());
        Ok((self.handler)(spec))
    }
}
