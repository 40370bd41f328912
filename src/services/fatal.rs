//! Escalation for failures that could not be recorded

/// Called when a build failure could not be persisted, leaving an entity
/// stuck in a non-terminal status
pub trait FatalHandler: Send + Sync {
    fn fatal(&self, message: &str);
}

/// Logs and terminates the process
#[derive(Debug, Default)]
pub struct ExitOnFatal;

impl FatalHandler for ExitOnFatal {
    fn fatal(&self, message: &str) {
        tracing::error!(message = %message, "Unrecoverable error, exiting");
        std::process::exit(1);
    }
}
