//! Backend selection and fallback.
//!
//! [`ToolAdapter::execute`] walks [`Backend::RANKED`] for a given
//! [`Operation`]:
//!
//! - a backend with no invocation for the operation is skipped (unsupported);
//! - a backend whose tool is not installed is skipped (unavailable);
//! - a backend that runs and fails is recorded, and the next one is tried;
//! - the first successful run wins.
//!
//! If every backend was skipped the caller gets
//! [`IosError::UnsupportedOperation`]. If at least one ran and failed, the
//! caller gets the classified error of the last failure
//! ([`IosError::Connection`] or [`IosError::Authentication`]).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::{Backend, Operation};
use crate::config::IosctlConfig;
use crate::error::{IosError, Result};
use crate::runner::{CommandRunner, RunError, SystemRunner};

/// Substrings in tool output that indicate a pairing or trust problem.
/// A bare "Could not connect to lockdownd" is not one: unplugged devices and
/// timeouts print it too.
const AUTH_MARKERS: [&str; 6] = [
    "not paired",
    "PairingDialogResponsePending",
    "InvalidHostID",
    "Invalid HostID",
    "PasswordProtected",
    "Trust",
];

/// Output marking the Python interpreter as present but the module missing.
const MISSING_MODULE_MARKER: &str = "No module named";

/// Raw output of the backend that completed an operation.
#[derive(Debug, Clone)]
pub struct BackendOutput {
    pub backend: Backend,
    pub stdout: String,
    pub stderr: String,
}

/// Runs [`Operation`]s against the first backend able to complete them.
#[derive(Clone)]
pub struct ToolAdapter {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    python: String,
}

impl ToolAdapter {
    /// Adapter using real processes and the saved configuration.
    pub fn new() -> Self {
        Self::from_config(&IosctlConfig::load())
    }

    /// Adapter using real processes and the given configuration.
    pub fn from_config(config: &IosctlConfig) -> Self {
        Self {
            runner: Arc::new(SystemRunner),
            timeout: config.command_timeout(),
            python: config.python.clone(),
        }
    }

    /// Replace the process runner.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Override the per-process timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute `op` on the highest-ranked backend that can complete it.
    pub fn execute(&self, op: &Operation) -> Result<BackendOutput> {
        let mut last_failure: Option<IosError> = None;

        for backend in Backend::RANKED {
            let Some(inv) = backend.invocation(op, &self.python) else {
                debug!(op = op.name(), %backend, "backend does not support operation");
                continue;
            };

            match self.runner.run(&inv.program, &inv.args, self.timeout) {
                Ok(out) if out.success => {
                    debug!(op = op.name(), %backend, "operation completed");
                    return Ok(BackendOutput {
                        backend,
                        stdout: out.stdout,
                        stderr: out.stderr,
                    });
                }
                Ok(out) if out.stderr.contains(MISSING_MODULE_MARKER) => {
                    debug!(op = op.name(), %backend, "backend module not installed");
                }
                Ok(out) => {
                    let message = out.failure_message();
                    warn!(op = op.name(), %backend, %message, "backend failed, trying next");
                    last_failure = Some(classify(op, backend, message));
                }
                Err(RunError::NotFound(program)) => {
                    debug!(op = op.name(), %backend, %program, "backend not installed");
                }
                Err(e) => {
                    warn!(op = op.name(), %backend, error = %e, "backend failed, trying next");
                    last_failure = Some(IosError::Connection(format!(
                        "Failed to {} via {}: {}",
                        op.name(),
                        backend,
                        e
                    )));
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| {
            IosError::UnsupportedOperation(format!(
                "no installed backend supports {}",
                op.name()
            ))
        }))
    }
}

impl Default for ToolAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolAdapter")
            .field("timeout", &self.timeout)
            .field("python", &self.python)
            .finish_non_exhaustive()
    }
}

fn classify(op: &Operation, backend: Backend, message: String) -> IosError {
    let text = format!("Failed to {} via {}: {}", op.name(), backend, message);
    if AUTH_MARKERS.iter().any(|m| message.contains(m)) {
        IosError::Authentication(text)
    } else {
        IosError::Connection(text)
    }
}
