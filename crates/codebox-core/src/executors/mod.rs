//! Container runtime backends that execute one sandboxed run.
//!
//! The orchestrator only needs two operations from a runtime: run a fully
//! described container to completion (or until its deadline) and force-remove
//! a container by name. Keeping the boundary this narrow lets the orchestrator
//! be exercised against a fake runtime without a container engine present.

use crate::config::{RunnerConfig, RuntimeKind};
use crate::errors::RuntimeError;
use crate::output::{CappedBuffer, CapturedOutput};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

pub mod cli;
pub mod engine;

pub use cli::CliRuntime;
pub use engine::EngineRuntime;

/// Everything a backend needs to start one isolated container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Script passed to `sh -c`.
    pub script: String,
    /// Volume (or host path) holding the workspace.
    pub volume: String,
    /// Where `volume` is mounted inside the container.
    pub mount: String,
    /// Working directory inside the container.
    pub workdir: String,
    pub env: Vec<(String, String)>,
    pub cpus: f64,
    pub memory_mb: u64,
    pub pids_limit: u32,
    pub tmpfs_size_mb: u64,
    pub timeout: Duration,
    /// Per-stream capture budget.
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// The program ran to completion with this exit status.
    Exited(i64),
    /// The deadline elapsed before the program finished.
    TimedOut,
    /// The runtime itself failed after it was started.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub stdout: CapturedOutput,
    pub stderr: CapturedOutput,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runs the container described by `spec` under `spec.timeout`.
    ///
    /// `Err` means the runtime could not be invoked at all; every other
    /// outcome, including timeouts, is reported through [`RunOutcome`].
    async fn run(&self, spec: &ContainerSpec) -> Result<RunOutcome, RuntimeError>;

    /// Removes a container by name, killing it if still running.
    async fn force_remove(&self, name: &str) -> Result<(), RuntimeError>;

    fn name(&self) -> &'static str;
}

/// Builds the backend selected by `config.runtime`.
pub fn runtime_from_config(config: &RunnerConfig) -> Result<Arc<dyn ContainerRuntime>, RuntimeError> {
    match config.runtime {
        RuntimeKind::Cli => Ok(Arc::new(CliRuntime::new(config.docker_bin.clone()))),
        RuntimeKind::Engine => Ok(Arc::new(EngineRuntime::connect()?)),
    }
}

/// Reads `reader` to EOF, feeding everything through the capped sink.
pub(crate) async fn drain<R>(mut reader: R, sink: &mut CappedBuffer) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        sink.push(&chunk[..n]);
    }
}
