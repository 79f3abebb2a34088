//! Execution orchestrator: one request in, one classified response out.

use crate::command::build_command;
use crate::config::RunnerConfig;
use crate::errors::RuntimeError;
use crate::executors::{runtime_from_config, ContainerRuntime, ContainerSpec, RunOutcome, RunStatus};
use crate::request::{ExecuteRequest, ExecuteResponse, TIMEOUT_ERROR, TIMEOUT_EXIT_CODE};
use crate::workspace::Workspace;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Upper bound on the best-effort removal issued after a timeout.
const FORCE_REMOVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs untrusted code in isolated containers.
///
/// Holds only read-only state, so a single `Runner` can serve any number of
/// concurrent requests.
#[derive(Clone)]
pub struct Runner {
    config: Arc<RunnerConfig>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl Runner {
    pub fn new(config: RunnerConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            config: Arc::new(config),
            runtime,
        }
    }

    /// Builds a runner with the backend selected by `config.runtime`.
    pub fn from_config(config: RunnerConfig) -> Result<Self, RuntimeError> {
        let runtime = runtime_from_config(&config)?;
        Ok(Self::new(config, runtime))
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn runtime_name(&self) -> &'static str {
        self.runtime.name()
    }

    /// Executes `request` and classifies the result.
    ///
    /// Never fails: every problem is folded into the returned response, and
    /// the workspace is removed before this returns.
    ///
    /// The run is detached onto its own task. Dropping the returned future
    /// does not cancel it; the deadline and container removal still happen.
    pub async fn execute(&self, request: &ExecuteRequest) -> ExecuteResponse {
        let started = Instant::now();
        let runner = self.clone();
        let request = request.clone();

        match tokio::spawn(async move { runner.execute_attached(&request).await }).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("Execution task failed: {}", e);
                ExecuteResponse::failure("execution task failed", e, started.elapsed())
            }
        }
    }

    async fn execute_attached(&self, request: &ExecuteRequest) -> ExecuteResponse {
        let started = Instant::now();

        if let Err(e) = request.validate() {
            log::warn!("Rejected execution request: {}", e);
            return ExecuteResponse::failure("invalid request", e, started.elapsed());
        }
        let limits = request.limits();

        let plan = match build_command(&request.language, &request.mode, &self.config.images) {
            Ok(plan) => plan,
            Err(e) => {
                log::warn!("Rejected execution request: {}", e);
                return ExecuteResponse::failure("invalid request", e, started.elapsed());
            }
        };

        let workspace = match Workspace::create(&self.config.work_root) {
            Ok(workspace) => workspace,
            Err(e) => {
                log::warn!("Workspace creation under {} failed: {}", self.config.work_root.display(), e);
                return ExecuteResponse::failure("mktemp failed", e, started.elapsed());
            }
        };

        if let Err(e) = workspace.write_files(&request.files).await {
            log::warn!("Writing files into workspace {} failed: {}", workspace.name(), e);
            release(workspace);
            return ExecuteResponse::failure("write files failed", e, started.elapsed());
        }

        let spec = ContainerSpec {
            name: container_name(&self.config.container_prefix),
            image: plan.image,
            script: plan.script,
            volume: self.config.work_volume.clone(),
            mount: self.config.container_mount.clone(),
            workdir: workspace.container_path(&self.config.container_mount),
            env: vec![("HOME".to_string(), "/tmp".to_string())],
            cpus: limits.cpus,
            memory_mb: limits.memory_mb,
            pids_limit: self.config.pids_limit,
            tmpfs_size_mb: self.config.tmpfs_size_mb,
            timeout: limits.timeout,
            max_output_bytes: self.config.max_output_bytes,
        };

        log::info!(
            "Starting container {} (image {}, mode {}, timeout {:?}, cpus {:.2}, memory {}m) via {}",
            spec.name,
            spec.image,
            request.mode,
            spec.timeout,
            spec.cpus,
            spec.memory_mb,
            self.runtime.name()
        );

        let result = self.runtime.run(&spec).await;
        let mut response = match result {
            Ok(outcome) => self.classify(&spec, outcome).await,
            Err(e) => {
                log::warn!("Container runtime for {} could not be invoked: {}", spec.name, e);
                ExecuteResponse {
                    ok: false,
                    passed: false,
                    exit_code: 1,
                    error: e.to_string(),
                    ..Default::default()
                }
            }
        };

        response.duration = started.elapsed();
        response.container = spec.name;
        response.image = spec.image;
        response.workdir = workspace.path().display().to_string();

        log::info!(
            "Container {} finished: ok={} passed={} exit_code={} duration={:?}",
            response.container,
            response.ok,
            response.passed,
            response.exit_code,
            response.duration
        );

        release(workspace);
        response
    }

    async fn classify(&self, spec: &ContainerSpec, outcome: RunOutcome) -> ExecuteResponse {
        let RunOutcome {
            status,
            stdout,
            stderr,
        } = outcome;
        let truncated = stdout.truncated || stderr.truncated;
        let output_size = stdout.size + stderr.size;

        let (ok, passed, exit_code, error) = match status {
            RunStatus::TimedOut => {
                log::warn!("Container {} timed out after {:?}", spec.name, spec.timeout);
                self.remove_after_timeout(&spec.name).await;
                (false, false, TIMEOUT_EXIT_CODE, TIMEOUT_ERROR.to_string())
            }
            RunStatus::Failed(message) => {
                log::warn!("Container {} failed in the runtime: {}", spec.name, message);
                (false, false, 1, message)
            }
            RunStatus::Exited(code) => (true, code == 0, code, String::new()),
        };

        ExecuteResponse {
            ok,
            passed,
            exit_code,
            stdout: stdout.text,
            stderr: stderr.text,
            error,
            truncated,
            output_size,
            ..Default::default()
        }
    }

    // The runtime client may already be gone, so failures here are expected.
    async fn remove_after_timeout(&self, name: &str) {
        match tokio::time::timeout(FORCE_REMOVE_TIMEOUT, self.runtime.force_remove(name)).await {
            Ok(Ok(())) => log::debug!("Force-removed container {}", name),
            Ok(Err(e)) => log::debug!("Force-removing container {} failed: {}", name, e),
            Err(_) => log::debug!("Force-removing container {} timed out", name),
        }
    }
}

/// Unique container name: `prefix` plus 16 hex digits from a random UUID.
pub fn container_name(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, &id[..16])
}

fn release(workspace: Workspace) {
    let path = workspace.path().to_path_buf();
    if let Err(e) = workspace.close() {
        log::warn!("Failed to remove workspace {}: {}", path.display(), e);
    }
}
