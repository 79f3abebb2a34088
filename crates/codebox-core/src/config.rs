//! Runner configuration loaded once from the process environment.

use crate::command::ImageSet;
use crate::errors::{ExecutorError, Result};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 256 * 1024;

/// Which container runtime backend executes the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeKind {
    /// Shell out to the container CLI (`docker run ...`).
    #[default]
    Cli,
    /// Talk to the Docker Engine API over its local socket.
    Engine,
}

impl FromStr for RuntimeKind {
    type Err = ExecutorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cli" | "docker" => Ok(RuntimeKind::Cli),
            "engine" | "api" => Ok(RuntimeKind::Engine),
            other => Err(ExecutorError::config(format!(
                "unknown runtime '{}', expected 'cli' or 'engine'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub runtime: RuntimeKind,
    /// Container CLI binary used by the `cli` runtime.
    pub docker_bin: String,
    pub images: ImageSet,
    /// Shared volume as seen by this process; workspaces are created here.
    pub work_root: PathBuf,
    /// Volume name (or host path) mounted into every container.
    pub work_volume: String,
    /// Mount point of the shared volume inside the container.
    pub container_mount: String,
    pub container_prefix: String,
    pub pids_limit: u32,
    pub tmpfs_size_mb: u64,
    /// Per-stream capture budget.
    pub max_output_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeKind::Cli,
            docker_bin: "docker".to_string(),
            images: ImageSet::default(),
            work_root: PathBuf::from("/workspaces"),
            work_volume: "codebox_executor_work".to_string(),
            container_mount: "/work".to_string(),
            container_prefix: "codebox-exec-".to_string(),
            pids_limit: 128,
            tmpfs_size_mb: 512,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(runtime) = get("EXECUTOR_RUNTIME") {
            config.runtime = runtime.parse()?;
        }
        if let Some(bin) = get("DOCKER_BIN") {
            config.docker_bin = bin;
        }
        if let Some(image) = get("EXECUTOR_GO_IMAGE") {
            config.images.go = image;
        }
        if let Some(image) = get("EXECUTOR_PY_IMAGE") {
            config.images.python = image;
        }
        if let Some(image) = get("EXECUTOR_NODE_IMAGE") {
            config.images.node = image;
        }
        if let Some(root) = get("EXECUTOR_WORK_ROOT") {
            config.work_root = PathBuf::from(root);
        }
        if let Some(volume) = get("EXECUTOR_WORK_VOLUME") {
            config.work_volume = volume;
        }
        if let Some(mount) = get("EXECUTOR_CONTAINER_MOUNT") {
            config.container_mount = mount;
        }
        if let Some(value) = get("EXECUTOR_PIDS_LIMIT") {
            config.pids_limit = parse_number("EXECUTOR_PIDS_LIMIT", &value)?;
        }
        if let Some(value) = get("EXECUTOR_TMPFS_SIZE_MB") {
            config.tmpfs_size_mb = parse_number("EXECUTOR_TMPFS_SIZE_MB", &value)?;
        }
        if let Some(value) = get("EXECUTOR_MAX_OUTPUT_BYTES") {
            config.max_output_bytes = parse_number("EXECUTOR_MAX_OUTPUT_BYTES", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.container_mount.starts_with('/') {
            return Err(ExecutorError::config(format!(
                "container mount '{}' must be an absolute path",
                self.container_mount
            )));
        }
        if self.pids_limit == 0 {
            return Err(ExecutorError::config("pids limit must be positive"));
        }
        if self.work_volume.contains(':') {
            return Err(ExecutorError::config(format!(
                "work volume '{}' must not contain ':'",
                self.work_volume
            )));
        }
        Ok(())
    }

    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = root.into();
        self
    }

    pub fn with_docker_bin(mut self, bin: impl Into<String>) -> Self {
        self.docker_bin = bin.into();
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ExecutorError::config(format!("{}={:?} is not valid: {}", key, value, e)))
}
