//! Wire types for execution requests and responses.

use crate::command::{Language, Mode};
use crate::errors::{ExecutorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 15;
pub const DEFAULT_CPUS: f64 = 1.0;
pub const DEFAULT_MEMORY_MB: u64 = 256;

pub const TIMEOUT_SECONDS_RANGE: (u64, u64) = (1, 120);
pub const CPUS_RANGE: (f64, f64) = (0.1, 4.0);
pub const MEMORY_MB_RANGE: (u64, u64) = (64, 2048);

/// Exit code reported for a run that hit its deadline.
pub const TIMEOUT_EXIT_CODE: i64 = 124;
pub const TIMEOUT_ERROR: &str = "timeout";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub language: String,
    pub mode: String,
    /// Relative path -> file content.
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub cpus: Option<f64>,
    #[serde(default)]
    pub memory_mb: Option<u64>,
}

impl ExecuteRequest {
    pub fn new(language: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            mode: mode.into(),
            files: BTreeMap::new(),
            timeout_seconds: None,
            cpus: None,
            memory_mb: None,
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_cpus(mut self, cpus: f64) -> Self {
        self.cpus = Some(cpus);
        self
    }

    pub fn with_memory_mb(mut self, memory_mb: u64) -> Self {
        self.memory_mb = Some(memory_mb);
        self
    }

    /// Checks enum membership, numeric ranges and file paths.
    ///
    /// Has no side effects; a request that passes can be handed to the runner.
    pub fn validate(&self) -> Result<()> {
        self.language.parse::<Language>()?;
        self.mode.parse::<Mode>()?;

        if self.files.is_empty() {
            return Err(ExecutorError::invalid_request("files must contain at least one entry"));
        }
        for path in self.files.keys() {
            normalize_relative_path(path)?;
        }

        if let Some(timeout) = self.timeout_seconds {
            let (min, max) = TIMEOUT_SECONDS_RANGE;
            if !(min..=max).contains(&timeout) {
                return Err(ExecutorError::invalid_request(format!(
                    "timeout_seconds must be between {} and {}, got {}",
                    min, max, timeout
                )));
            }
        }
        if let Some(cpus) = self.cpus {
            let (min, max) = CPUS_RANGE;
            if !cpus.is_finite() || cpus < min || cpus > max {
                return Err(ExecutorError::invalid_request(format!(
                    "cpus must be between {} and {}, got {}",
                    min, max, cpus
                )));
            }
        }
        if let Some(memory) = self.memory_mb {
            let (min, max) = MEMORY_MB_RANGE;
            if !(min..=max).contains(&memory) {
                return Err(ExecutorError::invalid_request(format!(
                    "memory_mb must be between {} and {}, got {}",
                    min, max, memory
                )));
            }
        }
        Ok(())
    }

    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            timeout: Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS)),
            cpus: self.cpus.unwrap_or(DEFAULT_CPUS),
            memory_mb: self.memory_mb.unwrap_or(DEFAULT_MEMORY_MB),
        }
    }
}

/// Effective per-run limits after defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceLimits {
    pub timeout: Duration,
    pub cpus: f64,
    pub memory_mb: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            cpus: DEFAULT_CPUS,
            memory_mb: DEFAULT_MEMORY_MB,
        }
    }
}

/// Normalizes a submitted file path into a path relative to the workspace root.
///
/// Rejects blank and absolute paths and anything that climbs above the root
/// once `.` and `..` segments are resolved.
pub fn normalize_relative_path(raw: &str) -> Result<PathBuf> {
    if raw.trim().is_empty() {
        return Err(ExecutorError::EmptyFilename);
    }

    let path = Path::new(raw);
    if path.is_absolute() {
        return Err(ExecutorError::InvalidPath(raw.to_string()));
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => normalized.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(ExecutorError::InvalidPath(raw.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ExecutorError::InvalidPath(raw.to_string()));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(ExecutorError::InvalidPath(raw.to_string()));
    }
    Ok(normalized)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub ok: bool,
    pub passed: bool,
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    #[serde(with = "duration_nanos")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workdir: String,
    pub truncated: bool,
    pub output_size: usize,
}

impl ExecuteResponse {
    /// Infrastructure failure raised before any container was started.
    pub fn failure(context: &str, err: impl std::fmt::Display, duration: Duration) -> Self {
        Self {
            ok: false,
            passed: false,
            exit_code: 1,
            duration,
            error: format!("{}: {}", context, err),
            ..Default::default()
        }
    }

    pub fn is_timeout(&self) -> bool {
        !self.ok && self.error == TIMEOUT_ERROR
    }
}

// Durations travel as integer nanoseconds.
mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_nanos(u64::deserialize(deserializer)?))
    }
}
