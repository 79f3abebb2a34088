//! Runs sandboxed containers by shelling out to the container CLI.

use super::{drain, ContainerRuntime, ContainerSpec, RunOutcome, RunStatus};
use crate::errors::RuntimeError;
use crate::output::CappedBuffer;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// `docker run` reserves this status for failures of the runtime itself
/// (daemon unreachable, image missing under `--pull=never`, bad flags).
pub const RUNTIME_FAILURE_STATUS: i32 = 125;

#[derive(Debug, Clone)]
pub struct CliRuntime {
    binary: String,
}

impl CliRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

/// Arguments for `docker run` implementing the sandbox policy for `spec`.
pub fn docker_args(spec: &ContainerSpec) -> Vec<String> {
    let memory = format!("{}m", spec.memory_mb);
    let mut args: Vec<String> = vec![
        "run".into(),
        "--pull=never".into(),
        "--rm".into(),
        "--name".into(),
        spec.name.clone(),
        // isolation
        "--network".into(),
        "none".into(),
        "--read-only".into(),
        "--pids-limit".into(),
        spec.pids_limit.to_string(),
        "--cap-drop".into(),
        "ALL".into(),
        "--security-opt".into(),
        "no-new-privileges".into(),
        // limits; swap pinned to memory so the limit cannot be evaded
        "--cpus".into(),
        format!("{:.2}", spec.cpus),
        "--memory".into(),
        memory.clone(),
        "--memory-swap".into(),
        memory,
        "--tmpfs".into(),
        format!("/tmp:rw,noexec,nosuid,size={}m", spec.tmpfs_size_mb),
        // workspace
        "-v".into(),
        format!("{}:{}:rw", spec.volume, spec.mount),
        "-w".into(),
        spec.workdir.clone(),
    ];
    for (key, value) in &spec.env {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }
    args.push(spec.image.clone());
    args.push("sh".into());
    args.push("-c".into());
    args.push(spec.script.clone());
    args
}

fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no output")
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn run(&self, spec: &ContainerSpec) -> Result<RunOutcome, RuntimeError> {
        let args = docker_args(spec);
        log::debug!("Invoking {} {:?}", self.binary, args);

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let missing = || {
            RuntimeError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "container runtime output was not captured",
            ))
        };
        let stdout_pipe = child.stdout.take().ok_or_else(missing)?;
        let stderr_pipe = child.stderr.take().ok_or_else(missing)?;

        let mut stdout = CappedBuffer::new(spec.max_output_bytes);
        let mut stderr = CappedBuffer::new(spec.max_output_bytes);

        let finished = {
            let run = async {
                let (out, err) = tokio::join!(
                    drain(stdout_pipe, &mut stdout),
                    drain(stderr_pipe, &mut stderr)
                );
                out?;
                err?;
                child.wait().await
            };
            tokio::time::timeout(spec.timeout, run).await
        };

        let status = match finished {
            Ok(Ok(exit)) => match exit.code() {
                Some(RUNTIME_FAILURE_STATUS) => RunStatus::Failed(
                    RuntimeError::Daemon {
                        code: RUNTIME_FAILURE_STATUS,
                        message: first_line(&String::from_utf8_lossy(stderr.as_bytes())).to_string(),
                    }
                    .to_string(),
                ),
                Some(code) => RunStatus::Exited(i64::from(code)),
                None => RunStatus::Failed(RuntimeError::Terminated.to_string()),
            },
            Ok(Err(e)) => {
                if let Err(kill_err) = child.kill().await {
                    log::debug!("Killing {} client failed: {}", self.binary, kill_err);
                }
                RunStatus::Failed(RuntimeError::Io(e).to_string())
            }
            Err(_) => {
                log::warn!(
                    "Container {} exceeded {:?}, killing {} client",
                    spec.name,
                    spec.timeout,
                    self.binary
                );
                if let Err(e) = child.kill().await {
                    log::debug!("Killing {} client failed: {}", self.binary, e);
                }
                RunStatus::TimedOut
            }
        };

        Ok(RunOutcome {
            status,
            stdout: stdout.finish(),
            stderr: stderr.finish(),
        })
    }

    async fn force_remove(&self, name: &str) -> Result<(), RuntimeError> {
        let status = Command::new(&self.binary)
            .args(["rm", "-f", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| RuntimeError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::Daemon {
                code: status.code().unwrap_or(-1),
                message: format!("rm -f {} failed", name),
            })
        }
    }

    fn name(&self) -> &'static str {
        "cli"
    }
}
