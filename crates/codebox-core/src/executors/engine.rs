//! Runs sandboxed containers through the Docker Engine API.
//!
//! Applies the same isolation policy as the CLI backend, expressed as a
//! `HostConfig`. Images are never pulled: creating a container from a missing
//! image fails and is reported as a runtime error.

use super::{ContainerRuntime, ContainerSpec, RunOutcome, RunStatus};
use crate::errors::RuntimeError;
use crate::output::CappedBuffer;
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::HashMap;

pub struct EngineRuntime {
    docker: Docker,
}

impl EngineRuntime {
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(
                name,
                Some(BollardRemoveContainerOptionsQuery {
                    force: true,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }
}

/// Container body implementing the sandbox policy for `spec`.
pub fn container_body(spec: &ContainerSpec) -> ContainerCreateBody {
    let memory_bytes = i64::try_from(spec.memory_mb.saturating_mul(1024 * 1024)).unwrap_or(i64::MAX);
    let tmpfs = HashMap::from([(
        "/tmp".to_string(),
        format!("rw,noexec,nosuid,size={}m", spec.tmpfs_size_mb),
    )]);

    let host_config = HostConfig {
        network_mode: Some("none".to_string()),
        readonly_rootfs: Some(true),
        pids_limit: Some(i64::from(spec.pids_limit)),
        cap_drop: Some(vec!["ALL".to_string()]),
        security_opt: Some(vec!["no-new-privileges".to_string()]),
        nano_cpus: Some((spec.cpus * 1e9).round() as i64),
        memory: Some(memory_bytes),
        memory_swap: Some(memory_bytes),
        tmpfs: Some(tmpfs),
        binds: Some(vec![format!("{}:{}:rw", spec.volume, spec.mount)]),
        ..Default::default()
    };

    ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: Some(vec!["sh".to_string(), "-c".to_string(), spec.script.clone()]),
        working_dir: Some(spec.workdir.clone()),
        env: Some(
            spec.env
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect(),
        ),
        network_disabled: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        host_config: Some(host_config),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for EngineRuntime {
    async fn run(&self, spec: &ContainerSpec) -> Result<RunOutcome, RuntimeError> {
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(spec.name.clone()),
            ..Default::default()
        });
        self.docker
            .create_container(options, container_body(spec))
            .await?;

        let mut stdout = CappedBuffer::new(spec.max_output_bytes);
        let mut stderr = CappedBuffer::new(spec.max_output_bytes);

        let finished = {
            let run = async {
                self.docker
                    .start_container(&spec.name, None::<BollardStartContainerOptionsQuery>)
                    .await?;

                let mut logs = self.docker.logs(
                    &spec.name,
                    Some(BollardLogsOptionsQuery {
                        follow: true,
                        stdout: true,
                        stderr: true,
                        ..Default::default()
                    }),
                );
                while let Some(chunk) = logs.next().await {
                    match chunk? {
                        LogOutput::StdOut { message } => {
                            stdout.push(&message);
                        }
                        LogOutput::StdErr { message } => {
                            stderr.push(&message);
                        }
                        _ => {}
                    }
                }

                let mut wait = self
                    .docker
                    .wait_container(&spec.name, None::<BollardWaitContainerOptionsQuery>);
                match wait.next().await {
                    Some(Ok(response)) => Ok(response.status_code),
                    // Non-zero exits surface as an error carrying the status
                    Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                        Ok(code)
                    }
                    Some(Err(e)) => Err(RuntimeError::Engine(e)),
                    None => Err(RuntimeError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "container wait stream ended unexpectedly",
                    ))),
                }
            };
            tokio::time::timeout(spec.timeout, run).await
        };

        let status = match finished {
            Ok(Ok(code)) => RunStatus::Exited(code),
            Ok(Err(e)) => RunStatus::Failed(e.to_string()),
            Err(_) => RunStatus::TimedOut,
        };

        // Timed-out containers are removed by the caller
        if status != RunStatus::TimedOut {
            if let Err(e) = self.remove(&spec.name).await {
                log::warn!("Failed to remove container {}: {}", spec.name, e);
            }
        }

        Ok(RunOutcome {
            status,
            stdout: stdout.finish(),
            stderr: stderr.finish(),
        })
    }

    async fn force_remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.remove(name).await
    }

    fn name(&self) -> &'static str {
        "engine"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name: "codebox-exec-deadbeefdeadbeef".to_string(),
            image: "node:20-alpine".to_string(),
            script: "node --test".to_string(),
            volume: "codebox_executor_work".to_string(),
            mount: "/work".to_string(),
            workdir: "/work/codebox-exec-xyz".to_string(),
            env: vec![("HOME".to_string(), "/tmp".to_string())],
            cpus: 1.5,
            memory_mb: 256,
            pids_limit: 128,
            tmpfs_size_mb: 512,
            timeout: Duration::from_secs(15),
            max_output_bytes: 4096,
        }
    }

    #[test]
    fn test_host_config_isolation() {
        let body = container_body(&spec());
        let host = body.host_config.unwrap();

        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(host.readonly_rootfs, Some(true));
        assert_eq!(host.pids_limit, Some(128));
        assert_eq!(host.cap_drop, Some(vec!["ALL".to_string()]));
        assert_eq!(host.security_opt, Some(vec!["no-new-privileges".to_string()]));
        assert_eq!(
            host.tmpfs.unwrap().get("/tmp").map(String::as_str),
            Some("rw,noexec,nosuid,size=512m")
        );
        assert_eq!(
            host.binds,
            Some(vec!["codebox_executor_work:/work:rw".to_string()])
        );
    }

    #[test]
    fn test_host_config_limits() {
        let host = container_body(&spec()).host_config.unwrap();
        assert_eq!(host.nano_cpus, Some(1_500_000_000));
        assert_eq!(host.memory, Some(256 * 1024 * 1024));
        assert_eq!(host.memory_swap, host.memory);
    }

    #[test]
    fn test_body_command_and_environment() {
        let body = container_body(&spec());
        assert_eq!(body.image.as_deref(), Some("node:20-alpine"));
        assert_eq!(
            body.cmd,
            Some(vec!["sh".to_string(), "-c".to_string(), "node --test".to_string()])
        );
        assert_eq!(body.working_dir.as_deref(), Some("/work/codebox-exec-xyz"));
        assert_eq!(body.env, Some(vec!["HOME=/tmp".to_string()]));
        assert_eq!(body.network_disabled, Some(true));
    }
}
