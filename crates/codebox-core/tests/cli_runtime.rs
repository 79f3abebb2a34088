//! Drives `CliRuntime` against shell scripts standing in for the container CLI.
#![cfg(unix)]

use codebox_core::executors::{CliRuntime, ContainerRuntime, ContainerSpec, RunStatus};
use codebox_core::request::ExecuteRequest;
use codebox_core::{Runner, RunnerConfig};
use serial_test::serial;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// A child forked by a concurrent test can inherit the script's write handle,
// making exec fail with ETXTBSY. Tests using this run serially.
fn fake_cli(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("docker");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn spec(timeout: Duration) -> ContainerSpec {
    ContainerSpec {
        name: "codebox-exec-00aa11bb22cc33dd".to_string(),
        image: "python:3.12-alpine".to_string(),
        script: "python main.py".to_string(),
        volume: "codebox_executor_work".to_string(),
        mount: "/work".to_string(),
        workdir: "/work/codebox-exec-test".to_string(),
        env: vec![("HOME".to_string(), "/tmp".to_string())],
        cpus: 1.0,
        memory_mb: 256,
        pids_limit: 128,
        tmpfs_size_mb: 512,
        timeout,
        max_output_bytes: 1024,
    }
}

#[tokio::test]
#[serial]
async fn test_program_exit_status_and_streams() {
    let dir = tempfile::tempdir().unwrap();
    let bin = fake_cli(dir.path(), "echo \"$@\"\necho boom >&2\nexit 3");
    let runtime = CliRuntime::new(bin.to_string_lossy());

    let outcome = runtime.run(&spec(Duration::from_secs(5))).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Exited(3));
    assert!(outcome.stdout.text.contains("--network none"));
    assert!(outcome.stdout.text.contains("--pull=never"));
    assert!(outcome.stdout.text.contains("--memory-swap 256m"));
    assert_eq!(outcome.stderr.text, "boom\n");
    assert!(!outcome.stdout.truncated);
}

#[tokio::test]
#[serial]
async fn test_runtime_failure_status_is_not_a_program_exit() {
    let dir = tempfile::tempdir().unwrap();
    let bin = fake_cli(
        dir.path(),
        "echo 'docker: Error response from daemon: No such image: python:3.12-alpine' >&2\nexit 125",
    );
    let runtime = CliRuntime::new(bin.to_string_lossy());

    let outcome = runtime.run(&spec(Duration::from_secs(5))).await.unwrap();

    match outcome.status {
        RunStatus::Failed(message) => {
            assert!(message.contains("125"));
            assert!(message.contains("No such image"));
        }
        other => panic!("expected runtime failure, got {:?}", other),
    }
}

#[tokio::test]
#[serial]
async fn test_deadline_kills_the_client() {
    let dir = tempfile::tempdir().unwrap();
    let bin = fake_cli(dir.path(), "echo started\nexec sleep 5");
    let runtime = CliRuntime::new(bin.to_string_lossy());

    let started = std::time::Instant::now();
    let outcome = runtime.run(&spec(Duration::from_millis(300))).await.unwrap();

    assert_eq!(outcome.status, RunStatus::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
#[serial]
async fn test_output_is_capped_per_stream() {
    let dir = tempfile::tempdir().unwrap();
    let bin = fake_cli(dir.path(), "head -c 5000 /dev/zero | tr '\\0' 'x'\necho small >&2");
    let runtime = CliRuntime::new(bin.to_string_lossy());

    let outcome = runtime.run(&spec(Duration::from_secs(5))).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Exited(0));
    assert!(outcome.stdout.truncated);
    assert_eq!(outcome.stdout.text.len(), 1024);
    assert!(!outcome.stderr.truncated);
    assert_eq!(outcome.stderr.text, "small\n");
}

#[tokio::test]
#[serial]
async fn test_force_remove_invokes_rm() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("calls.log");
    let bin = fake_cli(dir.path(), &format!("echo \"$@\" >> {}", log.display()));
    let runtime = CliRuntime::new(bin.to_string_lossy());

    runtime.force_remove("codebox-exec-feedfacefeedface").await.unwrap();

    let calls = std::fs::read_to_string(&log).unwrap();
    assert_eq!(calls.trim(), "rm -f codebox-exec-feedfacefeedface");
}

#[tokio::test]
#[serial]
async fn test_runner_timeout_removes_container_and_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("calls.log");
    let bin = fake_cli(
        dir.path(),
        &format!(
            "if [ \"$1\" = rm ]; then echo \"$@\" >> {}; exit 0; fi\nexec sleep 5",
            log.display()
        ),
    );
    let root = tempfile::tempdir().unwrap();
    let config = RunnerConfig::default()
        .with_work_root(root.path())
        .with_docker_bin(bin.to_string_lossy());
    let runner = Runner::new(config.clone(), Arc::new(CliRuntime::new(config.docker_bin.clone())));

    let request = ExecuteRequest::new("python", "run")
        .with_file("main.py", "import time\ntime.sleep(10)")
        .with_timeout_seconds(1);
    let response = runner.execute(&request).await;

    assert!(!response.ok);
    assert_eq!(response.exit_code, 124);
    assert_eq!(response.error, "timeout");

    let calls = std::fs::read_to_string(&log).unwrap();
    assert_eq!(calls.trim(), format!("rm -f {}", response.container));
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
#[serial]
async fn test_abandoned_execution_still_enforces_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("calls.log");
    let bin = fake_cli(
        dir.path(),
        &format!("echo \"$@\" >> {}\nif [ \"$1\" = rm ]; then exit 0; fi\nexec sleep 5", log.display()),
    );
    let root = tempfile::tempdir().unwrap();
    let config = RunnerConfig::default()
        .with_work_root(root.path())
        .with_docker_bin(bin.to_string_lossy());
    let runner = Runner::new(config.clone(), Arc::new(CliRuntime::new(config.docker_bin.clone())));

    let request = ExecuteRequest::new("python", "run")
        .with_file("main.py", "while True: pass")
        .with_timeout_seconds(1);

    // Caller gives up long before the deadline, as a disconnecting client would.
    let abandoned = tokio::time::timeout(Duration::from_millis(300), runner.execute(&request)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_secs(3)).await;

    let calls = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = calls.lines().collect();
    assert_eq!(lines.len(), 2, "calls: {:?}", calls);
    assert!(lines[0].starts_with("run "));
    assert!(lines[1].starts_with("rm -f codebox-exec-"));
    assert!(lines[0].contains(&lines[1]["rm -f ".len()..]));
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}
