//! codebox-server binary
//!
//! Serves `POST /execute` and `GET /health`, running submitted code in
//! sandboxed containers.

use anyhow::Context;
use clap::Parser;
use codebox_core::{Runner, RunnerConfig};
use codebox_server::{shutdown_signal, ExecutorServer, ServerConfig};

/// Command line arguments for the execution server.
#[derive(Parser, Debug)]
#[command(name = "codebox-server")]
#[command(about = "Runs untrusted code in sandboxed containers over HTTP")]
#[command(version)]
struct Args {
    /// Server bind address
    #[arg(short, long, env = "EXECUTOR_ADDR", default_value = "0.0.0.0:8090")]
    bind: String,

    /// Maximum request body size in bytes
    #[arg(long, default_value = "4194304")] // 4MiB
    max_body_size: usize,

    /// Disable per-request logging
    #[arg(long)]
    no_request_log: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let runner_config = RunnerConfig::from_env().context("invalid executor configuration")?;
    let config = ServerConfig::new()
        .with_bind_addr_str(&args.bind)?
        .with_max_body_size(args.max_body_size)
        .with_logging(!args.no_request_log);

    log::info!("Starting codebox executor...");
    log::info!("Configuration:");
    log::info!("  Bind address: {}", config.bind_addr);
    log::info!("  Max body size: {} bytes", config.max_body_size);
    log::info!("  Runtime: {:?} ({})", runner_config.runtime, runner_config.docker_bin);
    log::info!(
        "  Images: go={} python={} node={}",
        runner_config.images.go,
        runner_config.images.python,
        runner_config.images.node
    );
    log::info!(
        "  Work root: {} (volume {} at {})",
        runner_config.work_root.display(),
        runner_config.work_volume,
        runner_config.container_mount
    );
    log::info!("  Max output: {} bytes per stream", runner_config.max_output_bytes);

    let runner = Runner::from_config(runner_config).context("failed to set up container runtime")?;
    let server = ExecutorServer::with_config(runner, config);

    server.serve_with_shutdown(shutdown_signal()).await?;

    Ok(())
}
