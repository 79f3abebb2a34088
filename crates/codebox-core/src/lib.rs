//! Sandboxed execution of untrusted source code.
//!
//! A request carries a language, an execution mode and a set of source files.
//! The crate writes those files into a fresh workspace on a shared volume,
//! runs the matching toolchain inside a network-less, read-only,
//! resource-limited container, and classifies what happened into a single
//! [`ExecuteResponse`].
//!
//! # Layout
//!
//! - [`request`]: wire types, validation and resource defaults
//! - [`command`]: image and shell script selection per language and mode
//! - [`workspace`]: per-request directories and safe file placement
//! - [`output`]: byte-capped capture of container output
//! - [`executors`]: container runtime backends (CLI and Engine API)
//! - [`runner`]: the orchestrator tying the above together
//! - [`config`]: environment-driven runner configuration

pub mod command;
pub mod config;
pub mod errors;
pub mod executors;
pub mod output;
pub mod request;
pub mod runner;
pub mod workspace;

pub use command::{build_command, CommandPlan, ImageSet, Language, Mode};
pub use config::{RunnerConfig, RuntimeKind};
pub use errors::{ExecutorError, RuntimeError};
pub use executors::{ContainerRuntime, ContainerSpec, RunOutcome, RunStatus};
pub use output::{CappedBuffer, CapturedOutput};
pub use request::{ExecuteRequest, ExecuteResponse, ResourceLimits};
pub use runner::Runner;
pub use workspace::Workspace;
