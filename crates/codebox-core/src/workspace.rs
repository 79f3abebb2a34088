//! Per-request workspace directories inside the shared volume.
//!
//! The control plane and the container runtime may see the shared volume at
//! different paths. Only the workspace's final path segment is stable across
//! both views, so the container side is addressed by [`Workspace::name`].

use crate::errors::Result;
use crate::request::normalize_relative_path;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const WORKSPACE_PREFIX: &str = "codebox-exec-";

/// A uniquely named directory that is removed when dropped or closed.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    name: String,
}

impl Workspace {
    /// Creates a fresh workspace under `root`, creating `root` if needed.
    pub fn create(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = Builder::new().prefix(WORKSPACE_PREFIX).tempdir_in(root)?;
        let name = dir
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "workspace name is not valid UTF-8",
                )
            })?;

        log::debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir, name })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of this workspace inside a container that mounts the shared volume at `mount`.
    pub fn container_path(&self, mount: &str) -> String {
        format!("{}/{}", mount.trim_end_matches('/'), self.name)
    }

    /// Writes every file, creating intermediate directories.
    ///
    /// All paths are checked before the first write, so an unsafe entry leaves
    /// the workspace untouched.
    pub async fn write_files(&self, files: &BTreeMap<String, String>) -> Result<()> {
        let mut resolved: Vec<(PathBuf, &String)> = Vec::with_capacity(files.len());
        for (raw, content) in files {
            resolved.push((normalize_relative_path(raw)?, content));
        }

        for (relative, content) in resolved {
            let full = self.dir.path().join(&relative);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).await?;
            }
            let mut options = fs::OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            options.mode(0o644);
            let mut file = options.open(&full).await?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await?;
        }

        log::debug!("Wrote {} file(s) into workspace {}", files.len(), self.name);
        Ok(())
    }

    /// Removes the directory, reporting failures instead of swallowing them.
    pub fn close(self) -> Result<()> {
        let name = self.name;
        self.dir.close()?;
        log::debug!("Removed workspace {}", name);
        Ok(())
    }
}
