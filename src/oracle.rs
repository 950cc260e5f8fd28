//! API digest oracle
//!
//! The oracle summarizes the externally visible linkage surface of a shared
//! object as a single string. How that summary is computed is up to the
//! external program; linkcache only compares successive digests.

use crate::error::{LinkcacheError, LinkcacheResult};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Source of API digests for shared objects
#[async_trait]
pub trait ApiDigestOracle: Send + Sync {
    /// Compute the digest of `artifact`
    async fn digest(&self, artifact: &Path) -> LinkcacheResult<String>;

    /// Human-readable name for logs
    fn name(&self) -> String;
}

/// Oracle backed by an external program invoked as `<program> <artifact>`
#[derive(Debug, Clone)]
pub struct ProgramOracle {
    program: PathBuf,
}

impl ProgramOracle {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Look for `name` on PATH, then beside the running executable
    pub fn locate(name: &str) -> Option<Self> {
        let search_path = std::env::var_os("PATH");
        let exe_dir = std::env::current_exe()
            .and_then(|exe| exe.canonicalize())
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));

        find_program(name, search_path.as_deref(), exe_dir.as_deref()).map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl ApiDigestOracle for ProgramOracle {
    async fn digest(&self, artifact: &Path) -> LinkcacheResult<String> {
        debug!("Executing: {} {}", self.program.display(), artifact.display());

        let output = Command::new(&self.program)
            .arg(artifact)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|e| {
                LinkcacheError::oracle_failed(self.name(), artifact, e.to_string())
            })?;

        if !output.status.success() {
            return Err(LinkcacheError::oracle_failed(
                self.name(),
                artifact,
                output.status.to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let digest = stdout.trim();
        if digest.is_empty() {
            return Err(LinkcacheError::oracle_failed(
                self.name(),
                artifact,
                "empty output",
            ));
        }

        Ok(digest.to_string())
    }

    fn name(&self) -> String {
        self.program.display().to_string()
    }
}

/// Resolve `name` against each entry of `search_path`, then `fallback_dir`
pub fn find_program(
    name: &str,
    search_path: Option<&OsStr>,
    fallback_dir: Option<&Path>,
) -> Option<PathBuf> {
    let from_path = search_path
        .into_iter()
        .flat_map(std::env::split_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate));

    from_path.or_else(|| {
        fallback_dir
            .map(|dir| dir.join(name))
            .filter(|candidate| is_executable(candidate))
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
