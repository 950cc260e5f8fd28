//! Decision journal
//!
//! Appends one JSON line per cache event to `~/.local/state/linkcache/audit.log`
//! (or the configured path). Off by default.

use crate::config::{AuditConfig, ConfigManager};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// File-based journal that appends JSON lines
///
/// Every entry carries the wrapper's pid and, once known, the directory the
/// link step runs in, so lines from parallel build jobs can be told apart.
pub struct AuditLog {
    enabled: bool,
    path: PathBuf,
    pid: u32,
    cwd: Option<PathBuf>,
}

impl AuditLog {
    /// Create a journal from config
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            enabled: config.enabled,
            path: config
                .path
                .clone()
                .unwrap_or_else(ConfigManager::audit_log_path),
            pid: std::process::id(),
            cwd: None,
        }
    }

    /// A journal that records nothing
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            path: PathBuf::new(),
            pid: std::process::id(),
            cwd: None,
        }
    }

    /// Tag subsequent entries with the invocation's working directory
    pub fn in_dir(mut self, cwd: &Path) -> Self {
        self.cwd = Some(cwd.to_path_buf());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry(&self, event: &str, data: &Value) -> Value {
        let mut entry = Map::new();
        entry.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
        entry.insert("event".into(), json!(event));
        entry.insert("pid".into(), json!(self.pid));
        if let Some(cwd) = &self.cwd {
            entry.insert("cwd".into(), json!(cwd.display().to_string()));
        }
        entry.insert("data".into(), data.clone());
        Value::Object(entry)
    }

    /// Record a cache event
    ///
    /// Failures are reported as warnings; the journal never changes the
    /// outcome of a build step.
    pub async fn log(&self, event: &str, data: &Value) {
        if !self.enabled {
            return;
        }

        let line = match serde_json::to_string(&self.entry(event, data)) {
            Ok(s) => s + "\n",
            Err(e) => {
                warn!("Failed to serialize {} event: {}", event, e);
                return;
            }
        };

        if let Err(e) = self.append(line.as_bytes()).await {
            warn!("Failed to write journal {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // One write per line keeps concurrent appenders from interleaving
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await
    }
}
