//! Sidecar files stored beside managed outputs
//!
//! Two sidecars exist per output `P`:
//!
//! | File | Content | Written |
//! |------|---------|---------|
//! | `P.cacheinfo` | JSON `{"hash": ...}` | after every successful run |
//! | `P.apid` | one digest line | after a successful shared-object link, only when the digest changed |
//!
//! Reads never fail: anything missing or unparseable is reported as `None`
//! and the caller treats it as a cache miss. Writes go through a temporary
//! file in the same directory followed by a rename.

use crate::config::CacheConfig;
use crate::error::{LinkcacheError, LinkcacheResult};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Validity record persisted beside an output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Fingerprint of the invocation that produced the output
    pub hash: String,
}

/// Sidecar locations for one output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarPaths {
    pub cacheinfo: PathBuf,
    pub apid: PathBuf,
}

impl SidecarPaths {
    pub fn for_output(output: &Path, config: &CacheConfig) -> Self {
        Self {
            cacheinfo: with_suffix(output, &config.cacheinfo_suffix),
            apid: with_suffix(output, &config.apid_suffix),
        }
    }
}

/// Append `suffix` to the final component of `path` (`libfoo.so` -> `libfoo.so.apid`)
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Read a cacheinfo sidecar
pub fn read_cache_record(path: &Path) -> Option<CacheRecord> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("Cannot read cacheinfo {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!("Malformed cacheinfo {}: {}", path.display(), e);
            None
        }
    }
}

/// Write a cacheinfo sidecar
pub fn write_cache_record(path: &Path, record: &CacheRecord) -> LinkcacheResult<()> {
    let mut content = serde_json::to_string_pretty(record)?;
    content.push('\n');
    write_atomic(path, content.as_bytes())
}

/// Read an API digest sidecar, trimmed. Empty files count as absent.
pub fn read_api_digest(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let digest = content.trim();
            if digest.is_empty() {
                debug!("Empty API digest {}", path.display());
                None
            } else {
                Some(digest.to_string())
            }
        }
        Err(e) => {
            debug!("Cannot read API digest {}: {}", path.display(), e);
            None
        }
    }
}

/// Store a new API digest, leaving the file untouched when the content is
/// unchanged so that its mtime keeps marking the last API change.
///
/// Returns `true` if the sidecar was rewritten.
pub fn update_api_digest(path: &Path, digest: &str) -> LinkcacheResult<bool> {
    let digest = digest.trim();
    if read_api_digest(path).as_deref() == Some(digest) {
        return Ok(false);
    }

    write_atomic(path, format!("{}\n", digest).as_bytes())?;
    Ok(true)
}

/// Replace the file at `path` with `bytes` via write-then-rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> LinkcacheResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
        LinkcacheError::io(format!("creating temporary file in {}", dir.display()), e)
    })?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| LinkcacheError::io(format!("writing {}", path.display()), e))?;

    // NamedTempFile is created 0600; sidecars should read like any build file
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o644))
            .map_err(|e| LinkcacheError::io(format!("setting permissions on {}", path.display()), e))?;
    }

    tmp.persist(path)
        .map_err(|e| LinkcacheError::io(format!("renaming into {}", path.display()), e.error))?;
    Ok(())
}

/// Delete a sidecar. Absence is not an error.
pub fn remove(path: &Path) -> LinkcacheResult<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LinkcacheError::io(format!("removing {}", path.display()), e)),
    }
}
