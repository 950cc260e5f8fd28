//! Configuration schema for linkcache
//!
//! Configuration is stored at `~/.config/linkcache/config.toml`. Every
//! section is optional; the defaults describe a GNU-style linker wrapper.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which environment variables participate in the invocation fingerprint
    pub fingerprint: FingerprintConfig,

    /// Sidecar naming and shared-object detection
    pub cache: CacheConfig,

    /// API digest oracle settings
    pub oracle: OracleConfig,

    /// Decision journal settings
    pub audit: AuditConfig,
}

/// Environment allow-list for the invocation fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Variables whose name starts with any of these prefixes are tracked
    pub env_prefixes: Vec<String>,

    /// Variables tracked by exact name
    pub env_names: Vec<String>,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        // See ld(1), ENVIRONMENT
        Self {
            env_prefixes: vec!["LD_".to_string()],
            env_names: vec![
                "COLLECT_NO_DEMANGLE".to_string(),
                "GNUTARGET".to_string(),
                "LDEMULATION".to_string(),
                "PATH".to_string(),
            ],
        }
    }
}

/// Sidecar layout and input classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// File name suffix identifying shared objects
    pub shared_object_suffix: String,

    /// Suffix appended to an output path for its cacheinfo sidecar
    pub cacheinfo_suffix: String,

    /// Suffix appended to a shared object path for its API digest sidecar
    pub apid_suffix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shared_object_suffix: ".so".to_string(),
            cacheinfo_suffix: ".cacheinfo".to_string(),
            apid_suffix: ".apid".to_string(),
        }
    }
}

/// API digest oracle settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Program name looked up on PATH and next to the wrapper
    pub program: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            program: "linkhash".to_string(),
        }
    }
}

/// Decision journal settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Append one JSON line per decision
    pub enabled: bool,

    /// Journal location (defaults to the state directory)
    pub path: Option<PathBuf>,
}
