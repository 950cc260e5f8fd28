//! Invocation fingerprinting
//!
//! An [`ExecSpec`] captures the wrapped command line, the working directory
//! and the subset of the environment that can influence a link step. Its
//! hash is what a cacheinfo sidecar records.

use crate::config::FingerprintConfig;
use crate::error::{LinkcacheError, LinkcacheResult};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Decides which environment variables are part of the fingerprint
#[derive(Debug, Clone)]
pub struct EnvPolicy {
    prefixes: Vec<String>,
    names: BTreeSet<String>,
}

impl EnvPolicy {
    /// Create a policy from explicit prefixes and exact names
    pub fn new<P, N>(prefixes: P, names: N) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        N: IntoIterator,
        N::Item: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Build the policy from the `[fingerprint]` config section
    pub fn from_config(config: &FingerprintConfig) -> Self {
        Self::new(config.env_prefixes.clone(), config.env_names.clone())
    }

    /// Whether a variable with this name is tracked
    pub fn admits(&self, name: &str) -> bool {
        self.names.contains(name) || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

impl Default for EnvPolicy {
    fn default() -> Self {
        Self::from_config(&FingerprintConfig::default())
    }
}

/// Canonical description of one invocation
#[derive(Debug, Clone)]
pub struct ExecSpec {
    argv: Vec<String>,
    cwd: PathBuf,
    env: BTreeMap<String, String>,
    hash: String,
}

/// Serialized form that gets hashed. Field order is fixed and `env` is a
/// sorted map, so equal invocations always produce equal bytes.
#[derive(Serialize)]
struct Canonical<'a> {
    argv: &'a [String],
    cwd: String,
    env: &'a BTreeMap<String, String>,
}

impl ExecSpec {
    /// Fingerprint an invocation from explicit inputs
    pub fn capture<I, K, V>(
        argv: Vec<String>,
        cwd: &Path,
        vars: I,
        policy: &EnvPolicy,
    ) -> LinkcacheResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if argv.is_empty() {
            return Err(LinkcacheError::EmptyCommand);
        }

        let env: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| policy.admits(k))
            .collect();

        let canonical = Canonical {
            argv: &argv,
            cwd: cwd.to_string_lossy().into_owned(),
            env: &env,
        };
        let bytes = serde_json::to_vec_pretty(&canonical)?;
        let hash = hex::encode(Sha256::digest(&bytes));

        Ok(Self {
            argv,
            cwd: cwd.to_path_buf(),
            env,
            hash,
        })
    }

    /// Fingerprint an invocation using the current process directory and
    /// environment. Variables that are not valid UTF-8 are ignored.
    pub fn from_process(argv: Vec<String>, policy: &EnvPolicy) -> LinkcacheResult<Self> {
        let cwd = std::env::current_dir().map_err(LinkcacheError::CurrentDir)?;
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));

        let spec = Self::capture(argv, &cwd, vars, policy)?;
        debug!("Invocation fingerprint: {}", spec.hash);
        Ok(spec)
    }

    /// The wrapped command and its arguments
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Directory the invocation runs in
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Tracked environment, sorted by name
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Lowercase hex SHA-256 of the canonical serialization
    pub fn hash(&self) -> &str {
        &self.hash
    }
}
