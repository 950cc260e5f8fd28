//! Staleness evaluation
//!
//! Decides whether the output of a wrapped command is still valid. Ordinary
//! inputs are versioned by their own mtime; shared-object inputs are
//! versioned by the mtime of their API digest sidecar, so a library whose
//! exported surface did not change does not force its dependents to relink.
//!
//! Ties are resolved towards rebuilding: an input whose mtime equals the
//! output's counts as changed.

use crate::config::CacheConfig;
use crate::fingerprint::ExecSpec;
use crate::sidecar::{self, SidecarPaths};
use filetime::FileTime;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The output operand of a command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSlot {
    /// Position of the output path in argv
    pub index: usize,
    pub path: PathBuf,
}

/// Find the value following the first `-o` token
pub fn locate_output(argv: &[String]) -> Option<OutputSlot> {
    let flag = argv.iter().position(|arg| arg == "-o")?;
    let index = flag + 1;
    argv.get(index).map(|value| OutputSlot {
        index,
        path: PathBuf::from(value),
    })
}

/// Why a cached output cannot be reused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// No `-o <path>` on the command line
    NoOutputFlag,
    /// The output does not exist yet
    NoPriorOutput,
    /// No cacheinfo sidecar beside the output
    NoSidecar,
    /// The cacheinfo sidecar could not be parsed
    CorruptSidecar,
    /// The invocation fingerprint differs from the recorded one
    SpecChanged,
    /// A non-shared input is at least as new as the output
    InputChanged(PathBuf),
    /// A shared-object input changed and has no API digest
    NoApiDigest(PathBuf),
    /// A shared-object input's API changed since the output was produced
    ApiChanged(PathBuf),
}

impl MissReason {
    /// Stable identifier used in the decision journal
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoOutputFlag => "no-output-flag",
            Self::NoPriorOutput => "no-prior-output",
            Self::NoSidecar => "no-sidecar",
            Self::CorruptSidecar => "corrupt-sidecar",
            Self::SpecChanged => "spec-changed",
            Self::InputChanged(_) => "input-changed",
            Self::NoApiDigest(_) => "no-api-digest",
            Self::ApiChanged(_) => "api-changed",
        }
    }

    /// The input that caused the miss, if any
    pub fn input(&self) -> Option<&Path> {
        match self {
            Self::InputChanged(p) | Self::NoApiDigest(p) | Self::ApiChanged(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOutputFlag => write!(f, "Command doesn't have a recognizable output"),
            Self::NoPriorOutput => write!(f, "Output of command does not yet exist"),
            Self::NoSidecar => write!(f, "Command output does not have a cacheinfo sidecar"),
            Self::CorruptSidecar => write!(f, "Command output has malformed cacheinfo sidecar"),
            Self::SpecChanged => write!(f, "Cacheinfo has changed"),
            Self::InputChanged(p) => write!(f, "Input file has changed {}", p.display()),
            Self::NoApiDigest(p) => write!(
                f,
                "Shared object has changed and there is no API digest: {}",
                p.display()
            ),
            Self::ApiChanged(p) => write!(f, "Shared object API has changed: {}", p.display()),
        }
    }
}

/// Outcome of an evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Hit,
    Miss(MissReason),
}

impl Decision {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit)
    }
}

/// Decision together with the output it concerns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub output: Option<OutputSlot>,
    pub decision: Decision,
}

/// Staleness decision procedure
#[derive(Debug, Clone)]
pub struct StalenessEvaluator {
    config: CacheConfig,
}

impl StalenessEvaluator {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    /// Whether `path` is named like a shared object
    pub fn is_shared_object(&self, path: &Path) -> bool {
        path.to_string_lossy()
            .ends_with(self.config.shared_object_suffix.as_str())
    }

    /// Sidecar locations for `output`
    pub fn sidecars(&self, output: &Path) -> SidecarPaths {
        SidecarPaths::for_output(output, &self.config)
    }

    /// Evaluate the current invocation against the filesystem
    pub fn evaluate(&self, spec: &ExecSpec) -> Evaluation {
        let Some(slot) = locate_output(spec.argv()) else {
            let reason = MissReason::NoOutputFlag;
            debug!("{}", reason);
            return Evaluation {
                output: None,
                decision: Decision::Miss(reason),
            };
        };

        let decision = match self.check(spec, &slot) {
            Ok(()) => {
                debug!("Using link-cache of {}", slot.path.display());
                Decision::Hit
            }
            Err(reason) => {
                debug!("{}", reason);
                Decision::Miss(reason)
            }
        };

        Evaluation {
            output: Some(slot),
            decision,
        }
    }

    fn check(&self, spec: &ExecSpec, slot: &OutputSlot) -> Result<(), MissReason> {
        let output_mtime = modified(&slot.path).ok_or(MissReason::NoPriorOutput)?;

        let sidecars = self.sidecars(&slot.path);
        if !sidecars.cacheinfo.exists() {
            return Err(MissReason::NoSidecar);
        }
        let record = sidecar::read_cache_record(&sidecars.cacheinfo)
            .ok_or(MissReason::CorruptSidecar)?;
        if record.hash != spec.hash() {
            return Err(MissReason::SpecChanged);
        }

        for (index, arg) in spec.argv().iter().enumerate() {
            if index == slot.index {
                continue;
            }
            self.check_input(Path::new(arg), output_mtime)?;
        }

        Ok(())
    }

    fn check_input(&self, input: &Path, output_mtime: FileTime) -> Result<(), MissReason> {
        // Tokens that don't name an existing path are flags or values
        let Some(input_mtime) = modified(input) else {
            return Ok(());
        };

        if input_mtime < output_mtime {
            return Ok(());
        }

        if !self.is_shared_object(input) {
            return Err(MissReason::InputChanged(input.to_path_buf()));
        }

        let apid = self.sidecars(input).apid;
        let Some(apid_mtime) = modified(&apid) else {
            return Err(MissReason::NoApiDigest(input.to_path_buf()));
        };

        if apid_mtime < output_mtime {
            debug!("Input object is cache OK: {}", input.display());
            return Ok(());
        }

        Err(MissReason::ApiChanged(input.to_path_buf()))
    }
}

fn modified(path: &Path) -> Option<FileTime> {
    fs::metadata(path)
        .ok()
        .map(|meta| FileTime::from_last_modification_time(&meta))
}
