//! Invocation orchestration
//!
//! Evaluates the cache, then either refreshes the output's mtime (hit) or
//! runs the wrapped command and maintains the sidecars (miss).
//!
//! | Child exit | cacheinfo | apid |
//! |------------|-----------|------|
//! | 0 | rewritten with the current fingerprint | rewritten if the digest changed (shared objects) |
//! | non-zero | removed | removed |

use crate::audit::AuditLog;
use crate::error::{LinkcacheError, LinkcacheResult};
use crate::evaluator::{Decision, StalenessEvaluator};
use crate::fingerprint::ExecSpec;
use crate::oracle::ApiDigestOracle;
use crate::sidecar::{self, CacheRecord};
use filetime::FileTime;
use serde_json::json;
use std::path::Path;
use std::process::ExitStatus;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Drives one wrapped invocation
pub struct Runner {
    evaluator: StalenessEvaluator,
    oracle: Box<dyn ApiDigestOracle>,
    audit: AuditLog,
}

impl Runner {
    pub fn new(
        evaluator: StalenessEvaluator,
        oracle: Box<dyn ApiDigestOracle>,
        audit: AuditLog,
    ) -> Self {
        Self {
            evaluator,
            oracle,
            audit,
        }
    }

    /// Run the invocation and return the exit status to report
    pub async fn run(&self, spec: &ExecSpec) -> LinkcacheResult<i32> {
        let evaluation = self.evaluator.evaluate(spec);

        match (&evaluation.decision, &evaluation.output) {
            (Decision::Hit, Some(slot)) => match touch(&slot.path) {
                Ok(()) => {
                    debug!("Cache hit, touching {}", slot.path.display());
                    self.audit
                        .log("cache.hit", &json!({ "output": slot.path.display().to_string() }))
                        .await;
                    return Ok(0);
                }
                Err(e) => {
                    warn!("Cannot refresh {}, relinking: {}", slot.path.display(), e);
                    self.audit
                        .log(
                            "cache.miss",
                            &json!({
                                "output": slot.path.display().to_string(),
                                "reason": "touch-failed",
                            }),
                        )
                        .await;
                }
            },
            (Decision::Miss(reason), output) => {
                self.audit
                    .log(
                        "cache.miss",
                        &json!({
                            "output": output.as_ref().map(|slot| slot.path.display().to_string()),
                            "reason": reason.code(),
                            "input": reason.input().map(|p| p.display().to_string()),
                        }),
                    )
                    .await;
            }
            // Evaluation only hits with an output slot
            (Decision::Hit, None) => {}
        }

        debug!("Cache miss, executing subcommand");
        let status = match execute(spec.argv()).await {
            Ok(status) => status,
            Err(e) => {
                if let Some(slot) = &evaluation.output {
                    self.purge(&slot.path);
                }
                return Err(e);
            }
        };
        self.audit
            .log("command.exit", &json!({ "argv": spec.argv(), "status": status }))
            .await;

        if let Some(slot) = &evaluation.output {
            if status == 0 {
                self.record_success(spec, &slot.path).await;
            } else {
                self.purge(&slot.path);
            }
        }

        Ok(status)
    }

    async fn record_success(&self, spec: &ExecSpec, output: &Path) {
        let sidecars = self.evaluator.sidecars(output);
        let record = CacheRecord {
            hash: spec.hash().to_string(),
        };
        if let Err(e) = sidecar::write_cache_record(&sidecars.cacheinfo, &record) {
            warn!("Failed to write cacheinfo: {}", e);
        }

        if !self.evaluator.is_shared_object(output) {
            return;
        }

        let digest = match self.oracle.digest(output).await {
            Ok(digest) => digest,
            Err(e) => {
                warn!("Failed to compute API digest with {}: {}", self.oracle.name(), e);
                return;
            }
        };

        match sidecar::update_api_digest(&sidecars.apid, &digest) {
            Ok(true) => {
                info!("API of {} changed", output.display());
                self.audit
                    .log(
                        "apid.updated",
                        &json!({ "output": output.display().to_string(), "digest": digest }),
                    )
                    .await;
            }
            Ok(false) => {
                debug!("API of {} unchanged", output.display());
                self.audit
                    .log(
                        "apid.unchanged",
                        &json!({ "output": output.display().to_string() }),
                    )
                    .await;
            }
            Err(e) => warn!("Failed to write API digest: {}", e),
        }
    }

    /// Remove both sidecars so a failed build can never validate later
    fn purge(&self, output: &Path) {
        let sidecars = self.evaluator.sidecars(output);
        for path in [&sidecars.cacheinfo, &sidecars.apid] {
            if let Err(e) = sidecar::remove(path) {
                warn!("{}", e);
            }
        }
    }
}

/// Run `argv` as a child with inherited stdio and return its exit status
pub async fn execute(argv: &[String]) -> LinkcacheResult<i32> {
    let (program, args) = argv.split_first().ok_or(LinkcacheError::EmptyCommand)?;
    debug!("Executing: {:?}", argv);

    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|e| LinkcacheError::command_failed(argv.join(" "), e))?;

    Ok(exit_code(status))
}

/// Replace the current process with `argv`, bypassing the cache entirely
///
/// Only returns if the replacement failed.
#[cfg(unix)]
pub fn exec_uncached(argv: &[String]) -> LinkcacheResult<i32> {
    use std::os::unix::process::CommandExt;

    let (program, args) = argv.split_first().ok_or(LinkcacheError::EmptyCommand)?;
    let err = std::process::Command::new(program).args(args).exec();
    Err(LinkcacheError::command_failed(argv.join(" "), err))
}

/// Run `argv` without the cache; there is no process replacement here, so
/// the child's status is passed back instead
#[cfg(not(unix))]
pub fn exec_uncached(argv: &[String]) -> LinkcacheResult<i32> {
    let (program, args) = argv.split_first().ok_or(LinkcacheError::EmptyCommand)?;
    let status = std::process::Command::new(program)
        .args(args)
        .status()
        .map_err(|e| LinkcacheError::command_failed(argv.join(" "), e))?;
    Ok(exit_code(status))
}

/// Exit status as a shell would report it (128 + N for signal N)
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

fn touch(path: &Path) -> LinkcacheResult<()> {
    filetime::set_file_mtime(path, FileTime::now())
        .map_err(|e| LinkcacheError::io(format!("touching {}", path.display()), e))
}
