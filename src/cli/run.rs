//! Top-level flow for one wrapped invocation

use crate::audit::AuditLog;
use crate::cli::args::Cli;
use crate::config::Config;
use crate::error::LinkcacheResult;
use crate::evaluator::StalenessEvaluator;
use crate::fingerprint::{EnvPolicy, ExecSpec};
use crate::oracle::ProgramOracle;
use crate::runner::{self, Runner};
use serde_json::json;
use tracing::{debug, error};

/// Execute the wrapped command, returning the status to exit with
pub async fn execute(args: Cli, config: &Config) -> LinkcacheResult<i32> {
    let audit = AuditLog::new(&config.audit);

    // Without an oracle shared-object outputs can't be tracked; don't cache at all
    let Some(oracle) = ProgramOracle::locate(&config.oracle.program) else {
        debug!(
            "{} not found, executing without cache",
            config.oracle.program
        );
        audit
            .log("cache.disabled", &json!({ "argv": args.command }))
            .await;

        return Ok(match runner::exec_uncached(&args.command) {
            Ok(status) => status,
            Err(e) => {
                error!("{}", e);
                1
            }
        });
    };
    debug!("Using API digest oracle {}", oracle.program().display());

    let policy = EnvPolicy::from_config(&config.fingerprint);
    let spec = ExecSpec::from_process(args.command, &policy)?;
    let audit = audit.in_dir(spec.cwd());

    let runner = Runner::new(
        StalenessEvaluator::new(config.cache.clone()),
        Box::new(oracle),
        audit,
    );
    runner.run(&spec).await
}
