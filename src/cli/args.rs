//! CLI argument definitions using clap derive

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Linkcache - link-step cache wrapper
///
/// Wraps a single-output command (typically a linker). If the previous
/// output is still valid for this exact invocation, the command is skipped
/// and the output is touched instead.
#[derive(Parser, Debug)]
#[command(name = "linkcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Logging verbosity
    #[arg(long, value_enum, default_value_t = LogLevel::Warning)]
    pub log_level: LogLevel,

    /// Configuration file path
    #[arg(long, env = "LINKCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Command and arguments to wrap
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<String>,
}

/// Log levels accepted by `--log-level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// `EnvFilter` directive for this crate at this level
    pub fn directive(&self) -> &'static str {
        match self {
            Self::Debug => "linkcache=debug",
            Self::Info => "linkcache=info",
            Self::Warning => "linkcache=warn",
            Self::Error => "linkcache=error",
        }
    }
}
