//! Log output configuration.

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

/// Log line encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[derive(Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines with ANSI colors.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Log output options.
///
/// Verbosity comes from `RUST_LOG` and defaults to `info`.
#[derive(Debug, Clone, Serialize, Deserialize, Args)]
pub struct LoggingConfig {
    /// Log line encoding
    #[arg(long, env = "SHOPFLOOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    #[serde(default)]
    pub log_format: LogFormat,
}
