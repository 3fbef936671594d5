//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use carfile_backup::config::AgentConfig;

/// Back up CAR archives from source nodes into dated storage directories.
///
/// Polls the storage API for pending backups, downloads each archive from the
/// first source node that answers, and reports the outcome.
#[derive(Parser, Debug)]
#[command(name = "carfile-backup")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/carfile-backup/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Storage API base URL
    #[arg(long, value_name = "URL")]
    pub storage_api: Option<String>,

    /// Bearer token for the storage API
    #[arg(long)]
    pub token: Option<String>,

    /// Area whose scheduler resolves archive sources
    #[arg(long)]
    pub area_id: Option<String>,

    /// Root directory for bucket directories
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_root: Option<PathBuf>,
}

impl Args {
    /// Applies command-line overrides on top of file values.
    pub fn apply_to(&self, config: &mut AgentConfig) {
        if let Some(concurrency) = self.concurrency {
            config.concurrency = usize::from(concurrency);
        }
        if let Some(storage_api) = &self.storage_api {
            config.storage_api.clone_from(storage_api);
        }
        if let Some(token) = &self.token {
            config.token.clone_from(token);
        }
        if let Some(area_id) = &self.area_id {
            config.area_id.clone_from(area_id);
        }
        if let Some(output_root) = &self.output_root {
            config.output_root.clone_from(output_root);
        }
    }

    /// Default log level when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}
