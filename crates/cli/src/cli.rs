use clap::{Parser, Subcommand};

/// Bronze layer ingestion for the sbit data set.
///
/// Lands raw CSV and JSON-lines units into append-only bronze tables and
/// validates the committed record counts.
#[derive(Parser, Debug)]
#[command(name = "bronze", version, about = "Bronze layer ingestion and validation")]
pub struct CliArgs {
    /// Config profile; keys are read as `{PROFILE}_{KEY}` first.
    #[arg(long, env = "BRONZE_PROFILE", global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest every source into its bronze table.
    Consume {
        /// Keep polling for new units until interrupted (Ctrl-C).
        #[arg(long)]
        continuous: bool,

        /// Poll interval in seconds for continuous mode (default: POLL_INTERVAL_SECS).
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Assert committed record counts for the given number of data sets.
    Validate {
        #[arg(long, default_value_t = 1)]
        sets: u32,
    },

    /// Finite consumption followed by validation.
    Run {
        #[arg(long, default_value_t = 1)]
        sets: u32,
    },
}
