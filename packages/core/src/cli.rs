use std::path::PathBuf;

use clap::Parser;

/// Chain alerter CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "chain-alerter",
    version,
    about = "Classify blockchain node metric rounds into severity alerts"
)]
pub struct Cli {
    /// Path to the JSON alerts configuration
    #[arg(long)]
    pub alerts_config: Option<PathBuf>,

    /// Newline-delimited JSON metric rounds to replay (`-` for stdin)
    #[arg(long)]
    pub input: Option<String>,

    /// Print Prometheus metrics to stderr once the replay ends
    #[arg(long)]
    pub print_metrics: bool,
}
