use clap::Parser;

/// Utility threshold service CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "utility-thresholds",
    version,
    about = "Tracks utility consumption limits and reports breaches"
)]
pub struct Cli {
    /// HTTP port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// SQLite connection string
    #[arg(long)]
    pub database_url: Option<String>,

    /// Change-monitor polling interval in milliseconds
    #[arg(long)]
    pub monitoring_interval_ms: Option<u64>,

    /// Keep thresholds in memory instead of SQLite
    #[arg(long)]
    pub in_memory: bool,
}
