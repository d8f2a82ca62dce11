//! Stats command - inspect or reset persisted counters

use anyhow::{Context, Result};
use clap::Args;
use dnsveil_core::Counters;
use tracing::info;

/// Stats command arguments
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Persisted stats file
    #[arg(short = 'f', long, value_name = "FILE")]
    pub file: String,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,

    /// Reset the persisted query/block counters
    #[arg(long)]
    pub reset: bool,
}

/// Execute the stats command
pub fn execute(args: StatsArgs) -> Result<()> {
    let counters = Counters::with_store(&args.file);

    if args.reset {
        counters.reset_dns();
        info!(file = %args.file, "Persisted DNS counters reset");
    }

    let snapshot = counters.snapshot();
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize counters")?
        );
    } else {
        println!("DNS queries: {}", snapshot.dns_queries);
        println!("DNS blocked: {}", snapshot.dns_blocked);
    }

    Ok(())
}
