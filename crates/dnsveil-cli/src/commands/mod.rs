//! CLI commands

pub mod bloom;
pub mod run;
pub mod stats;

use clap::Subcommand;

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the DNS filtering tunnel (main command)
    Run(run::RunArgs),

    /// Build the pre-listed Bloom index from a domain corpus
    BuildBloom(bloom::BloomArgs),

    /// Show or reset persisted tunnel statistics
    Stats(stats::StatsArgs),
}
