//! dnsveil CLI
//!
//! Command-line interface for the DNS filtering tunnel.

mod args;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use args::Args;

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    logging::init(&args)?;

    // Print banner
    if !args.quiet {
        print_banner();
    }

    // Run the main logic
    let result = run(args);

    if let Err(ref e) = result {
        error!("Fatal error: {:#}", e);
    }

    result
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Some(commands::Command::Run(run_args)) => commands::run::execute(run_args),
        Some(commands::Command::BuildBloom(bloom_args)) => commands::bloom::execute(bloom_args),
        Some(commands::Command::Stats(stats_args)) => commands::stats::execute(stats_args),
        None => {
            // Default: run the tunnel with configuration defaults
            commands::run::execute(commands::run::RunArgs::default())
        }
    }
}

fn print_banner() {
    use colored::Colorize;

    println!();
    println!("{}", "╔═══════════════════════════════════════════╗".cyan());
    println!(
        "{}{}{}",
        "║  ".cyan(),
        "dnsveil".green().bold(),
        "                                  ║".cyan()
    );
    println!(
        "{}{}{}",
        "║  ".cyan(),
        "DNS filtering tunnel".white(),
        "                     ║".cyan()
    );
    println!("{}", "╚═══════════════════════════════════════════╝".cyan());
    println!();
}
