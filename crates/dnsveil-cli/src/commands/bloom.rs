//! Build-bloom command - pre-seed the Bloom index from a domain corpus

use anyhow::{Context, Result};
use clap::Args;
use dnsveil_core::filter::BloomIndex;
use std::time::Instant;
use tracing::info;

/// Build-bloom command arguments
#[derive(Args, Debug)]
pub struct BloomArgs {
    /// Domain corpus, one domain per line
    #[arg(short = 's', long, value_name = "FILE")]
    pub source: String,

    /// Output index file
    #[arg(short = 'o', long, value_name = "FILE")]
    pub out: String,

    /// Approximate corpus size; counted from the file when omitted
    #[arg(short = 'n', long, value_name = "COUNT")]
    pub count: Option<u32>,

    /// Bit array size; defaults to count * 10
    #[arg(short = 'm', long, value_name = "BITS")]
    pub m_bits: Option<u32>,

    /// Hash rounds
    #[arg(short = 'k', long, value_name = "ROUNDS")]
    pub hashes: Option<u32>,
}

/// Execute the build-bloom command
pub fn execute(args: BloomArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.source)
        .with_context(|| format!("Failed to read corpus from {}", args.source))?;
    let domains: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();

    let approx_count = args.count.unwrap_or(domains.len() as u32);
    info!(
        source = %args.source,
        domains = domains.len(),
        approx_count,
        "Building Bloom index"
    );

    let started = Instant::now();
    let index = BloomIndex::build(domains, approx_count, args.m_bits, args.hashes)?;
    index.persist(&args.out)?;

    info!(
        out = %args.out,
        m_bits = index.bit_len(),
        k_hashes = index.hash_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Bloom index written"
    );

    Ok(())
}
