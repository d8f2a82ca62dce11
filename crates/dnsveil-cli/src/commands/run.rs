//! Run command - main tunnel execution

use anyhow::{Context, Result};
use clap::Args;
use dnsveil_core::{Config, RuleRepository};
use dnsveil_tun::TunnelManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Run command arguments
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<String>,

    /// User blocklist file (one domain per line, # comments)
    #[arg(short = 'b', long, value_name = "FILE")]
    pub blocklist: Option<String>,

    /// Upstream DNS server, overriding the configuration
    #[arg(long, value_name = "IP")]
    pub dns_addr: Option<String>,

    /// Persisted Bloom index path, overriding the configuration
    #[arg(long, value_name = "FILE")]
    pub bloom: Option<String>,

    /// Disable the pre-listed (Bloom) tier
    #[arg(long)]
    pub no_prelisted: bool,

    /// Validate configuration without establishing the tunnel
    #[arg(long)]
    pub dry_run: bool,
}

/// Execute the run command
pub fn execute(args: RunArgs) -> Result<()> {
    info!("Starting dnsveil...");

    let config = load_config(&args)?;
    info!(
        upstreams = config.tunnel.dns_servers.len(),
        filtering = config.filter.enabled,
        prelisted = config.filter.prelisted_enabled,
        "Loaded configuration"
    );

    if args.dry_run {
        warn!("Dry run mode - tunnel will not be established");
        info!("Configuration validated successfully");
        return Ok(());
    }

    let rules = Arc::new(RuleRepository::from_config(&config));
    let manager = Arc::new(TunnelManager::new(config, provider()?));

    manager
        .start(&rules.snapshot())
        .context("Failed to establish the tunnel")?;

    // Any rule change tears the interface down and rebuilds it
    {
        let manager = manager.clone();
        rules.subscribe(move |snapshot| {
            if let Err(e) = manager.apply_updates(snapshot) {
                error!(error = %e, "Failed to rebuild tunnel after rule change");
            }
        });
    }

    // Set up signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(500));
    }

    if let Some(snapshot) = manager.counters() {
        info!(
            bytes_in = snapshot.bytes_in,
            bytes_out = snapshot.bytes_out,
            dns_queries = snapshot.dns_queries,
            dns_blocked = snapshot.dns_blocked,
            "Final session counters"
        );
    }
    manager.stop();
    info!("dnsveil stopped");

    Ok(())
}

#[cfg(target_os = "linux")]
fn provider() -> Result<Box<dyn dnsveil_tun::TunProvider>> {
    Ok(Box::new(dnsveil_tun::LinuxTunProvider::new()))
}

#[cfg(not(target_os = "linux"))]
fn provider() -> Result<Box<dyn dnsveil_tun::TunProvider>> {
    anyhow::bail!("The tunnel device is only supported on Linux")
}

fn load_config(args: &RunArgs) -> Result<Config> {
    let mut config = if let Some(ref config_path) = args.config {
        Config::load(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path))?
    } else {
        Config::default()
    };

    // Apply command-line overrides
    if let Some(ref dns) = args.dns_addr {
        let ip: std::net::Ipv4Addr = dns
            .parse()
            .with_context(|| format!("Invalid DNS address: {}", dns))?;
        config.tunnel.dns_servers = vec![ip];
    }

    if let Some(ref bloom) = args.bloom {
        config.filter.bloom_path = Some(bloom.into());
    }

    if args.no_prelisted {
        config.filter.prelisted_enabled = false;
    }

    if let Some(ref blocklist_path) = args.blocklist {
        let domains = load_blocklist(blocklist_path)?;
        info!(count = domains.len(), "Loaded user blocklist");
        config.filter.user_domains = domains;
    }

    config.validate()?;
    Ok(config)
}

fn load_blocklist(path: &str) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read blocklist file: {}", path))?;

    let domains: Vec<String> = content
        .lines()
        .filter(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|s| s.trim().to_lowercase())
        .collect();

    Ok(domains)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_blocklist() {
        let content = "# Comment\nexample.com\n  Test.org  \n\nfoo.bar\n";
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("blocklist.txt");
        std::fs::write(&path, content).unwrap();

        let domains = load_blocklist(path.to_str().unwrap()).unwrap();
        assert_eq!(domains.len(), 3);
        assert!(domains.contains(&"example.com".to_string()));
        assert!(domains.contains(&"test.org".to_string()));
        assert!(domains.contains(&"foo.bar".to_string()));
    }

    #[test]
    fn test_overrides() {
        let args = RunArgs {
            dns_addr: Some("9.9.9.9".to_string()),
            no_prelisted: true,
            ..Default::default()
        };
        let config = load_config(&args).unwrap();
        assert_eq!(
            config.tunnel.dns_servers,
            vec![std::net::Ipv4Addr::new(9, 9, 9, 9)]
        );
        assert!(!config.filter.prelisted_enabled);
    }

    #[test]
    fn test_invalid_dns_addr() {
        let args = RunArgs {
            dns_addr: Some("not-an-ip".to_string()),
            ..Default::default()
        };
        assert!(load_config(&args).is_err());
    }
}
