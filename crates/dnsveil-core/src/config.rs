//! Configuration management
//!
//! Strongly-typed TOML configuration plus the wholesale-rebuilt runtime
//! [`TunnelConfig`] handed to the device provider on every tunnel start.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tunnel interface settings
    pub tunnel: TunnelSettings,

    /// Per-application capture scoping
    pub apps: AppScopeSettings,

    /// Blocklist settings
    pub filter: FilterSettings,

    /// Statistics persistence
    pub stats: StatsSettings,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| Error::ConfigNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tunnel.dns_servers.is_empty() {
            return Err(Error::config_value(
                "tunnel.dns_servers",
                "at least one upstream DNS server is required",
            ));
        }
        if self.tunnel.mtu < 576 {
            return Err(Error::config_value(
                "tunnel.mtu",
                format!("{} is below the IPv4 minimum of 576", self.tunnel.mtu),
            ));
        }
        if self.filter.approx_count == 0 {
            return Err(Error::config_value(
                "filter.approx_count",
                "must be nonzero",
            ));
        }
        Ok(())
    }

    /// Serialize to a TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Tunnel interface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    /// Session name shown by the platform
    pub session: String,
    /// Virtual interface address (always a /32)
    pub address: Ipv4Addr,
    /// Interface MTU
    pub mtu: u16,
    /// Upstream DNS servers; only these get host routes through the tunnel
    pub dns_servers: Vec<Ipv4Addr>,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            session: "dnsveil".to_string(),
            address: Ipv4Addr::new(10, 0, 0, 2),
            mtu: 1500,
            dns_servers: vec![Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(8, 8, 8, 8)],
        }
    }
}

/// Per-application capture scoping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppScopeSettings {
    /// Applications whose traffic enters the tunnel; empty captures all
    pub allowed: Vec<String>,
    /// Identifier of the controlling application, always excluded
    pub own_id: String,
}

impl Default for AppScopeSettings {
    fn default() -> Self {
        Self {
            allowed: Vec::new(),
            own_id: "dnsveil".to_string(),
        }
    }
}

/// Blocklist settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Master filtering switch
    pub enabled: bool,
    /// Pre-listed (Bloom) tier switch
    pub prelisted_enabled: bool,
    /// Persisted Bloom index location
    pub bloom_path: Option<PathBuf>,
    /// Newline-separated corpus used to build the index when missing
    pub source_path: Option<PathBuf>,
    /// Approximate size of the pre-listed corpus
    pub approx_count: u32,
    /// Initial user blocklist entries
    pub user_domains: Vec<String>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            prelisted_enabled: true,
            bloom_path: None,
            source_path: None,
            approx_count: 322_506,
            user_domains: Vec::new(),
        }
    }
}

/// Statistics persistence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    /// Durable counters file; omitted keeps counters in memory only
    pub file: Option<PathBuf>,
}

/// Runtime interface description, rebuilt wholesale on every start or rule
/// change; never patched incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    /// Session name shown by the platform
    pub session: String,
    /// Virtual interface address (/32)
    pub address: Ipv4Addr,
    /// Interface MTU
    pub mtu: u16,
    /// Upstream DNS servers, first entry is the relay target
    pub dns_servers: Vec<Ipv4Addr>,
    /// Applications captured into the tunnel; empty captures everything
    /// except `excluded_app`
    pub allowed_apps: Vec<String>,
    /// The controlling application, excluded to prevent a self-loop
    pub excluded_app: String,
}

impl TunnelConfig {
    /// Host (/32) routes pulled into the tunnel: exactly the upstream
    /// server addresses, so non-DNS traffic never enters.
    pub fn host_routes(&self) -> Vec<Ipv4Addr> {
        self.dns_servers.clone()
    }

    /// The upstream server queries are relayed to
    pub fn primary_dns(&self) -> Option<Ipv4Addr> {
        self.dns_servers.first().copied()
    }
}
