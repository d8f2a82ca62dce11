//! Rule repository
//!
//! Holds the current app-scoping and domain rules plus the filter flags, and
//! signals every change to registered listeners. The tunnel subscribes its
//! rebuild entry point, so any edit tears the interface down and re-creates
//! it with fresh state.

use crate::config::Config;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// Consistent copy of the rule state at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSnapshot {
    /// Application identifiers whose traffic is captured
    pub blocked_apps: HashSet<String>,
    /// User blocklist domains
    pub blocked_domains: HashSet<String>,
    /// Master filtering switch
    pub filtering_enabled: bool,
    /// Pre-listed (Bloom) tier switch
    pub prelisted_enabled: bool,
    /// Upstream DNS servers
    pub dns_servers: Vec<Ipv4Addr>,
}

type Listener = Box<dyn Fn(&RuleSnapshot) + Send + Sync>;

/// Live rule store with change notification
pub struct RuleRepository {
    state: RwLock<RuleSnapshot>,
    listeners: RwLock<Vec<Listener>>,
}

impl RuleRepository {
    /// Create a repository seeded from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            state: RwLock::new(RuleSnapshot {
                blocked_apps: config.apps.allowed.iter().cloned().collect(),
                blocked_domains: config.filter.user_domains.iter().cloned().collect(),
                filtering_enabled: config.filter.enabled,
                prelisted_enabled: config.filter.prelisted_enabled,
                dns_servers: config.tunnel.dns_servers.clone(),
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a change listener; invoked after every mutation
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&RuleSnapshot) + Send + Sync + 'static,
    {
        self.listeners.write().push(Box::new(listener));
    }

    /// Current rule state
    pub fn snapshot(&self) -> RuleSnapshot {
        self.state.read().clone()
    }

    /// Replace the captured-application set
    pub fn set_blocked_apps(&self, apps: HashSet<String>) {
        let count = apps.len();
        self.state.write().blocked_apps = apps;
        info!(count, "Blocked packages updated");
        self.notify();
    }

    /// Add one application identifier
    pub fn add_blocked_app(&self, app: &str) {
        self.state.write().blocked_apps.insert(app.to_string());
        self.notify();
    }

    /// Remove one application identifier
    pub fn remove_blocked_app(&self, app: &str) {
        self.state.write().blocked_apps.remove(app);
        self.notify();
    }

    /// Replace the user domain blocklist
    pub fn set_blocked_domains(&self, domains: HashSet<String>) {
        let count = domains.len();
        self.state.write().blocked_domains =
            domains.into_iter().map(|d| d.to_lowercase()).collect();
        info!(count, "DNS blocklist updated");
        self.notify();
    }

    /// Add one domain to the user blocklist
    pub fn add_blocked_domain(&self, domain: &str) {
        self.state
            .write()
            .blocked_domains
            .insert(domain.to_lowercase());
        self.notify();
    }

    /// Remove one domain from the user blocklist
    pub fn remove_blocked_domain(&self, domain: &str) {
        self.state
            .write()
            .blocked_domains
            .remove(&domain.to_lowercase());
        self.notify();
    }

    /// Toggle the master filtering switch
    pub fn set_filtering_enabled(&self, value: bool) {
        self.state.write().filtering_enabled = value;
        info!(enabled = value, "DNS filtering toggled");
        self.notify();
    }

    /// Toggle the pre-listed tier
    pub fn set_prelisted_enabled(&self, value: bool) {
        self.state.write().prelisted_enabled = value;
        info!(enabled = value, "Pre-listed tier toggled");
        self.notify();
    }

    /// Replace the upstream server list
    pub fn set_dns_servers(&self, servers: Vec<Ipv4Addr>) {
        self.state.write().dns_servers = servers;
        self.notify();
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        let listeners = self.listeners.read();
        debug!(listeners = listeners.len(), "Broadcasting rule change");
        for listener in listeners.iter() {
            listener(&snapshot);
        }
    }
}
