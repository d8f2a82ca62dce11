//! Tunnel lifecycle management
//!
//! Owns all per-session state (classifier, counters, device, worker) and
//! rebuilds it wholesale on every start or rule change. Nothing here is
//! process-global: state is constructed at tunnel start, torn down at stop,
//! and injected into the loop by reference.

use crate::device::{TunDevice, TunProvider};
use crate::packet_loop::PacketLoop;
use crate::upstream::UpstreamResolver;
use dnsveil_core::filter::{BloomIndex, UserBlocklist};
use dnsveil_core::{
    Config, Counters, CountersSnapshot, DomainClassifier, Error, Result, RuleSnapshot,
    TunnelConfig,
};
use parking_lot::Mutex;
use std::io::BufRead;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Tunnel lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// No interface, no worker
    Stopped,
    /// Building session state and establishing the interface
    Starting,
    /// Worker loop processing packets
    Running,
    /// Tearing down
    Stopping,
}

/// Per-session owned state
struct ActiveTunnel {
    device: Arc<dyn TunDevice>,
    worker: JoinHandle<()>,
    counters: Arc<Counters>,
}

/// Owns the tunnel interface lifecycle and the packet worker
pub struct TunnelManager {
    config: Config,
    provider: Box<dyn TunProvider>,
    state: Mutex<TunnelState>,
    active: Mutex<Option<ActiveTunnel>>,
}

impl TunnelManager {
    /// Create a manager; nothing runs until [`start`](Self::start)
    pub fn new(config: Config, provider: Box<dyn TunProvider>) -> Self {
        Self {
            config,
            provider,
            state: Mutex::new(TunnelState::Stopped),
            active: Mutex::new(None),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> TunnelState {
        *self.state.lock()
    }

    /// Whether a worker loop is active
    pub fn is_running(&self) -> bool {
        self.state() == TunnelState::Running
    }

    /// Snapshot of the active session's counters
    pub fn counters(&self) -> Option<CountersSnapshot> {
        self.active.lock().as_ref().map(|a| a.counters.snapshot())
    }

    /// Establish the tunnel from the given rule snapshot.
    ///
    /// An already-running tunnel is torn down first; rule changes always get
    /// a fresh interface rather than a live patch. On any failure the
    /// manager returns to `Stopped` with no partial state left behind.
    pub fn start(&self, rules: &RuleSnapshot) -> Result<()> {
        self.stop();
        *self.state.lock() = TunnelState::Starting;
        info!("Building tunnel session");

        match self.build_session(rules) {
            Ok(active) => {
                *self.active.lock() = Some(active);
                *self.state.lock() = TunnelState::Running;
                info!("Tunnel running");
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = TunnelState::Stopped;
                Err(e)
            }
        }
    }

    /// Apply changed rules: full teardown and rebuild
    pub fn apply_updates(&self, rules: &RuleSnapshot) -> Result<()> {
        info!("Applying rule updates; rebuilding tunnel");
        self.start(rules)
    }

    /// Close the interface (failing the blocked read), join the worker and
    /// mark the tunnel inactive. In-flight upstream requests are not drained.
    pub fn stop(&self) {
        let Some(active) = self.active.lock().take() else {
            return;
        };
        *self.state.lock() = TunnelState::Stopping;
        info!("Stopping tunnel");

        if let Err(e) = active.device.close() {
            warn!(error = %e, "Failed to close tunnel device");
        }
        if active.worker.join().is_err() {
            warn!("Tunnel worker panicked");
        }

        *self.state.lock() = TunnelState::Stopped;
        info!("Tunnel stopped");
    }

    fn build_session(&self, rules: &RuleSnapshot) -> Result<ActiveTunnel> {
        let tunnel_config = self.tunnel_config(rules);
        let upstream = tunnel_config
            .primary_dns()
            .ok_or_else(|| Error::Config("no upstream DNS server configured".to_string()))?;

        // Bloom tier first: built or loaded before the loop ever reads, so
        // it needs no locking afterward
        let prelisted = self.ensure_prelisted();

        let userlist = UserBlocklist::with_domains(rules.blocked_domains.iter());
        let classifier = Arc::new(DomainClassifier::new(prelisted, userlist));
        classifier.set_filtering_enabled(rules.filtering_enabled);
        classifier.set_prelisted_enabled(rules.prelisted_enabled);

        let counters = Arc::new(match &self.config.stats.file {
            Some(path) => Counters::with_store(path),
            None => Counters::new(),
        });

        let resolver = UpstreamResolver::new(upstream)?;
        let device = self.provider.establish(&tunnel_config)?;

        let packet_loop = PacketLoop::new(device.clone(), classifier, resolver, counters.clone());
        let worker = std::thread::Builder::new()
            .name("dnsveil-loop".to_string())
            .spawn(move || packet_loop.run())?;

        Ok(ActiveTunnel {
            device,
            worker,
            counters,
        })
    }

    /// Assemble the wholesale interface description for this session
    fn tunnel_config(&self, rules: &RuleSnapshot) -> TunnelConfig {
        let dns_servers = if rules.dns_servers.is_empty() {
            self.config.tunnel.dns_servers.clone()
        } else {
            rules.dns_servers.clone()
        };

        // The controlling app never routes through its own tunnel
        let mut allowed_apps: Vec<String> = rules
            .blocked_apps
            .iter()
            .filter(|app| **app != self.config.apps.own_id)
            .cloned()
            .collect();
        allowed_apps.sort();

        TunnelConfig {
            session: self.config.tunnel.session.clone(),
            address: self.config.tunnel.address,
            mtu: self.config.tunnel.mtu,
            dns_servers,
            allowed_apps,
            excluded_app: self.config.apps.own_id.clone(),
        }
    }

    /// Load the persisted Bloom index, building it from the source corpus
    /// when missing. Any failure disables the tier for this session.
    fn ensure_prelisted(&self) -> Option<BloomIndex> {
        let filter = &self.config.filter;
        let Some(bloom_path) = &filter.bloom_path else {
            debug!("No Bloom index configured; pre-listed tier disabled");
            return None;
        };

        match BloomIndex::load(bloom_path) {
            Ok(index) => return Some(index),
            Err(e) => {
                info!(error = %e, "Pre-listed Bloom index not loadable; building from source")
            }
        }

        let Some(source) = &filter.source_path else {
            warn!("No pre-listed source corpus configured; pre-listed tier disabled");
            return None;
        };

        let file = match std::fs::File::open(source) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %source.display(), error = %e, "Cannot read pre-listed corpus");
                return None;
            }
        };
        let domains = std::io::BufReader::new(file)
            .lines()
            .map_while(std::io::Result::ok);

        let index = match BloomIndex::build(domains, filter.approx_count, None, None) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Failed to build Bloom index");
                return None;
            }
        };

        if let Err(e) = index.persist(bloom_path) {
            warn!(path = %bloom_path.display(), error = %e, "Failed to persist Bloom index");
        }
        Some(index)
    }
}

impl Drop for TunnelManager {
    fn drop(&mut self) {
        self.stop();
    }
}
