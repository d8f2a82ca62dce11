//! Session and durable tunnel statistics
//!
//! Byte counters are session-scoped and start at zero on every tunnel start.
//! Query/block counters persist across restarts until explicitly reset; each
//! increment writes the durable pair back to the stats file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Durable fields, stored as a small TOML file
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct PersistedStats {
    dns_queries: u64,
    dns_blocked: u64,
}

/// Read-only view of all counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    /// Bytes read from the tunnel device this session
    pub bytes_in: u64,
    /// Bytes written back to the tunnel device this session
    pub bytes_out: u64,
    /// DNS queries seen (durable)
    pub dns_queries: u64,
    /// DNS queries blocked (durable)
    pub dns_blocked: u64,
}

/// Atomic tunnel counters, owned by the tunnel manager
#[derive(Debug, Default)]
pub struct Counters {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    dns_queries: AtomicU64,
    dns_blocked: AtomicU64,
    store: Option<PathBuf>,
}

impl Counters {
    /// Counters without persistence (tests, ephemeral sessions)
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters backed by a stats file.
    ///
    /// Existing durable values are loaded; an unreadable or malformed file
    /// starts the durable pair at zero.
    pub fn with_store(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let persisted = match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str::<PersistedStats>(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Malformed stats file; starting at zero");
                PersistedStats::default()
            }),
            Err(_) => PersistedStats::default(),
        };

        Self {
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            dns_queries: AtomicU64::new(persisted.dns_queries),
            dns_blocked: AtomicU64::new(persisted.dns_blocked),
            store: Some(path),
        }
    }

    /// Count bytes read from the device
    pub fn inc_bytes_in(&self, delta: u64) {
        if delta > 0 {
            self.bytes_in.fetch_add(delta, Ordering::Relaxed);
        }
    }

    /// Count bytes written back to the device
    pub fn inc_bytes_out(&self, delta: u64) {
        if delta > 0 {
            self.bytes_out.fetch_add(delta, Ordering::Relaxed);
        }
    }

    /// Count one DNS query and persist the durable pair
    pub fn inc_dns_queries(&self) {
        self.dns_queries.fetch_add(1, Ordering::Relaxed);
        self.persist();
    }

    /// Count one blocked query and persist the durable pair
    pub fn inc_dns_blocked(&self) {
        self.dns_blocked.fetch_add(1, Ordering::Relaxed);
        self.persist();
    }

    /// Reset only the durable query/block counters; session byte counters
    /// are untouched
    pub fn reset_dns(&self) {
        self.dns_queries.store(0, Ordering::Relaxed);
        self.dns_blocked.store(0, Ordering::Relaxed);
        self.persist();
    }

    /// Read-only snapshot of all four counters
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            dns_queries: self.dns_queries.load(Ordering::Relaxed),
            dns_blocked: self.dns_blocked.load(Ordering::Relaxed),
        }
    }

    fn persist(&self) {
        let Some(path) = &self.store else {
            return;
        };
        let persisted = PersistedStats {
            dns_queries: self.dns_queries.load(Ordering::Relaxed),
            dns_blocked: self.dns_blocked.load(Ordering::Relaxed),
        };
        let content = match toml::to_string(&persisted) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "Failed to serialize stats");
                return;
            }
        };
        if let Err(e) = std::fs::write(path, content) {
            warn!(path = %path.display(), error = %e, "Failed to persist stats");
        }
    }
}
