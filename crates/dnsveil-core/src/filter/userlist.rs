//! User-curated exact blocklist
//!
//! Small, mutable set of normalized domains with suffix semantics: an entry
//! blocks itself and every subdomain. Mutations replace the whole set under
//! the write lock, so the packet loop never observes a partial edit.

use crate::filter::normalize_host;
use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::{debug, info};

/// Exact/suffix-match domain set driven by user edits
#[derive(Debug, Default)]
pub struct UserBlocklist {
    entries: RwLock<HashSet<String>>,
}

impl UserBlocklist {
    /// Create an empty blocklist
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashSet::new()),
        }
    }

    /// Create a blocklist seeded with `domains`
    pub fn with_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = Self::new();
        list.set(domains);
        list
    }

    /// Replace the entire set
    pub fn set<I, S>(&self, domains: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized: HashSet<String> = domains
            .into_iter()
            .map(|d| normalize_host(d.as_ref()))
            .filter(|d| !d.is_empty())
            .collect();
        let size = normalized.len();
        *self.entries.write() = normalized;
        info!(size, "Replaced user blocklist");
    }

    /// Add one domain
    pub fn add(&self, domain: &str) {
        let norm = normalize_host(domain);
        if norm.is_empty() {
            return;
        }
        let mut next = self.entries.read().clone();
        next.insert(norm.clone());
        let size = next.len();
        *self.entries.write() = next;
        debug!(domain = %norm, size, "Added domain to user blocklist");
    }

    /// Remove one domain
    pub fn remove(&self, domain: &str) {
        let norm = normalize_host(domain);
        let mut next = self.entries.read().clone();
        next.remove(&norm);
        let size = next.len();
        *self.entries.write() = next;
        debug!(domain = %norm, size, "Removed domain from user blocklist");
    }

    /// Check whether `host` equals an entry or is a subdomain of one.
    ///
    /// Any match blocks; there is no ordering or priority among entries.
    pub fn is_blocked(&self, host: &str) -> bool {
        let h = normalize_host(host);
        if h.is_empty() {
            return false;
        }
        let entries = self.entries.read();
        entries
            .iter()
            .any(|d| h == *d || h.ends_with(&format!(".{d}")))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Current entries, sorted (for display and persistence)
    pub fn domains(&self) -> Vec<String> {
        let mut out: Vec<String> = self.entries.read().iter().cloned().collect();
        out.sort();
        out
    }
}
