//! Domain classification
//!
//! Combines the pre-seeded Bloom tier and the exact user tier behind two
//! independent runtime flags into a single ALLOW/BLOCK decision.

use crate::filter::{normalize_host, BloomIndex, UserBlocklist};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Outcome of classifying one queried host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Relay to the upstream resolver
    Allow,
    /// Matched the pre-seeded Bloom tier
    BlockPrelisted,
    /// Matched the user blocklist
    BlockUserlist,
}

impl Classification {
    /// Whether this decision drops the query
    pub fn is_blocked(self) -> bool {
        !matches!(self, Classification::Allow)
    }
}

/// Two-tier domain classifier.
///
/// The Bloom tier is checked first: it covers the bulk pre-seeded corpus in
/// O(1). The exact tier follows with zero-false-positive user overrides.
/// First matching tier decides.
pub struct DomainClassifier {
    filtering_enabled: AtomicBool,
    prelisted_enabled: AtomicBool,
    prelisted: Option<BloomIndex>,
    userlist: UserBlocklist,
}

impl DomainClassifier {
    /// Create a classifier; `prelisted` is `None` when the Bloom file could
    /// not be loaded or built, which disables that tier for the session.
    pub fn new(prelisted: Option<BloomIndex>, userlist: UserBlocklist) -> Self {
        Self {
            filtering_enabled: AtomicBool::new(true),
            prelisted_enabled: AtomicBool::new(true),
            prelisted,
            userlist,
        }
    }

    /// Master switch; when off every host is allowed
    pub fn set_filtering_enabled(&self, value: bool) {
        self.filtering_enabled.store(value, Ordering::Relaxed);
    }

    /// Whether filtering is enabled at all
    pub fn filtering_enabled(&self) -> bool {
        self.filtering_enabled.load(Ordering::Relaxed)
    }

    /// Toggle only the Bloom tier
    pub fn set_prelisted_enabled(&self, value: bool) {
        self.prelisted_enabled.store(value, Ordering::Relaxed);
    }

    /// Whether the Bloom tier is consulted
    pub fn prelisted_enabled(&self) -> bool {
        self.prelisted_enabled.load(Ordering::Relaxed)
    }

    /// Whether a Bloom index is present for this session
    pub fn has_prelisted(&self) -> bool {
        self.prelisted.is_some()
    }

    /// The mutable user tier
    pub fn userlist(&self) -> &UserBlocklist {
        &self.userlist
    }

    /// Classify a queried host name.
    pub fn classify(&self, host: &str) -> Classification {
        if !self.filtering_enabled() {
            return Classification::Allow;
        }

        let h = normalize_host(host);
        if h.is_empty() {
            return Classification::Allow;
        }

        if self.prelisted_enabled() {
            if let Some(index) = &self.prelisted {
                if index.query(&h) {
                    debug!(host = %h, "Bloom tier hit");
                    return Classification::BlockPrelisted;
                }
            }
        }

        if self.userlist.is_blocked(&h) {
            debug!(host = %h, "User tier hit");
            return Classification::BlockUserlist;
        }

        Classification::Allow
    }
}
