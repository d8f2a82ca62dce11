//! # dnsveil Core
//!
//! Platform-independent core library for the DNS filtering tunnel.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Packet parsing and synthesis** - IPv4/UDP frame handling and
//!   checksum-correct response crafting
//! - **DNS codec** - minimal QNAME extraction from raw queries
//! - **Two-tier filtering** - pre-seeded Bloom index plus exact user list
//!   behind a single classifier
//! - **Counters** - session and durable tunnel statistics
//! - **Configuration and rules** - TOML configuration and the live rule
//!   repository the tunnel rebuilds from
//!
//! ## Example
//!
//! ```rust
//! use dnsveil_core::filter::{BloomIndex, Classification, DomainClassifier, UserBlocklist};
//!
//! let bloom = BloomIndex::build(["bad.example"], 1, Some(1024), None)?;
//! let userlist = UserBlocklist::with_domains(["tracker.example"]);
//! let classifier = DomainClassifier::new(Some(bloom), userlist);
//!
//! assert_eq!(classifier.classify("bad.example"), Classification::BlockPrelisted);
//! assert_eq!(classifier.classify("ok.example"), Classification::Allow);
//! # Ok::<(), dnsveil_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dns;
pub mod error;
pub mod filter;
pub mod packet;
pub mod rules;
pub mod stats;

// Re-exports for convenience
pub use config::{Config, TunnelConfig};
pub use error::{Error, Result};
pub use filter::{Classification, DomainClassifier};
pub use packet::Packet;
pub use rules::{RuleRepository, RuleSnapshot};
pub use stats::{Counters, CountersSnapshot};
