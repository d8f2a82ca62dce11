//! # dnsveil Tunnel Runtime
//!
//! Owns the virtual interface lifecycle and the blocking packet loop.
//!
//! ## Architecture
//!
//! - **device** - platform-agnostic [`TunDevice`]/[`TunProvider`] traits
//! - **linux** - kernel TUN implementation (Linux only)
//! - **upstream** - blocking UDP relay to the configured resolver
//! - **packet_loop** - the sequential read-classify-relay-write worker
//! - **manager** - per-session state ownership and rebuild-on-change
//!
//! The manager builds every piece of session state at start (Bloom index,
//! user list, classifier, counters, resolver, device), hands it to one
//! dedicated worker thread, and tears all of it down at stop. Rule changes
//! rebuild the interface wholesale.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod device;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod manager;
pub mod packet_loop;
pub mod upstream;

// Re-exports for convenience
pub use device::{TunDevice, TunProvider};
#[cfg(target_os = "linux")]
pub use linux::LinuxTunProvider;
pub use manager::{TunnelManager, TunnelState};
pub use packet_loop::PacketLoop;
pub use upstream::{UpstreamResolver, UPSTREAM_TIMEOUT};
