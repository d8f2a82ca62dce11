//! Platform-agnostic tunnel device interface
//!
//! These traits define the interface that platform-specific implementations
//! must follow. The packet loop blocks in [`TunDevice::recv`]; closing the
//! device from another thread is the only cancellation mechanism.

use dnsveil_core::{Result, TunnelConfig};
use std::io;
use std::sync::Arc;

/// A virtual network interface carrying raw IP frames
pub trait TunDevice: Send + Sync {
    /// Read one frame into `buf`, blocking until one is available.
    ///
    /// Returns an error once the device has been closed; the packet loop
    /// treats that as its exit signal.
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write one frame back into the tunnel
    fn send(&self, buf: &[u8]) -> io::Result<usize>;

    /// Close the device descriptor, failing any blocked read
    fn close(&self) -> io::Result<()>;
}

/// Establishes tunnel devices from a [`TunnelConfig`]
///
/// Implemented per platform; the manager injects one so the rest of the
/// runtime never touches OS specifics.
pub trait TunProvider: Send + Sync {
    /// Create the interface described by `config`: virtual address, MTU and
    /// host routes for exactly the upstream DNS servers. On failure no
    /// partial interface state may be left behind.
    fn establish(&self, config: &TunnelConfig) -> Result<Arc<dyn TunDevice>>;
}
