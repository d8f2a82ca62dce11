//! Linux TUN device
//!
//! Opens `/dev/net/tun`, attaches an interface with `TUNSETIFF`, and
//! configures address, MTU and host routes through the `ip` utility.

use crate::device::{TunDevice, TunProvider};
use dnsveil_core::{Error, Result, TunnelConfig};
use std::io;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TUN_PATH: &[u8] = b"/dev/net/tun\0";
const TUNSETIFF: libc::c_ulong = 0x4004_54ca;
const IFF_TUN: libc::c_short = 0x0001;
const IFF_NO_PI: libc::c_short = 0x1000;

#[repr(C)]
struct IfReq {
    ifr_name: [u8; libc::IFNAMSIZ],
    ifr_flags: libc::c_short,
    _pad: [u8; 22],
}

/// Provider creating kernel TUN interfaces
pub struct LinuxTunProvider {
    /// Interface name to request (e.g. `dnsveil0`)
    pub ifname: String,
}

impl LinuxTunProvider {
    /// Provider with the default interface name
    pub fn new() -> Self {
        Self {
            ifname: "dnsveil0".to_string(),
        }
    }
}

impl Default for LinuxTunProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TunProvider for LinuxTunProvider {
    fn establish(&self, config: &TunnelConfig) -> Result<Arc<dyn TunDevice>> {
        if !config.allowed_apps.is_empty() {
            // Per-app scoping needs platform support the plain TUN path
            // does not have; the rule still travels in the config.
            warn!(
                apps = config.allowed_apps.len(),
                "Per-application scoping is not supported on this platform; capturing by route only"
            );
        }

        let device = LinuxTun::open(&self.ifname)?;

        for args in interface_commands(&self.ifname, config) {
            debug!(command = ?args, "Configuring interface");
            let status = Command::new("ip")
                .args(&args)
                .status()
                .map_err(|e| Error::Device(format!("failed to run ip: {e}")))?;
            if !status.success() {
                // Leave nothing half-configured behind
                let _ = device.close();
                return Err(Error::Device(format!(
                    "ip {} exited with {status}",
                    args.join(" ")
                )));
            }
        }

        info!(
            ifname = %self.ifname,
            address = %config.address,
            mtu = config.mtu,
            routes = config.host_routes().len(),
            "Tunnel interface established"
        );

        Ok(Arc::new(device))
    }
}

/// The `ip` invocations that bring the interface up: address, MTU, link
/// state, then one /32 host route per upstream server.
fn interface_commands(ifname: &str, config: &TunnelConfig) -> Vec<Vec<String>> {
    let mut commands = vec![
        vec![
            "addr".into(),
            "add".into(),
            format!("{}/32", config.address),
            "dev".into(),
            ifname.into(),
        ],
        vec![
            "link".into(),
            "set".into(),
            ifname.into(),
            "mtu".into(),
            config.mtu.to_string(),
            "up".into(),
        ],
    ];
    for server in config.host_routes() {
        commands.push(vec![
            "route".into(),
            "add".into(),
            format!("{server}/32"),
            "dev".into(),
            ifname.into(),
        ]);
    }
    commands
}

/// Kernel TUN descriptor
struct LinuxTun {
    fd: libc::c_int,
    closed: AtomicBool,
}

impl LinuxTun {
    fn open(ifname: &str) -> Result<Self> {
        if ifname.len() >= libc::IFNAMSIZ {
            return Err(Error::Device(format!("interface name too long: {ifname}")));
        }

        let fd = unsafe { libc::open(TUN_PATH.as_ptr().cast(), libc::O_RDWR) };
        if fd < 0 {
            return Err(Error::Device(format!(
                "failed to open /dev/net/tun: {}",
                io::Error::last_os_error()
            )));
        }

        let mut req = IfReq {
            ifr_name: [0; libc::IFNAMSIZ],
            ifr_flags: IFF_TUN | IFF_NO_PI,
            _pad: [0; 22],
        };
        req.ifr_name[..ifname.len()].copy_from_slice(ifname.as_bytes());

        let rc = unsafe { libc::ioctl(fd, TUNSETIFF, &req) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(Error::Device(format!("TUNSETIFF failed: {err}")));
        }

        Ok(Self {
            fd,
            closed: AtomicBool::new(false),
        })
    }
}

impl TunDevice for LinuxTun {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        let n = unsafe { libc::write(self.fd, buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let rc = unsafe { libc::close(self.fd) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Drop for LinuxTun {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
