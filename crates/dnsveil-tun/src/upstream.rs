//! Upstream DNS relay
//!
//! One shared datagram socket per tunnel session. A query is sent to the
//! first configured upstream server and a single reply is awaited; there is
//! no retry and no secondary server.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;
use tracing::debug;

/// How long to wait for an upstream reply before dropping the query
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest upstream reply we accept
const MAX_REPLY_SIZE: usize = 1500;

/// Blocking resolver over a shared UDP socket
pub struct UpstreamResolver {
    socket: UdpSocket,
    server: SocketAddr,
}

impl UpstreamResolver {
    /// Resolver targeting `server` on port 53
    pub fn new(server: Ipv4Addr) -> io::Result<Self> {
        Self::with_target(SocketAddr::V4(SocketAddrV4::new(server, 53)))
    }

    /// Resolver targeting an explicit address (tests use loopback targets)
    pub fn with_target(server: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_read_timeout(Some(UPSTREAM_TIMEOUT))?;
        debug!(upstream = %server, "Upstream resolver socket bound");
        Ok(Self { socket, server })
    }

    /// The server queries are relayed to
    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Relay one raw DNS query and wait for a single reply.
    ///
    /// A timeout or socket error means the query is unanswerable; the caller
    /// drops it and moves on.
    pub fn resolve(&self, query: &[u8]) -> io::Result<Vec<u8>> {
        self.socket.send_to(query, self.server)?;

        let mut buf = vec![0u8; MAX_REPLY_SIZE];
        let (len, _from) = self.socket.recv_from(&mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Local stand-in for an upstream server: answers each query with the
    /// query bytes, QR bit set.
    fn spawn_fake_upstream(replies: usize) -> SocketAddr {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || {
            let mut buf = [0u8; 2048];
            for _ in 0..replies {
                let Ok((len, from)) = server.recv_from(&mut buf) else {
                    return;
                };
                let mut reply = buf[..len].to_vec();
                if reply.len() >= 3 {
                    reply[2] |= 0x80;
                }
                let _ = server.send_to(&reply, from);
            }
        });
        addr
    }

    #[test]
    fn test_resolve_roundtrip() {
        let upstream = spawn_fake_upstream(1);
        let resolver = UpstreamResolver::with_target(upstream).unwrap();

        let query = [0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let reply = resolver.resolve(&query).unwrap();

        assert_eq!(reply.len(), query.len());
        assert_eq!(reply[2], 0x81); // QR bit set by the fake upstream
        assert_eq!(reply[0], 0x12);
    }

    #[test]
    fn test_timeout_on_silent_upstream() {
        // Bound socket that never answers
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let resolver = UpstreamResolver::with_target(silent.local_addr().unwrap()).unwrap();

        let err = resolver.resolve(&[0u8; 12]).unwrap_err();
        assert!(matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ));
    }
}
