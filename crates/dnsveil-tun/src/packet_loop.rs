//! The read-classify-relay-write loop
//!
//! One dedicated worker runs this loop for the lifetime of a tunnel session.
//! Processing is strictly sequential: each query's upstream round trip
//! completes before the next frame is read. Cancellation happens by closing
//! the device, which fails the blocking read.

use crate::device::TunDevice;
use crate::upstream::UpstreamResolver;
use dnsveil_core::dns::parse_query_name;
use dnsveil_core::packet::{craft_dns_response, TrafficClass, MAX_PACKET_SIZE};
use dnsveil_core::{Classification, Counters, DomainClassifier, Packet};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Sequential packet processor for one tunnel session
pub struct PacketLoop {
    device: Arc<dyn TunDevice>,
    classifier: Arc<DomainClassifier>,
    resolver: UpstreamResolver,
    counters: Arc<Counters>,
}

impl PacketLoop {
    /// Assemble a loop over owned session state
    pub fn new(
        device: Arc<dyn TunDevice>,
        classifier: Arc<DomainClassifier>,
        resolver: UpstreamResolver,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            device,
            classifier,
            resolver,
            counters,
        }
    }

    /// Run until the device read fails (close or teardown).
    ///
    /// No per-packet error is allowed to end the loop: malformed frames are
    /// dropped, unparseable DNS queries are forwarded (fail-open), and
    /// upstream failures drop only the query at hand.
    pub fn run(self) {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        info!(upstream = %self.resolver.server(), "Packet loop started");

        loop {
            let len = match self.device.recv(&mut buf) {
                Ok(0) => continue,
                Ok(len) => len,
                Err(e) => {
                    warn!(error = %e, "Read from tunnel failed; stopping loop");
                    break;
                }
            };
            self.counters.inc_bytes_in(len as u64);

            let frame = &buf[..len];
            let candidate = match Packet::from_bytes(frame).map(|p| p.classify()) {
                Ok(TrafficClass::DnsQuery(candidate)) => candidate,
                Ok(TrafficClass::Other) => {
                    // Routing should only deliver DNS; drop anything else
                    trace!(len, "Dropping non-DNS frame");
                    continue;
                }
                Err(e) => {
                    trace!(error = %e, "Dropping unparseable frame");
                    continue;
                }
            };

            self.counters.inc_dns_queries();

            match parse_query_name(frame, candidate.dns_offset, len) {
                Some(qname) => match self.classifier.classify(&qname) {
                    Classification::BlockPrelisted => {
                        self.counters.inc_dns_blocked();
                        info!(host = %qname, "Blocked DNS (pre-listed)");
                        continue;
                    }
                    Classification::BlockUserlist => {
                        self.counters.inc_dns_blocked();
                        info!(host = %qname, "Blocked DNS (user list)");
                        continue;
                    }
                    Classification::Allow => {
                        debug!(host = %qname, "Relaying DNS query");
                    }
                },
                None => {
                    // Fail open: filtering cannot be established for this
                    // query, so forward it rather than break resolution
                    warn!("Failed to parse DNS query name; forwarding");
                }
            }

            let query = &frame[candidate.dns_offset..len];
            let reply = match self.resolver.resolve(query) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(error = %e, "Upstream DNS relay failed");
                    continue;
                }
            };

            let response = craft_dns_response(frame, &candidate, &reply);
            match self.device.send(&response) {
                Ok(written) => self.counters.inc_bytes_out(written as u64),
                Err(e) => warn!(error = %e, "Failed to write DNS response"),
            }
        }

        info!("Packet loop ended");
    }
}
