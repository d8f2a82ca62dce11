//! Response packet synthesis
//!
//! Builds the IPv4/UDP frame that carries an upstream DNS reply back into the
//! tunnel, addressed as if it came straight from the upstream server.

use super::checksum::internet_checksum;
use super::{DnsCandidate, UDP_HEADER_LEN};
use bytes::BytesMut;

/// Builder for constructing IPv4/UDP response packets
pub struct UdpResponseBuilder {
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
    src_port: u16,
    dst_port: u16,
    ttl: u8,
    ip_header_len: usize,
    payload: Vec<u8>,
}

impl UdpResponseBuilder {
    /// Create new IPv4 UDP packet builder
    pub fn udp_v4() -> Self {
        Self {
            src_ip: [0; 4],
            dst_ip: [0; 4],
            src_port: 0,
            dst_port: 0,
            ttl: 64,
            ip_header_len: 20,
            payload: Vec::new(),
        }
    }

    /// Set source IP
    pub fn src_ip(mut self, ip: [u8; 4]) -> Self {
        self.src_ip = ip;
        self
    }

    /// Set destination IP
    pub fn dst_ip(mut self, ip: [u8; 4]) -> Self {
        self.dst_ip = ip;
        self
    }

    /// Set source port
    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    /// Set destination port
    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    /// Set TTL
    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set IP header length (must be a multiple of 4, at least 20)
    pub fn ip_header_len(mut self, len: usize) -> Self {
        self.ip_header_len = len;
        self
    }

    /// Set payload
    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    /// Build the packet
    pub fn build(self) -> Vec<u8> {
        let udp_len = UDP_HEADER_LEN + self.payload.len();
        let total_len = self.ip_header_len + udp_len;

        let mut packet = BytesMut::with_capacity(total_len);

        // IPv4 header
        packet.extend_from_slice(&[
            (4 << 4) | (self.ip_header_len / 4) as u8,   // Version + IHL
            0x00,                                        // DSCP + ECN
            ((total_len >> 8) & 0xFF) as u8,             // Total Length (high)
            (total_len & 0xFF) as u8,                    // Total Length (low)
            0x00, 0x00,                                  // Identification
            0x40, 0x00,                                  // Flags (DF) + Fragment Offset
            self.ttl,                                    // TTL
            0x11,                                        // Protocol (UDP)
            0x00, 0x00,                                  // Header Checksum (placeholder)
        ]);
        packet.extend_from_slice(&self.src_ip);
        packet.extend_from_slice(&self.dst_ip);
        packet.resize(self.ip_header_len, 0);

        // Fill in the header checksum (computed with the field zeroed)
        let csum = internet_checksum(&packet[..self.ip_header_len]);
        packet[10] = (csum >> 8) as u8;
        packet[11] = (csum & 0xFF) as u8;

        // UDP header; checksum stays zero, which IPv4 permits
        packet.extend_from_slice(&self.src_port.to_be_bytes());
        packet.extend_from_slice(&self.dst_port.to_be_bytes());
        packet.extend_from_slice(&(udp_len as u16).to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00]);

        // Payload
        packet.extend_from_slice(&self.payload);

        packet.to_vec()
    }
}

/// Craft the response frame for a DNS query.
///
/// Addresses and ports are swapped relative to the original query: the reply
/// travels from the upstream server (port 53) back to the querying socket.
/// `dns_payload` is the raw upstream reply, appended verbatim.
pub fn craft_dns_response(
    original: &[u8],
    candidate: &DnsCandidate,
    dns_payload: &[u8],
) -> Vec<u8> {
    let mut src_ip = [0u8; 4];
    let mut dst_ip = [0u8; 4];
    // Original destination becomes the response source and vice versa
    src_ip.copy_from_slice(&original[16..20]);
    dst_ip.copy_from_slice(&original[12..16]);

    UdpResponseBuilder::udp_v4()
        .src_ip(src_ip)
        .dst_ip(dst_ip)
        .src_port(super::ports::DNS)
        .dst_port(candidate.src_port)
        .ip_header_len(candidate.ip_header_len)
        .payload(dns_payload)
        .build()
}
