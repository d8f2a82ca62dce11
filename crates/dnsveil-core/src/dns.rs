//! Minimal DNS message codec
//!
//! The tunnel only needs the first question's QNAME; everything else in the
//! message is relayed verbatim.

/// DNS fixed header length
pub const DNS_HEADER_LEN: usize = 12;

/// Maximum hostname length (DNS standard)
pub const MAX_HOSTNAME_LEN: usize = 253;

/// Parse the first QNAME in the question section.
///
/// `dns_offset` is where the DNS payload starts within `packet`; the name
/// begins after the fixed 12-byte header. Compression pointers (length byte
/// with both top bits set) are not supported and yield `None`, as does any
/// label that would read past `total_len`.
pub fn parse_query_name(packet: &[u8], dns_offset: usize, total_len: usize) -> Option<String> {
    let total_len = total_len.min(packet.len());
    let mut i = dns_offset + DNS_HEADER_LEN;
    let mut labels: Vec<&str> = Vec::new();
    let mut name_len = 0usize;

    while i < total_len {
        let len = packet[i] as usize;
        if len == 0 {
            break;
        }
        if len & 0xC0 == 0xC0 {
            // Compression pointer; not handled
            return None;
        }
        i += 1;
        if i + len > total_len {
            return None;
        }
        let label = std::str::from_utf8(&packet[i..i + len]).ok()?;
        name_len += len + 1;
        if name_len > MAX_HOSTNAME_LEN + 1 {
            return None;
        }
        labels.push(label);
        i += len;
    }

    if labels.is_empty() {
        None
    } else {
        Some(labels.join("."))
    }
}

/// Encode a hostname into DNS wire format (length-prefixed labels).
///
/// Used when synthesizing query payloads in tests and tooling.
pub fn encode_qname(host: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(host.len() + 2);
    for label in host.split('.').filter(|l| !l.is_empty()) {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dns_message(qname_wire: &[u8]) -> Vec<u8> {
        let mut msg = vec![
            0x12, 0x34, // Transaction ID
            0x01, 0x00, // Flags: standard query
            0x00, 0x01, // Questions: 1
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        msg.extend_from_slice(qname_wire);
        msg.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // QTYPE A, QCLASS IN
        msg
    }

    #[test]
    fn test_parse_simple_name() {
        let msg = dns_message(&encode_qname("bad.example"));
        let name = parse_query_name(&msg, 0, msg.len());
        assert_eq!(name.as_deref(), Some("bad.example"));
    }

    #[test]
    fn test_parse_deep_name() {
        let msg = dns_message(&encode_qname("a.b.c.tracker.example.org"));
        let name = parse_query_name(&msg, 0, msg.len());
        assert_eq!(name.as_deref(), Some("a.b.c.tracker.example.org"));
    }

    #[test]
    fn test_parse_with_payload_offset() {
        let msg = dns_message(&encode_qname("ok.example"));
        let mut framed = vec![0xFFu8; 28];
        framed.extend_from_slice(&msg);
        let name = parse_query_name(&framed, 28, framed.len());
        assert_eq!(name.as_deref(), Some("ok.example"));
    }

    #[test]
    fn test_compression_pointer_rejected() {
        // QNAME is a pointer to offset 12
        let msg = dns_message(&[0xC0, 0x0C]);
        assert_eq!(parse_query_name(&msg, 0, msg.len()), None);
    }

    #[test]
    fn test_label_overrun_rejected() {
        // Label claims 60 bytes but the message ends first
        let mut qname = vec![60u8];
        qname.extend_from_slice(b"short");
        let msg = dns_message(&qname);
        assert_eq!(parse_query_name(&msg, 0, msg.len()), None);
    }

    #[test]
    fn test_empty_name_rejected() {
        // Root-only QNAME has no labels
        let msg = dns_message(&[0x00]);
        assert_eq!(parse_query_name(&msg, 0, msg.len()), None);
    }

    #[test]
    fn test_truncated_message_rejected() {
        let msg = dns_message(&encode_qname("bad.example"));
        // Cut inside the QNAME
        assert_eq!(parse_query_name(&msg[..14], 0, 14), None);
    }

    #[test]
    fn test_non_utf8_label_rejected() {
        let mut qname = vec![3u8, 0xFF, 0xFE, 0xFD];
        qname.push(0);
        let msg = dns_message(&qname);
        assert_eq!(parse_query_name(&msg, 0, msg.len()), None);
    }

    #[test]
    fn test_encode_qname_roundtrip() {
        let wire = encode_qname("www.example.com");
        assert_eq!(wire[0], 3);
        assert_eq!(&wire[1..4], b"www");
        assert_eq!(*wire.last().unwrap(), 0);

        let msg = dns_message(&wire);
        assert_eq!(
            parse_query_name(&msg, 0, msg.len()).as_deref(),
            Some("www.example.com")
        );
    }
}
