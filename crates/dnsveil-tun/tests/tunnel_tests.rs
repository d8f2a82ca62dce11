//! Integration tests for the tunnel runtime
//!
//! Drive the packet loop end-to-end over an in-memory device and a local
//! fake upstream, and exercise the manager lifecycle with a mock provider.

use dnsveil_core::config::Config;
use dnsveil_core::dns::encode_qname;
use dnsveil_core::filter::{BloomIndex, DomainClassifier, UserBlocklist};
use dnsveil_core::rules::RuleSnapshot;
use dnsveil_core::{Counters, Packet, Result, TunnelConfig};
use dnsveil_tun::device::{TunDevice, TunProvider};
use dnsveil_tun::manager::{TunnelManager, TunnelState};
use dnsveil_tun::packet_loop::PacketLoop;
use dnsveil_tun::upstream::UpstreamResolver;

use std::collections::{HashSet, VecDeque};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// In-memory tunnel device: queued inbound frames, captured outbound writes
struct MockDevice {
    inbound: Mutex<VecDeque<Vec<u8>>>,
    written: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
    available: Condvar,
}

impl MockDevice {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inbound: Mutex::new(VecDeque::new()),
            written: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            available: Condvar::new(),
        })
    }

    fn push_frame(&self, frame: Vec<u8>) {
        self.inbound.lock().unwrap().push_back(frame);
        self.available.notify_all();
    }

    fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }
}

impl TunDevice for MockDevice {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut queue = self.inbound.lock().unwrap();
        loop {
            if let Some(frame) = queue.pop_front() {
                buf[..frame.len()].copy_from_slice(&frame);
                return Ok(frame.len());
            }
            if self.closed.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device closed"));
            }
            queue = self.available.wait(queue).unwrap();
        }
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().unwrap().push(buf.to_vec());
        Ok(buf.len())
    }

    fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.available.notify_all();
        Ok(())
    }
}

/// Provider handing out a fresh in-memory device per establish call and
/// keeping a registry so tests can reach the active one
#[derive(Clone, Default)]
struct MockProvider {
    devices: Arc<Mutex<Vec<Arc<MockDevice>>>>,
}

impl MockProvider {
    fn latest(&self) -> Arc<MockDevice> {
        self.devices.lock().unwrap().last().unwrap().clone()
    }
}

impl TunProvider for MockProvider {
    fn establish(&self, _config: &TunnelConfig) -> Result<Arc<dyn TunDevice>> {
        let device = MockDevice::new();
        self.devices.lock().unwrap().push(device.clone());
        Ok(device)
    }
}

/// Build an IPv4/UDP frame carrying a DNS query for `qname_wire`
fn dns_query_frame(qname_wire: &[u8], src_port: u16, dst_port: u16) -> Vec<u8> {
    let mut dns = vec![
        0x12, 0x34, // Transaction ID
        0x01, 0x00, // Flags: standard query, recursion desired
        0x00, 0x01, // Questions: 1
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    dns.extend_from_slice(qname_wire);
    dns.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // QTYPE A, QCLASS IN

    let total_len = (20 + 8 + dns.len()) as u16;
    let udp_len = (8 + dns.len()) as u16;
    let mut frame = vec![
        0x45, 0x00,
        (total_len >> 8) as u8, (total_len & 0xFF) as u8,
        0x00, 0x01, 0x00, 0x00,
        0x40, 0x11, 0x00, 0x00,
        0x0A, 0x00, 0x00, 0x02, // Source IP: 10.0.0.2
        0x01, 0x01, 0x01, 0x01, // Dest IP: 1.1.1.1
        (src_port >> 8) as u8, (src_port & 0xFF) as u8,
        (dst_port >> 8) as u8, (dst_port & 0xFF) as u8,
        (udp_len >> 8) as u8, (udp_len & 0xFF) as u8,
        0x00, 0x00,
    ];
    frame.extend_from_slice(&dns);
    frame
}

fn query_for(host: &str) -> Vec<u8> {
    dns_query_frame(&encode_qname(host), 50000, 53)
}

/// Local upstream stand-in that echoes each query with the QR bit set
fn spawn_fake_upstream() -> SocketAddr {
    let server = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = server.local_addr().unwrap();
    std::thread::spawn(move || {
        let mut buf = [0u8; 2048];
        while let Ok((len, from)) = server.recv_from(&mut buf) {
            let mut reply = buf[..len].to_vec();
            if reply.len() >= 3 {
                reply[2] |= 0x80;
            }
            let _ = server.send_to(&reply, from);
        }
    });
    addr
}

fn classifier_with(bloom_domains: &[&str], user_domains: &[&str]) -> Arc<DomainClassifier> {
    let bloom = BloomIndex::build(
        bloom_domains.iter().copied(),
        bloom_domains.len().max(1) as u32,
        Some(4096),
        None,
    )
    .unwrap();
    let userlist = UserBlocklist::with_domains(user_domains.iter().copied());
    Arc::new(DomainClassifier::new(Some(bloom), userlist))
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("condition not reached within timeout");
}

fn run_loop(
    device: Arc<MockDevice>,
    classifier: Arc<DomainClassifier>,
    upstream: SocketAddr,
    counters: Arc<Counters>,
) -> std::thread::JoinHandle<()> {
    let resolver = UpstreamResolver::with_target(upstream).unwrap();
    let packet_loop = PacketLoop::new(device, classifier, resolver, counters);
    std::thread::spawn(move || packet_loop.run())
}

#[test]
fn test_end_to_end_two_tier_filtering() {
    let device = MockDevice::new();
    let classifier = classifier_with(&["bad.example"], &["tracker.example"]);
    let counters = Arc::new(Counters::new());
    let upstream = spawn_fake_upstream();

    let worker = run_loop(device.clone(), classifier, upstream, counters.clone());

    device.push_frame(query_for("bad.example"));
    device.push_frame(query_for("tracker.example"));
    device.push_frame(query_for("ok.example"));

    // Only the allowed query produces a response
    wait_until(|| device.written().len() == 1);
    wait_until(|| counters.snapshot().dns_queries == 3);

    device.close().unwrap();
    worker.join().unwrap();

    let snap = counters.snapshot();
    assert_eq!(snap.dns_queries, 3);
    assert_eq!(snap.dns_blocked, 2);

    let written = device.written();
    let response = &written[0];
    assert_eq!(snap.bytes_out, response.len() as u64);

    // Response is a checksum-correct IPv4/UDP packet from the upstream
    // back to the querying socket
    let parsed = Packet::from_bytes(response).unwrap();
    assert!(parsed.is_udp());
    assert_eq!(parsed.src_port, 53);
    assert_eq!(parsed.dst_port, 50000);
    assert_eq!(&response[12..16], &[1, 1, 1, 1]);
    assert_eq!(&response[16..20], &[10, 0, 0, 2]);

    // Payload is the upstream reply: our query with the QR bit set
    let payload = &response[28..];
    assert_eq!(payload[2] & 0x80, 0x80);
}

#[test]
fn test_unparseable_query_fails_open() {
    let device = MockDevice::new();
    let classifier = classifier_with(&["bad.example"], &[]);
    let counters = Arc::new(Counters::new());
    let upstream = spawn_fake_upstream();

    let worker = run_loop(device.clone(), classifier, upstream, counters.clone());

    // Compression pointer in the QNAME: name cannot be parsed, so the
    // query must still be forwarded upstream
    device.push_frame(dns_query_frame(&[0xC0, 0x0C], 50001, 53));

    wait_until(|| device.written().len() == 1);
    device.close().unwrap();
    worker.join().unwrap();

    let snap = counters.snapshot();
    assert_eq!(snap.dns_queries, 1);
    assert_eq!(snap.dns_blocked, 0);
}

#[test]
fn test_non_dns_traffic_dropped() {
    let device = MockDevice::new();
    let classifier = classifier_with(&[], &[]);
    let counters = Arc::new(Counters::new());
    let upstream = spawn_fake_upstream();

    let worker = run_loop(device.clone(), classifier, upstream, counters.clone());

    let frame = dns_query_frame(&encode_qname("ok.example"), 50000, 443);
    let frame_len = frame.len() as u64;
    device.push_frame(frame);

    wait_until(|| counters.snapshot().bytes_in == frame_len);
    device.close().unwrap();
    worker.join().unwrap();

    let snap = counters.snapshot();
    assert_eq!(snap.dns_queries, 0);
    assert!(device.written().is_empty());
}

#[test]
fn test_upstream_silence_drops_query_but_loop_continues() {
    let device = MockDevice::new();
    let classifier = classifier_with(&[], &[]);
    let counters = Arc::new(Counters::new());

    // An upstream that never answers
    let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
    let worker = run_loop(
        device.clone(),
        classifier,
        silent.local_addr().unwrap(),
        counters.clone(),
    );

    device.push_frame(query_for("ok.example"));
    device.push_frame(query_for("also-ok.example"));

    // Both queries are counted; neither gets a response
    wait_until(|| counters.snapshot().dns_queries == 2);
    device.close().unwrap();
    worker.join().unwrap();

    assert!(device.written().is_empty());
    assert_eq!(counters.snapshot().bytes_out, 0);
}

#[test]
fn test_manager_lifecycle_with_blocked_queries() {
    let provider = MockProvider::default();

    let manager = TunnelManager::new(Config::default(), Box::new(provider.clone()));
    assert_eq!(manager.state(), TunnelState::Stopped);

    let rules = RuleSnapshot {
        blocked_apps: HashSet::new(),
        blocked_domains: HashSet::from(["tracker.example".to_string()]),
        filtering_enabled: true,
        prelisted_enabled: true,
        dns_servers: vec![],
    };

    manager.start(&rules).unwrap();
    assert_eq!(manager.state(), TunnelState::Running);
    assert!(manager.is_running());

    // Blocked queries never touch the upstream, so this works offline
    let device = provider.latest();
    device.push_frame(query_for("tracker.example"));
    device.push_frame(query_for("sub.tracker.example"));

    wait_until(|| manager.counters().is_some_and(|c| c.dns_blocked == 2));

    manager.stop();
    assert_eq!(manager.state(), TunnelState::Stopped);
    assert!(manager.counters().is_none());
    assert!(device.written().is_empty());
}

#[test]
fn test_manager_rebuild_on_rule_change() {
    let provider = MockProvider::default();
    let manager = TunnelManager::new(Config::default(), Box::new(provider.clone()));

    let mut rules = RuleSnapshot {
        blocked_apps: HashSet::new(),
        blocked_domains: HashSet::new(),
        filtering_enabled: true,
        prelisted_enabled: true,
        dns_servers: vec![],
    };

    manager.start(&rules).unwrap();
    assert!(manager.is_running());
    let first_device = provider.latest();

    // Rule change rebuilds the session wholesale: the first interface is
    // torn down and a fresh one established
    rules.blocked_domains.insert("ads.example".to_string());
    manager.apply_updates(&rules).unwrap();
    assert!(manager.is_running());

    let second_device = provider.latest();
    assert!(!Arc::ptr_eq(&first_device, &second_device));
    assert!(first_device.closed.load(Ordering::SeqCst));

    second_device.push_frame(query_for("ads.example"));
    wait_until(|| manager.counters().is_some_and(|c| c.dns_blocked == 1));

    manager.stop();
    assert_eq!(manager.state(), TunnelState::Stopped);
}
