//! End-to-end engine scenarios driven by a scripted stand-in network which
//! answers probes according to per-TTL and per-send rules.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};
use tracepulse_core::{
    Burstping, BurstpingConfig, DestinationInfo, Error, HopStatus, MagicNumber, Network,
    PacketSize, Ping, PingConfig, ProbeId, Response, ResponseKind, ResultEntry, ResultSink,
    Sequence, TimeToLive, Traceroute, TracerouteConfig, TrafficClass,
};
use tracepulse_packet::icmpv4::echo_request::EchoRequestPacket;
use tracepulse_packet::payload::ProbePayloadPacket;

/// How a scripted peer answers one probe.
#[derive(Debug, Clone, Copy)]
enum Reply {
    TimeExceeded(Ipv4Addr),
    EchoReply(Ipv4Addr),
    /// An ICMPv4 error with a truncated quote: no magic available.
    TruncatedUnreachable(Ipv4Addr, HopStatus),
    /// An echo reply carrying someone else's magic number.
    ForeignMagic(Ipv4Addr),
    Drop,
}

/// A sent probe as the fake saw it on the wire.
#[derive(Debug, Clone, Copy)]
struct SentProbe {
    identifier: u16,
    sequence: u16,
    ttl: u8,
    magic: u32,
    len: usize,
}

#[derive(Default)]
struct NetState {
    by_ttl: HashMap<u8, Reply>,
    by_send_index: HashMap<usize, Reply>,
    fail_sends: bool,
    sent: Vec<SentProbe>,
    burst_sizes: Vec<usize>,
    queue: VecDeque<Response>,
}

/// A scripted [`Network`]: parses each outgoing probe and queues the
/// matching canned reply for the next receive.
#[derive(Clone, Default)]
struct ScriptedNetwork(Arc<Mutex<NetState>>);

impl ScriptedNetwork {
    fn reply_for_ttl(&self, ttl: u8, reply: Reply) -> Self {
        self.0.lock().by_ttl.insert(ttl, reply);
        self.clone()
    }

    fn reply_for_send(&self, index: usize, reply: Reply) -> Self {
        self.0.lock().by_send_index.insert(index, reply);
        self.clone()
    }

    fn fail_sends(&self) -> Self {
        self.0.lock().fail_sends = true;
        self.clone()
    }

    fn sent(&self) -> Vec<SentProbe> {
        self.0.lock().sent.clone()
    }

    fn burst_sizes(&self) -> Vec<usize> {
        self.0.lock().burst_sizes.clone()
    }

    fn record_send(&self, buf: &[u8]) {
        let echo = EchoRequestPacket::new_view(buf).unwrap();
        let payload = ProbePayloadPacket::new_view(echo.payload()).unwrap();
        let probe = SentProbe {
            identifier: echo.get_identifier(),
            sequence: echo.get_sequence(),
            ttl: payload.get_send_ttl(),
            magic: payload.get_magic(),
            len: buf.len(),
        };
        let mut state = self.0.lock();
        state.sent.push(probe);
        let index = state.sent.len();
        let reply = state
            .by_send_index
            .get(&index)
            .or_else(|| state.by_ttl.get(&probe.ttl))
            .copied()
            .unwrap_or(Reply::Drop);
        if let Some(response) = respond(probe, reply) {
            state.queue.push_back(response);
        }
    }
}

fn respond(probe: SentProbe, reply: Reply) -> Option<Response> {
    let recv_time = SystemTime::now();
    let identifier = ProbeId(probe.identifier);
    let sequence = Sequence(probe.sequence);
    match reply {
        Reply::TimeExceeded(addr) => Some(Response {
            recv_time,
            responder: IpAddr::V4(addr),
            identifier,
            sequence,
            magic: Some(MagicNumber(probe.magic)),
            kind: ResponseKind::TimeExceeded,
        }),
        Reply::EchoReply(addr) => Some(Response {
            recv_time,
            responder: IpAddr::V4(addr),
            identifier,
            sequence,
            magic: Some(MagicNumber(probe.magic)),
            kind: ResponseKind::EchoReply,
        }),
        Reply::TruncatedUnreachable(addr, status) => Some(Response {
            recv_time,
            responder: IpAddr::V4(addr),
            identifier,
            sequence,
            magic: None,
            kind: ResponseKind::Unreachable(status),
        }),
        Reply::ForeignMagic(addr) => Some(Response {
            recv_time,
            responder: IpAddr::V4(addr),
            identifier,
            sequence,
            magic: Some(MagicNumber(probe.magic.wrapping_add(1))),
            kind: ResponseKind::EchoReply,
        }),
        Reply::Drop => None,
    }
}

impl Network for ScriptedNetwork {
    fn send(
        &mut self,
        buf: &[u8],
        _ttl: TimeToLive,
        _dest: DestinationInfo,
    ) -> Result<(), Error> {
        if self.0.lock().fail_sends {
            return Err(Error::ShortSend {
                sent: 0,
                expected: buf.len(),
            });
        }
        self.record_send(buf);
        Ok(())
    }

    fn send_burst(
        &mut self,
        bufs: &[Vec<u8>],
        _ttl: TimeToLive,
        _dest: DestinationInfo,
    ) -> Result<(), Error> {
        if self.0.lock().fail_sends {
            return Err(Error::ShortSend {
                sent: 0,
                expected: bufs.iter().map(Vec::len).sum(),
            });
        }
        self.0.lock().burst_sizes.push(bufs.len());
        for buf in bufs {
            self.record_send(buf);
        }
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Response>, Error> {
        let response = self.0.lock().queue.pop_front();
        if response.is_none() {
            thread::sleep(timeout.min(Duration::from_millis(1)));
        }
        Ok(response)
    }
}

/// Collects everything the engines flush.
#[derive(Default)]
struct MemorySink {
    entries: Mutex<Vec<ResultEntry>>,
    transactions: Mutex<usize>,
}

impl ResultSink for MemorySink {
    fn write_result(&self, entry: &ResultEntry) {
        self.entries.lock().push(entry.clone());
    }

    fn may_start_new_transaction(&self) {
        *self.transactions.lock() += 1;
    }
}

const SOURCE: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

fn destination(addr: Ipv4Addr) -> DestinationInfo {
    DestinationInfo::new(IpAddr::V4(addr), TrafficClass(0))
}

fn destinations(addr: Ipv4Addr) -> Arc<Mutex<BTreeSet<DestinationInfo>>> {
    Arc::new(Mutex::new(BTreeSet::from([destination(addr)])))
}

fn traceroute_config(initial: u8, last: u8, increment: u8) -> TracerouteConfig {
    TracerouteConfig {
        duration: Duration::from_millis(100),
        initial_max_ttl: TimeToLive(initial),
        final_max_ttl: TimeToLive(last),
        increment_max_ttl: TimeToLive(increment),
        packet_size: PacketSize(24),
        initial_sequence: Some(Sequence(0)),
        max_rounds: Some(1),
    }
}

fn ping_config(iterations: u64) -> PingConfig {
    PingConfig {
        interval: Duration::from_millis(100),
        expiration: Duration::from_millis(250),
        ttl: TimeToLive(64),
        packet_size: PacketSize(24),
        initial_sequence: Some(Sequence(0)),
        iterations: Some(iterations),
    }
}

fn assert_invariants(entries: &[ResultEntry]) {
    for entry in entries {
        assert!(entry.status().is_terminal(), "flushed entry is unclassified");
        if entry.status() != HopStatus::Timeout {
            let receive_time = entry.receive_time().expect("classified entry has no receive time");
            assert!(entry.send_time() <= receive_time);
        }
    }
}

#[test]
fn test_traceroute_three_hops() {
    let dest = Ipv4Addr::new(10, 0, 0, 4);
    let network = ScriptedNetwork::default()
        .reply_for_ttl(1, Reply::TimeExceeded(Ipv4Addr::new(10, 0, 0, 2)))
        .reply_for_ttl(2, Reply::TimeExceeded(Ipv4Addr::new(10, 0, 0, 3)))
        .reply_for_ttl(3, Reply::EchoReply(dest));
    let sink = Arc::new(MemorySink::default());
    let mut engine = Traceroute::new(
        traceroute_config(5, 5, 1),
        SOURCE,
        network.clone(),
        destinations(dest),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
    engine.run();

    let entries = sink.entries.lock().clone();
    assert_eq!(5, entries.len());
    assert_invariants(&entries);
    let hops: Vec<u8> = entries.iter().map(|entry| entry.hop().0).collect();
    assert_eq!(vec![1, 2, 3, 4, 5], hops);
    assert_eq!(HopStatus::TimeExceeded, entries[0].status());
    assert_eq!(
        Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))),
        entries[0].responder()
    );
    assert_eq!(HopStatus::TimeExceeded, entries[1].status());
    assert_eq!(
        Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3))),
        entries[1].responder()
    );
    assert_eq!(HopStatus::Success, entries[2].status());
    assert_eq!(Some(IpAddr::V4(dest)), entries[2].responder());
    assert_eq!(HopStatus::Timeout, entries[3].status());
    assert_eq!(HopStatus::Timeout, entries[4].status());
    // One sweep of TTLs 5..1, high first.
    let ttls: Vec<u8> = network.sent().iter().map(|probe| probe.ttl).collect();
    assert_eq!(vec![5, 4, 3, 2, 1], ttls);
    // All probes of the round share one on-wire identity baseline: distinct,
    // strictly increasing sequence numbers.
    let seqs: Vec<u16> = network.sent().iter().map(|probe| probe.sequence).collect();
    assert_eq!(vec![1, 2, 3, 4, 5], seqs);
}

#[test]
fn test_traceroute_primes_ttl_cache() {
    let dest = Ipv4Addr::new(10, 0, 0, 4);
    let network = ScriptedNetwork::default()
        .reply_for_ttl(1, Reply::TimeExceeded(Ipv4Addr::new(10, 0, 0, 2)))
        .reply_for_ttl(2, Reply::TimeExceeded(Ipv4Addr::new(10, 0, 0, 3)))
        .reply_for_ttl(3, Reply::EchoReply(dest));
    let sink = Arc::new(MemorySink::default());
    let config = TracerouteConfig {
        max_rounds: Some(2),
        ..traceroute_config(5, 5, 1)
    };
    let mut engine = Traceroute::new(
        config,
        SOURCE,
        network.clone(),
        destinations(dest),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
    engine.run();

    // The second run starts at the cached hop count of the first.
    let ttls: Vec<u8> = network.sent().iter().map(|probe| probe.ttl).collect();
    assert_eq!(vec![5, 4, 3, 2, 1, 3, 2, 1], ttls);
}

#[test]
fn test_traceroute_ttl_expansion() {
    let dest = Ipv4Addr::new(10, 0, 0, 9);
    let network = ScriptedNetwork::default()
        .reply_for_ttl(1, Reply::TimeExceeded(Ipv4Addr::new(10, 1, 0, 1)))
        .reply_for_ttl(2, Reply::TimeExceeded(Ipv4Addr::new(10, 1, 0, 2)))
        .reply_for_ttl(3, Reply::TimeExceeded(Ipv4Addr::new(10, 1, 0, 3)))
        .reply_for_ttl(4, Reply::TimeExceeded(Ipv4Addr::new(10, 1, 0, 4)))
        .reply_for_ttl(5, Reply::EchoReply(dest));
    let sink = Arc::new(MemorySink::default());
    let mut engine = Traceroute::new(
        traceroute_config(2, 6, 2),
        SOURCE,
        network.clone(),
        destinations(dest),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
    engine.run();

    // Three sweeps of one run: 2..1, then 4..3, then 6..5.
    let ttls: Vec<u8> = network.sent().iter().map(|probe| probe.ttl).collect();
    assert_eq!(vec![2, 1, 4, 3, 6, 5], ttls);

    let entries = sink.entries.lock().clone();
    assert_eq!(6, entries.len());
    assert_invariants(&entries);
    for (entry, hop) in entries.iter().zip(1_u8..) {
        assert_eq!(hop, entry.hop().0);
    }
    assert!(entries[..4]
        .iter()
        .all(|entry| entry.status() == HopStatus::TimeExceeded));
    assert_eq!(HopStatus::Success, entries[4].status());
    assert_eq!(HopStatus::Timeout, entries[5].status());
}

#[test]
fn test_traceroute_single_ttl_all_timeout() {
    // FinalMaxTTL of 1 toward a silent destination: one round, one probe,
    // no sweep extension.
    let dest = Ipv4Addr::new(10, 0, 0, 66);
    let network = ScriptedNetwork::default();
    let sink = Arc::new(MemorySink::default());
    let mut engine = Traceroute::new(
        traceroute_config(1, 1, 1),
        SOURCE,
        network.clone(),
        destinations(dest),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
    engine.run();

    assert_eq!(1, network.sent().len());
    let entries = sink.entries.lock().clone();
    assert_eq!(1, entries.len());
    assert_eq!(HopStatus::Timeout, entries[0].status());
    assert_eq!(1, entries[0].hop().0);
}

#[test]
fn test_ping_expiration() {
    let dest = Ipv4Addr::new(10, 0, 0, 7);
    let network = ScriptedNetwork::default();
    let sink = Arc::new(MemorySink::default());
    let mut engine = Ping::new(
        ping_config(3),
        SOURCE,
        network.clone(),
        destinations(dest),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
    engine.run();

    let entries = sink.entries.lock().clone();
    assert_eq!(3, entries.len());
    assert!(entries
        .iter()
        .all(|entry| entry.status() == HopStatus::Timeout));
    // Each probe flushed exactly once.
    let mut seqs: Vec<u16> = entries.iter().map(|entry| entry.seq_number().0).collect();
    seqs.sort_unstable();
    assert_eq!(vec![1, 2, 3], seqs);
    // A transaction boundary per interval.
    assert_eq!(3, *sink.transactions.lock());
}

#[test]
fn test_ping_success_and_failure_mix() {
    let dest = Ipv4Addr::new(10, 0, 0, 7);
    let network = ScriptedNetwork::default().reply_for_send(2, Reply::EchoReply(dest));
    let sink = Arc::new(MemorySink::default());
    let config = PingConfig {
        // Generous expiration keeps the unanswered probe pending until the
        // final drain, independent of scheduling delays.
        expiration: Duration::from_millis(2000),
        ..ping_config(2)
    };
    let mut engine = Ping::new(
        config,
        SOURCE,
        network.clone(),
        destinations(dest),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
    engine.run();

    let entries = sink.entries.lock().clone();
    assert_eq!(2, entries.len());
    assert_invariants(&entries);
    let mut statuses: Vec<HopStatus> =
        entries.iter().map(tracepulse_core::ResultEntry::status).collect();
    statuses.sort();
    assert_eq!(vec![HopStatus::Timeout, HopStatus::Success], statuses);
}

#[test]
fn test_burstping_four_probes() {
    let dest = Ipv4Addr::new(10, 0, 0, 5);
    let network = ScriptedNetwork::default()
        .reply_for_send(1, Reply::EchoReply(dest))
        .reply_for_send(2, Reply::EchoReply(dest));
    let sink = Arc::new(MemorySink::default());
    let config = BurstpingConfig {
        ping: PingConfig {
            packet_size: PacketSize(56),
            ..ping_config(1)
        },
        burst: 4,
    };
    let mut engine = Burstping::new(
        config,
        SOURCE,
        network.clone(),
        destinations(dest),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
    engine.run();

    // One vectored send of four padded datagrams.
    assert_eq!(vec![4], network.burst_sizes());
    let sent = network.sent();
    assert!(sent.iter().all(|probe| probe.len == 56));
    let seqs: Vec<u16> = sent.iter().map(|probe| probe.sequence).collect();
    assert_eq!(vec![1, 2, 3, 4], seqs);

    let entries = sink.entries.lock().clone();
    assert_eq!(4, entries.len());
    assert_invariants(&entries);
    let successes = entries
        .iter()
        .filter(|entry| entry.status() == HopStatus::Success)
        .count();
    let timeouts = entries
        .iter()
        .filter(|entry| entry.status() == HopStatus::Timeout)
        .count();
    assert_eq!((2, 2), (successes, timeouts));
    let mut flushed_seqs: Vec<u16> = entries.iter().map(|entry| entry.seq_number().0).collect();
    flushed_seqs.sort_unstable();
    assert_eq!(vec![1, 2, 3, 4], flushed_seqs);
}

#[test]
fn test_burstping_failed_send_records_nothing() {
    let dest = Ipv4Addr::new(10, 0, 0, 5);
    let network = ScriptedNetwork::default().fail_sends();
    let sink = Arc::new(MemorySink::default());
    let config = BurstpingConfig {
        ping: ping_config(1),
        burst: 3,
    };
    let mut engine = Burstping::new(
        config,
        SOURCE,
        network.clone(),
        destinations(dest),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
    engine.run();

    assert!(network.sent().is_empty());
    assert!(sink.entries.lock().is_empty());
}

#[test]
fn test_ipv4_port_unreachable_with_truncated_quote() {
    let dest = Ipv4Addr::new(10, 0, 0, 7);
    let network = ScriptedNetwork::default().reply_for_send(
        1,
        Reply::TruncatedUnreachable(dest, HopStatus::UnreachablePort),
    );
    let sink = Arc::new(MemorySink::default());
    let mut engine = Ping::new(
        ping_config(1),
        SOURCE,
        network.clone(),
        destinations(dest),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
    engine.run();

    let entries = sink.entries.lock().clone();
    assert_eq!(1, entries.len());
    assert_eq!(HopStatus::UnreachablePort, entries[0].status());
    assert_eq!(Some(IpAddr::V4(dest)), entries[0].responder());
}

#[test]
fn test_foreign_magic_is_dropped() {
    let dest = Ipv4Addr::new(10, 0, 0, 7);
    let network = ScriptedNetwork::default().reply_for_send(1, Reply::ForeignMagic(dest));
    let sink = Arc::new(MemorySink::default());
    let mut engine = Ping::new(
        ping_config(1),
        SOURCE,
        network.clone(),
        destinations(dest),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
    engine.run();

    // The reply did not classify the probe; it drains as a timeout.
    let entries = sink.entries.lock().clone();
    assert_eq!(1, entries.len());
    assert_eq!(HopStatus::Timeout, entries[0].status());
    assert_eq!(None, entries[0].responder());
}

#[test]
fn test_stop_drains_pending_probes() {
    let dest = Ipv4Addr::new(10, 0, 0, 7);
    let network = ScriptedNetwork::default();
    let sink = Arc::new(MemorySink::default());
    let stop = Arc::new(AtomicBool::new(false));
    let config = PingConfig {
        iterations: None,
        ..ping_config(1)
    };
    let mut engine = Ping::new(
        config,
        SOURCE,
        network,
        destinations(dest),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
        Arc::clone(&stop),
    )
    .unwrap();
    // Stop mid-interval: the flag is noticed at the next suspension point
    // and the pending probe drains as a timeout.
    let runner = thread::spawn(move || {
        engine.run();
    });
    thread::sleep(Duration::from_millis(30));
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    runner.join().unwrap();

    let entries = sink.entries.lock().clone();
    assert_eq!(1, entries.len());
    assert_eq!(HopStatus::Timeout, entries[0].status());
}
