//! The probe engines: shared send/receive/match machinery plus the
//! traceroute, ping and burst ping modes built on top of it.

use crate::error::Result;
use crate::net::{Network, Response, ResponseKind};
use crate::probe::{DestinationInfo, HopStatus, ResultEntry};
use crate::results::ResultsMap;
use crate::sink::ResultSink;
use crate::types::{MagicNumber, PacketSize, ProbeId, Round, Sequence, TimeToLive};
use itertools::Itertools;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracepulse_packet::checksum::{icmp_ipv4_checksum, icmp_ipv6_checksum};
use tracepulse_packet::payload::ProbePayloadPacket;
use tracing::{debug, trace, warn};

mod burst;
mod ping;
mod traceroute;

pub use burst::Burstping;
pub use ping::Ping;
pub use traceroute::Traceroute;

/// The ICMP echo header length for both families.
const ICMP_HEADER_SIZE: usize = 8;

/// How long a single receive waits before the loop re-checks its deadline
/// and the stop flag.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// The deadline jitter: uniform in `[0, max(10, duration / 5))` ms, added on
/// top of `duration` so a deadline never fires early.
fn jitter(duration: Duration) -> Duration {
    let deviation = (duration.as_millis() as u64 / 5).max(10);
    Duration::from_millis(rand::thread_rng().gen_range(0..deviation))
}

/// The payload filler which forces a probe whose natural checksum is
/// `natural` to carry `target` instead.
///
/// One's-complement arithmetic: adding `fold(!target + natural)` to the sum
/// shifts the final checksum from `natural` to `target`.
fn tweak_field_for(natural: u16, target: u16) -> u16 {
    let sum = u32::from(!target) + u32::from(natural);
    let folded = (sum & 0xffff) + (sum >> 16);
    (((folded & 0xffff) + (folded >> 16)) & 0xffff) as u16
}

/// State and machinery shared by every engine mode.
pub(crate) struct EngineCore<N> {
    src_addr: IpAddr,
    identifier: ProbeId,
    magic: MagicNumber,
    sequence: Sequence,
    packet_size: PacketSize,
    network: N,
    results: ResultsMap,
    ttl_cache: HashMap<IpAddr, TimeToLive>,
    destinations: Arc<Mutex<BTreeSet<DestinationInfo>>>,
    sink: Arc<dyn ResultSink>,
    last_hop: Option<TimeToLive>,
    stop: Arc<AtomicBool>,
}

impl<N: Network> EngineCore<N> {
    pub(crate) fn new(
        src_addr: IpAddr,
        network: N,
        destinations: Arc<Mutex<BTreeSet<DestinationInfo>>>,
        sink: Arc<dyn ResultSink>,
        stop: Arc<AtomicBool>,
        packet_size: PacketSize,
        initial_sequence: Option<Sequence>,
    ) -> Self {
        Self {
            src_addr,
            identifier: ProbeId(std::process::id() as u16),
            magic: MagicNumber(rand::thread_rng().gen()),
            sequence: initial_sequence.unwrap_or_else(|| Sequence(rand::thread_rng().gen())),
            packet_size,
            network,
            results: ResultsMap::new(),
            ttl_cache: HashMap::new(),
            destinations,
            sink,
            last_hop: None,
            stop,
        }
    }

    pub(crate) const fn src_addr(&self) -> IpAddr {
        self.src_addr
    }

    pub(crate) const fn last_hop(&self) -> Option<TimeToLive> {
        self.last_hop
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// A point-in-time copy of the destination set.
    pub(crate) fn destinations(&self) -> Vec<DestinationInfo> {
        self.destinations.lock().iter().copied().collect()
    }

    /// Reset the per-run state: results and the reached hop.
    pub(crate) fn begin_run(&mut self) {
        self.results.clear();
        self.last_hop = None;
    }

    /// The TTL ceiling to start a run with, primed by earlier runs.
    pub(crate) fn cached_initial_ttl(
        &self,
        dest: DestinationInfo,
        initial_max_ttl: TimeToLive,
        final_max_ttl: TimeToLive,
    ) -> TimeToLive {
        self.ttl_cache
            .get(&dest.address())
            .map_or(initial_max_ttl, |cached| (*cached).min(final_max_ttl))
    }

    pub(crate) fn cache_ttl(&mut self, dest: DestinationInfo, hop: TimeToLive) {
        self.ttl_cache.insert(dest.address(), hop);
    }

    fn next_sequence(&mut self) -> Sequence {
        self.sequence = self.sequence.wrapping_next();
        self.sequence
    }

    /// Build one Echo Request datagram and its pending record.
    ///
    /// When `target_checksum` is given, every probe built against the same
    /// slot carries an identical on-wire checksum: the first probe donates
    /// its natural checksum and later ones absorb the difference into the
    /// payload filler word, keeping equal-cost multipath hashing on one
    /// path. Without a slot the natural checksum is kept.
    fn build_probe(
        &mut self,
        dest: DestinationInfo,
        ttl: TimeToLive,
        round: Round,
        target_checksum: Option<&mut Option<u16>>,
    ) -> Result<(Vec<u8>, ResultEntry)> {
        let sequence = self.next_sequence();
        let send_time = SystemTime::now();
        let timestamp = send_time
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        let total = usize::from(self.packet_size.0)
            .max(ICMP_HEADER_SIZE + ProbePayloadPacket::minimum_packet_size());
        let mut buf = vec![0_u8; total];
        {
            let mut payload = ProbePayloadPacket::new(&mut buf[ICMP_HEADER_SIZE..])?;
            payload.set_magic(self.magic.0);
            payload.set_send_ttl(ttl.0);
            payload.set_round(round.0);
            payload.set_checksum_tweak(0);
            payload.set_send_timestamp(timestamp);
            payload.pad();
        }
        self.write_echo_header(&mut buf, dest, sequence)?;
        let natural = self.checksum_of(&buf, dest);
        let checksum = match target_checksum {
            Some(target) => match *target {
                Some(wanted) if wanted != natural => {
                    let tweak = tweak_field_for(natural, wanted);
                    ProbePayloadPacket::new(&mut buf[ICMP_HEADER_SIZE..])?
                        .set_checksum_tweak(tweak);
                    self.checksum_of(&buf, dest)
                }
                Some(wanted) => wanted,
                None => {
                    *target = Some(natural);
                    natural
                }
            },
            None => natural,
        };
        self.write_checksum(&mut buf, dest, checksum)?;
        let entry = ResultEntry::new(round, sequence, ttl, dest, checksum, send_time);
        Ok((buf, entry))
    }

    fn write_echo_header(
        &self,
        buf: &mut [u8],
        dest: DestinationInfo,
        sequence: Sequence,
    ) -> Result<()> {
        if dest.address().is_ipv6() {
            use tracepulse_packet::icmpv6::echo_request::EchoRequestPacket;
            use tracepulse_packet::icmpv6::{Icmpv6Code, Icmpv6Type};
            let mut echo = EchoRequestPacket::new(buf)?;
            echo.set_icmp_type(Icmpv6Type::EchoRequest);
            echo.set_icmp_code(Icmpv6Code(0));
            echo.set_identifier(self.identifier.0);
            echo.set_sequence(sequence.0);
        } else {
            use tracepulse_packet::icmpv4::echo_request::EchoRequestPacket;
            use tracepulse_packet::icmpv4::{IcmpCode, IcmpType};
            let mut echo = EchoRequestPacket::new(buf)?;
            echo.set_icmp_type(IcmpType::EchoRequest);
            echo.set_icmp_code(IcmpCode(0));
            echo.set_identifier(self.identifier.0);
            echo.set_sequence(sequence.0);
        }
        Ok(())
    }

    fn write_checksum(&self, buf: &mut [u8], dest: DestinationInfo, checksum: u16) -> Result<()> {
        if dest.address().is_ipv6() {
            use tracepulse_packet::icmpv6::echo_request::EchoRequestPacket;
            EchoRequestPacket::new(buf)?.set_checksum(checksum);
        } else {
            use tracepulse_packet::icmpv4::echo_request::EchoRequestPacket;
            EchoRequestPacket::new(buf)?.set_checksum(checksum);
        }
        Ok(())
    }

    fn checksum_of(&self, buf: &[u8], dest: DestinationInfo) -> u16 {
        match (self.src_addr, dest.address()) {
            (IpAddr::V6(src_addr), IpAddr::V6(dest_addr)) => {
                icmp_ipv6_checksum(buf, src_addr, dest_addr)
            }
            _ => icmp_ipv4_checksum(buf),
        }
    }

    /// Build and send one probe, registering a pending entry on success.
    ///
    /// A failed send is logged and leaves no entry behind.
    pub(crate) fn send_probe(
        &mut self,
        dest: DestinationInfo,
        ttl: TimeToLive,
        round: Round,
        target_checksum: Option<&mut Option<u16>>,
    ) {
        match self.build_probe(dest, ttl, round, target_checksum) {
            Ok((buf, entry)) => match self.network.send(&buf, ttl, dest) {
                Ok(()) => {
                    if !self.results.insert_pending(entry) {
                        warn!("sequence {} still pending, probe not recorded", self.sequence.0);
                    }
                }
                Err(err) => warn!("probe to {dest} ttl {} not sent: {err}", ttl.0),
            },
            Err(err) => warn!("unable to build probe for {dest}: {err}"),
        }
    }

    /// Build `count` probes and submit them as one vectored send.
    ///
    /// A failed send drops the whole burst: no entries are registered.
    pub(crate) fn send_burst(
        &mut self,
        dest: DestinationInfo,
        ttl: TimeToLive,
        round: Round,
        count: usize,
    ) {
        let mut bufs = Vec::with_capacity(count);
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            match self.build_probe(dest, ttl, round, None) {
                Ok((buf, entry)) => {
                    bufs.push(buf);
                    entries.push(entry);
                }
                Err(err) => {
                    warn!("unable to build burst probe for {dest}: {err}");
                    return;
                }
            }
        }
        match self.network.send_burst(&bufs, ttl, dest) {
            Ok(()) => {
                for entry in entries {
                    if !self.results.insert_pending(entry) {
                        warn!("burst sequence still pending, probe not recorded");
                    }
                }
            }
            Err(err) => warn!("burst of {count} to {dest} not sent: {err}"),
        }
    }

    /// Correlate one inbound response against the pending entries.
    pub(crate) fn handle_response(&mut self, response: &Response) {
        if response.identifier != self.identifier {
            trace!("identifier {} is not ours", response.identifier.0);
            return;
        }
        match response.magic {
            Some(magic) if magic != self.magic => {
                trace!("foreign magic {:#010x} dropped", magic.0);
                return;
            }
            None if !missing_magic_allowed(response) => return,
            _ => {}
        }
        let status = response.kind.status();
        if let Some(entry) = self.results.record_response(
            response.sequence,
            status,
            response.recv_time,
            response.responder,
        ) {
            trace!("seq {} classified {:?}", response.sequence.0, status);
            if status == HopStatus::Success {
                let hop = entry.hop();
                self.last_hop = Some(self.last_hop.map_or(hop, |last_hop| last_hop.min(hop)));
            }
        }
    }

    /// Receive and correlate until `deadline`.
    ///
    /// With `early_exit`, returns as soon as no requests are outstanding,
    /// which ends a traceroute round without waiting out the deadline.
    pub(crate) fn await_replies(&mut self, deadline: Instant, early_exit: bool) {
        loop {
            if self.stop_requested() {
                return;
            }
            if early_exit && self.results.outstanding() == 0 {
                return;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            match self.network.recv(remaining.min(READ_TIMEOUT)) {
                Ok(Some(response)) => self.handle_response(&response),
                Ok(None) => {}
                Err(err) => debug!("receive failed: {err}"),
            }
        }
    }

    pub(crate) fn write_result(&self, entry: &ResultEntry) {
        self.sink.write_result(entry);
    }

    pub(crate) fn may_start_new_transaction(&self) {
        self.sink.may_start_new_transaction();
    }

    /// Stop path: everything still unknown becomes a timeout and all
    /// remaining entries are flushed in hop order.
    pub(crate) fn drain_all(&mut self) {
        self.results.expire_unknown();
        let entries = self
            .results
            .drain()
            .sorted_by_key(ResultEntry::hop)
            .collect::<Vec<_>>();
        for entry in &entries {
            self.sink.write_result(entry);
        }
    }
}

/// ICMPv4 error messages may quote too little of the original datagram to
/// recover the probe payload; those are matched on identifier and sequence
/// alone. Everything else must echo our magic.
fn missing_magic_allowed(response: &Response) -> bool {
    response.responder.is_ipv4() && !matches!(response.kind, ResponseKind::EchoReply)
}
