use crate::types::{Round, Sequence, TimeToLive, TrafficClass};
use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, SystemTime};

/// A probe destination: an IP address plus the traffic class to mark its
/// probes with.
///
/// Destinations order by address first, then traffic class, so one address
/// may be probed under several classes at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DestinationInfo {
    address: IpAddr,
    traffic_class: TrafficClass,
}

impl DestinationInfo {
    #[must_use]
    pub const fn new(address: IpAddr, traffic_class: TrafficClass) -> Self {
        Self {
            address,
            traffic_class,
        }
    }

    #[must_use]
    pub const fn address(&self) -> IpAddr {
        self.address
    }

    #[must_use]
    pub const fn traffic_class(&self) -> TrafficClass {
        self.traffic_class
    }
}

impl fmt::Display for DestinationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.traffic_class.0 == 0 {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{}@{:#04x}", self.address, self.traffic_class.0)
        }
    }
}

/// The classified outcome of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HopStatus {
    /// No response has been matched yet.
    Unknown,
    /// A router reported the TTL expired in transit.
    TimeExceeded,
    /// The destination lies beyond the scope of the source address.
    UnreachableScope,
    /// There is no route to the destination network.
    UnreachableNetwork,
    /// The destination host is unreachable.
    UnreachableHost,
    /// The transport protocol is not supported by the destination.
    UnreachableProtocol,
    /// The destination port is unreachable.
    UnreachablePort,
    /// Communication is administratively prohibited.
    UnreachableProhibited,
    /// An unreachable reply with a code not otherwise classified.
    UnreachableUnknown,
    /// No response arrived before the probe expired.
    Timeout,
    /// The destination answered with an Echo Reply.
    Success,
}

impl HopStatus {
    /// The stable numeric code written by result sinks.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::TimeExceeded => 1,
            Self::UnreachableScope => 100,
            Self::UnreachableNetwork => 101,
            Self::UnreachableHost => 102,
            Self::UnreachableProtocol => 103,
            Self::UnreachablePort => 104,
            Self::UnreachableProhibited => 105,
            Self::UnreachableUnknown => 110,
            Self::Timeout => 200,
            Self::Success => 255,
        }
    }

    /// Every status other than `Unknown` is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// The record of a single probe, created at send time and classified at most
/// once when a response is matched or the probe expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEntry {
    round: Round,
    seq_number: Sequence,
    hop: TimeToLive,
    destination: DestinationInfo,
    checksum_tweak: u16,
    send_time: SystemTime,
    receive_time: Option<SystemTime>,
    responder: Option<IpAddr>,
    status: HopStatus,
}

impl ResultEntry {
    #[must_use]
    pub const fn new(
        round: Round,
        seq_number: Sequence,
        hop: TimeToLive,
        destination: DestinationInfo,
        checksum_tweak: u16,
        send_time: SystemTime,
    ) -> Self {
        Self {
            round,
            seq_number,
            hop,
            destination,
            checksum_tweak,
            send_time,
            receive_time: None,
            responder: None,
            status: HopStatus::Unknown,
        }
    }

    #[must_use]
    pub const fn round(&self) -> Round {
        self.round
    }

    #[must_use]
    pub const fn seq_number(&self) -> Sequence {
        self.seq_number
    }

    /// The TTL the probe was sent with.
    #[must_use]
    pub const fn hop(&self) -> TimeToLive {
        self.hop
    }

    #[must_use]
    pub const fn destination(&self) -> DestinationInfo {
        self.destination
    }

    #[must_use]
    pub const fn checksum_tweak(&self) -> u16 {
        self.checksum_tweak
    }

    #[must_use]
    pub const fn send_time(&self) -> SystemTime {
        self.send_time
    }

    #[must_use]
    pub const fn receive_time(&self) -> Option<SystemTime> {
        self.receive_time
    }

    /// The address which answered the probe, if any.
    #[must_use]
    pub const fn responder(&self) -> Option<IpAddr> {
        self.responder
    }

    #[must_use]
    pub const fn status(&self) -> HopStatus {
        self.status
    }

    /// The round-trip time, for entries with a matched response.
    #[must_use]
    pub fn rtt(&self) -> Option<Duration> {
        self.receive_time
            .and_then(|receive_time| receive_time.duration_since(self.send_time).ok())
    }

    /// The age of the entry relative to `now`.
    #[must_use]
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.send_time).unwrap_or_default()
    }

    pub(crate) fn record(&mut self, status: HopStatus, receive_time: SystemTime, responder: IpAddr) {
        self.status = status;
        self.receive_time = Some(receive_time);
        self.responder = Some(responder);
    }

    pub(crate) fn expire(&mut self) {
        self.status = HopStatus::Timeout;
    }
}

impl fmt::Display for ResultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rtt_ms = self
            .rtt()
            .map_or_else(|| String::from("-"), |rtt| format!("{:.3}ms", rtt.as_secs_f64() * 1000.0));
        let responder = self
            .responder
            .map_or_else(|| String::from("*"), |addr| addr.to_string());
        write!(
            f,
            "#{:5}\t{:2}\t{:>9}\t{:3}\t{}",
            self.seq_number.0,
            self.hop.0,
            rtt_ms,
            self.status.code(),
            responder
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn destination() -> DestinationInfo {
        DestinationInfo::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 4)), TrafficClass(0))
    }

    #[test]
    fn test_destination_ordering() {
        let a = DestinationInfo::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), TrafficClass(7));
        let b = DestinationInfo::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), TrafficClass(0));
        let c = DestinationInfo::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), TrafficClass(1));
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(0, HopStatus::Unknown.code());
        assert_eq!(1, HopStatus::TimeExceeded.code());
        assert_eq!(104, HopStatus::UnreachablePort.code());
        assert_eq!(200, HopStatus::Timeout.code());
        assert_eq!(255, HopStatus::Success.code());
        assert!(!HopStatus::Unknown.is_terminal());
        assert!(HopStatus::Timeout.is_terminal());
    }

    #[test]
    fn test_rtt_requires_response() {
        let send_time = SystemTime::now();
        let mut entry = ResultEntry::new(
            Round(0),
            Sequence(7),
            TimeToLive(3),
            destination(),
            0xcafe,
            send_time,
        );
        assert_eq!(None, entry.rtt());
        let receive_time = send_time + Duration::from_millis(12);
        entry.record(
            HopStatus::Success,
            receive_time,
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 4)),
        );
        assert_eq!(Some(Duration::from_millis(12)), entry.rtt());
        assert_eq!(HopStatus::Success, entry.status());
    }
}
