//! The network seam between the engines and the raw sockets.

use crate::error::Result;
use crate::probe::{DestinationInfo, HopStatus};
use crate::types::{MagicNumber, ProbeId, Sequence, TimeToLive};
use std::net::IpAddr;
use std::time::{Duration, SystemTime};

#[cfg(test)]
use mockall::automock;

pub mod channel;
pub mod platform;
pub mod source;

/// The network abstraction the engines drive.
///
/// The production implementation is [`channel::ProbeChannel`]; tests use a
/// scripted stand-in.
#[cfg_attr(test, automock)]
pub trait Network {
    /// Send a single probe datagram to `dest` with the given TTL.
    fn send(&mut self, buf: &[u8], ttl: TimeToLive, dest: DestinationInfo) -> Result<()>;

    /// Send a block of probe datagrams to `dest` as one vectored operation.
    fn send_burst(&mut self, bufs: &[Vec<u8>], ttl: TimeToLive, dest: DestinationInfo)
        -> Result<()>;

    /// Wait up to `timeout` for one inbound ICMP datagram.
    ///
    /// Returns `None` on timeout and for datagrams which do not parse into a
    /// response the engines care about.
    fn recv(&mut self, timeout: Duration) -> Result<Option<Response>>;
}

/// A parsed inbound ICMP datagram, ready for correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    /// When the datagram was received, taken before parsing.
    pub recv_time: SystemTime,
    /// The address the datagram came from.
    pub responder: IpAddr,
    /// The echoed probe identifier.
    pub identifier: ProbeId,
    /// The echoed sequence number.
    pub sequence: Sequence,
    /// The echoed magic number, absent when the reply truncated the probe
    /// payload (seen with ICMPv4 error messages).
    pub magic: Option<MagicNumber>,
    pub kind: ResponseKind,
}

/// What kind of reply arrived, with unreachable codes already classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    EchoReply,
    TimeExceeded,
    Unreachable(HopStatus),
}

impl ResponseKind {
    /// The status an entry matched by this response transitions to.
    #[must_use]
    pub const fn status(self) -> HopStatus {
        match self {
            Self::EchoReply => HopStatus::Success,
            Self::TimeExceeded => HopStatus::TimeExceeded,
            Self::Unreachable(status) => status,
        }
    }
}

/// Classify an ICMPv4 destination unreachable code.
pub(crate) fn status_from_unreachable_v4(code: u8) -> HopStatus {
    use tracepulse_packet::icmpv4::destination_unreachable as v4;
    match code {
        v4::CODE_NET_UNREACH | v4::CODE_NET_UNKNOWN => HopStatus::UnreachableNetwork,
        v4::CODE_HOST_UNREACH | v4::CODE_HOST_UNKNOWN => HopStatus::UnreachableHost,
        v4::CODE_PORT_UNREACH => HopStatus::UnreachablePort,
        v4::CODE_PKT_FILTERED => HopStatus::UnreachableProhibited,
        _ => HopStatus::UnreachableUnknown,
    }
}

/// Classify an ICMPv6 destination unreachable code.
pub(crate) fn status_from_unreachable_v6(code: u8) -> HopStatus {
    use tracepulse_packet::icmpv6::destination_unreachable as v6;
    match code {
        v6::CODE_NO_ROUTE => HopStatus::UnreachableNetwork,
        v6::CODE_ADMIN_PROHIBITED => HopStatus::UnreachableProhibited,
        v6::CODE_BEYOND_SCOPE => HopStatus::UnreachableScope,
        v6::CODE_ADDR_UNREACHABLE => HopStatus::UnreachableHost,
        v6::CODE_PORT_UNREACHABLE => HopStatus::UnreachablePort,
        _ => HopStatus::UnreachableUnknown,
    }
}
