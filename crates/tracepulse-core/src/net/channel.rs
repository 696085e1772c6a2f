//! The raw-socket implementation of [`Network`].

use crate::error::{Error, Result};
use crate::net::{
    platform, status_from_unreachable_v4, status_from_unreachable_v6, Network, Response,
    ResponseKind,
};
use crate::probe::DestinationInfo;
use crate::types::{MagicNumber, ProbeId, Sequence, TimeToLive};
use socket2::{SockAddr, Socket};
use std::io::IoSlice;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, SystemTime};
use tracing::warn;

/// The receive buffer: the largest IPv4 datagram plus the IPv6 header the
/// kernel strips before handing ICMPv6 messages to a raw socket.
pub const RECV_BUFFER_SIZE: usize = 65_576;

/// A bound raw ICMP socket for one source address.
pub struct ProbeChannel {
    socket: Socket,
    src_addr: IpAddr,
    buffer: Vec<u8>,
}

impl ProbeChannel {
    /// Open a raw ICMP socket of the matching family and bind it to
    /// `src_addr`.
    ///
    /// Binding or filter installation failure is fatal for the engine that
    /// would own this channel.
    pub fn bind(src_addr: IpAddr) -> Result<Self> {
        let socket = match src_addr {
            IpAddr::V4(_) => platform::make_icmp_socket_v4(),
            IpAddr::V6(_) => platform::make_icmp_socket_v6(),
        }
        .map_err(|source| Error::Bind {
            addr: src_addr,
            source,
        })?;
        socket
            .bind(&SockAddr::from(SocketAddr::new(src_addr, 0)))
            .map_err(|source| Error::Bind {
                addr: src_addr,
                source,
            })?;
        if src_addr.is_ipv6() {
            platform::set_icmpv6_filter(&socket).map_err(|source| Error::Bind {
                addr: src_addr,
                source,
            })?;
        }
        Ok(Self {
            socket,
            src_addr,
            buffer: vec![0_u8; RECV_BUFFER_SIZE],
        })
    }

    /// The source address this channel is bound to.
    #[must_use]
    pub const fn src_addr(&self) -> IpAddr {
        self.src_addr
    }

    /// Set the per-send socket options: hop limit and traffic class.
    fn prepare_send(&self, ttl: TimeToLive, dest: DestinationInfo) -> Result<()> {
        match dest.address() {
            IpAddr::V4(_) => {
                self.socket
                    .set_ttl(u32::from(ttl.0))
                    .map_err(Error::Send)?;
                self.socket
                    .set_tos(u32::from(dest.traffic_class().0))
                    .map_err(|err| {
                        warn!("unable to set TOS {} for {dest}: {err}", dest.traffic_class().0);
                        Error::Send(err)
                    })?;
            }
            IpAddr::V6(_) => {
                self.socket
                    .set_unicast_hops_v6(u32::from(ttl.0))
                    .map_err(Error::Send)?;
                self.socket
                    .set_tclass_v6(u32::from(dest.traffic_class().0))
                    .map_err(|err| {
                        warn!(
                            "unable to set traffic class {} for {dest}: {err}",
                            dest.traffic_class().0
                        );
                        Error::Send(err)
                    })?;
            }
        }
        Ok(())
    }
}

impl Network for ProbeChannel {
    fn send(&mut self, buf: &[u8], ttl: TimeToLive, dest: DestinationInfo) -> Result<()> {
        self.prepare_send(ttl, dest)?;
        let remote = SockAddr::from(SocketAddr::new(dest.address(), 0));
        let sent = self.socket.send_to(buf, &remote).map_err(Error::Send)?;
        if sent < buf.len() {
            return Err(Error::ShortSend {
                sent,
                expected: buf.len(),
            });
        }
        Ok(())
    }

    fn send_burst(
        &mut self,
        bufs: &[Vec<u8>],
        ttl: TimeToLive,
        dest: DestinationInfo,
    ) -> Result<()> {
        self.prepare_send(ttl, dest)?;
        let remote = SockAddr::from(SocketAddr::new(dest.address(), 0));
        let slices: Vec<IoSlice<'_>> = bufs.iter().map(|buf| IoSlice::new(buf)).collect();
        let expected = bufs.iter().map(Vec::len).sum();
        let sent = self
            .socket
            .send_to_vectored(&slices, &remote)
            .map_err(Error::Send)?;
        if sent < expected {
            return Err(Error::ShortSend { sent, expected });
        }
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Response>> {
        if !platform::is_readable(&self.socket, timeout)? {
            return Ok(None);
        }
        let (len, responder) = platform::recv_from(&self.socket, &mut self.buffer)?;
        let recv_time = SystemTime::now();
        let Some(responder) = responder else {
            return Ok(None);
        };
        let bytes = &self.buffer[..len];
        Ok(match self.src_addr {
            IpAddr::V4(_) => parse_v4(bytes, recv_time, responder),
            IpAddr::V6(_) => parse_v6(bytes, recv_time, responder),
        })
    }
}

/// Parse an inbound IPv4 datagram; raw ICMPv4 sockets deliver the IP header.
///
/// Malformed or uninteresting datagrams yield `None` and are dropped.
fn parse_v4(bytes: &[u8], recv_time: SystemTime, responder: IpAddr) -> Option<Response> {
    use tracepulse_packet::icmpv4::destination_unreachable::DestinationUnreachablePacket;
    use tracepulse_packet::icmpv4::echo_reply::EchoReplyPacket;
    use tracepulse_packet::icmpv4::time_exceeded::TimeExceededPacket;
    use tracepulse_packet::icmpv4::{IcmpPacket, IcmpType};
    use tracepulse_packet::ipv4::Ipv4Packet;

    let ipv4 = Ipv4Packet::new_view(bytes).ok()?;
    let icmp_bytes = ipv4.payload();
    let icmp = IcmpPacket::new_view(icmp_bytes).ok()?;
    match icmp.get_icmp_type() {
        IcmpType::EchoReply => {
            let echo_reply = EchoReplyPacket::new_view(icmp_bytes).ok()?;
            Some(Response {
                recv_time,
                responder,
                identifier: ProbeId(echo_reply.get_identifier()),
                sequence: Sequence(echo_reply.get_sequence()),
                magic: parse_magic(echo_reply.payload()),
                kind: ResponseKind::EchoReply,
            })
        }
        IcmpType::TimeExceeded => {
            let time_exceeded = TimeExceededPacket::new_view(icmp_bytes).ok()?;
            let (identifier, sequence, magic) = parse_original_v4(time_exceeded.payload())?;
            Some(Response {
                recv_time,
                responder,
                identifier,
                sequence,
                magic,
                kind: ResponseKind::TimeExceeded,
            })
        }
        IcmpType::DestinationUnreachable => {
            let unreachable = DestinationUnreachablePacket::new_view(icmp_bytes).ok()?;
            let (identifier, sequence, magic) = parse_original_v4(unreachable.payload())?;
            Some(Response {
                recv_time,
                responder,
                identifier,
                sequence,
                magic,
                kind: ResponseKind::Unreachable(status_from_unreachable_v4(
                    unreachable.get_icmp_code().0,
                )),
            })
        }
        _ => None,
    }
}

/// Parse an inbound ICMPv6 message; the kernel strips the IPv6 header.
fn parse_v6(bytes: &[u8], recv_time: SystemTime, responder: IpAddr) -> Option<Response> {
    use tracepulse_packet::icmpv6::destination_unreachable::DestinationUnreachablePacket;
    use tracepulse_packet::icmpv6::echo_reply::EchoReplyPacket;
    use tracepulse_packet::icmpv6::time_exceeded::TimeExceededPacket;
    use tracepulse_packet::icmpv6::{IcmpPacket, Icmpv6Type};

    let icmp = IcmpPacket::new_view(bytes).ok()?;
    match icmp.get_icmp_type() {
        Icmpv6Type::EchoReply => {
            let echo_reply = EchoReplyPacket::new_view(bytes).ok()?;
            Some(Response {
                recv_time,
                responder,
                identifier: ProbeId(echo_reply.get_identifier()),
                sequence: Sequence(echo_reply.get_sequence()),
                magic: parse_magic(echo_reply.payload()),
                kind: ResponseKind::EchoReply,
            })
        }
        Icmpv6Type::TimeExceeded => {
            let time_exceeded = TimeExceededPacket::new_view(bytes).ok()?;
            let (identifier, sequence, magic) = parse_original_v6(time_exceeded.payload())?;
            Some(Response {
                recv_time,
                responder,
                identifier,
                sequence,
                magic,
                kind: ResponseKind::TimeExceeded,
            })
        }
        Icmpv6Type::DestinationUnreachable => {
            let unreachable = DestinationUnreachablePacket::new_view(bytes).ok()?;
            let (identifier, sequence, magic) = parse_original_v6(unreachable.payload())?;
            Some(Response {
                recv_time,
                responder,
                identifier,
                sequence,
                magic,
                kind: ResponseKind::Unreachable(status_from_unreachable_v6(
                    unreachable.get_icmp_code().0,
                )),
            })
        }
        _ => None,
    }
}

/// Extract identifier, sequence and (when present) magic from the original
/// IPv4 datagram quoted inside an ICMPv4 error message.
///
/// Routers may quote as little as the IP header plus eight bytes, so the
/// probe payload and even parts of the echo header can be missing; matching
/// then falls back to identifier and sequence alone.
fn parse_original_v4(bytes: &[u8]) -> Option<(ProbeId, Sequence, Option<MagicNumber>)> {
    use tracepulse_packet::icmpv4::echo_request::EchoRequestPacket;
    use tracepulse_packet::ipv4::Ipv4Packet;

    let inner_ip = Ipv4Packet::new_view(bytes).ok()?;
    let echo_request = EchoRequestPacket::new_view(inner_ip.payload()).ok()?;
    Some((
        ProbeId(echo_request.get_identifier()),
        Sequence(echo_request.get_sequence()),
        parse_magic(echo_request.payload()),
    ))
}

/// Extract identifier, sequence and magic from the original IPv6 datagram
/// quoted inside an ICMPv6 error message.
fn parse_original_v6(bytes: &[u8]) -> Option<(ProbeId, Sequence, Option<MagicNumber>)> {
    use tracepulse_packet::icmpv6::echo_request::EchoRequestPacket;
    use tracepulse_packet::ipv6::Ipv6Packet;

    let inner_ip = Ipv6Packet::new_view(bytes).ok()?;
    let echo_request = EchoRequestPacket::new_view(inner_ip.payload()).ok()?;
    Some((
        ProbeId(echo_request.get_identifier()),
        Sequence(echo_request.get_sequence()),
        parse_magic(echo_request.payload()),
    ))
}

fn parse_magic(payload: &[u8]) -> Option<MagicNumber> {
    use tracepulse_packet::payload::ProbePayloadPacket;
    ProbePayloadPacket::new_view(payload)
        .ok()
        .map(|payload| MagicNumber(payload.get_magic()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::HopStatus;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use tracepulse_packet::icmpv4;
    use tracepulse_packet::icmpv6;
    use tracepulse_packet::ipv4::Ipv4Packet;
    use tracepulse_packet::ipv6::Ipv6Packet;
    use tracepulse_packet::payload::ProbePayloadPacket;

    const MAGIC: u32 = 0xdead_beef;

    fn v4_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
        let mut buf = vec![0_u8; 24];
        let mut payload = ProbePayloadPacket::new(&mut buf[8..]).unwrap();
        payload.set_magic(MAGIC);
        payload.set_send_ttl(5);
        let mut echo =
            icmpv4::echo_request::EchoRequestPacket::new(&mut buf).unwrap();
        echo.set_icmp_type(icmpv4::IcmpType::EchoRequest);
        echo.set_identifier(identifier);
        echo.set_sequence(sequence);
        buf
    }

    fn v4_datagram(icmp: &[u8], src: Ipv4Addr) -> Vec<u8> {
        let mut buf = vec![0_u8; 20 + icmp.len()];
        {
            let mut ip = Ipv4Packet::new(&mut buf).unwrap();
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_protocol(1);
            ip.set_total_length((20 + icmp.len()) as u16);
            ip.set_source(src);
            ip.set_destination(Ipv4Addr::new(10, 0, 0, 1));
        }
        buf[20..].copy_from_slice(icmp);
        buf
    }

    #[test]
    fn test_parse_v4_echo_reply() {
        let mut icmp = v4_echo_request(42, 7);
        icmp[0] = 0; // EchoReply
        let datagram = v4_datagram(&icmp, Ipv4Addr::new(10, 0, 0, 4));
        let responder = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 4));
        let response = parse_v4(&datagram, SystemTime::now(), responder).unwrap();
        assert_eq!(ResponseKind::EchoReply, response.kind);
        assert_eq!(ProbeId(42), response.identifier);
        assert_eq!(Sequence(7), response.sequence);
        assert_eq!(Some(MagicNumber(MAGIC)), response.magic);
        assert_eq!(responder, response.responder);
    }

    #[test]
    fn test_parse_v4_time_exceeded_quotes_original() {
        let original = v4_datagram(&v4_echo_request(42, 9), Ipv4Addr::new(10, 0, 0, 1));
        let mut icmp = vec![0_u8; 8 + original.len()];
        icmp[0] = 11; // TimeExceeded
        icmp[8..].copy_from_slice(&original);
        let datagram = v4_datagram(&icmp, Ipv4Addr::new(10, 0, 0, 2));
        let response = parse_v4(
            &datagram,
            SystemTime::now(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        )
        .unwrap();
        assert_eq!(ResponseKind::TimeExceeded, response.kind);
        assert_eq!(Sequence(9), response.sequence);
        assert_eq!(Some(MagicNumber(MAGIC)), response.magic);
    }

    #[test]
    fn test_parse_v4_truncated_unreachable_matches_without_magic() {
        // Quote only the IP header plus the first 8 bytes of the echo
        // request, as sparse routers do.
        let original = v4_datagram(&v4_echo_request(42, 9)[..8], Ipv4Addr::new(10, 0, 0, 1));
        let mut icmp = vec![0_u8; 8 + original.len()];
        icmp[0] = 3; // DestinationUnreachable
        icmp[1] = icmpv4::destination_unreachable::CODE_PORT_UNREACH;
        icmp[8..].copy_from_slice(&original);
        let datagram = v4_datagram(&icmp, Ipv4Addr::new(10, 0, 0, 4));
        let response = parse_v4(
            &datagram,
            SystemTime::now(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 4)),
        )
        .unwrap();
        assert_eq!(
            ResponseKind::Unreachable(HopStatus::UnreachablePort),
            response.kind
        );
        assert_eq!(ProbeId(42), response.identifier);
        assert_eq!(Sequence(9), response.sequence);
        assert_eq!(None, response.magic);
    }

    #[test]
    fn test_parse_v4_runt_dropped() {
        let response = parse_v4(
            &[0_u8; 12],
            SystemTime::now(),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        );
        assert_eq!(None, response);
    }

    fn v6_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
        let mut buf = vec![0_u8; 24];
        let mut payload = ProbePayloadPacket::new(&mut buf[8..]).unwrap();
        payload.set_magic(MAGIC);
        let mut echo =
            icmpv6::echo_request::EchoRequestPacket::new(&mut buf).unwrap();
        echo.set_icmp_type(icmpv6::Icmpv6Type::EchoRequest);
        echo.set_identifier(identifier);
        echo.set_sequence(sequence);
        buf
    }

    #[test]
    fn test_parse_v6_time_exceeded_quotes_original() {
        let inner_icmp = v6_echo_request(42, 3);
        let mut original = vec![0_u8; 40 + inner_icmp.len()];
        {
            let mut ip = Ipv6Packet::new(&mut original).unwrap();
            ip.set_version(6);
            ip.set_next_header(58);
            ip.set_payload_length(inner_icmp.len() as u16);
            ip.set_source("fe80::1".parse().unwrap());
            ip.set_destination("2001:db8::2".parse().unwrap());
        }
        original[40..].copy_from_slice(&inner_icmp);
        let mut message = vec![0_u8; 8 + original.len()];
        message[0] = 3; // TimeExceeded
        message[8..].copy_from_slice(&original);
        let responder = IpAddr::V6("fe80::9".parse::<Ipv6Addr>().unwrap());
        let response = parse_v6(&message, SystemTime::now(), responder).unwrap();
        assert_eq!(ResponseKind::TimeExceeded, response.kind);
        assert_eq!(ProbeId(42), response.identifier);
        assert_eq!(Sequence(3), response.sequence);
        assert_eq!(Some(MagicNumber(MAGIC)), response.magic);
    }

    #[test]
    fn test_parse_v6_packet_too_big_ignored() {
        let mut message = vec![0_u8; 48];
        message[0] = 2; // PacketTooBig passes the filter but is not matched
        let response = parse_v6(
            &message,
            SystemTime::now(),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
        );
        assert_eq!(None, response);
    }
}
