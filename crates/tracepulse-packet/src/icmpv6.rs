//! ICMPv6 codec (RFC 4443).

use crate::buffer::Buffer;
use crate::error::{PacketError, PacketResult};
use std::fmt;

const TYPE_OFFSET: usize = 0;
const CODE_OFFSET: usize = 1;
const CHECKSUM_OFFSET: usize = 2;

/// The ICMPv6 message types the probing engine works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icmpv6Type {
    EchoRequest,
    EchoReply,
    DestinationUnreachable,
    PacketTooBig,
    TimeExceeded,
    Other(u8),
}

impl From<Icmpv6Type> for u8 {
    fn from(value: Icmpv6Type) -> Self {
        match value {
            Icmpv6Type::EchoRequest => 128,
            Icmpv6Type::EchoReply => 129,
            Icmpv6Type::DestinationUnreachable => 1,
            Icmpv6Type::PacketTooBig => 2,
            Icmpv6Type::TimeExceeded => 3,
            Icmpv6Type::Other(id) => id,
        }
    }
}

impl From<u8> for Icmpv6Type {
    fn from(value: u8) -> Self {
        match value {
            128 => Self::EchoRequest,
            129 => Self::EchoReply,
            1 => Self::DestinationUnreachable,
            2 => Self::PacketTooBig,
            3 => Self::TimeExceeded,
            id => Self::Other(id),
        }
    }
}

/// The code of an ICMPv6 message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icmpv6Code(pub u8);

impl From<Icmpv6Code> for u8 {
    fn from(value: Icmpv6Code) -> Self {
        value.0
    }
}

impl From<u8> for Icmpv6Code {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

/// Represents an ICMPv6 packet.
pub struct IcmpPacket<'a> {
    buf: Buffer<'a>,
}

impl<'a> IcmpPacket<'a> {
    pub fn new(packet: &'a mut [u8]) -> PacketResult<Self> {
        if packet.len() >= Self::minimum_packet_size() {
            Ok(Self {
                buf: Buffer::Mutable(packet),
            })
        } else {
            Err(PacketError::InsufficientPacketBuffer(
                String::from("Icmpv6"),
                Self::minimum_packet_size(),
                packet.len(),
            ))
        }
    }

    pub fn new_view(packet: &'a [u8]) -> PacketResult<Self> {
        if packet.len() >= Self::minimum_packet_size() {
            Ok(Self {
                buf: Buffer::Immutable(packet),
            })
        } else {
            Err(PacketError::InsufficientPacketBuffer(
                String::from("Icmpv6"),
                Self::minimum_packet_size(),
                packet.len(),
            ))
        }
    }

    #[must_use]
    pub const fn minimum_packet_size() -> usize {
        8
    }

    #[must_use]
    pub fn get_icmp_type(&self) -> Icmpv6Type {
        Icmpv6Type::from(self.buf.read_u8(TYPE_OFFSET))
    }

    #[must_use]
    pub fn get_icmp_code(&self) -> Icmpv6Code {
        Icmpv6Code::from(self.buf.read_u8(CODE_OFFSET))
    }

    #[must_use]
    pub fn get_checksum(&self) -> u16 {
        self.buf.read_u16(CHECKSUM_OFFSET)
    }

    pub fn set_icmp_type(&mut self, icmp_type: Icmpv6Type) {
        self.buf.write_u8(TYPE_OFFSET, icmp_type.into());
    }

    pub fn set_icmp_code(&mut self, icmp_code: Icmpv6Code) {
        self.buf.write_u8(CODE_OFFSET, icmp_code.into());
    }

    pub fn set_checksum(&mut self, checksum: u16) {
        self.buf.write_u16(CHECKSUM_OFFSET, checksum);
    }

    #[must_use]
    pub fn packet(&self) -> &[u8] {
        self.buf.as_slice()
    }
}

impl fmt::Debug for IcmpPacket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IcmpPacket")
            .field("icmp_type", &self.get_icmp_type())
            .field("icmp_code", &self.get_icmp_code())
            .field("checksum", &self.get_checksum())
            .finish()
    }
}

pub mod echo_request {
    use super::{Buffer, Icmpv6Code, Icmpv6Type, PacketError, PacketResult};
    use std::fmt;

    const TYPE_OFFSET: usize = 0;
    const CODE_OFFSET: usize = 1;
    const CHECKSUM_OFFSET: usize = 2;
    const IDENTIFIER_OFFSET: usize = 4;
    const SEQUENCE_OFFSET: usize = 6;

    /// Represents an ICMPv6 `EchoRequest` packet.
    pub struct EchoRequestPacket<'a> {
        buf: Buffer<'a>,
    }

    impl<'a> EchoRequestPacket<'a> {
        pub fn new(packet: &'a mut [u8]) -> PacketResult<Self> {
            if packet.len() >= Self::minimum_packet_size() {
                Ok(Self {
                    buf: Buffer::Mutable(packet),
                })
            } else {
                Err(PacketError::InsufficientPacketBuffer(
                    String::from("EchoRequest"),
                    Self::minimum_packet_size(),
                    packet.len(),
                ))
            }
        }

        pub fn new_view(packet: &'a [u8]) -> PacketResult<Self> {
            if packet.len() >= Self::minimum_packet_size() {
                Ok(Self {
                    buf: Buffer::Immutable(packet),
                })
            } else {
                Err(PacketError::InsufficientPacketBuffer(
                    String::from("EchoRequest"),
                    Self::minimum_packet_size(),
                    packet.len(),
                ))
            }
        }

        #[must_use]
        pub const fn minimum_packet_size() -> usize {
            8
        }

        #[must_use]
        pub fn get_icmp_type(&self) -> Icmpv6Type {
            Icmpv6Type::from(self.buf.read_u8(TYPE_OFFSET))
        }

        #[must_use]
        pub fn get_icmp_code(&self) -> Icmpv6Code {
            Icmpv6Code::from(self.buf.read_u8(CODE_OFFSET))
        }

        #[must_use]
        pub fn get_checksum(&self) -> u16 {
            self.buf.read_u16(CHECKSUM_OFFSET)
        }

        #[must_use]
        pub fn get_identifier(&self) -> u16 {
            self.buf.read_u16(IDENTIFIER_OFFSET)
        }

        #[must_use]
        pub fn get_sequence(&self) -> u16 {
            self.buf.read_u16(SEQUENCE_OFFSET)
        }

        pub fn set_icmp_type(&mut self, icmp_type: Icmpv6Type) {
            self.buf.write_u8(TYPE_OFFSET, icmp_type.into());
        }

        pub fn set_icmp_code(&mut self, icmp_code: Icmpv6Code) {
            self.buf.write_u8(CODE_OFFSET, icmp_code.into());
        }

        pub fn set_checksum(&mut self, checksum: u16) {
            self.buf.write_u16(CHECKSUM_OFFSET, checksum);
        }

        pub fn set_identifier(&mut self, identifier: u16) {
            self.buf.write_u16(IDENTIFIER_OFFSET, identifier);
        }

        pub fn set_sequence(&mut self, sequence: u16) {
            self.buf.write_u16(SEQUENCE_OFFSET, sequence);
        }

        pub fn set_payload(&mut self, payload: &[u8]) {
            self.buf.write_bytes(Self::minimum_packet_size(), payload);
        }

        #[must_use]
        pub fn packet(&self) -> &[u8] {
            self.buf.as_slice()
        }

        #[must_use]
        pub fn payload(&self) -> &[u8] {
            &self.buf.as_slice()[Self::minimum_packet_size()..]
        }
    }

    impl fmt::Debug for EchoRequestPacket<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("EchoRequestPacket")
                .field("icmp_type", &self.get_icmp_type())
                .field("icmp_code", &self.get_icmp_code())
                .field("checksum", &self.get_checksum())
                .field("identifier", &self.get_identifier())
                .field("sequence", &self.get_sequence())
                .finish()
        }
    }
}

pub mod echo_reply {
    use super::{Buffer, Icmpv6Code, Icmpv6Type, PacketError, PacketResult};
    use std::fmt;

    const TYPE_OFFSET: usize = 0;
    const CODE_OFFSET: usize = 1;
    const IDENTIFIER_OFFSET: usize = 4;
    const SEQUENCE_OFFSET: usize = 6;

    /// Represents an ICMPv6 `EchoReply` packet.
    pub struct EchoReplyPacket<'a> {
        buf: Buffer<'a>,
    }

    impl<'a> EchoReplyPacket<'a> {
        pub fn new_view(packet: &'a [u8]) -> PacketResult<Self> {
            if packet.len() >= Self::minimum_packet_size() {
                Ok(Self {
                    buf: Buffer::Immutable(packet),
                })
            } else {
                Err(PacketError::InsufficientPacketBuffer(
                    String::from("EchoReply"),
                    Self::minimum_packet_size(),
                    packet.len(),
                ))
            }
        }

        #[must_use]
        pub const fn minimum_packet_size() -> usize {
            8
        }

        #[must_use]
        pub fn get_icmp_type(&self) -> Icmpv6Type {
            Icmpv6Type::from(self.buf.read_u8(TYPE_OFFSET))
        }

        #[must_use]
        pub fn get_icmp_code(&self) -> Icmpv6Code {
            Icmpv6Code::from(self.buf.read_u8(CODE_OFFSET))
        }

        #[must_use]
        pub fn get_identifier(&self) -> u16 {
            self.buf.read_u16(IDENTIFIER_OFFSET)
        }

        #[must_use]
        pub fn get_sequence(&self) -> u16 {
            self.buf.read_u16(SEQUENCE_OFFSET)
        }

        #[must_use]
        pub fn packet(&self) -> &[u8] {
            self.buf.as_slice()
        }

        #[must_use]
        pub fn payload(&self) -> &[u8] {
            &self.buf.as_slice()[Self::minimum_packet_size()..]
        }
    }

    impl fmt::Debug for EchoReplyPacket<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("EchoReplyPacket")
                .field("icmp_type", &self.get_icmp_type())
                .field("icmp_code", &self.get_icmp_code())
                .field("identifier", &self.get_identifier())
                .field("sequence", &self.get_sequence())
                .finish()
        }
    }
}

pub mod time_exceeded {
    use super::{Buffer, Icmpv6Code, Icmpv6Type, PacketError, PacketResult};
    use std::fmt;

    const TYPE_OFFSET: usize = 0;
    const CODE_OFFSET: usize = 1;

    /// Represents an ICMPv6 `TimeExceeded` packet.
    ///
    /// The payload holds the leading bytes of the original datagram.
    pub struct TimeExceededPacket<'a> {
        buf: Buffer<'a>,
    }

    impl<'a> TimeExceededPacket<'a> {
        pub fn new_view(packet: &'a [u8]) -> PacketResult<Self> {
            if packet.len() >= Self::minimum_packet_size() {
                Ok(Self {
                    buf: Buffer::Immutable(packet),
                })
            } else {
                Err(PacketError::InsufficientPacketBuffer(
                    String::from("TimeExceeded"),
                    Self::minimum_packet_size(),
                    packet.len(),
                ))
            }
        }

        #[must_use]
        pub const fn minimum_packet_size() -> usize {
            8
        }

        #[must_use]
        pub fn get_icmp_type(&self) -> Icmpv6Type {
            Icmpv6Type::from(self.buf.read_u8(TYPE_OFFSET))
        }

        #[must_use]
        pub fn get_icmp_code(&self) -> Icmpv6Code {
            Icmpv6Code::from(self.buf.read_u8(CODE_OFFSET))
        }

        #[must_use]
        pub fn packet(&self) -> &[u8] {
            self.buf.as_slice()
        }

        #[must_use]
        pub fn payload(&self) -> &[u8] {
            &self.buf.as_slice()[Self::minimum_packet_size()..]
        }
    }

    impl fmt::Debug for TimeExceededPacket<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("TimeExceededPacket")
                .field("icmp_type", &self.get_icmp_type())
                .field("icmp_code", &self.get_icmp_code())
                .finish()
        }
    }
}

pub mod destination_unreachable {
    use super::{Buffer, Icmpv6Code, Icmpv6Type, PacketError, PacketResult};
    use std::fmt;

    /// "No route to destination" (RFC 4443).
    pub const CODE_NO_ROUTE: u8 = 0;

    /// "Communication administratively prohibited" (RFC 4443).
    pub const CODE_ADMIN_PROHIBITED: u8 = 1;

    /// "Beyond scope of source address" (RFC 4443).
    pub const CODE_BEYOND_SCOPE: u8 = 2;

    /// "Address unreachable" (RFC 4443).
    pub const CODE_ADDR_UNREACHABLE: u8 = 3;

    /// "Port unreachable" (RFC 4443).
    pub const CODE_PORT_UNREACHABLE: u8 = 4;

    const TYPE_OFFSET: usize = 0;
    const CODE_OFFSET: usize = 1;

    /// Represents an ICMPv6 `DestinationUnreachable` packet.
    ///
    /// The payload holds the leading bytes of the original datagram.
    pub struct DestinationUnreachablePacket<'a> {
        buf: Buffer<'a>,
    }

    impl<'a> DestinationUnreachablePacket<'a> {
        pub fn new_view(packet: &'a [u8]) -> PacketResult<Self> {
            if packet.len() >= Self::minimum_packet_size() {
                Ok(Self {
                    buf: Buffer::Immutable(packet),
                })
            } else {
                Err(PacketError::InsufficientPacketBuffer(
                    String::from("DestinationUnreachable"),
                    Self::minimum_packet_size(),
                    packet.len(),
                ))
            }
        }

        #[must_use]
        pub const fn minimum_packet_size() -> usize {
            8
        }

        #[must_use]
        pub fn get_icmp_type(&self) -> Icmpv6Type {
            Icmpv6Type::from(self.buf.read_u8(TYPE_OFFSET))
        }

        #[must_use]
        pub fn get_icmp_code(&self) -> Icmpv6Code {
            Icmpv6Code::from(self.buf.read_u8(CODE_OFFSET))
        }

        #[must_use]
        pub fn packet(&self) -> &[u8] {
            self.buf.as_slice()
        }

        #[must_use]
        pub fn payload(&self) -> &[u8] {
            &self.buf.as_slice()[Self::minimum_packet_size()..]
        }
    }

    impl fmt::Debug for DestinationUnreachablePacket<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("DestinationUnreachablePacket")
                .field("icmp_type", &self.get_icmp_type())
                .field("icmp_code", &self.get_icmp_code())
                .finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::echo_request::EchoRequestPacket;
    use super::*;
    use crate::checksum::icmp_ipv6_checksum;
    use hex_literal::hex;
    use std::net::Ipv6Addr;

    #[test]
    fn test_echo_request_roundtrip() {
        let mut buf = [0_u8; 16];
        let mut packet = EchoRequestPacket::new(&mut buf).unwrap();
        packet.set_icmp_type(Icmpv6Type::EchoRequest);
        packet.set_icmp_code(Icmpv6Code(0));
        packet.set_identifier(0xbeef);
        packet.set_sequence(42);
        packet.set_payload(&hex!("0102030405060708"));
        let src = Ipv6Addr::LOCALHOST;
        let dest = "2001:db8::1".parse().unwrap();
        let checksum = icmp_ipv6_checksum(packet.packet(), src, dest);
        packet.set_checksum(checksum);
        assert_eq!(Icmpv6Type::EchoRequest, packet.get_icmp_type());
        assert_eq!(0xbeef, packet.get_identifier());
        assert_eq!(42, packet.get_sequence());
        assert_eq!(checksum, packet.get_checksum());
    }

    #[test]
    fn test_type_conversions() {
        for value in [1_u8, 2, 3, 128, 129, 200] {
            assert_eq!(value, u8::from(Icmpv6Type::from(value)));
        }
    }

    #[test]
    fn test_view_filters_nothing() {
        let bytes = hex!("8100 0000 cafe 0001");
        let packet = IcmpPacket::new_view(&bytes).unwrap();
        assert_eq!(Icmpv6Type::EchoReply, packet.get_icmp_type());
        assert_eq!(Icmpv6Code(0), packet.get_icmp_code());
    }
}
