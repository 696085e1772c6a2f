//! ICMPv4 codec (RFC 792).

use crate::buffer::Buffer;
use crate::error::{PacketError, PacketResult};
use std::fmt;

const TYPE_OFFSET: usize = 0;
const CODE_OFFSET: usize = 1;
const CHECKSUM_OFFSET: usize = 2;

/// The ICMPv4 message types the probing engine works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpType {
    EchoRequest,
    EchoReply,
    DestinationUnreachable,
    TimeExceeded,
    Other(u8),
}

impl From<IcmpType> for u8 {
    fn from(value: IcmpType) -> Self {
        match value {
            IcmpType::EchoRequest => 8,
            IcmpType::EchoReply => 0,
            IcmpType::DestinationUnreachable => 3,
            IcmpType::TimeExceeded => 11,
            IcmpType::Other(id) => id,
        }
    }
}

impl From<u8> for IcmpType {
    fn from(value: u8) -> Self {
        match value {
            8 => Self::EchoRequest,
            0 => Self::EchoReply,
            3 => Self::DestinationUnreachable,
            11 => Self::TimeExceeded,
            id => Self::Other(id),
        }
    }
}

/// The code of an ICMPv4 message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpCode(pub u8);

impl From<IcmpCode> for u8 {
    fn from(value: IcmpCode) -> Self {
        value.0
    }
}

impl From<u8> for IcmpCode {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

/// Represents an ICMPv4 packet.
///
/// Only the fixed four-byte prefix is interpreted here; use the typed packets
/// in the submodules for the message bodies.
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
                String::from("Icmp"),
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
                String::from("Icmp"),
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
    pub fn get_icmp_type(&self) -> IcmpType {
        IcmpType::from(self.buf.read_u8(TYPE_OFFSET))
    }

    #[must_use]
    pub fn get_icmp_code(&self) -> IcmpCode {
        IcmpCode::from(self.buf.read_u8(CODE_OFFSET))
    }

    #[must_use]
    pub fn get_checksum(&self) -> u16 {
        self.buf.read_u16(CHECKSUM_OFFSET)
    }

    pub fn set_icmp_type(&mut self, icmp_type: IcmpType) {
        self.buf.write_u8(TYPE_OFFSET, icmp_type.into());
    }

    pub fn set_icmp_code(&mut self, icmp_code: IcmpCode) {
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
    use super::{Buffer, IcmpCode, IcmpType, PacketError, PacketResult};
    use std::fmt;

    const TYPE_OFFSET: usize = 0;
    const CODE_OFFSET: usize = 1;
    const CHECKSUM_OFFSET: usize = 2;
    const IDENTIFIER_OFFSET: usize = 4;
    const SEQUENCE_OFFSET: usize = 6;

    /// Represents an ICMPv4 `EchoRequest` packet.
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
        pub fn get_icmp_type(&self) -> IcmpType {
            IcmpType::from(self.buf.read_u8(TYPE_OFFSET))
        }

        #[must_use]
        pub fn get_icmp_code(&self) -> IcmpCode {
            IcmpCode::from(self.buf.read_u8(CODE_OFFSET))
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

        pub fn set_icmp_type(&mut self, icmp_type: IcmpType) {
            self.buf.write_u8(TYPE_OFFSET, icmp_type.into());
        }

        pub fn set_icmp_code(&mut self, icmp_code: IcmpCode) {
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
    use super::{Buffer, IcmpCode, IcmpType, PacketError, PacketResult};
    use std::fmt;

    const TYPE_OFFSET: usize = 0;
    const CODE_OFFSET: usize = 1;
    const IDENTIFIER_OFFSET: usize = 4;
    const SEQUENCE_OFFSET: usize = 6;

    /// Represents an ICMPv4 `EchoReply` packet.
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
        pub fn get_icmp_type(&self) -> IcmpType {
            IcmpType::from(self.buf.read_u8(TYPE_OFFSET))
        }

        #[must_use]
        pub fn get_icmp_code(&self) -> IcmpCode {
            IcmpCode::from(self.buf.read_u8(CODE_OFFSET))
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
    use super::{Buffer, IcmpCode, IcmpType, PacketError, PacketResult};
    use std::fmt;

    const TYPE_OFFSET: usize = 0;
    const CODE_OFFSET: usize = 1;

    /// Represents an ICMPv4 `TimeExceeded` packet.
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
        pub fn get_icmp_type(&self) -> IcmpType {
            IcmpType::from(self.buf.read_u8(TYPE_OFFSET))
        }

        #[must_use]
        pub fn get_icmp_code(&self) -> IcmpCode {
            IcmpCode::from(self.buf.read_u8(CODE_OFFSET))
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
    use super::{Buffer, IcmpCode, IcmpType, PacketError, PacketResult};
    use std::fmt;

    /// "Net Unreachable" (RFC 792).
    pub const CODE_NET_UNREACH: u8 = 0;

    /// "Host Unreachable" (RFC 792).
    pub const CODE_HOST_UNREACH: u8 = 1;

    /// "Protocol Unreachable" (RFC 792).
    pub const CODE_PROTOCOL_UNREACH: u8 = 2;

    /// "Port Unreachable" (RFC 792).
    pub const CODE_PORT_UNREACH: u8 = 3;

    /// "Destination Network Unknown" (RFC 1122).
    pub const CODE_NET_UNKNOWN: u8 = 6;

    /// "Destination Host Unknown" (RFC 1122).
    pub const CODE_HOST_UNKNOWN: u8 = 7;

    /// "Communication Administratively Prohibited" (RFC 1812).
    pub const CODE_PKT_FILTERED: u8 = 13;

    const TYPE_OFFSET: usize = 0;
    const CODE_OFFSET: usize = 1;

    /// Represents an ICMPv4 `DestinationUnreachable` packet.
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
        pub fn get_icmp_type(&self) -> IcmpType {
            IcmpType::from(self.buf.read_u8(TYPE_OFFSET))
        }

        #[must_use]
        pub fn get_icmp_code(&self) -> IcmpCode {
            IcmpCode::from(self.buf.read_u8(CODE_OFFSET))
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
    use super::time_exceeded::TimeExceededPacket;
    use super::*;
    use crate::checksum::icmp_ipv4_checksum;
    use hex_literal::hex;

    #[test]
    fn test_echo_request_roundtrip() {
        let mut buf = [0_u8; 12];
        let mut packet = EchoRequestPacket::new(&mut buf).unwrap();
        packet.set_icmp_type(IcmpType::EchoRequest);
        packet.set_icmp_code(IcmpCode(0));
        packet.set_identifier(0x1234);
        packet.set_sequence(0x5678);
        packet.set_payload(&hex!("c0ffee00"));
        let checksum = icmp_ipv4_checksum(packet.packet());
        packet.set_checksum(checksum);
        assert_eq!(IcmpType::EchoRequest, packet.get_icmp_type());
        assert_eq!(IcmpCode(0), packet.get_icmp_code());
        assert_eq!(0x1234, packet.get_identifier());
        assert_eq!(0x5678, packet.get_sequence());
        assert_eq!(&hex!("c0ffee00"), packet.payload());
        assert_eq!(checksum, packet.get_checksum());
    }

    #[test]
    fn test_time_exceeded_carries_original_datagram() {
        let bytes = hex!("0b00 f4ee 00000000 45000054");
        let packet = TimeExceededPacket::new_view(&bytes).unwrap();
        assert_eq!(IcmpType::TimeExceeded, packet.get_icmp_type());
        assert_eq!(IcmpCode(0), packet.get_icmp_code());
        assert_eq!(&hex!("45000054"), packet.payload());
    }

    #[test]
    fn test_type_conversions() {
        for value in [0_u8, 3, 8, 11, 42] {
            assert_eq!(value, u8::from(IcmpType::from(value)));
        }
    }
}
