//! UDP header codec (RFC 768).
//!
//! The probing engine is ICMP-only; this codec is the seam for the UDP probe
//! mode and is exercised by the checksum laws.

use crate::buffer::Buffer;
use crate::error::{PacketError, PacketResult};
use std::fmt;

const SOURCE_OFFSET: usize = 0;
const DESTINATION_OFFSET: usize = 2;
const LENGTH_OFFSET: usize = 4;
const CHECKSUM_OFFSET: usize = 6;

/// Represents a UDP packet.
pub struct UdpPacket<'a> {
    buf: Buffer<'a>,
}

impl<'a> UdpPacket<'a> {
    pub fn new(packet: &'a mut [u8]) -> PacketResult<Self> {
        if packet.len() >= Self::minimum_packet_size() {
            Ok(Self {
                buf: Buffer::Mutable(packet),
            })
        } else {
            Err(PacketError::InsufficientPacketBuffer(
                String::from("Udp"),
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
                String::from("Udp"),
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
    pub fn get_source(&self) -> u16 {
        self.buf.read_u16(SOURCE_OFFSET)
    }

    #[must_use]
    pub fn get_destination(&self) -> u16 {
        self.buf.read_u16(DESTINATION_OFFSET)
    }

    #[must_use]
    pub fn get_length(&self) -> u16 {
        self.buf.read_u16(LENGTH_OFFSET)
    }

    #[must_use]
    pub fn get_checksum(&self) -> u16 {
        self.buf.read_u16(CHECKSUM_OFFSET)
    }

    pub fn set_source(&mut self, port: u16) {
        self.buf.write_u16(SOURCE_OFFSET, port);
    }

    pub fn set_destination(&mut self, port: u16) {
        self.buf.write_u16(DESTINATION_OFFSET, port);
    }

    pub fn set_length(&mut self, length: u16) {
        self.buf.write_u16(LENGTH_OFFSET, length);
    }

    pub fn set_checksum(&mut self, checksum: u16) {
        self.buf.write_u16(CHECKSUM_OFFSET, checksum);
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

impl fmt::Debug for UdpPacket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpPacket")
            .field("source", &self.get_source())
            .field("destination", &self.get_destination())
            .field("length", &self.get_length())
            .field("checksum", &self.get_checksum())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::udp_ipv4_checksum;
    use std::net::Ipv4Addr;

    #[test]
    fn test_roundtrip() {
        let mut buf = [0_u8; 12];
        let mut packet = UdpPacket::new(&mut buf).unwrap();
        packet.set_source(33434);
        packet.set_destination(33435);
        packet.set_length(12);
        packet.set_payload(&[1, 2, 3, 4]);
        let checksum = udp_ipv4_checksum(
            packet.packet(),
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
        );
        packet.set_checksum(checksum);
        assert_eq!(33434, packet.get_source());
        assert_eq!(33435, packet.get_destination());
        assert_eq!(12, packet.get_length());
        assert_eq!(checksum, packet.get_checksum());
        assert_eq!(&[1, 2, 3, 4], packet.payload());
    }
}
