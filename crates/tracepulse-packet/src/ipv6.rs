//! IPv6 header codec (RFC 8200).

use crate::buffer::Buffer;
use crate::error::{PacketError, PacketResult};
use std::net::Ipv6Addr;

const VERSION_OFFSET: usize = 0;
const PAYLOAD_LENGTH_OFFSET: usize = 4;
const NEXT_HEADER_OFFSET: usize = 6;
const HOP_LIMIT_OFFSET: usize = 7;
const SOURCE_OFFSET: usize = 8;
const DESTINATION_OFFSET: usize = 24;

/// Represents an IPv6 packet.
pub struct Ipv6Packet<'a> {
    buf: Buffer<'a>,
}

impl<'a> Ipv6Packet<'a> {
    pub fn new(packet: &'a mut [u8]) -> PacketResult<Self> {
        if packet.len() >= Self::minimum_packet_size() {
            Ok(Self {
                buf: Buffer::Mutable(packet),
            })
        } else {
            Err(PacketError::InsufficientPacketBuffer(
                String::from("Ipv6"),
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
                String::from("Ipv6"),
                Self::minimum_packet_size(),
                packet.len(),
            ))
        }
    }

    #[must_use]
    pub const fn minimum_packet_size() -> usize {
        40
    }

    #[must_use]
    pub fn get_version(&self) -> u8 {
        self.buf.read_u8(VERSION_OFFSET) >> 4
    }

    #[must_use]
    pub fn get_traffic_class(&self) -> u8 {
        (self.buf.read_u16(VERSION_OFFSET) >> 4) as u8
    }

    #[must_use]
    pub fn get_flow_label(&self) -> u32 {
        self.buf.read_u32(VERSION_OFFSET) & 0x000f_ffff
    }

    #[must_use]
    pub fn get_payload_length(&self) -> u16 {
        self.buf.read_u16(PAYLOAD_LENGTH_OFFSET)
    }

    #[must_use]
    pub fn get_next_header(&self) -> u8 {
        self.buf.read_u8(NEXT_HEADER_OFFSET)
    }

    #[must_use]
    pub fn get_hop_limit(&self) -> u8 {
        self.buf.read_u8(HOP_LIMIT_OFFSET)
    }

    #[must_use]
    pub fn get_source(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.buf.read_bytes::<16>(SOURCE_OFFSET))
    }

    #[must_use]
    pub fn get_destination(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.buf.read_bytes::<16>(DESTINATION_OFFSET))
    }

    pub fn set_version(&mut self, version: u8) {
        let rest = self.buf.read_u8(VERSION_OFFSET) & 0x0f;
        self.buf.write_u8(VERSION_OFFSET, (version << 4) | rest);
    }

    pub fn set_traffic_class(&mut self, traffic_class: u8) {
        let first = (self.buf.read_u8(VERSION_OFFSET) & 0xf0) | (traffic_class >> 4);
        let second = (self.buf.read_u8(VERSION_OFFSET + 1) & 0x0f) | (traffic_class << 4);
        self.buf.write_u8(VERSION_OFFSET, first);
        self.buf.write_u8(VERSION_OFFSET + 1, second);
    }

    pub fn set_payload_length(&mut self, length: u16) {
        self.buf.write_u16(PAYLOAD_LENGTH_OFFSET, length);
    }

    pub fn set_next_header(&mut self, next_header: u8) {
        self.buf.write_u8(NEXT_HEADER_OFFSET, next_header);
    }

    pub fn set_hop_limit(&mut self, hop_limit: u8) {
        self.buf.write_u8(HOP_LIMIT_OFFSET, hop_limit);
    }

    pub fn set_source(&mut self, addr: Ipv6Addr) {
        self.buf.write_bytes(SOURCE_OFFSET, &addr.octets());
    }

    pub fn set_destination(&mut self, addr: Ipv6Addr) {
        self.buf.write_bytes(DESTINATION_OFFSET, &addr.octets());
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

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_view_of_real_header() {
        let bytes = hex!(
            "6e00 0000 0008 3a 40"
            "fe80 0000 0000 0000 0000 0000 0000 0001"
            "2001 0db8 0000 0000 0000 0000 0000 0002"
            "8000 0000"
        );
        let packet = Ipv6Packet::new_view(&bytes).unwrap();
        assert_eq!(6, packet.get_version());
        assert_eq!(0xe0, packet.get_traffic_class());
        assert_eq!(0, packet.get_flow_label());
        assert_eq!(8, packet.get_payload_length());
        assert_eq!(58, packet.get_next_header());
        assert_eq!(64, packet.get_hop_limit());
        assert_eq!("fe80::1".parse::<Ipv6Addr>().unwrap(), packet.get_source());
        assert_eq!(
            "2001:db8::2".parse::<Ipv6Addr>().unwrap(),
            packet.get_destination()
        );
        assert_eq!(&hex!("8000 0000"), packet.payload());
    }

    #[test]
    fn test_build_roundtrip() {
        let mut buf = [0_u8; 40];
        let mut packet = Ipv6Packet::new(&mut buf).unwrap();
        packet.set_version(6);
        packet.set_traffic_class(0x2e);
        packet.set_payload_length(16);
        packet.set_next_header(58);
        packet.set_hop_limit(255);
        packet.set_source("fe80::1".parse().unwrap());
        packet.set_destination("2001:db8::2".parse().unwrap());
        assert_eq!(6, packet.get_version());
        assert_eq!(0x2e, packet.get_traffic_class());
        assert_eq!(16, packet.get_payload_length());
        assert_eq!(58, packet.get_next_header());
        assert_eq!(255, packet.get_hop_limit());
        assert_eq!("fe80::1".parse::<Ipv6Addr>().unwrap(), packet.get_source());
    }
}
