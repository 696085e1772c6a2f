//! The probe payload header carried inside every Echo Request.
//!
//! On-wire layout, big-endian, 16 bytes:
//!
//! ```text
//! 0       4       5       6        8                     16
//! | magic | ttl   | round | tweak  | send timestamp (us)  |
//! ```
//!
//! The magic number identifies probes belonging to one engine instance, the
//! checksum tweak echoes the Echo Request checksum so error replies can be
//! matched even when the outer sequence number is unavailable, and the send
//! timestamp is microseconds since the UNIX epoch. Responders never interpret
//! these bytes. The header may be followed by 0xFF padding up to a configured
//! datagram size.

use crate::buffer::Buffer;
use crate::error::{PacketError, PacketResult};
use std::fmt;

const MAGIC_OFFSET: usize = 0;
const SEND_TTL_OFFSET: usize = 4;
const ROUND_OFFSET: usize = 5;
const CHECKSUM_TWEAK_OFFSET: usize = 6;
const SEND_TIMESTAMP_OFFSET: usize = 8;

/// The byte value used to pad probes up to the configured payload size.
pub const PROBE_PAD_BYTE: u8 = 0xff;

/// Represents the probe payload header.
pub struct ProbePayloadPacket<'a> {
    buf: Buffer<'a>,
}

impl<'a> ProbePayloadPacket<'a> {
    pub fn new(packet: &'a mut [u8]) -> PacketResult<Self> {
        if packet.len() >= Self::minimum_packet_size() {
            Ok(Self {
                buf: Buffer::Mutable(packet),
            })
        } else {
            Err(PacketError::InsufficientPacketBuffer(
                String::from("ProbePayload"),
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
                String::from("ProbePayload"),
                Self::minimum_packet_size(),
                packet.len(),
            ))
        }
    }

    #[must_use]
    pub const fn minimum_packet_size() -> usize {
        16
    }

    #[must_use]
    pub fn get_magic(&self) -> u32 {
        self.buf.read_u32(MAGIC_OFFSET)
    }

    #[must_use]
    pub fn get_send_ttl(&self) -> u8 {
        self.buf.read_u8(SEND_TTL_OFFSET)
    }

    #[must_use]
    pub fn get_round(&self) -> u8 {
        self.buf.read_u8(ROUND_OFFSET)
    }

    #[must_use]
    pub fn get_checksum_tweak(&self) -> u16 {
        self.buf.read_u16(CHECKSUM_TWEAK_OFFSET)
    }

    #[must_use]
    pub fn get_send_timestamp(&self) -> u64 {
        self.buf.read_u64(SEND_TIMESTAMP_OFFSET)
    }

    pub fn set_magic(&mut self, magic: u32) {
        self.buf.write_u32(MAGIC_OFFSET, magic);
    }

    pub fn set_send_ttl(&mut self, ttl: u8) {
        self.buf.write_u8(SEND_TTL_OFFSET, ttl);
    }

    pub fn set_round(&mut self, round: u8) {
        self.buf.write_u8(ROUND_OFFSET, round);
    }

    pub fn set_checksum_tweak(&mut self, tweak: u16) {
        self.buf.write_u16(CHECKSUM_TWEAK_OFFSET, tweak);
    }

    pub fn set_send_timestamp(&mut self, micros: u64) {
        self.buf.write_u64(SEND_TIMESTAMP_OFFSET, micros);
    }

    /// Fill everything beyond the fixed header with the pad byte.
    pub fn pad(&mut self) {
        let len = self.buf.len();
        for offset in Self::minimum_packet_size()..len {
            self.buf.write_u8(offset, PROBE_PAD_BYTE);
        }
    }

    #[must_use]
    pub fn packet(&self) -> &[u8] {
        self.buf.as_slice()
    }
}

impl fmt::Debug for ProbePayloadPacket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbePayloadPacket")
            .field("magic", &self.get_magic())
            .field("send_ttl", &self.get_send_ttl())
            .field("round", &self.get_round())
            .field("checksum_tweak", &self.get_checksum_tweak())
            .field("send_timestamp", &self.get_send_timestamp())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_roundtrip() {
        let mut buf = [0_u8; 16];
        let mut payload = ProbePayloadPacket::new(&mut buf).unwrap();
        payload.set_magic(0xdead_beef);
        payload.set_send_ttl(5);
        payload.set_round(2);
        payload.set_checksum_tweak(0xcafe);
        payload.set_send_timestamp(1_700_000_000_000_000);
        assert_eq!(0xdead_beef, payload.get_magic());
        assert_eq!(5, payload.get_send_ttl());
        assert_eq!(2, payload.get_round());
        assert_eq!(0xcafe, payload.get_checksum_tweak());
        assert_eq!(1_700_000_000_000_000, payload.get_send_timestamp());
    }

    #[test]
    fn test_view_matches_wire_layout() {
        let bytes = hex!("deadbeef 05 02 cafe 0006 0a6b 4977 4a00");
        let payload = ProbePayloadPacket::new_view(&bytes).unwrap();
        assert_eq!(0xdead_beef, payload.get_magic());
        assert_eq!(5, payload.get_send_ttl());
        assert_eq!(2, payload.get_round());
        assert_eq!(0xcafe, payload.get_checksum_tweak());
        assert_eq!(0x0006_0a6b_4977_4a00, payload.get_send_timestamp());
    }

    #[test]
    fn test_pad_fills_trailer() {
        let mut buf = [0_u8; 24];
        let mut payload = ProbePayloadPacket::new(&mut buf).unwrap();
        payload.set_magic(1);
        payload.pad();
        assert!(payload.packet()[16..].iter().all(|&b| b == PROBE_PAD_BYTE));
        assert_eq!(1, payload.get_magic());
    }
}
