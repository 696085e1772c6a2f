//! Wire format codecs for the tracepulse network measurement tools.
//!
//! Each packet type wraps a borrowed byte buffer, either a mutable slice for
//! building outgoing packets (`new`) or an immutable view for parsing
//! (`new_view`). All multi-byte fields are network byte order.

pub mod buffer;
pub mod checksum;
pub mod error;
pub mod icmpv4;
pub mod icmpv6;
pub mod ipv4;
pub mod ipv6;
pub mod payload;
pub mod udp;

pub use error::{PacketError, PacketResult};
