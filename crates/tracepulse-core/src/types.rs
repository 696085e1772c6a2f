use derive_more::{Add, AddAssign, From, Sub};

/// Sequence number newtype.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Ord, PartialOrd, Hash, From, Add, AddAssign,
)]
pub struct Sequence(pub u16);

impl Sequence {
    /// The next sequence number, wrapping at the 16-bit boundary.
    #[must_use]
    pub const fn wrapping_next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Time-to-live (or IPv6 hop-limit) newtype.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Ord, PartialOrd, Hash, From, Add, Sub, AddAssign,
)]
pub struct TimeToLive(pub u8);

/// Round newtype.
///
/// Counts the send sweeps within a single traceroute run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Ord, PartialOrd, From, AddAssign)]
pub struct Round(pub u8);

/// Probe identifier newtype, carried in the ICMP Echo identifier field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Ord, PartialOrd, From)]
pub struct ProbeId(pub u16);

/// Magic number newtype, random per engine lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, From)]
pub struct MagicNumber(pub u32);

/// Traffic class (IPv4 TOS / IPv6 Traffic Class) newtype.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Ord, PartialOrd, Hash, From)]
pub struct TrafficClass(pub u8);

/// The size of the ICMP message (header plus payload) to send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Ord, PartialOrd, From)]
pub struct PacketSize(pub u16);

impl From<Sequence> for usize {
    fn from(sequence: Sequence) -> Self {
        sequence.0 as Self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_wraps() {
        assert_eq!(Sequence(1), Sequence(0).wrapping_next());
        assert_eq!(Sequence(0), Sequence(u16::MAX).wrapping_next());
    }

    #[test]
    fn test_ttl_arithmetic() {
        assert_eq!(TimeToLive(3), TimeToLive(1) + TimeToLive(2));
        assert_eq!(TimeToLive(4), TimeToLive(6) - TimeToLive(2));
    }
}
