//! Engine configuration.

use crate::error::{Error, Result};
use crate::types::{PacketSize, Sequence, TimeToLive};
use std::time::Duration;

/// The smallest accepted round duration, interval or expiration.
pub const MIN_DURATION: Duration = Duration::from_millis(100);

/// The largest accepted round duration, interval or expiration.
pub const MAX_DURATION: Duration = Duration::from_secs(3600);

/// The smallest ICMP message we send: echo header plus the probe payload
/// header.
pub const MIN_PACKET_SIZE: PacketSize = PacketSize(24);

/// The largest ICMP message we send.
pub const MAX_PACKET_SIZE: PacketSize = PacketSize(1024);

/// Configuration for the traceroute engine.
#[derive(Debug, Clone)]
pub struct TracerouteConfig {
    /// The per-round deadline.
    pub duration: Duration,
    /// The TTL ceiling of the first sweep toward an uncached destination.
    pub initial_max_ttl: TimeToLive,
    /// The TTL ceiling a run never exceeds.
    pub final_max_ttl: TimeToLive,
    /// How far the ceiling grows when a sweep did not reach the destination.
    pub increment_max_ttl: TimeToLive,
    /// The total ICMP message size; padded with 0xFF beyond the headers.
    pub packet_size: PacketSize,
    /// The first sequence number to issue, random when `None`.
    pub initial_sequence: Option<Sequence>,
    /// Stop after this many completed runs; unbounded when `None`.
    pub max_rounds: Option<usize>,
}

impl Default for TracerouteConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(3000),
            initial_max_ttl: TimeToLive(6),
            final_max_ttl: TimeToLive(36),
            increment_max_ttl: TimeToLive(6),
            packet_size: MIN_PACKET_SIZE,
            initial_sequence: None,
            max_rounds: None,
        }
    }
}

impl TracerouteConfig {
    pub fn validate(&self) -> Result<()> {
        validate_duration("traceroute duration", self.duration)?;
        validate_ttl("initial max TTL", self.initial_max_ttl)?;
        validate_ttl("final max TTL", self.final_max_ttl)?;
        validate_ttl("increment max TTL", self.increment_max_ttl)?;
        if self.initial_max_ttl > self.final_max_ttl {
            return Err(Error::Config(format!(
                "initial max TTL {} exceeds final max TTL {}",
                self.initial_max_ttl.0, self.final_max_ttl.0
            )));
        }
        validate_packet_size(self.packet_size)
    }
}

/// Configuration for the ping engine.
#[derive(Debug, Clone)]
pub struct PingConfig {
    /// The time between rounds.
    pub interval: Duration,
    /// The per-probe lifetime; unanswered probes expire to `Timeout`.
    pub expiration: Duration,
    /// The fixed TTL of every probe.
    pub ttl: TimeToLive,
    /// The total ICMP message size; padded with 0xFF beyond the headers.
    pub packet_size: PacketSize,
    /// The first sequence number to issue, random when `None`.
    pub initial_sequence: Option<Sequence>,
    /// Stop after this many intervals; unbounded when `None`.
    pub iterations: Option<u64>,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            expiration: Duration::from_millis(30000),
            ttl: TimeToLive(64),
            packet_size: MIN_PACKET_SIZE,
            initial_sequence: None,
            iterations: None,
        }
    }
}

impl PingConfig {
    pub fn validate(&self) -> Result<()> {
        validate_duration("ping interval", self.interval)?;
        validate_duration("ping expiration", self.expiration)?;
        validate_ttl("ping TTL", self.ttl)?;
        validate_packet_size(self.packet_size)
    }
}

/// Configuration for the burst ping engine.
#[derive(Debug, Clone)]
pub struct BurstpingConfig {
    pub ping: PingConfig,
    /// The number of back-to-back probes per destination per interval.
    pub burst: usize,
}

impl Default for BurstpingConfig {
    fn default() -> Self {
        Self {
            ping: PingConfig {
                packet_size: PacketSize(56),
                ..PingConfig::default()
            },
            burst: 1,
        }
    }
}

impl BurstpingConfig {
    pub fn validate(&self) -> Result<()> {
        self.ping.validate()?;
        if self.burst == 0 {
            return Err(Error::Config(String::from("burst must be at least 1")));
        }
        Ok(())
    }
}

fn validate_duration(what: &str, duration: Duration) -> Result<()> {
    if duration < MIN_DURATION || duration > MAX_DURATION {
        return Err(Error::Config(format!(
            "{what} {}ms outside {}ms..{}ms",
            duration.as_millis(),
            MIN_DURATION.as_millis(),
            MAX_DURATION.as_millis()
        )));
    }
    Ok(())
}

fn validate_ttl(what: &str, ttl: TimeToLive) -> Result<()> {
    if ttl.0 == 0 {
        return Err(Error::Config(format!("{what} must be at least 1")));
    }
    Ok(())
}

fn validate_packet_size(packet_size: PacketSize) -> Result<()> {
    if packet_size < MIN_PACKET_SIZE || packet_size > MAX_PACKET_SIZE {
        return Err(Error::Config(format!(
            "packet size {} outside {}..{}",
            packet_size.0, MIN_PACKET_SIZE.0, MAX_PACKET_SIZE.0
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults_validate() {
        assert!(TracerouteConfig::default().validate().is_ok());
        assert!(PingConfig::default().validate().is_ok());
        assert!(BurstpingConfig::default().validate().is_ok());
    }

    #[test_case(Duration::from_millis(99); "below minimum")]
    #[test_case(Duration::from_secs(3601); "above maximum")]
    fn test_duration_bounds_rejected(duration: Duration) {
        let config = TracerouteConfig {
            duration,
            ..TracerouteConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_initial_above_final_rejected() {
        let config = TracerouteConfig {
            initial_max_ttl: TimeToLive(10),
            final_max_ttl: TimeToLive(5),
            ..TracerouteConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = PingConfig {
            ttl: TimeToLive(0),
            ..PingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_burst_rejected() {
        let config = BurstpingConfig {
            burst: 0,
            ..BurstpingConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
