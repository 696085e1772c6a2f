use clap::Parser;
use std::net::IpAddr;
use std::str::FromStr;
use tracepulse_core::{DestinationInfo, TrafficClass};

/// Actively measure network paths: traceroute, ping or burst-ping a set of
/// destinations from a set of local source addresses over raw ICMP.
#[derive(Parser, Debug)]
#[command(name = "tracepulse", version, about)]
pub struct Args {
    /// A source address to probe from (repeatable).
    #[arg(long = "source", value_name = "ADDR", required = true)]
    pub sources: Vec<IpAddr>,

    /// A destination to probe, optionally with a traffic class (repeatable).
    #[arg(long = "destination", value_name = "ADDR[@TC]", required = true)]
    pub destinations: Vec<DestinationArg>,

    /// Continuously ping each destination.
    #[arg(long, conflicts_with_all = ["traceroute", "burstping"])]
    pub ping: bool,

    /// Traceroute each destination (the default mode).
    #[arg(long)]
    pub traceroute: bool,

    /// Ping each destination with bursts of back-to-back probes.
    #[arg(long, conflicts_with = "traceroute")]
    pub burstping: bool,

    /// The traceroute per-round deadline in milliseconds.
    #[arg(long = "traceroute-duration", value_name = "MS", default_value_t = 3000)]
    pub traceroute_duration: u64,

    /// The TTL ceiling of the first traceroute sweep.
    #[arg(long = "traceroute-initial-max-ttl", value_name = "N", default_value_t = 6)]
    pub traceroute_initial_max_ttl: u8,

    /// The TTL ceiling a traceroute run never exceeds.
    #[arg(long = "traceroute-final-max-ttl", value_name = "N", default_value_t = 36)]
    pub traceroute_final_max_ttl: u8,

    /// How far the TTL ceiling grows per unanswered sweep.
    #[arg(long = "traceroute-increment-max-ttl", value_name = "N", default_value_t = 6)]
    pub traceroute_increment_max_ttl: u8,

    /// The ping interval in milliseconds.
    #[arg(long = "ping-interval", value_name = "MS", default_value_t = 1000)]
    pub ping_interval: u64,

    /// The ping per-probe lifetime in milliseconds.
    #[arg(long = "ping-expiration", value_name = "MS", default_value_t = 30000)]
    pub ping_expiration: u64,

    /// The fixed TTL of ping probes.
    #[arg(long = "ping-ttl", value_name = "N", default_value_t = 64)]
    pub ping_ttl: u8,

    /// The total ICMP message size of ping and burstping probes.
    #[arg(long, value_name = "BYTES", default_value_t = 56)]
    pub payload: u16,

    /// Back-to-back probes per destination per interval (burstping).
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub burst: usize,

    /// Stop after this many intervals (ping/burstping) or runs (traceroute).
    #[arg(long, value_name = "N")]
    pub iterations: Option<u64>,

    /// The log filter, e.g. `info` or `tracepulse_core=debug`.
    #[arg(long = "log-level", value_name = "FILTER", default_value = "info")]
    pub log_level: String,
}

/// A destination argument: `ADDR` or `ADDR@TC` with a decimal or `0x` hex
/// traffic class.
#[derive(Debug, Clone)]
pub struct DestinationArg(pub DestinationInfo);

impl FromStr for DestinationArg {
    type Err = String;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        let (addr, traffic_class) = match arg.split_once('@') {
            Some((addr, tc)) => {
                let tc = tc.strip_prefix("0x").map_or_else(
                    || tc.parse(),
                    |hex| u8::from_str_radix(hex, 16),
                );
                (addr, tc.map_err(|_| format!("invalid traffic class in '{arg}'"))?)
            }
            None => (arg, 0),
        };
        let address: IpAddr = addr
            .parse()
            .map_err(|_| format!("invalid address '{addr}'"))?;
        Ok(Self(DestinationInfo::new(address, TrafficClass(traffic_class))))
    }
}
