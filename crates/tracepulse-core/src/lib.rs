//! A network path probing library.
//!
//! tracepulse-core issues ICMP Echo probes from a set of local source
//! addresses toward a set of destinations, in three modes:
//!
//! - [`Traceroute`]: per-destination TTL sweeps which widen until the
//!   destination answers, yielding a per-hop picture of the path.
//! - [`Ping`]: one probe per destination per interval, with
//!   expiration-driven flushing.
//! - [`Burstping`]: like ping, but several back-to-back probes per
//!   destination per interval in one vectored send.
//!
//! Each source address gets its own engine, raw socket and thread (see
//! [`spawn`]); engines correlate replies with outstanding probes via the
//! ICMP sequence number, an engine-lifetime magic number embedded in the
//! probe payload and, for truncated ICMPv4 errors, the echo identifier.
//! Classified probes are handed to a caller-supplied [`ResultSink`].

mod config;
mod engine;
mod error;
mod net;
mod probe;
mod results;
mod service;
mod sink;
mod types;

pub use config::{
    BurstpingConfig, PingConfig, TracerouteConfig, MAX_DURATION, MAX_PACKET_SIZE, MIN_DURATION,
    MIN_PACKET_SIZE,
};
pub use engine::{Burstping, Ping, Traceroute};
pub use error::{Error, Result};
pub use net::channel::ProbeChannel;
pub use net::source::source_for_destination;
pub use net::{Network, Response, ResponseKind};
pub use probe::{DestinationInfo, HopStatus, ResultEntry};
pub use results::ResultsMap;
pub use service::{spawn, Mode, ServiceHandle};
pub use sink::ResultSink;
pub use types::{
    MagicNumber, PacketSize, ProbeId, Round, Sequence, TimeToLive, TrafficClass,
};
