use std::io;
use std::net::IpAddr;
use thiserror::Error;
use tracepulse_packet::PacketError;

/// A probing error.
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration is rejected at startup.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Binding or preparing the raw socket failed; fatal for the engine.
    #[error("failed to bind probe socket to {addr}: {source}")]
    Bind { addr: IpAddr, source: io::Error },
    /// Sending a probe failed; the probe is dropped and the engine continues.
    #[error("probe send failed: {0}")]
    Send(io::Error),
    /// The kernel accepted fewer bytes than the probe datagram holds.
    #[error("short probe send: {sent} of {expected} bytes")]
    ShortSend { sent: usize, expected: usize },
    /// No local source address could be determined for a destination.
    #[error("unable to determine source address for {0}")]
    SourceDiscovery(IpAddr),
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A probing result.
pub type Result<T> = std::result::Result<T, Error>;
