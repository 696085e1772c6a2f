//! Process-wide discovery of the local source address for a destination.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::OnceLock;

/// The port used when connecting the discovery socket; nothing is sent.
const DISCOVERY_PORT: u16 = 80;

static CACHE: OnceLock<Mutex<HashMap<IpAddr, IpAddr>>> = OnceLock::new();

/// The local address the kernel would route packets to `dest` from.
///
/// Discovered once per destination by connecting a UDP socket and reading
/// its local endpoint; later lookups hit the process-wide cache.
pub fn source_for_destination(dest: IpAddr) -> Result<IpAddr> {
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = cache.lock();
    if let Some(addr) = cache.get(&dest) {
        return Ok(*addr);
    }
    let addr = discover(dest)?;
    cache.insert(dest, addr);
    Ok(addr)
}

fn discover(dest: IpAddr) -> Result<IpAddr> {
    let domain = match dest {
        IpAddr::V4(_) => Domain::IPV4,
        IpAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.connect(&SockAddr::from(SocketAddr::new(dest, DISCOVERY_PORT)))?;
    socket
        .local_addr()?
        .as_socket()
        .map(|addr| addr.ip())
        .ok_or(Error::SourceDiscovery(dest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_loopback_resolves_to_loopback() {
        let dest = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let addr = source_for_destination(dest).unwrap();
        assert_eq!(dest, addr);
        // Second lookup is served from the cache.
        assert_eq!(addr, source_for_destination(dest).unwrap());
    }
}
