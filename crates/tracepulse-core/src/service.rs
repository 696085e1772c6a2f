//! One service thread per source address, each owning its raw socket and
//! engine. Threads share nothing but the result sink.

use crate::config::{BurstpingConfig, PingConfig, TracerouteConfig};
use crate::engine::{Burstping, Ping, Traceroute};
use crate::error::{Error, Result};
use crate::net::channel::ProbeChannel;
use crate::probe::DestinationInfo;
use crate::sink::ResultSink;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{error, info};

/// Which probing mode a service runs.
#[derive(Debug, Clone)]
pub enum Mode {
    Traceroute(TracerouteConfig),
    Ping(PingConfig),
    Burstping(BurstpingConfig),
}

enum EngineKind {
    Traceroute(Traceroute<ProbeChannel>),
    Ping(Ping<ProbeChannel>),
    Burstping(Burstping<ProbeChannel>),
}

/// A running probing service for one source address.
pub struct ServiceHandle {
    source: IpAddr,
    stop: Arc<AtomicBool>,
    destinations: Arc<Mutex<BTreeSet<DestinationInfo>>>,
    thread: thread::JoinHandle<()>,
}

/// Bind a raw socket for `src_addr` and start the engine on its own thread.
///
/// Destinations of the other address family are skipped; a source with no
/// compatible destination, a bind failure or an invalid configuration all
/// surface here, before anything is sent.
pub fn spawn(
    src_addr: IpAddr,
    destinations: &BTreeSet<DestinationInfo>,
    mode: &Mode,
    sink: Arc<dyn ResultSink>,
) -> Result<ServiceHandle> {
    let compatible: BTreeSet<DestinationInfo> = destinations
        .iter()
        .copied()
        .filter(|dest| dest.address().is_ipv6() == src_addr.is_ipv6())
        .collect();
    if compatible.is_empty() {
        return Err(Error::Config(format!(
            "no destinations match the address family of source {src_addr}"
        )));
    }
    let channel = ProbeChannel::bind(src_addr)?;
    let stop = Arc::new(AtomicBool::new(false));
    let shared = Arc::new(Mutex::new(compatible));
    let engine = match mode {
        Mode::Traceroute(config) => EngineKind::Traceroute(Traceroute::new(
            config.clone(),
            src_addr,
            channel,
            Arc::clone(&shared),
            sink,
            Arc::clone(&stop),
        )?),
        Mode::Ping(config) => EngineKind::Ping(Ping::new(
            config.clone(),
            src_addr,
            channel,
            Arc::clone(&shared),
            sink,
            Arc::clone(&stop),
        )?),
        Mode::Burstping(config) => EngineKind::Burstping(Burstping::new(
            config.clone(),
            src_addr,
            channel,
            Arc::clone(&shared),
            sink,
            Arc::clone(&stop),
        )?),
    };
    let thread = thread::Builder::new()
        .name(format!("probe-{src_addr}"))
        .spawn(move || {
            info!("probing service for {src_addr} started");
            match engine {
                EngineKind::Traceroute(mut engine) => engine.run(),
                EngineKind::Ping(mut engine) => engine.run(),
                EngineKind::Burstping(mut engine) => engine.run(),
            }
            info!("probing service for {src_addr} finished");
        })?;
    Ok(ServiceHandle {
        source: src_addr,
        stop,
        destinations: shared,
        thread,
    })
}

impl ServiceHandle {
    /// The source address this service probes from.
    #[must_use]
    pub const fn source(&self) -> IpAddr {
        self.source
    }

    /// Ask the engine to stop; it notices at its next suspension point.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Wait for the engine thread to drain and exit.
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("probing service for {} panicked", self.source);
        }
    }

    /// Add a destination; probed from the next scheduling cycle on.
    /// Family-mismatched addresses are ignored.
    pub fn add_destination(&self, dest: DestinationInfo) {
        if dest.address().is_ipv6() == self.source.is_ipv6() {
            self.destinations.lock().insert(dest);
        }
    }

    /// Remove a destination; takes effect at the next scheduling cycle.
    pub fn remove_destination(&self, dest: DestinationInfo) {
        self.destinations.lock().remove(&dest);
    }
}
