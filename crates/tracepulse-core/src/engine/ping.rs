//! The ping engine: one probe per destination per interval, with
//! expiration-driven flushing.

use crate::config::PingConfig;
use crate::engine::{jitter, EngineCore};
use crate::error::Result;
use crate::net::Network;
use crate::probe::DestinationInfo;
use crate::sink::ResultSink;
use crate::types::Round;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::debug;

/// Continuously ping all destinations from one source address.
pub struct Ping<N> {
    core: EngineCore<N>,
    config: PingConfig,
}

impl<N: Network> Ping<N> {
    pub fn new(
        config: PingConfig,
        src_addr: IpAddr,
        network: N,
        destinations: Arc<Mutex<BTreeSet<DestinationInfo>>>,
        sink: Arc<dyn ResultSink>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self> {
        config.validate()?;
        let core = EngineCore::new(
            src_addr,
            network,
            destinations,
            sink,
            stop,
            config.packet_size,
            config.initial_sequence,
        );
        Ok(Self { core, config })
    }

    /// Run until stopped or for the configured number of iterations.
    /// Entries still pending at the end are drained as timeouts.
    pub fn run(&mut self) {
        let mut iteration: u64 = 0;
        loop {
            if self.core.stop_requested() {
                break;
            }
            if self
                .config
                .iterations
                .is_some_and(|iterations| iteration >= iterations)
            {
                break;
            }
            debug!("ping iteration {} from {}", iteration + 1, self.core.src_addr());
            let mut target_checksum = None;
            for dest in self.core.destinations() {
                self.core
                    .send_probe(dest, self.config.ttl, Round(0), Some(&mut target_checksum));
            }
            self.core.may_start_new_transaction();
            let deadline = Instant::now() + self.config.interval + jitter(self.config.interval);
            self.core.await_replies(deadline, false);
            self.flush_due();
            iteration += 1;
        }
        self.core.drain_all();
    }

    /// Flush everything classified or expired; a removed entry never comes
    /// back, so each probe is written exactly once.
    fn flush_due(&mut self) {
        let now = SystemTime::now();
        let mut entries = self.core.results.take_flushable(now, self.config.expiration);
        entries.sort_by_key(|entry| (entry.destination().address(), entry.seq_number()));
        for entry in &entries {
            self.core.write_result(entry);
        }
    }
}
