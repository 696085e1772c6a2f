//! The burst ping engine: `burst` back-to-back probes per destination per
//! interval, submitted as one vectored send to amortize syscall cost and
//! expose short-timescale loss correlation.

use crate::config::BurstpingConfig;
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

/// Continuously burst-ping all destinations from one source address.
pub struct Burstping<N> {
    core: EngineCore<N>,
    config: BurstpingConfig,
}

impl<N: Network> Burstping<N> {
    pub fn new(
        config: BurstpingConfig,
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
            config.ping.packet_size,
            config.ping.initial_sequence,
        );
        Ok(Self { core, config })
    }

    /// Run until stopped or for the configured number of iterations.
    ///
    /// Identical to [`crate::Ping`] except that each destination receives a
    /// burst of probes with consecutive sequence numbers and natural,
    /// untweaked checksums.
    pub fn run(&mut self) {
        let mut iteration: u64 = 0;
        loop {
            if self.core.stop_requested() {
                break;
            }
            if self
                .config
                .ping
                .iterations
                .is_some_and(|iterations| iteration >= iterations)
            {
                break;
            }
            debug!(
                "burst iteration {} from {}",
                iteration + 1,
                self.core.src_addr()
            );
            for dest in self.core.destinations() {
                self.core
                    .send_burst(dest, self.config.ping.ttl, Round(0), self.config.burst);
            }
            self.core.may_start_new_transaction();
            let deadline =
                Instant::now() + self.config.ping.interval + jitter(self.config.ping.interval);
            self.core.await_replies(deadline, false);
            self.flush_due();
            iteration += 1;
        }
        self.core.drain_all();
    }

    fn flush_due(&mut self) {
        let now = SystemTime::now();
        let mut entries = self
            .core
            .results
            .take_flushable(now, self.config.ping.expiration);
        entries.sort_by_key(|entry| (entry.destination().address(), entry.seq_number()));
        for entry in &entries {
            self.core.write_result(entry);
        }
    }
}
