//! The traceroute engine: a TTL sweep per destination, widened until the
//! destination answers or the TTL ceiling is reached.

use crate::config::TracerouteConfig;
use crate::engine::{jitter, EngineCore};
use crate::error::Result;
use crate::net::Network;
use crate::probe::{DestinationInfo, ResultEntry};
use crate::sink::ResultSink;
use crate::types::{Round, TimeToLive};
use itertools::Itertools;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Traceroute all destinations from one source address, round-robin,
/// indefinitely.
pub struct Traceroute<N> {
    core: EngineCore<N>,
    config: TracerouteConfig,
}

impl<N: Network> Traceroute<N> {
    pub fn new(
        config: TracerouteConfig,
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

    /// Run until stopped or, when configured, for `max_rounds` completed
    /// destination runs. Entries of an interrupted run are drained as
    /// timeouts on the way out.
    pub fn run(&mut self) {
        let mut completed = 0_usize;
        'runs: loop {
            if self.core.stop_requested() {
                break;
            }
            let destinations = self.core.destinations();
            if destinations.is_empty() {
                break;
            }
            for dest in destinations {
                if self.core.stop_requested() {
                    break 'runs;
                }
                self.run_target(dest);
                completed += 1;
                if self
                    .config
                    .max_rounds
                    .is_some_and(|max_rounds| completed >= max_rounds)
                {
                    break 'runs;
                }
            }
        }
        self.core.drain_all();
    }

    /// One full run toward `dest`: sweep, widen, classify, flush.
    fn run_target(&mut self, dest: DestinationInfo) {
        debug!("traceroute from {} to {dest}", self.core.src_addr());
        self.core.begin_run();
        let mut min_ttl = TimeToLive(1);
        let mut max_ttl =
            self.core
                .cached_initial_ttl(dest, self.config.initial_max_ttl, self.config.final_max_ttl);
        let mut round = Round(0);
        loop {
            // High TTLs go out first so distant responses pipeline behind
            // near ones.
            let mut target_checksum = None;
            for ttl in (min_ttl.0..=max_ttl.0).rev() {
                self.core
                    .send_probe(dest, TimeToLive(ttl), round, Some(&mut target_checksum));
            }
            let deadline = Instant::now() + self.config.duration + jitter(self.config.duration);
            self.core.await_replies(deadline, true);
            if self.core.stop_requested() {
                return;
            }
            if self.core.last_hop().is_none() && max_ttl < self.config.final_max_ttl {
                // Not reached: widen the sweep within the same run.
                min_ttl = max_ttl + TimeToLive(1);
                max_ttl = TimeToLive(
                    max_ttl
                        .0
                        .saturating_add(self.config.increment_max_ttl.0)
                        .min(self.config.final_max_ttl.0),
                );
                round += Round(1);
                debug!("{dest} not reached, extending sweep to {}..{}", min_ttl.0, max_ttl.0);
                continue;
            }
            break;
        }
        if let Some(last_hop) = self.core.last_hop() {
            self.core.cache_ttl(dest, last_hop);
        }
        self.flush_run();
    }

    /// Classify the leftovers and hand the whole run to the sink in hop
    /// order.
    fn flush_run(&mut self) {
        self.core.results.expire_unknown();
        let entries = self
            .core
            .results
            .drain()
            .sorted_by_key(ResultEntry::hop)
            .collect::<Vec<_>>();
        for entry in &entries {
            self.core.write_result(entry);
        }
        self.core.may_start_new_transaction();
    }
}
