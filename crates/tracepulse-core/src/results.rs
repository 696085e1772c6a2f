//! The per-engine table of outstanding and classified probes.

use crate::probe::{HopStatus, ResultEntry};
use crate::types::Sequence;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::{Duration, SystemTime};

/// An ordered map of probe records keyed by sequence number.
///
/// All status transitions are funneled through this type so that an entry
/// moves from `Unknown` to a terminal status exactly once and the
/// outstanding-request counter always equals the number of `Unknown` entries.
#[derive(Debug, Default)]
pub struct ResultsMap {
    entries: BTreeMap<Sequence, ResultEntry>,
    outstanding: usize,
}

impl ResultsMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of entries still awaiting a response.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.outstanding = 0;
    }

    /// Register a freshly sent probe.
    ///
    /// Returns `false` when the sequence number is still occupied by an
    /// earlier probe, in which case the entry is not inserted.
    pub fn insert_pending(&mut self, entry: ResultEntry) -> bool {
        let seq_number = entry.seq_number();
        if self.entries.contains_key(&seq_number) {
            return false;
        }
        self.entries.insert(seq_number, entry);
        self.outstanding += 1;
        true
    }

    /// Record a matched response against a pending entry.
    ///
    /// The first response wins: entries which are absent or already
    /// classified are left untouched and `None` is returned.
    pub fn record_response(
        &mut self,
        seq_number: Sequence,
        status: HopStatus,
        receive_time: SystemTime,
        responder: IpAddr,
    ) -> Option<&ResultEntry> {
        let entry = self.entries.get_mut(&seq_number)?;
        if entry.status().is_terminal() {
            return None;
        }
        entry.record(status, receive_time, responder);
        self.outstanding -= 1;
        Some(entry)
    }

    /// Turn every entry still `Unknown` into a `Timeout`.
    pub fn expire_unknown(&mut self) {
        for entry in self.entries.values_mut() {
            if !entry.status().is_terminal() {
                entry.expire();
                self.outstanding -= 1;
            }
        }
    }

    /// Remove and return every entry, in sequence-number order.
    pub fn drain(&mut self) -> impl Iterator<Item = ResultEntry> {
        self.outstanding = 0;
        std::mem::take(&mut self.entries).into_values()
    }

    /// Remove and return the entries due for flushing: those already
    /// classified plus those whose age reached `expiration`, the latter
    /// expired to `Timeout` on the way out.
    pub fn take_flushable(&mut self, now: SystemTime, expiration: Duration) -> Vec<ResultEntry> {
        let due: Vec<Sequence> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.status().is_terminal() || entry.age(now) >= expiration)
            .map(|(seq_number, _)| *seq_number)
            .collect();
        due.into_iter()
            .filter_map(|seq_number| {
                self.entries.remove(&seq_number).map(|mut entry| {
                    if !entry.status().is_terminal() {
                        entry.expire();
                        self.outstanding -= 1;
                    }
                    entry
                })
            })
            .collect()
    }

    /// Iterate the entries in sequence-number order.
    pub fn iter(&self) -> impl Iterator<Item = &ResultEntry> {
        self.entries.values()
    }
}
