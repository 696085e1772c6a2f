use crate::probe::ResultEntry;

/// The outward seam for completed probes.
///
/// One sink instance is shared by every engine in the process, so
/// implementations serialize their own writes. Both calls must return
/// promptly; sinks buffer internally and flush on their own schedule.
pub trait ResultSink: Send + Sync {
    /// Hand over one classified probe record.
    fn write_result(&self, entry: &ResultEntry);

    /// A scheduling cycle completed; the sink may batch up accumulated
    /// records into a new transaction.
    fn may_start_new_transaction(&self);
}
