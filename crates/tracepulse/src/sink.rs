use tracepulse_core::{ResultEntry, ResultSink};

/// A line-oriented sink writing one record per classified probe to stdout.
#[derive(Debug, Default)]
pub struct StreamSink;

impl ResultSink for StreamSink {
    fn write_result(&self, entry: &ResultEntry) {
        println!("{} {entry}", entry.destination());
    }

    fn may_start_new_transaction(&self) {}
}
