use crate::logging::{LogRecord, LogSink, SinkError};
use std::sync::{Arc, Mutex};

/// Keeps every record it receives in memory.
///
/// Cloning a `MemorySink` gives you another handle to the same buffer: hand one clone to the
/// consumer group and keep the other to inspect what was logged.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the records written so far, in order of arrival.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// The rendered messages written so far, in order of arrival.
    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .map_err(|_| SinkError::Unavailable("the record buffer is poisoned".into()))?
            .push(record.clone());
        Ok(())
    }
}
