use std::collections::VecDeque;
use std::collections::vec_deque::Drain;

/// One line of the session file, already rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Written verbatim. Queuing one resets the time-since-last-event anchor.
    Header(String),
    /// A frame row with its stimulus/trial/event prefix applied
    Data(String),
}

impl LogRecord {
    pub fn line(&self) -> &str {
        match self {
            LogRecord::Header(line) | LogRecord::Data(line) => line,
        }
    }

    pub fn is_header(&self) -> bool {
        matches!(self, LogRecord::Header(_))
    }
}

/// FIFO of records awaiting a flush
#[derive(Debug, Clone)]
pub struct LogQueue {
    records: VecDeque<LogRecord>,
    threshold: usize,
}

impl LogQueue {
    /// A threshold of zero behaves like one: every record flushes.
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            records: VecDeque::with_capacity(threshold),
            threshold,
        }
    }

    /// Enqueues `record`; returns true once the queue is due for a flush.
    pub fn push(&mut self, record: LogRecord) -> bool {
        self.records.push_back(record);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.threshold
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Removes every record, oldest first.
    pub fn drain(&mut self) -> Drain<'_, LogRecord> {
        self.records.drain(..)
    }
}
